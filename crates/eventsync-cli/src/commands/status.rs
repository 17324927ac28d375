//! Status command handler

use anyhow::Result;

use eventsync_core::{Config, SyncEngine};

use crate::output::Output;

/// Show pending work and cache size
pub fn show(engine: &SyncEngine, config: &Config, output: &Output) -> Result<()> {
    output.print_status(&engine.status(), &config.api_url);
    Ok(())
}
