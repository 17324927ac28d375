//! Sync, cleanup and watch command handlers

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use eventsync_core::sync::{spawn_scheduler, SchedulerConfig, SchedulerEvent, SchedulerStatus};
use eventsync_core::{Config, SyncEngine};

use crate::output::Output;

/// Run one sync cycle over everything that is due
pub async fn sync(engine: &SyncEngine, output: &Output) -> Result<()> {
    let status = engine.status();
    if !status.has_pending_changes {
        output.message("Nothing to sync.");
        return Ok(());
    }

    output.message(&format!(
        "Syncing {} interest change(s) and {} view(s)...",
        status.pending_interests, status.pending_views
    ));
    let report = engine.sync_now().await;
    output.print_sync_report(&report);
    Ok(())
}

/// Evict stale cache entries and long-failing queue entries
pub fn cleanup(engine: &SyncEngine, config: &Config, output: &Output) -> Result<()> {
    let report = engine.cleanup(config.max_age());
    output.print_cleanup(&report);
    Ok(())
}

/// Keep syncing in the foreground until interrupted
pub async fn watch(engine: Arc<SyncEngine>, config: &Config, output: &Output) -> Result<()> {
    let mut handle = spawn_scheduler(engine, SchedulerConfig::from(config));
    output.message(&format!(
        "Watching for pending changes every {}s (Ctrl-C to stop)",
        config.sync_interval_secs
    ));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted, stopping scheduler");
                break;
            }
            event = handle.event_rx.recv() => {
                match event {
                    Some(SchedulerEvent::SyncCompleted(report)) if !report.is_empty() => {
                        output.print_sync_report(&report);
                    }
                    Some(SchedulerEvent::CleanupCompleted(report)) if !report.is_empty() => {
                        output.print_cleanup(&report);
                    }
                    Some(SchedulerEvent::StatusChanged(SchedulerStatus::Offline)) => {
                        output.message("Offline; changes will sync when reconnected");
                    }
                    Some(SchedulerEvent::StatusChanged(SchedulerStatus::Stopped)) | None => break,
                    Some(_) => {}
                }
            }
        }
    }

    handle.shutdown().await;
    output.success("Stopped");
    Ok(())
}
