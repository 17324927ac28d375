//! Event interaction command handlers

use anyhow::{Context, Result};

use eventsync_core::{ApiError, EventId, SyncEngine};

use crate::output::Output;

/// Toggle interest, then push it unless `local_only`
pub async fn interest(
    engine: &SyncEngine,
    event_id: EventId,
    local_only: bool,
    output: &Output,
) -> Result<()> {
    let toggle = engine.toggle_interest(event_id);
    output.print_toggle(event_id, &toggle);

    if !local_only {
        push(engine, output).await;
    }
    Ok(())
}

/// Track a view, then push it unless `local_only`
pub async fn view(
    engine: &SyncEngine,
    event_id: EventId,
    local_only: bool,
    output: &Output,
) -> Result<()> {
    let view = engine.track_view(event_id);
    output.print_view(event_id, &view);

    if !local_only {
        push(engine, output).await;
    }
    Ok(())
}

/// Show local state without touching the network
pub fn show(engine: &SyncEngine, event_id: EventId, output: &Output) -> Result<()> {
    match engine.peek(event_id) {
        Some(state) => output.print_state(event_id, &state, engine.interest_phase(event_id)),
        None => output.message(&format!("No local state for event {}", event_id)),
    }
    Ok(())
}

/// Fetch authoritative counts and interest status from the server
pub async fn refresh(engine: &SyncEngine, event_id: EventId, output: &Output) -> Result<()> {
    let refreshed = match engine.refresh_event(event_id).await {
        Ok(_) => engine.refresh_interest_status(event_id).await,
        Err(e) => Err(e),
    };

    match refreshed {
        Ok(state) => {
            output.print_state(event_id, &state, engine.interest_phase(event_id));
            Ok(())
        }
        Err(ApiError::NotFound) => {
            output.message(&format!(
                "Event {} no longer exists; local state removed",
                event_id
            ));
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to refresh event {}", event_id)),
    }
}

async fn push(engine: &SyncEngine, output: &Output) {
    let report = engine.sync_now().await;
    if report.retrying > 0 && !output.is_quiet() && !output.is_json() {
        eprintln!("⚠ Server unreachable; change saved and will sync later");
    }
}
