//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use chrono::DateTime;
use serde::Serialize;

use eventsync_core::{
    CleanupReport, EngineStatus, EventId, EventInteractionState, InterestPhase, InterestToggle,
    SyncReport, ViewTracking,
};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print the local state of one event
    pub fn print_state(
        &self,
        event_id: EventId,
        state: &EventInteractionState,
        phase: InterestPhase,
    ) {
        match self.format {
            OutputFormat::Human => {
                println!("Event:       {}", event_id);
                println!(
                    "Interested:  {} ({})",
                    yes_no(state.interested),
                    phase_label(phase)
                );
                println!("Interest:    {}", state.interest_count);
                println!(
                    "Views:       {}{}",
                    state.view_count,
                    if state.view_tracked { " (tracked)" } else { "" }
                );
                println!("Last sync:   {}", format_timestamp(state.last_sync));
                println!(
                    "Last change: {}",
                    format_timestamp(state.last_optimistic_update)
                );
            }
            OutputFormat::Json => {
                print_json(&serde_json::json!({
                    "eventId": event_id,
                    "phase": phase_label(phase),
                    "state": state,
                }));
            }
            OutputFormat::Quiet => {
                println!(
                    "{} {} {}",
                    state.interested, state.interest_count, state.view_count
                );
            }
        }
    }

    /// Print the immediate result of a toggle
    pub fn print_toggle(&self, event_id: EventId, toggle: &InterestToggle) {
        match self.format {
            OutputFormat::Human => {
                let verb = if toggle.interested {
                    "Marked interested in"
                } else {
                    "No longer interested in"
                };
                println!(
                    "✓ {} event {} ({} interested)",
                    verb, event_id, toggle.interest_count
                );
            }
            OutputFormat::Json => print_json(toggle),
            OutputFormat::Quiet => println!("{}", toggle.interested),
        }
    }

    /// Print the immediate result of view tracking
    pub fn print_view(&self, event_id: EventId, view: &ViewTracking) {
        match self.format {
            OutputFormat::Human => {
                println!("✓ Viewed event {} ({} views)", event_id, view.view_count);
            }
            OutputFormat::Json => print_json(view),
            OutputFormat::Quiet => println!("{}", view.view_count),
        }
    }

    /// Print the tally of one sync cycle
    pub fn print_sync_report(&self, report: &SyncReport) {
        match self.format {
            OutputFormat::Human => {
                if report.is_empty() {
                    println!("Nothing to sync.");
                    return;
                }
                println!(
                    "Synced {} of {} pending change(s)",
                    report.synced,
                    report.attempted()
                );
                if report.retrying > 0 {
                    println!("  Retrying later: {}", report.retrying);
                }
                if report.dropped > 0 {
                    println!("  Dropped:        {}", report.dropped);
                }
                if report.purged > 0 {
                    println!("  Deleted events: {}", report.purged);
                }
                if report.superseded > 0 {
                    println!("  Superseded:     {}", report.superseded);
                }
            }
            OutputFormat::Json => {
                print_json(&serde_json::json!({
                    "synced": report.synced,
                    "retrying": report.retrying,
                    "dropped": report.dropped,
                    "purged": report.purged,
                    "superseded": report.superseded,
                }));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print the result of a housekeeping sweep
    pub fn print_cleanup(&self, report: &CleanupReport) {
        match self.format {
            OutputFormat::Human => {
                if report.is_empty() {
                    println!("Nothing to clean up.");
                } else {
                    println!(
                        "✓ Evicted {} cached event(s) and {} failed change(s)",
                        report.evicted_cache_entries, report.evicted_queue_entries
                    );
                }
            }
            OutputFormat::Json => {
                print_json(&serde_json::json!({
                    "evictedCacheEntries": report.evicted_cache_entries,
                    "evictedQueueEntries": report.evicted_queue_entries,
                }));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print engine status
    pub fn print_status(&self, status: &EngineStatus, api_url: &str) {
        match self.format {
            OutputFormat::Human => {
                println!("EventSync Status");
                println!("================");
                println!();
                println!("Server: {}", api_url);
                println!("Online: {}", yes_no(status.online));
                println!();
                println!("Pending:");
                println!("  Interest changes: {}", status.pending_interests);
                println!("  Views:            {}", status.pending_views);
                println!();
                println!("Cached events: {}", status.cached_events);
            }
            OutputFormat::Json => print_json(status),
            OutputFormat::Quiet => {
                println!("{}", status.pending_interests + status.pending_views);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Human label for an interest phase
pub fn phase_label(phase: InterestPhase) -> &'static str {
    match phase {
        InterestPhase::Unknown => "not synced",
        InterestPhase::PendingAdd => "pending add",
        InterestPhase::PendingRemove => "pending remove",
        InterestPhase::Synced => "synced",
        InterestPhase::Purged => "deleted",
    }
}

/// Format a millisecond timestamp as UTC, or "never"
fn format_timestamp(millis: Option<i64>) -> String {
    millis
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}
