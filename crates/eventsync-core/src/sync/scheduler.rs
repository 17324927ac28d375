//! Background sync scheduler
//!
//! Runs the sync executor on a timer and reacts to connectivity and
//! visibility changes reported by the host application:
//!
//! - every `sync_interval`, sync if online and anything is pending
//! - every `cleanup_interval`, evict stale cache and queue entries
//! - `Online` after being offline triggers one immediate sync
//! - `Offline` suspends syncing; actions keep queueing locally
//! - `Visibility(true)` syncs if online with pending work
//!
//! Shutting down (or disposing the engine) stops future ticks only. A cycle
//! that is already running finishes before the task exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::executor::SyncReport;
use crate::config::Config;
use crate::engine::{CleanupReport, SyncEngine};

/// Commands sent to the scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Sync immediately if online
    SyncNow,
    /// Connectivity restored
    Online,
    /// Connectivity lost
    Offline,
    /// Host application became visible (true) or hidden (false)
    Visibility(bool),
    /// Stop the scheduler
    Shutdown,
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    /// Waiting for the next tick or command
    Idle,
    /// A sync cycle is running
    Syncing,
    /// Connectivity lost; syncs suspended
    Offline,
    /// The task has exited
    Stopped,
}

/// Events emitted by the scheduler task
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    StatusChanged(SchedulerStatus),
    SyncCompleted(SyncReport),
    CleanupCompleted(CleanupReport),
}

/// Shortest timer period; tokio intervals reject zero
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Timing for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sync_interval: Duration,
    pub cleanup_interval: Duration,
    /// Age after which idle or failing entries are evicted
    pub max_age: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(15),
            cleanup_interval: Duration::from_secs(3600),
            max_age: Duration::from_secs(24 * 3600),
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            sync_interval: config.sync_interval().max(MIN_PERIOD),
            cleanup_interval: config.cleanup_interval().max(MIN_PERIOD),
            max_age: config.max_age(),
        }
    }
}

/// Handle to control the scheduler task
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    /// Receive events from the scheduler task
    pub event_rx: mpsc::Receiver<SchedulerEvent>,
    status_rx: watch::Receiver<SchedulerStatus>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Send a command; returns false if the task has exited
    pub async fn send(&self, command: SchedulerCommand) -> bool {
        self.command_tx.send(command).await.is_ok()
    }

    pub async fn sync_now(&self) -> bool {
        self.send(SchedulerCommand::SyncNow).await
    }

    pub async fn set_online(&self, online: bool) -> bool {
        let command = if online {
            SchedulerCommand::Online
        } else {
            SchedulerCommand::Offline
        };
        self.send(command).await
    }

    pub async fn set_visible(&self, visible: bool) -> bool {
        self.send(SchedulerCommand::Visibility(visible)).await
    }

    pub fn status(&self) -> SchedulerStatus {
        *self.status_rx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SchedulerStatus> {
        self.status_rx.clone()
    }

    /// Stop the scheduler and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(SchedulerCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Spawn the scheduler on the current tokio runtime
pub fn spawn_scheduler(engine: Arc<SyncEngine>, config: SchedulerConfig) -> SchedulerHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);
    let initial = if engine.is_online() {
        SchedulerStatus::Idle
    } else {
        SchedulerStatus::Offline
    };
    let (status_tx, status_rx) = watch::channel(initial);

    let task = tokio::spawn(scheduler_loop(
        engine, config, command_rx, event_tx, status_tx,
    ));

    SchedulerHandle {
        command_tx,
        event_rx,
        status_rx,
        task,
    }
}

struct Notifier {
    event_tx: mpsc::Sender<SchedulerEvent>,
    status_tx: watch::Sender<SchedulerStatus>,
}

impl Notifier {
    fn status(&self, status: SchedulerStatus) {
        let _ = self.status_tx.send(status);
        self.emit(SchedulerEvent::StatusChanged(status));
    }

    // Never block the loop on a consumer that stopped reading
    fn emit(&self, event: SchedulerEvent) {
        let _ = self.event_tx.try_send(event);
    }
}

async fn scheduler_loop(
    engine: Arc<SyncEngine>,
    config: SchedulerConfig,
    mut command_rx: mpsc::Receiver<SchedulerCommand>,
    event_tx: mpsc::Sender<SchedulerEvent>,
    status_tx: watch::Sender<SchedulerStatus>,
) {
    let notifier = Notifier {
        event_tx,
        status_tx,
    };

    let sync_period = config.sync_interval.max(MIN_PERIOD);
    let cleanup_period = config.cleanup_interval.max(MIN_PERIOD);

    // First tick fires immediately so restored intent syncs on startup
    let mut sync_tick = interval(sync_period);
    sync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cleanup_tick = interval_at(Instant::now() + cleanup_period, cleanup_period);
    cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Sync scheduler started (interval {:?}, cleanup every {:?})",
        sync_period, cleanup_period
    );

    loop {
        tokio::select! {
            _ = sync_tick.tick() => {
                if engine.is_online() && engine.has_pending_changes() {
                    run_cycle(&engine, &notifier).await;
                }
            }
            _ = cleanup_tick.tick() => {
                let report = engine.cleanup(config.max_age);
                notifier.emit(SchedulerEvent::CleanupCompleted(report));
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(SchedulerCommand::SyncNow) => {
                        if engine.is_online() {
                            run_cycle(&engine, &notifier).await;
                        }
                    }
                    Some(SchedulerCommand::Online) => {
                        let was_online = engine.set_online(true);
                        notifier.status(SchedulerStatus::Idle);
                        if !was_online {
                            run_cycle(&engine, &notifier).await;
                        }
                    }
                    Some(SchedulerCommand::Offline) => {
                        engine.set_online(false);
                        notifier.status(SchedulerStatus::Offline);
                    }
                    Some(SchedulerCommand::Visibility(visible)) => {
                        debug!("Visibility changed: {}", visible);
                        if visible && engine.is_online() && engine.has_pending_changes() {
                            run_cycle(&engine, &notifier).await;
                        }
                    }
                    Some(SchedulerCommand::Shutdown) | None => break,
                }
            }
        }

        if engine.is_disposed() {
            debug!("Engine disposed, stopping scheduler");
            break;
        }
    }

    engine.persist();
    notifier.status(SchedulerStatus::Stopped);
    info!("Sync scheduler stopped");
}

async fn run_cycle(engine: &SyncEngine, notifier: &Notifier) {
    notifier.status(SchedulerStatus::Syncing);
    let report = engine.sync_now().await;
    notifier.emit(SchedulerEvent::SyncCompleted(report));
    let status = if engine.is_online() {
        SchedulerStatus::Idle
    } else {
        SchedulerStatus::Offline
    };
    notifier.status(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::queue::RetryPolicy;
    use crate::storage::MemoryStore;

    fn quiet_config() -> SchedulerConfig {
        SchedulerConfig {
            sync_interval: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(3600),
            max_age: Duration::from_secs(24 * 3600),
        }
    }

    fn engine(api: Arc<MockApi>) -> Arc<SyncEngine> {
        SyncEngine::init(Arc::new(MemoryStore::new()), api, RetryPolicy::default())
    }

    async fn next_sync(handle: &mut SchedulerHandle) -> SyncReport {
        loop {
            match handle.event_rx.recv().await {
                Some(SchedulerEvent::SyncCompleted(report)) => return report,
                Some(_) => continue,
                None => panic!("scheduler stopped"),
            }
        }
    }

    #[tokio::test]
    async fn test_online_transition_syncs_once() {
        let api = Arc::new(MockApi::new());
        let engine = engine(api.clone());
        engine.set_online(false);

        let mut handle = spawn_scheduler(engine.clone(), quiet_config());
        assert_eq!(handle.status(), SchedulerStatus::Offline);

        engine.toggle_interest(1);
        engine.toggle_interest(2);
        engine.track_view(3);
        assert_eq!(api.call_count(), 0);

        assert!(handle.set_online(true).await);
        let report = next_sync(&mut handle).await;

        assert_eq!(report.synced, 3);
        assert_eq!(api.calls_to("apply_interest").len(), 2);
        assert_eq!(api.calls_to("record_view"), vec![3]);
        assert!(!engine.has_pending_changes());

        handle.shutdown().await;
    }

    async fn wait_for_status(handle: &mut SchedulerHandle, wanted: SchedulerStatus) {
        loop {
            match handle.event_rx.recv().await {
                Some(SchedulerEvent::StatusChanged(status)) if status == wanted => return,
                Some(_) => continue,
                None => panic!("scheduler stopped"),
            }
        }
    }

    #[tokio::test]
    async fn test_offline_command_suspends_sync() {
        let api = Arc::new(MockApi::new());
        let engine = engine(api.clone());
        let mut handle = spawn_scheduler(engine.clone(), quiet_config());

        assert!(handle.set_online(false).await);
        wait_for_status(&mut handle, SchedulerStatus::Offline).await;
        assert!(!engine.is_online());

        engine.toggle_interest(4);
        assert!(handle.sync_now().await);
        assert!(handle.set_visible(true).await);
        assert!(handle.set_online(true).await);
        let report = next_sync(&mut handle).await;

        // Only the online transition reached the network
        assert_eq!(report.synced, 1);
        assert_eq!(api.calls_to("apply_interest"), vec![4]);
        assert_eq!(api.call_count(), 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_startup_tick_syncs_restored_intent() {
        let api = Arc::new(MockApi::new());
        let engine = engine(api.clone());
        engine.track_view(8);

        let mut handle = spawn_scheduler(engine.clone(), quiet_config());
        let report = next_sync(&mut handle).await;

        assert_eq!(report.synced, 1);
        assert_eq!(api.calls_to("record_view"), vec![8]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_interval_tick_syncs_new_work() {
        let api = Arc::new(MockApi::new());
        let engine = engine(api.clone());
        let config = SchedulerConfig {
            sync_interval: Duration::from_millis(20),
            ..quiet_config()
        };

        let mut handle = spawn_scheduler(engine.clone(), config);
        engine.toggle_interest(12);

        let report = tokio::time::timeout(Duration::from_secs(5), next_sync(&mut handle))
            .await
            .unwrap();
        assert_eq!(report.synced, 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_intervals_still_sync() {
        let api = Arc::new(MockApi::new());
        let engine = engine(api.clone());
        engine.track_view(21);

        let config = Config {
            sync_interval_secs: 0,
            cleanup_interval_secs: 0,
            ..Config::default()
        };
        let scheduler_config = SchedulerConfig::from(&config);
        assert_eq!(scheduler_config.sync_interval, MIN_PERIOD);
        assert_eq!(scheduler_config.cleanup_interval, MIN_PERIOD);

        let mut handle = spawn_scheduler(engine.clone(), scheduler_config);
        let status_rx = handle.subscribe_status();
        let report = tokio::time::timeout(Duration::from_secs(5), next_sync(&mut handle))
            .await
            .unwrap();
        assert_eq!(report.synced, 1);
        assert!(!engine.has_pending_changes());

        handle.shutdown().await;
        assert_eq!(*status_rx.borrow(), SchedulerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_zero_scheduler_config_is_clamped() {
        let api = Arc::new(MockApi::new());
        let engine = engine(api.clone());
        engine.toggle_interest(22);

        let config = SchedulerConfig {
            sync_interval: Duration::ZERO,
            cleanup_interval: Duration::ZERO,
            ..SchedulerConfig::default()
        };
        let mut handle = spawn_scheduler(engine.clone(), config);
        let report = tokio::time::timeout(Duration::from_secs(5), next_sync(&mut handle))
            .await
            .unwrap();
        assert_eq!(report.synced, 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let api = Arc::new(MockApi::new());
        let engine = engine(api.clone());
        let handle = spawn_scheduler(engine.clone(), quiet_config());
        let status_rx = handle.subscribe_status();

        handle.shutdown().await;

        assert_eq!(*status_rx.borrow(), SchedulerStatus::Stopped);
        engine.toggle_interest(1);
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn test_disposed_engine_stops_scheduler() {
        let api = Arc::new(MockApi::new());
        let engine = engine(api.clone());
        let mut handle = spawn_scheduler(engine.clone(), quiet_config());

        engine.dispose();
        assert!(handle.sync_now().await);
        wait_for_status(&mut handle, SchedulerStatus::Stopped).await;

        assert_eq!(handle.status(), SchedulerStatus::Stopped);
        handle.shutdown().await;
    }
}
