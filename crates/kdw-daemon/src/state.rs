//! Shared runtime state for kdw-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The scheduler owns the
//! only background loop; everything else here is handles.

use std::sync::Arc;
use std::time::Duration;

use kdw_config::SchedulerSettings;
use kdw_reconcile::{CycleSummary, ReconciliationEngine, Registrar, SubjectAdmin, SubjectStore};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::scheduler::{CycleRunner, Scheduler};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Cycle(CycleSummary),
    LogLine { level: String, msg: String },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub engine: Arc<ReconciliationEngine>,
    pub store: Arc<dyn SubjectStore>,
    pub admin: Arc<dyn SubjectAdmin>,
    pub registrar: Arc<Registrar>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    /// Wire state around an engine. The scheduler is created idle.
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        store: Arc<dyn SubjectStore>,
        admin: Arc<dyn SubjectAdmin>,
        scheduler_settings: &SchedulerSettings,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        let runner: Arc<dyn CycleRunner> = engine.clone();
        let scheduler = Arc::new(Scheduler::new(runner, scheduler_settings, bus.clone()));
        let registrar = Arc::new(Registrar::new(Arc::clone(&admin), Arc::clone(&engine)));

        Self {
            bus,
            build: BuildInfo {
                service: "kdw-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            engine,
            store,
            admin,
            registrar,
            scheduler,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
