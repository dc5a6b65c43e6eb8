//! Owned periodic scheduler driving reconciliation cycles.
//!
//! State machine: `Idle --start()--> Running --stop()--> Idle`. Nothing else.
//!
//! Every cycle, whether fired by the timer, by `run_once`, or by a
//! single-subject refresh holding [`Scheduler::cycle_gate`], runs under one
//! shared async mutex, so two cycles never overlap. The timer skips missed
//! ticks instead of queueing them.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use kdw_config::SchedulerSettings;
use kdw_reconcile::{CycleError, CycleSummary, ReconciliationEngine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::state::BusMsg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,
    #[error("scheduler is not running")]
    NotRunning,
    #[error("scheduler period must be greater than zero")]
    ZeroPeriod,
}

/// One reconciliation pass. Implemented by the engine; faked in tests.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleSummary, CycleError>;
}

#[async_trait]
impl CycleRunner for ReconciliationEngine {
    async fn run_cycle(&self) -> Result<CycleSummary, CycleError> {
        ReconciliationEngine::run_cycle(self)
            .await
            .map(|report| report.summary())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Cycles that ran to the end, including those that failed to list subjects.
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_cycle: Option<CycleSummary>,
    pub last_error: Option<String>,
}

struct Shared {
    runner: Arc<dyn CycleRunner>,
    bus: broadcast::Sender<BusMsg>,
    gate: Arc<Mutex<()>>,
    stats: RwLock<SchedulerStats>,
}

impl Shared {
    async fn run_gated(&self) -> Result<CycleSummary, CycleError> {
        let _cycle = self.gate.lock().await;
        let result = self.runner.run_cycle().await;

        let mut stats = self.stats.write().await;
        stats.cycles_completed += 1;
        match &result {
            Ok(summary) => {
                stats.last_cycle = Some(summary.clone());
                stats.last_error = None;
                let _ = self.bus.send(BusMsg::Cycle(summary.clone()));
            }
            Err(e) => {
                stats.cycles_failed += 1;
                stats.last_error = Some(e.to_string());
                let _ = self.bus.send(BusMsg::LogLine {
                    level: "ERROR".to_string(),
                    msg: format!("cycle aborted: {e}"),
                });
            }
        }
        result
    }
}

struct LoopHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    period: Duration,
    run_on_start: bool,
    running: StdMutex<Option<LoopHandle>>,
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn CycleRunner>,
        settings: &SchedulerSettings,
        bus: broadcast::Sender<BusMsg>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                runner,
                bus,
                gate: Arc::new(Mutex::new(())),
                stats: RwLock::new(SchedulerStats::default()),
            }),
            period: settings.poll_interval(),
            run_on_start: settings.run_on_start,
            running: StdMutex::new(None),
        }
    }

    fn handle(&self) -> MutexGuard<'_, Option<LoopHandle>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SchedulerState {
        if self.handle().is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Begin firing cycles. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut slot = self.handle();
        if slot.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }
        // `interval_at` panics on a zero period, inside the spawned task.
        if self.period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            self.period,
            self.run_on_start,
            stop_rx,
        ));
        *slot = Some(LoopHandle { stop_tx, join });

        info!(
            period_secs = self.period.as_secs_f64(),
            run_on_start = self.run_on_start,
            "scheduler started"
        );
        Ok(())
    }

    /// Halt future cycles. Returns once the loop has exited; a cycle that was
    /// already running finishes first.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let Some(handle) = self.handle().take() else {
            return Err(SchedulerError::NotRunning);
        };
        let _ = handle.stop_tx.send(());
        if let Err(e) = handle.join.await {
            error!(error = %e, "scheduler loop task ended abnormally");
        }
        info!("scheduler stopped");
        Ok(())
    }

    /// Run one cycle now, outside the timer, under the cycle gate.
    pub async fn run_once(&self) -> Result<CycleSummary, CycleError> {
        self.shared.run_gated().await
    }

    /// The mutex every cycle holds. Hold it to keep cycles out.
    pub fn cycle_gate(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.shared.gate)
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.shared.stats.read().await.clone()
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    period: Duration,
    run_on_start: bool,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let first = if run_on_start {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                if let Err(e) = shared.run_gated().await {
                    warn!(error = %e, "scheduled cycle failed");
                }
            }
        }
    }
}
