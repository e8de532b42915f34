//! Daily inactivity sweep.
//!
//! Once a day, at the configured UTC hour, every ACTIVE analyzer whose last
//! activation is older than `inactivity_days` is moved to OFFLINE. Each analyzer is
//! handled on its own: one failure does not stop the sweep.

use super::{LifecycleManager, LifecycleTrigger};
use crate::config::LifecycleConfig;
use crate::error::AppResult;
use crate::model::AnalyzerStatus;
use crate::repository::AnalyzerRepository;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Analyzers moved to OFFLINE
    pub transitioned: Vec<String>,
    /// Analyzers whose transition failed
    pub failed_ids: Vec<String>,
    /// Wall time of the sweep
    pub elapsed: Duration,
}

/// Totals across every sweep since start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepMetrics {
    /// Analyzers moved to OFFLINE
    pub success_count: u64,
    /// Failed transitions
    pub failure_count: u64,
    /// Start of the latest sweep
    pub last_execution: Option<DateTime<Utc>>,
    /// Wall time of the latest sweep
    pub last_duration: Option<Duration>,
}

/// Moves idle ACTIVE analyzers to OFFLINE once a day.
pub struct InactivityScheduler {
    manager: Arc<LifecycleManager>,
    analyzers: Arc<dyn AnalyzerRepository>,
    config: LifecycleConfig,
    metrics: Mutex<SweepMetrics>,
}

impl InactivityScheduler {
    /// Scheduler firing sweep triggers through `manager`.
    pub fn new(
        manager: Arc<LifecycleManager>,
        analyzers: Arc<dyn AnalyzerRepository>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            manager,
            analyzers,
            config,
            metrics: Mutex::new(SweepMetrics::default()),
        }
    }

    /// Totals so far.
    pub fn metrics(&self) -> SweepMetrics {
        self.metrics.lock().clone()
    }

    /// Run one sweep as of `now`.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let started = Instant::now();
        let cutoff = now - ChronoDuration::days(i64::from(self.config.inactivity_days));
        let mut report = SweepReport::default();

        let idle: Vec<String> = self
            .analyzers
            .find_by_status(AnalyzerStatus::Active)
            .await?
            .into_iter()
            .filter(|a| a.last_activated.is_some_and(|ts| ts < cutoff))
            .map(|a| a.id)
            .collect();

        // Transitions are independent; results come back in candidate order.
        let outcomes = join_all(
            idle.iter()
                .map(|id| self.manager.fire(id, LifecycleTrigger::InactivitySweep)),
        )
        .await;
        for (id, outcome) in idle.into_iter().zip(outcomes) {
            match outcome {
                Ok(_) => report.transitioned.push(id),
                Err(e) => {
                    error!("Failed to transition analyzer {} to OFFLINE: {}", id, e);
                    report.failed_ids.push(id);
                }
            }
        }

        report.elapsed = started.elapsed();

        if report.failed_ids.len() > self.config.failure_warning_threshold {
            warn!(
                "{} analyzers failed transition to OFFLINE. Failed analyzer IDs: {}",
                report.failed_ids.len(),
                report.failed_ids.join(", ")
            );
        }
        info!(
            "Inactivity sweep finished: {} transitioned, {} failed in {:?}",
            report.transitioned.len(),
            report.failed_ids.len(),
            report.elapsed
        );

        {
            let mut metrics = self.metrics.lock();
            metrics.success_count += report.transitioned.len() as u64;
            metrics.failure_count += report.failed_ids.len() as u64;
            metrics.last_execution = Some(now);
            metrics.last_duration = Some(report.elapsed);
        }

        Ok(report)
    }

    /// Run the sweep every day at `sweep_hour_utc` until `shutdown` fires.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Inactivity scheduler started (daily at {:02}:00 UTC, {} day window)",
                self.config.sweep_hour_utc, self.config.inactivity_days
            );
            loop {
                let now = Utc::now();
                let next = next_run_after(now, self.config.sweep_hour_utc);
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Inactivity scheduler stopping");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {
                        if let Err(e) = self.run_sweep(Utc::now()).await {
                            error!("Inactivity sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

/// The first `hour:00:00` UTC strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}
