//! Fixed-interval driver for runs, reconciliation and drift checks.
//!
//! The scheduler owns no business logic. It ticks three independent
//! timers, calls into the orchestrator or reconciler, and logs whatever
//! comes back. Nothing it calls can stop it; only the shutdown signal
//! does.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

use super::orchestrator::Orchestrator;
use super::reconciler::Reconciler;
use crate::config::BurnerConfig;
use crate::error::PipelineError;

/// Periodic trigger for the orchestrator and reconciler.
#[derive(Debug)]
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    reconciler: Arc<Reconciler>,
    pipeline_every: Duration,
    reconcile_every: Duration,
    metrics_every: Duration,
}

impl Scheduler {
    /// Builds a scheduler using the configured intervals.
    #[must_use]
    pub fn new(
        config: &BurnerConfig,
        orchestrator: Arc<Orchestrator>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            orchestrator,
            reconciler,
            pipeline_every: Duration::from_secs(config.pipeline_interval_secs.max(1)),
            reconcile_every: Duration::from_secs(config.reconcile_interval_secs.max(1)),
            metrics_every: Duration::from_secs(config.metrics_interval_secs.max(1)),
        }
    }

    /// Ticks until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Every timer fires once immediately. A tick that overruns its
    /// interval delays the next one rather than bunching them up.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut pipeline = interval(self.pipeline_every);
        let mut reconcile = interval(self.reconcile_every);
        let mut metrics = interval(self.metrics_every);
        tracing::info!(
            pipeline_secs = self.pipeline_every.as_secs(),
            reconcile_secs = self.reconcile_every.as_secs(),
            metrics_secs = self.metrics_every.as_secs(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = pipeline.tick() => self.pipeline_tick().await,
                _ = reconcile.tick() => self.reconcile_tick().await,
                _ = metrics.tick() => self.metrics_tick().await,
            }
        }
        tracing::info!("scheduler stopped");
    }

    async fn pipeline_tick(&self) {
        match self.orchestrator.run().await {
            // the orchestrator logs its own summary line
            Ok(_) => {}
            Err(PipelineError::RunInProgress) => {
                tracing::debug!("pipeline tick skipped: run in progress");
            }
            Err(e) => tracing::error!(error = %e, "pipeline tick failed"),
        }
    }

    async fn reconcile_tick(&self) {
        if let Err(e) = self.reconciler.reconcile_all().await {
            tracing::error!(error = %e, "reconciliation pass failed; retrying next interval");
        }
    }

    async fn metrics_tick(&self) {
        match self.reconciler.reconcile_metrics().await {
            Ok(check) => tracing::debug!(?check, "metrics drift check done"),
            Err(e) => tracing::error!(error = %e, "metrics drift check failed"),
        }
    }
}

fn interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
