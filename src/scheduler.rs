//! Fixed-period ticker driving [`Pipeline`] cycles until shutdown.

use crate::analysis::Pipeline;
use crate::config::ScheduleConfig;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Counters reported when the scheduler stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub attempted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    period: Duration,
    cycle_timeout: Duration,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(period: Duration, cycle_timeout: Duration) -> Self {
        Self {
            period,
            cycle_timeout,
            run_on_start: false,
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(config.period, config.cycle_timeout).run_on_start(config.run_on_start)
    }

    /// Fire the first cycle immediately instead of one period after start.
    pub fn run_on_start(mut self, yes: bool) -> Self {
        self.run_on_start = yes;
        self
    }

    /// Runs cycles on every tick until `shutdown` resolves. One cycle at a time:
    /// ticks that fall due while a cycle is running are skipped, and a cycle
    /// running longer than the timeout is abandoned. A cycle that is already
    /// running finishes (or times out) before shutdown is observed.
    pub async fn run<F>(&self, pipeline: &Pipeline, shutdown: F) -> RunStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let first = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + self.period
        };
        let mut ticker = time::interval_at(first, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = RunStats::default();
        info!(
            period_secs = self.period.as_secs(),
            analysis = pipeline.analyzes(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(?stats, "shutdown requested, scheduler stopping");
                    return stats;
                }
                _ = ticker.tick() => {}
            }

            stats.attempted += 1;
            let started_at = Utc::now();
            match time::timeout(self.cycle_timeout, pipeline.run_cycle(started_at)).await {
                Ok(Ok(record)) => {
                    stats.completed += 1;
                    info!(
                        chart = %record.chart.path.display(),
                        analysed = record.saved_analysis.is_some(),
                        "cycle complete"
                    );
                }
                Ok(Err(e)) => {
                    stats.failed += 1;
                    error!(
                        stage = %e.stage,
                        symbol = %pipeline.request().symbol,
                        at = started_at.timestamp(),
                        error = %e.source,
                        "cycle abandoned"
                    );
                }
                Err(_) => {
                    stats.timed_out += 1;
                    warn!(
                        symbol = %pipeline.request().symbol,
                        at = started_at.timestamp(),
                        timeout_secs = self.cycle_timeout.as_secs(),
                        "cycle timed out"
                    );
                }
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
