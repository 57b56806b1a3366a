//! Periodic anomaly sweeps over every user's cycle state.
//!
//! Each sweep is idempotent: an anomaly is notified once per cycle
//! through the cycle's notified flag, and a failed delivery leaves the flag
//! unset so the next run retries it. Per-item failures never abort a run.

pub mod late_cycle;
pub mod long_period;

pub use late_cycle::LateCycleSweep;
pub use long_period::LongPeriodSweep;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::error::{AppError, Result};
use crate::models::Cycle;
use crate::notify::Notifier;
use crate::store::{CyclePatch, CycleStore};

/// Daily at 09:00 UTC.
pub const PRODUCTION_SCHEDULE: &str = "0 0 9 * * *";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub notified: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[async_trait]
pub trait SweepJob: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<SweepReport>;
}

/// Held for the length of a run so a sweep never overlaps itself.
#[derive(Default)]
pub(crate) struct RunGuard(Mutex<()>);

impl RunGuard {
    pub fn try_enter(&self, name: &str) -> Option<MutexGuard<'_, ()>> {
        match self.0.try_lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::warn!("{} sweep still running, skipping this run", name);
                None
            }
        }
    }
}

/// What goes out to the user for one anomaly.
pub(crate) struct Notice {
    pub title: &'static str,
    pub body: String,
    pub data: HashMap<String, String>,
}

impl Notice {
    pub fn new(kind: &str, title: &'static str, body: String, cycle: &Cycle) -> Self {
        let data = HashMap::from([
            ("type".to_string(), kind.to_string()),
            ("cycle_id".to_string(), cycle.id.to_string()),
        ]);
        Self { title, body, data }
    }
}

/// Sends `notice` and sets `flag` on the cycle once delivered.
pub(crate) async fn notify_and_flag(
    store: &dyn CycleStore,
    notifier: &dyn Notifier,
    token: &str,
    cycle: &Cycle,
    notice: Notice,
    flag: CyclePatch,
    report: &mut SweepReport,
) {
    if let Err(e) = notifier.send(token, notice.title, &notice.body, &notice.data).await {
        tracing::warn!(
            "Notification for cycle {} (user {}) not delivered: {}",
            cycle.id,
            cycle.user_id,
            e
        );
        report.failed += 1;
        return;
    }

    match store.update_cycle(cycle.id, flag).await {
        Ok(()) => report.notified += 1,
        Err(e) => {
            tracing::error!("❌ Failed to mark cycle {} as notified: {}", cycle.id, e);
            report.failed += 1;
        }
    }
}

/// How often the sweeps fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepCadence {
    /// Six-field cron expression, seconds first, evaluated in UTC.
    Cron(String),
    Every(Duration),
}

impl SweepCadence {
    pub fn for_environment(production: bool) -> Self {
        if production {
            SweepCadence::Cron(PRODUCTION_SCHEDULE.to_string())
        } else {
            SweepCadence::Every(Duration::from_secs(60))
        }
    }
}

impl FromStr for SweepCadence {
    type Err = String;

    /// Accepts `<n>s`, `<n>m`, `<n>h` or a six-field cron expression.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();

        if s.split_whitespace().count() == 6 {
            return Ok(SweepCadence::Cron(s.to_string()));
        }

        let Some(unit) = s.chars().last() else {
            return Err("Empty sweep schedule".to_string());
        };
        let value: u64 = s[..s.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| format!("Invalid sweep schedule: {s}"))?;

        if value == 0 {
            return Err("Sweep interval must be greater than 0".to_string());
        }

        let multiplier = match unit {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            _ => {
                return Err(format!(
                    "Invalid sweep unit '{unit}'. Use 's', 'm', 'h' or a cron expression"
                ))
            }
        };

        let secs = value
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Sweep interval too large: {s}"))?;
        Ok(SweepCadence::Every(Duration::from_secs(secs)))
    }
}

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn run_sweep(sweep: Arc<dyn SweepJob>) -> JobFuture {
    Box::pin(async move {
        match sweep.run().await {
            Ok(report) => tracing::info!(
                "{} sweep done: {} examined, {} notified, {} skipped, {} failed",
                sweep.name(),
                report.examined,
                report.notified,
                report.skipped,
                report.failed
            ),
            Err(e) => tracing::error!("❌ {} sweep failed: {}", sweep.name(), e),
        }
    })
}

fn build_job(cadence: &SweepCadence, sweep: Arc<dyn SweepJob>) -> Result<Job> {
    let job = match cadence {
        SweepCadence::Cron(expr) => {
            Job::new_async(expr.clone(), move |_uuid, _l| run_sweep(Arc::clone(&sweep)))
        }
        SweepCadence::Every(interval) => {
            Job::new_repeated_async(*interval, move |_uuid, _l| run_sweep(Arc::clone(&sweep)))
        }
    };

    job.map_err(|e| AppError::Scheduler(format!("Failed to create sweep job: {e}")))
}

/// Runs every registered sweep on the same cadence. Jobs run independently
/// of each other and of request traffic.
pub struct SweepScheduler {
    scheduler: JobScheduler,
}

impl SweepScheduler {
    pub async fn start(cadence: &SweepCadence, sweeps: Vec<Arc<dyn SweepJob>>) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {e}")))?;

        for sweep in sweeps {
            let name = sweep.name();
            scheduler
                .add(build_job(cadence, sweep)?)
                .await
                .map_err(|e| AppError::Scheduler(format!("Failed to schedule {name} sweep: {e}")))?;
            tracing::info!("Scheduled {} sweep ({:?})", name, cadence);
        }

        scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {e}")))?;

        Ok(Self { scheduler })
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to shut down scheduler: {e}")))?;
        tracing::info!("Sweep scheduler stopped");
        Ok(())
    }
}
