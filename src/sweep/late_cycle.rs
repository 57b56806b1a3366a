use std::sync::Arc;

use async_trait::async_trait;

use super::{notify_and_flag, Notice, RunGuard, SweepJob, SweepReport};
use crate::clock::Clock;
use crate::error::Result;
use crate::notify::Notifier;
use crate::store::{CycleFilter, CyclePatch, CycleStore};

/// Days after the last period ended before the next one counts as late.
/// Deliberately separate from the normal cycle-length range.
pub const LATE_CYCLE_THRESHOLD_DAYS: i64 = 32;

const TITLE: &str = "Your period may be late";

/// Notifies users whose most recent cycle closed too long ago without a new
/// one being started.
pub struct LateCycleSweep {
    store: Arc<dyn CycleStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    threshold_days: i64,
    running: RunGuard,
}

impl LateCycleSweep {
    pub fn new(
        store: Arc<dyn CycleStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        threshold_days: i64,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            threshold_days,
            running: RunGuard::default(),
        }
    }
}

#[async_trait]
impl SweepJob for LateCycleSweep {
    fn name(&self) -> &'static str {
        "late-cycle"
    }

    async fn run(&self) -> Result<SweepReport> {
        let Some(_running) = self.running.try_enter(self.name()) else {
            return Ok(SweepReport::default());
        };

        let today = self.clock.today();
        let users = self.store.users_with_notification_token().await?;
        let mut report = SweepReport::default();

        for user in users {
            report.examined += 1;

            let Some(token) = user.notification_token.as_deref().filter(|t| !t.is_empty()) else {
                report.skipped += 1;
                continue;
            };

            let latest = match self.store.find_latest_cycle(user.id, CycleFilter::Any).await {
                Ok(latest) => latest,
                Err(e) => {
                    tracing::error!("❌ Failed to load latest cycle for user {}: {}", user.id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let Some(cycle) = latest else {
                report.skipped += 1;
                continue;
            };

            // an open latest cycle means the next period has already started
            let Some(end_date) = cycle.end_date else {
                continue;
            };
            if cycle.late_period_notified {
                continue;
            }

            let days_since_end = (today - end_date).num_days();
            if days_since_end <= self.threshold_days {
                continue;
            }

            let notice = Notice::new(
                "LATE_PERIOD",
                TITLE,
                format!(
                    "It has been {days_since_end} days since your last period ended. Log your next period when it starts."
                ),
                &cycle,
            );

            notify_and_flag(
                self.store.as_ref(),
                self.notifier.as_ref(),
                token,
                &cycle,
                notice,
                CyclePatch::late_period_notified(),
                &mut report,
            )
            .await;
        }

        Ok(report)
    }
}
