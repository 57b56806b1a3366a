use std::sync::Arc;

use async_trait::async_trait;

use super::{notify_and_flag, Notice, RunGuard, SweepJob, SweepReport};
use crate::clock::Clock;
use crate::error::Result;
use crate::notify::Notifier;
use crate::store::{CyclePatch, CycleStore};

pub const LONG_PERIOD_THRESHOLD_DAYS: i64 = 7;

const TITLE: &str = "Your period is running long";

/// Notifies users whose period has stayed open longer than the threshold.
/// A cycle is notified at most once; closing it later does not reset that.
pub struct LongPeriodSweep {
    store: Arc<dyn CycleStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    threshold_days: i64,
    running: RunGuard,
}

impl LongPeriodSweep {
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
impl SweepJob for LongPeriodSweep {
    fn name(&self) -> &'static str {
        "long-period"
    }

    async fn run(&self) -> Result<SweepReport> {
        let Some(_running) = self.running.try_enter(self.name()) else {
            return Ok(SweepReport::default());
        };

        let today = self.clock.today();
        let cycles = self.store.open_cycles_pending_long_period_notice().await?;
        let mut report = SweepReport::default();

        for cycle in cycles {
            report.examined += 1;

            let days_open = (today - cycle.start_date).num_days();
            if days_open <= self.threshold_days {
                continue;
            }

            let user = match self.store.find_user(cycle.user_id).await {
                Ok(user) => user,
                Err(e) => {
                    tracing::error!("❌ Failed to load user {}: {}", cycle.user_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let Some(token) = user
                .and_then(|u| u.notification_token)
                .filter(|t| !t.is_empty())
            else {
                tracing::debug!("User {} has no notification token, skipping", cycle.user_id);
                report.skipped += 1;
                continue;
            };

            let notice = Notice::new(
                "LONG_PERIOD",
                TITLE,
                format!(
                    "Your period has lasted {days_open} days. If it continues, consider talking to a doctor."
                ),
                &cycle,
            );

            notify_and_flag(
                self.store.as_ref(),
                self.notifier.as_ref(),
                &token,
                &cycle,
                notice,
                CyclePatch::long_period_notified(),
                &mut report,
            )
            .await;
        }

        Ok(report)
    }
}
