//! Cycle inference: turns start/end reports into cycle rows with derived
//! lengths and normal-range flags.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Cycle, CycleStat, CycleStatsResponse, CycleSummary};
use crate::store::{CycleFilter, CyclePatch, CycleStore};

pub const MIN_PERIOD_NORMAL: i32 = 2;
pub const MAX_PERIOD_NORMAL: i32 = 7;
pub const MIN_CYCLE_NORMAL: i32 = 21;
pub const MAX_CYCLE_NORMAL: i32 = 35;

const DEFAULT_CYCLE_LENGTH: f64 = 28.0;
const FERTILE_WINDOW_START_DAY: i64 = 12;
const FERTILE_WINDOW_END_DAY: i64 = 16;

/// Inclusive day count of a period.
pub fn period_length(start_date: NaiveDate, end_date: NaiveDate) -> i32 {
    (end_date - start_date).num_days() as i32 + 1
}

/// Days from one cycle start to the next.
pub fn cycle_length(start_date: NaiveDate, next_start_date: NaiveDate) -> i32 {
    (next_start_date - start_date).num_days() as i32
}

pub fn is_period_normal(period_length: i32) -> bool {
    (MIN_PERIOD_NORMAL..=MAX_PERIOD_NORMAL).contains(&period_length)
}

pub fn is_cycle_normal(cycle_length: i32) -> bool {
    (MIN_CYCLE_NORMAL..=MAX_CYCLE_NORMAL).contains(&cycle_length)
}

/// A start and/or end report for one user.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleEvent {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Rows touched by a [`CycleService::record_cycle_event`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleEventOutcome {
    pub started: Option<Uuid>,
    pub previous_updated: Option<Uuid>,
    pub closed: Option<Uuid>,
}

#[derive(Clone)]
pub struct CycleService {
    store: Arc<dyn CycleStore>,
}

impl CycleService {
    pub fn new(store: Arc<dyn CycleStore>) -> Self {
        Self { store }
    }

    /// Applies a start and/or end report in one transaction.
    ///
    /// The start is processed first, so an end in the same call closes the
    /// cycle that was just opened.
    pub async fn record_cycle_event(&self, user_id: Uuid, event: CycleEvent) -> Result<CycleEventOutcome> {
        match (event.start_date, event.end_date) {
            (None, None) => {
                return Err(AppError::Validation(
                    "a start date or an end date is required".into(),
                ))
            }
            (Some(start), Some(end)) if end < start => {
                return Err(AppError::Validation(format!(
                    "end date {end} is before start date {start}"
                )))
            }
            _ => {}
        }

        let mut tx = self.store.begin().await?;

        if tx.find_user(user_id).await?.is_none() {
            return Err(AppError::UserNotFound(user_id));
        }

        let mut outcome = CycleEventOutcome::default();

        if let Some(start_date) = event.start_date {
            let cycle = tx.insert_cycle(user_id, start_date).await?;
            outcome.started = Some(cycle.id);

            let previous = tx
                .find_latest_cycle(user_id, CycleFilter::StartedBefore(start_date))
                .await?;

            if let Some(previous) = previous {
                let length = cycle_length(previous.start_date, start_date);
                tx.update_cycle(previous.id, CyclePatch::cycle_length(length, is_cycle_normal(length)))
                    .await?;
                outcome.previous_updated = Some(previous.id);
                tracing::debug!("Cycle {} closed out at {} days", previous.id, length);
            }
        }

        if let Some(end_date) = event.end_date {
            match tx.find_latest_cycle(user_id, CycleFilter::Open).await? {
                Some(open) => {
                    if end_date < open.start_date {
                        return Err(AppError::Validation(format!(
                            "end date {end_date} is before the open cycle's start date {}",
                            open.start_date
                        )));
                    }

                    let length = period_length(open.start_date, end_date);
                    tx.update_cycle(open.id, CyclePatch::closed(end_date, length, is_period_normal(length)))
                        .await?;
                    outcome.closed = Some(open.id);
                }
                None => {
                    tracing::debug!("No open cycle to close for user {}", user_id);
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            "Recorded cycle event for user {} (started: {:?}, closed: {:?})",
            user_id,
            outcome.started,
            outcome.closed
        );
        Ok(outcome)
    }

    pub async fn history(&self, user_id: Uuid) -> Result<Vec<Cycle>> {
        self.require_user(user_id).await?;
        self.store.list_cycles(user_id).await
    }

    pub async fn summary(&self, user_id: Uuid, today: NaiveDate) -> Result<CycleSummary> {
        self.require_user(user_id).await?;

        let cycles = self.store.list_cycles(user_id).await?;
        let Some(latest) = cycles.last() else {
            return Err(AppError::NotFound(format!("cycles for user {user_id}")));
        };

        let expected_length = mean(cycles.iter().filter_map(|c| c.cycle_length))
            .unwrap_or(DEFAULT_CYCLE_LENGTH)
            .round() as i64;

        let cycle_day = (today - latest.start_date).num_days() + 1;
        let fertile = latest.start_date + Duration::days(FERTILE_WINDOW_START_DAY)
            ..=latest.start_date + Duration::days(FERTILE_WINDOW_END_DAY);

        Ok(CycleSummary {
            cycle_day,
            is_period_ongoing: latest.is_open(),
            in_fertile_window: fertile.contains(&today),
            period_expected_in_days: expected_length - (cycle_day - 1),
            start_date: latest.start_date,
        })
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<CycleStatsResponse> {
        self.require_user(user_id).await?;
        let cycles = self.store.list_cycles(user_id).await?;
        Ok(cycle_stats(&cycles))
    }

    async fn require_user(&self, user_id: Uuid) -> Result<()> {
        match self.store.find_user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::UserNotFound(user_id)),
        }
    }
}

fn mean(values: impl Iterator<Item = i32>) -> Option<f64> {
    let (sum, count) = values.fold((0i64, 0u32), |(sum, count), v| (sum + v as i64, count + 1));
    (count > 0).then(|| sum as f64 / count as f64)
}

/// Per-cycle stats, oldest first. Averages skip cycles missing the value.
pub fn cycle_stats(cycles: &[Cycle]) -> CycleStatsResponse {
    let cycle_stats = cycles
        .iter()
        .enumerate()
        .map(|(i, c)| CycleStat {
            cycle_number: (i + 1) as i32,
            start_date: c.start_date,
            period_length: c.period_length,
            cycle_length: c.cycle_length,
            is_period_normal: c.is_period_normal,
            is_cycle_normal: c.is_cycle_normal,
        })
        .collect();

    CycleStatsResponse {
        average_period_length: mean(cycles.iter().filter_map(|c| c.period_length)),
        average_cycle_length: mean(cycles.iter().filter_map(|c| c.cycle_length)),
        cycle_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn start(s: &str) -> CycleEvent {
        CycleEvent {
            start_date: Some(date(s)),
            end_date: None,
        }
    }

    fn end(s: &str) -> CycleEvent {
        CycleEvent {
            start_date: None,
            end_date: Some(date(s)),
        }
    }

    async fn setup() -> (CycleService, MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_user(user, Some("token")).await;
        (CycleService::new(Arc::new(store.clone())), store, user)
    }

    #[test]
    fn normal_ranges_include_both_bounds() {
        assert!(!is_period_normal(1));
        assert!(is_period_normal(2));
        assert!(is_period_normal(7));
        assert!(!is_period_normal(8));

        assert!(!is_cycle_normal(20));
        assert!(is_cycle_normal(21));
        assert!(is_cycle_normal(35));
        assert!(!is_cycle_normal(36));
    }

    #[test]
    fn lengths_count_calendar_days() {
        assert_eq!(period_length(date("2025-01-28"), date("2025-02-03")), 7);
        assert_eq!(period_length(date("2025-03-01"), date("2025-03-01")), 1);
        assert_eq!(cycle_length(date("2025-01-01"), date("2025-01-28")), 27);
        // leap day
        assert_eq!(cycle_length(date("2024-02-15"), date("2024-03-14")), 28);
    }

    #[tokio::test]
    async fn consecutive_starts_and_an_end_derive_lengths() {
        let (service, store, user) = setup().await;

        let first = service.record_cycle_event(user, start("2025-01-01")).await.unwrap();
        let second = service.record_cycle_event(user, start("2025-01-28")).await.unwrap();
        assert_eq!(second.previous_updated, first.started);

        let first_cycle = store.cycle(first.started.unwrap()).await.unwrap();
        assert_eq!(first_cycle.cycle_length, Some(27));
        assert_eq!(first_cycle.is_cycle_normal, Some(true));

        let closed = service.record_cycle_event(user, end("2025-02-03")).await.unwrap();
        assert_eq!(closed.closed, second.started);

        let second_cycle = store.cycle(second.started.unwrap()).await.unwrap();
        assert_eq!(second_cycle.end_date, Some(date("2025-02-03")));
        assert_eq!(second_cycle.period_length, Some(7));
        assert_eq!(second_cycle.is_period_normal, Some(true));
        assert_eq!(second_cycle.cycle_length, None);
    }

    #[tokio::test]
    async fn first_cycle_has_no_previous_to_update() {
        let (service, store, user) = setup().await;

        let outcome = service.record_cycle_event(user, start("2025-01-01")).await.unwrap();
        assert!(outcome.previous_updated.is_none());

        let cycle = store.cycle(outcome.started.unwrap()).await.unwrap();
        assert!(cycle.is_open());
        assert_eq!(cycle.cycle_length, None);
        assert_eq!(cycle.period_length, None);
    }

    #[tokio::test]
    async fn end_without_open_cycle_is_a_no_op() {
        let (service, store, user) = setup().await;

        let outcome = service.record_cycle_event(user, end("2025-01-05")).await.unwrap();
        assert_eq!(outcome, CycleEventOutcome::default());
        assert!(store.list_cycles(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn combined_call_closes_the_cycle_it_opened() {
        let (service, store, user) = setup().await;

        let outcome = service
            .record_cycle_event(
                user,
                CycleEvent {
                    start_date: Some(date("2025-04-10")),
                    end_date: Some(date("2025-04-10")),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.started, outcome.closed);

        let cycle = store.cycle(outcome.started.unwrap()).await.unwrap();
        assert_eq!(cycle.period_length, Some(1));
        assert_eq!(cycle.is_period_normal, Some(false));
    }

    #[tokio::test]
    async fn long_cycle_is_flagged_abnormal() {
        let (service, store, user) = setup().await;

        let first = service.record_cycle_event(user, start("2025-01-01")).await.unwrap();
        service.record_cycle_event(user, end("2025-01-12")).await.unwrap();
        service.record_cycle_event(user, start("2025-02-10")).await.unwrap();

        let cycle = store.cycle(first.started.unwrap()).await.unwrap();
        assert_eq!(cycle.period_length, Some(12));
        assert_eq!(cycle.is_period_normal, Some(false));
        assert_eq!(cycle.cycle_length, Some(40));
        assert_eq!(cycle.is_cycle_normal, Some(false));
    }

    #[tokio::test]
    async fn well_formed_sequence_leaves_at_most_one_open_cycle() {
        let (service, store, user) = setup().await;

        for (s, e) in [
            ("2025-01-01", "2025-01-05"),
            ("2025-01-29", "2025-02-02"),
            ("2025-02-26", "2025-03-03"),
        ] {
            service.record_cycle_event(user, start(s)).await.unwrap();
            service.record_cycle_event(user, end(e)).await.unwrap();
        }
        service.record_cycle_event(user, start("2025-03-27")).await.unwrap();

        let cycles = store.list_cycles(user).await.unwrap();
        assert_eq!(cycles.iter().filter(|c| c.is_open()).count(), 1);

        for pair in cycles.windows(2) {
            assert_eq!(
                pair[0].cycle_length,
                Some(cycle_length(pair[0].start_date, pair[1].start_date))
            );
        }
        for closed in cycles.iter().filter(|c| !c.is_open()) {
            assert_eq!(
                closed.period_length,
                Some(period_length(closed.start_date, closed.end_date.unwrap()))
            );
        }
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let (service, _store, _user) = setup().await;
        let err = service
            .record_cycle_event(Uuid::new_v4(), start("2025-01-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn empty_event_is_rejected() {
        let (service, _store, user) = setup().await;
        let err = service
            .record_cycle_event(user, CycleEvent::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn end_before_open_start_rolls_back_the_whole_call() {
        let (service, store, user) = setup().await;
        let december = service.record_cycle_event(user, start("2024-12-01")).await.unwrap();
        service.record_cycle_event(user, end("2024-12-05")).await.unwrap();
        let february = service.record_cycle_event(user, start("2025-02-10")).await.unwrap();

        // backfilled start succeeds and rewrites December's length, then the
        // end lands before the still-open February cycle
        let err = service
            .record_cycle_event(
                user,
                CycleEvent {
                    start_date: Some(date("2025-01-01")),
                    end_date: Some(date("2025-01-05")),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let cycles = store.list_cycles(user).await.unwrap();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].id, december.started.unwrap());
        assert_eq!(cycles[0].cycle_length, Some(71));
        assert_eq!(cycles[1].id, february.started.unwrap());
        assert!(cycles[1].is_open());
    }

    #[tokio::test]
    async fn end_before_start_in_one_call_is_rejected() {
        let (service, store, user) = setup().await;
        let err = service
            .record_cycle_event(
                user,
                CycleEvent {
                    start_date: Some(date("2025-01-30")),
                    end_date: Some(date("2025-01-20")),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.list_cycles(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_uses_the_latest_cycle() {
        let (service, _store, user) = setup().await;
        service.record_cycle_event(user, start("2025-01-01")).await.unwrap();
        service.record_cycle_event(user, end("2025-01-05")).await.unwrap();
        service.record_cycle_event(user, start("2025-01-31")).await.unwrap();

        let summary = service.summary(user, date("2025-02-13")).await.unwrap();
        assert_eq!(summary.start_date, date("2025-01-31"));
        assert_eq!(summary.cycle_day, 14);
        assert!(summary.is_period_ongoing);
        assert!(summary.in_fertile_window);
        // expected length is the 30-day cycle on record
        assert_eq!(summary.period_expected_in_days, 17);
    }

    #[tokio::test]
    async fn summary_without_cycles_is_not_found() {
        let (service, _store, user) = setup().await;
        let err = service.summary(user, date("2025-01-01")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn stats_average_only_known_values() {
        let (service, _store, user) = setup().await;
        service.record_cycle_event(user, start("2025-01-01")).await.unwrap();
        service.record_cycle_event(user, end("2025-01-05")).await.unwrap();
        service.record_cycle_event(user, start("2025-01-29")).await.unwrap();
        service.record_cycle_event(user, end("2025-02-03")).await.unwrap();
        service.record_cycle_event(user, start("2025-02-28")).await.unwrap();

        let stats = service.stats(user).await.unwrap();
        assert_eq!(stats.cycle_stats.len(), 3);
        assert_eq!(stats.cycle_stats[2].cycle_number, 3);
        assert_eq!(stats.average_period_length, Some(5.5));
        assert_eq!(stats.average_cycle_length, Some(29.0));
    }
}
