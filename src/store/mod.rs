//! Persistence for cycles and symptom logs.
//!
//! Engine writes always go through a [`StoreTx`] obtained from
//! [`CycleStore::begin`]. A transaction that is dropped without
//! [`StoreTx::commit`] is rolled back. Sweep jobs and read endpoints use the
//! non-transactional methods on [`CycleStore`] directly.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Cycle, SymptomEntry, SymptomLog, SymptomLogEntry, SymptomWithOptions, User};

/// Predicate for "most recent cycle of a user matching X" lookups.
///
/// Matches are ordered by `start_date DESC, created_at DESC` and the first
/// one wins. One open cycle per user is a convention of the callers, so
/// `Open` picks the newest when more than one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleFilter {
    Any,
    Open,
    StartedBefore(NaiveDate),
    StartedOnOrBefore(NaiveDate),
}

impl CycleFilter {
    pub fn matches(&self, cycle: &Cycle) -> bool {
        match *self {
            CycleFilter::Any => true,
            CycleFilter::Open => cycle.end_date.is_none(),
            CycleFilter::StartedBefore(date) => cycle.start_date < date,
            CycleFilter::StartedOnOrBefore(date) => cycle.start_date <= date,
        }
    }
}

/// A partial update of a cycle row. Only `Some` fields are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CyclePatch {
    pub end_date: Option<NaiveDate>,
    pub period_length: Option<i32>,
    pub is_period_normal: Option<bool>,
    pub cycle_length: Option<i32>,
    pub is_cycle_normal: Option<bool>,
    pub long_period_notified: Option<bool>,
    pub late_period_notified: Option<bool>,
}

impl CyclePatch {
    pub fn closed(end_date: NaiveDate, period_length: i32, is_period_normal: bool) -> Self {
        Self {
            end_date: Some(end_date),
            period_length: Some(period_length),
            is_period_normal: Some(is_period_normal),
            ..Self::default()
        }
    }

    pub fn cycle_length(cycle_length: i32, is_cycle_normal: bool) -> Self {
        Self {
            cycle_length: Some(cycle_length),
            is_cycle_normal: Some(is_cycle_normal),
            ..Self::default()
        }
    }

    pub fn long_period_notified() -> Self {
        Self {
            long_period_notified: Some(true),
            ..Self::default()
        }
    }

    pub fn late_period_notified() -> Self {
        Self {
            late_period_notified: Some(true),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, cycle: &mut Cycle) {
        if let Some(end_date) = self.end_date {
            cycle.end_date = Some(end_date);
        }
        if let Some(period_length) = self.period_length {
            cycle.period_length = Some(period_length);
        }
        if let Some(normal) = self.is_period_normal {
            cycle.is_period_normal = Some(normal);
        }
        if let Some(cycle_length) = self.cycle_length {
            cycle.cycle_length = Some(cycle_length);
        }
        if let Some(normal) = self.is_cycle_normal {
            cycle.is_cycle_normal = Some(normal);
        }
        if let Some(notified) = self.long_period_notified {
            cycle.long_period_notified = notified;
        }
        if let Some(notified) = self.late_period_notified {
            cycle.late_period_notified = notified;
        }
    }
}

#[async_trait]
pub trait CycleStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Users that have a push destination registered.
    async fn users_with_notification_token(&self) -> Result<Vec<User>>;

    async fn find_latest_cycle(&self, user_id: Uuid, filter: CycleFilter) -> Result<Option<Cycle>>;

    /// Open cycles that have not yet triggered a long-period notification.
    async fn open_cycles_pending_long_period_notice(&self) -> Result<Vec<Cycle>>;

    async fn update_cycle(&self, cycle_id: Uuid, patch: CyclePatch) -> Result<()>;

    /// All cycles of a user, oldest first.
    async fn list_cycles(&self, user_id: Uuid) -> Result<Vec<Cycle>>;

    /// All symptom logs of a user with their details, newest first.
    async fn list_symptom_logs(&self, user_id: Uuid) -> Result<Vec<SymptomLogEntry>>;

    async fn find_symptom_log(&self, user_id: Uuid, log_date: NaiveDate) -> Result<Option<SymptomLogEntry>>;

    async fn list_symptoms(&self) -> Result<Vec<SymptomWithOptions>>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>>;

    async fn insert_cycle(&mut self, user_id: Uuid, start_date: NaiveDate) -> Result<Cycle>;

    async fn find_latest_cycle(&mut self, user_id: Uuid, filter: CycleFilter) -> Result<Option<Cycle>>;

    async fn update_cycle(&mut self, cycle_id: Uuid, patch: CyclePatch) -> Result<()>;

    /// Finds the log for `(user_id, log_date)` or creates it. The cycle link
    /// is refreshed either way.
    async fn upsert_symptom_log(
        &mut self,
        user_id: Uuid,
        log_date: NaiveDate,
        logged_at: DateTime<Utc>,
        cycle_id: Option<Uuid>,
    ) -> Result<SymptomLog>;

    async fn set_symptom_log_note(&mut self, log_id: Uuid, note: &str) -> Result<()>;

    async fn delete_symptom_log_details(&mut self, log_id: Uuid) -> Result<u64>;

    async fn insert_symptom_log_detail(&mut self, log_id: Uuid, entry: SymptomEntry) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
