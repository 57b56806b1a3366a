//! In-process store used by tests and local runs without Postgres.
//!
//! Transactions are serialized: a [`MemoryTx`] holds the store lock for its
//! whole lifetime and works on a copy of the state, which replaces the shared
//! state on commit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{CycleFilter, CyclePatch, CycleStore, StoreTx};
use crate::error::{AppError, Result};
use crate::models::{
    Cycle, Symptom, SymptomEntry, SymptomLog, SymptomLogDetail, SymptomLogEntry, SymptomOption,
    SymptomWithOptions, User,
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    cycles: Vec<Cycle>,
    symptoms: Vec<Symptom>,
    options: Vec<SymptomOption>,
    logs: Vec<SymptomLog>,
    details: Vec<SymptomLogDetail>,
}

impl MemoryState {
    fn find_user(&self, user_id: Uuid) -> Option<User> {
        self.users
            .get(&user_id)
            .filter(|user| user.deleted_at.is_none())
            .cloned()
    }

    fn find_latest_cycle(&self, user_id: Uuid, filter: CycleFilter) -> Option<Cycle> {
        self.cycles
            .iter()
            .filter(|c| c.user_id == user_id && c.deleted_at.is_none() && filter.matches(c))
            .max_by(|a, b| {
                a.start_date
                    .cmp(&b.start_date)
                    .then(a.created_at.cmp(&b.created_at))
            })
            .cloned()
    }

    fn update_cycle(&mut self, cycle_id: Uuid, patch: CyclePatch) -> Result<()> {
        let cycle = self
            .cycles
            .iter_mut()
            .find(|c| c.id == cycle_id && c.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("cycle {cycle_id}")))?;
        patch.apply(cycle);
        Ok(())
    }

    fn log_entry(&self, log: &SymptomLog) -> SymptomLogEntry {
        SymptomLogEntry {
            log: log.clone(),
            details: self
                .details
                .iter()
                .filter(|d| d.symptom_log_id == log.id)
                .cloned()
                .collect(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user_id: Uuid, notification_token: Option<&str>) {
        let mut state = self.state.lock().await;
        state.users.insert(
            user_id,
            User {
                id: user_id,
                notification_token: notification_token.map(str::to_string),
                deleted_at: None,
            },
        );
    }

    pub async fn insert_symptom(&self, symptom: Symptom, options: Vec<SymptomOption>) {
        let mut state = self.state.lock().await;
        state.symptoms.push(symptom);
        state.options.extend(options);
    }

    /// Stores a cycle row as given, bypassing the engine.
    pub async fn seed_cycle(&self, cycle: Cycle) {
        self.state.lock().await.cycles.push(cycle);
    }

    pub async fn cycle(&self, cycle_id: Uuid) -> Option<Cycle> {
        let state = self.state.lock().await;
        state.cycles.iter().find(|c| c.id == cycle_id).cloned()
    }
}

#[async_trait]
impl CycleStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.state.lock().await.find_user(user_id))
    }

    async fn users_with_notification_token(&self) -> Result<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| {
                u.deleted_at.is_none()
                    && u.notification_token.as_deref().is_some_and(|t| !t.is_empty())
            })
            .cloned()
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn find_latest_cycle(&self, user_id: Uuid, filter: CycleFilter) -> Result<Option<Cycle>> {
        Ok(self.state.lock().await.find_latest_cycle(user_id, filter))
    }

    async fn open_cycles_pending_long_period_notice(&self) -> Result<Vec<Cycle>> {
        let state = self.state.lock().await;
        Ok(state
            .cycles
            .iter()
            .filter(|c| c.deleted_at.is_none() && c.end_date.is_none() && !c.long_period_notified)
            .cloned()
            .collect())
    }

    async fn update_cycle(&self, cycle_id: Uuid, patch: CyclePatch) -> Result<()> {
        self.state.lock().await.update_cycle(cycle_id, patch)
    }

    async fn list_cycles(&self, user_id: Uuid) -> Result<Vec<Cycle>> {
        let state = self.state.lock().await;
        let mut cycles: Vec<Cycle> = state
            .cycles
            .iter()
            .filter(|c| c.user_id == user_id && c.deleted_at.is_none())
            .cloned()
            .collect();
        cycles.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(cycles)
    }

    async fn list_symptom_logs(&self, user_id: Uuid) -> Result<Vec<SymptomLogEntry>> {
        let state = self.state.lock().await;
        let mut logs: Vec<&SymptomLog> = state.logs.iter().filter(|l| l.user_id == user_id).collect();
        logs.sort_by(|a, b| b.log_date.cmp(&a.log_date));
        Ok(logs.into_iter().map(|log| state.log_entry(log)).collect())
    }

    async fn find_symptom_log(&self, user_id: Uuid, log_date: NaiveDate) -> Result<Option<SymptomLogEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .find(|l| l.user_id == user_id && l.log_date == log_date)
            .map(|log| state.log_entry(log)))
    }

    async fn list_symptoms(&self) -> Result<Vec<SymptomWithOptions>> {
        let state = self.state.lock().await;
        Ok(state
            .symptoms
            .iter()
            .map(|symptom| SymptomWithOptions {
                symptom: symptom.clone(),
                options: state
                    .options
                    .iter()
                    .filter(|o| o.symptom_id == symptom.id)
                    .cloned()
                    .collect(),
            })
            .collect())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.working.find_user(user_id))
    }

    async fn insert_cycle(&mut self, user_id: Uuid, start_date: NaiveDate) -> Result<Cycle> {
        let cycle = Cycle::new(user_id, start_date);
        self.working.cycles.push(cycle.clone());
        Ok(cycle)
    }

    async fn find_latest_cycle(&mut self, user_id: Uuid, filter: CycleFilter) -> Result<Option<Cycle>> {
        Ok(self.working.find_latest_cycle(user_id, filter))
    }

    async fn update_cycle(&mut self, cycle_id: Uuid, patch: CyclePatch) -> Result<()> {
        self.working.update_cycle(cycle_id, patch)
    }

    async fn upsert_symptom_log(
        &mut self,
        user_id: Uuid,
        log_date: NaiveDate,
        logged_at: DateTime<Utc>,
        cycle_id: Option<Uuid>,
    ) -> Result<SymptomLog> {
        if let Some(log) = self
            .working
            .logs
            .iter_mut()
            .find(|l| l.user_id == user_id && l.log_date == log_date)
        {
            log.cycle_id = cycle_id;
            return Ok(log.clone());
        }

        let log = SymptomLog {
            id: Uuid::new_v4(),
            user_id,
            cycle_id,
            log_date,
            logged_at,
            note: None,
        };
        self.working.logs.push(log.clone());
        Ok(log)
    }

    async fn set_symptom_log_note(&mut self, log_id: Uuid, note: &str) -> Result<()> {
        let log = self
            .working
            .logs
            .iter_mut()
            .find(|l| l.id == log_id)
            .ok_or_else(|| AppError::NotFound(format!("symptom log {log_id}")))?;
        log.note = Some(note.to_string());
        Ok(())
    }

    async fn delete_symptom_log_details(&mut self, log_id: Uuid) -> Result<u64> {
        let before = self.working.details.len();
        self.working.details.retain(|d| d.symptom_log_id != log_id);
        Ok((before - self.working.details.len()) as u64)
    }

    async fn insert_symptom_log_detail(&mut self, log_id: Uuid, entry: SymptomEntry) -> Result<()> {
        if !self.working.symptoms.iter().any(|s| s.id == entry.symptom_id) {
            return Err(AppError::Validation(format!(
                "unknown symptom {}",
                entry.symptom_id
            )));
        }
        if let Some(option_id) = entry.option_id {
            if !self
                .working
                .options
                .iter()
                .any(|o| o.id == option_id && o.symptom_id == entry.symptom_id)
            {
                return Err(AppError::Validation(format!(
                    "unknown option {option_id} for symptom {}",
                    entry.symptom_id
                )));
            }
        }

        self.working.details.push(SymptomLogDetail {
            id: Uuid::new_v4(),
            symptom_log_id: log_id,
            symptom_id: entry.symptom_id,
            symptom_option_id: entry.option_id,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
