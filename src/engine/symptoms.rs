use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{SymptomEntry, SymptomLogEntry, SymptomWithOptions};
use crate::store::{CycleFilter, CycleStore};

#[derive(Debug, Clone)]
pub struct LogSymptoms {
    pub logged_at: DateTime<Utc>,
    pub note: Option<String>,
    pub symptoms: Vec<SymptomEntry>,
}

#[derive(Clone)]
pub struct SymptomService {
    store: Arc<dyn CycleStore>,
}

impl SymptomService {
    pub fn new(store: Arc<dyn CycleStore>) -> Self {
        Self { store }
    }

    /// Records the symptoms for one calendar day, replacing whatever was
    /// logged for that day before. Retrying with the same payload is safe.
    pub async fn log_symptoms(&self, user_id: Uuid, request: LogSymptoms) -> Result<Uuid> {
        let log_date = request.logged_at.date_naive();

        let mut tx = self.store.begin().await?;

        if tx.find_user(user_id).await?.is_none() {
            return Err(AppError::UserNotFound(user_id));
        }

        let cycle = tx
            .find_latest_cycle(user_id, CycleFilter::StartedOnOrBefore(log_date))
            .await?;

        let log = tx
            .upsert_symptom_log(user_id, log_date, request.logged_at, cycle.map(|c| c.id))
            .await?;

        if let Some(note) = &request.note {
            tx.set_symptom_log_note(log.id, note).await?;
        }

        let removed = tx.delete_symptom_log_details(log.id).await?;
        for entry in &request.symptoms {
            tx.insert_symptom_log_detail(log.id, *entry).await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Logged {} symptoms for user {} on {} (replaced {})",
            request.symptoms.len(),
            user_id,
            log_date,
            removed
        );
        Ok(log.id)
    }

    pub async fn history(&self, user_id: Uuid) -> Result<Vec<SymptomLogEntry>> {
        self.require_user(user_id).await?;
        self.store.list_symptom_logs(user_id).await
    }

    pub async fn for_day(&self, user_id: Uuid, log_date: NaiveDate) -> Result<SymptomLogEntry> {
        self.require_user(user_id).await?;
        self.store
            .find_symptom_log(user_id, log_date)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("symptom log for {log_date}")))
    }

    pub async fn catalog(&self) -> Result<Vec<SymptomWithOptions>> {
        self.store.list_symptoms().await
    }

    async fn require_user(&self, user_id: Uuid) -> Result<()> {
        match self.store.find_user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::UserNotFound(user_id)),
        }
    }
}
