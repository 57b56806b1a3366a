use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{CycleFilter, CyclePatch, CycleStore, StoreTx};
use crate::error::{AppError, Result};
use crate::models::{
    Cycle, Symptom, SymptomEntry, SymptomLog, SymptomLogDetail, SymptomLogEntry, SymptomOption,
    SymptomWithOptions, User,
};

const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");

        Ok(Self::new(pool))
    }
}

async fn fetch_user<'e, E>(executor: E, user_id: Uuid) -> Result<Option<User>>
where
    E: Executor<'e, Database = Postgres>,
{
    let user = sqlx::query_as::<_, User>(
        "SELECT id, notification_token, deleted_at FROM users WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

async fn fetch_latest_cycle<'e, E>(executor: E, user_id: Uuid, filter: CycleFilter) -> Result<Option<Cycle>>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT * FROM cycles WHERE deleted_at IS NULL AND user_id = ",
    );
    qb.push_bind(user_id);

    match filter {
        CycleFilter::Any => {}
        CycleFilter::Open => {
            qb.push(" AND end_date IS NULL");
        }
        CycleFilter::StartedBefore(date) => {
            qb.push(" AND start_date < ").push_bind(date);
        }
        CycleFilter::StartedOnOrBefore(date) => {
            qb.push(" AND start_date <= ").push_bind(date);
        }
    }

    qb.push(" ORDER BY start_date DESC, created_at DESC LIMIT 1");

    let cycle = qb.build_query_as::<Cycle>().fetch_optional(executor).await?;
    Ok(cycle)
}

async fn patch_cycle<'e, E>(executor: E, cycle_id: Uuid, patch: CyclePatch) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    if patch.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Postgres>::new("UPDATE cycles SET ");
    let mut fields = qb.separated(", ");

    if let Some(end_date) = patch.end_date {
        fields.push("end_date = ").push_bind_unseparated(end_date);
    }
    if let Some(period_length) = patch.period_length {
        fields.push("period_length = ").push_bind_unseparated(period_length);
    }
    if let Some(normal) = patch.is_period_normal {
        fields.push("is_period_normal = ").push_bind_unseparated(normal);
    }
    if let Some(cycle_length) = patch.cycle_length {
        fields.push("cycle_length = ").push_bind_unseparated(cycle_length);
    }
    if let Some(normal) = patch.is_cycle_normal {
        fields.push("is_cycle_normal = ").push_bind_unseparated(normal);
    }
    if let Some(notified) = patch.long_period_notified {
        fields.push("long_period_notified = ").push_bind_unseparated(notified);
    }
    if let Some(notified) = patch.late_period_notified {
        fields.push("late_period_notified = ").push_bind_unseparated(notified);
    }

    qb.push(" WHERE deleted_at IS NULL AND id = ").push_bind(cycle_id);

    let rows = qb.build().execute(executor).await?.rows_affected();
    if rows == 0 {
        return Err(AppError::NotFound(format!("cycle {cycle_id}")));
    }

    Ok(())
}

fn map_detail_insert_error(e: sqlx::Error) -> AppError {
    if let Some(db_err) = e.as_database_error() {
        tracing::error!("❌ DB insert failed: {}", db_err.message());

        if let Some(constraint) = db_err.constraint() {
            tracing::info!("🔒 Constraint violated: {}", constraint);
        }

        if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            return AppError::Validation("unknown symptom or symptom option".into());
        }
    }

    AppError::Database(e)
}

#[async_trait]
impl CycleStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        fetch_user(&self.pool, user_id).await
    }

    async fn users_with_notification_token(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, notification_token, deleted_at
            FROM users
            WHERE deleted_at IS NULL AND notification_token IS NOT NULL AND notification_token <> ''
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn find_latest_cycle(&self, user_id: Uuid, filter: CycleFilter) -> Result<Option<Cycle>> {
        fetch_latest_cycle(&self.pool, user_id, filter).await
    }

    async fn open_cycles_pending_long_period_notice(&self) -> Result<Vec<Cycle>> {
        let cycles = sqlx::query_as::<_, Cycle>(
            r#"
            SELECT * FROM cycles
            WHERE deleted_at IS NULL AND end_date IS NULL AND long_period_notified = FALSE
            ORDER BY start_date ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(cycles)
    }

    async fn update_cycle(&self, cycle_id: Uuid, patch: CyclePatch) -> Result<()> {
        patch_cycle(&self.pool, cycle_id, patch).await
    }

    async fn list_cycles(&self, user_id: Uuid) -> Result<Vec<Cycle>> {
        let cycles = sqlx::query_as::<_, Cycle>(
            r#"
            SELECT * FROM cycles
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY start_date ASC, created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(cycles)
    }

    async fn list_symptom_logs(&self, user_id: Uuid) -> Result<Vec<SymptomLogEntry>> {
        let logs = sqlx::query_as::<_, SymptomLog>(
            r#"
            SELECT id, user_id, cycle_id, log_date, logged_at, note
            FROM symptom_logs
            WHERE user_id = $1
            ORDER BY log_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = logs.iter().map(|l| l.id).collect();
        let details = sqlx::query_as::<_, SymptomLogDetail>(
            r#"
            SELECT id, symptom_log_id, symptom_id, symptom_option_id
            FROM symptom_log_details
            WHERE symptom_log_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_log = HashMap::<Uuid, Vec<SymptomLogDetail>>::new();
        for detail in details {
            by_log.entry(detail.symptom_log_id).or_default().push(detail);
        }

        Ok(logs
            .into_iter()
            .map(|log| SymptomLogEntry {
                details: by_log.remove(&log.id).unwrap_or_default(),
                log,
            })
            .collect())
    }

    async fn find_symptom_log(&self, user_id: Uuid, log_date: NaiveDate) -> Result<Option<SymptomLogEntry>> {
        let Some(log) = sqlx::query_as::<_, SymptomLog>(
            r#"
            SELECT id, user_id, cycle_id, log_date, logged_at, note
            FROM symptom_logs
            WHERE user_id = $1 AND log_date = $2
            "#,
        )
        .bind(user_id)
        .bind(log_date)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let details = sqlx::query_as::<_, SymptomLogDetail>(
            "SELECT id, symptom_log_id, symptom_id, symptom_option_id FROM symptom_log_details WHERE symptom_log_id = $1",
        )
        .bind(log.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(SymptomLogEntry { log, details }))
    }

    async fn list_symptoms(&self) -> Result<Vec<SymptomWithOptions>> {
        let symptoms = sqlx::query_as::<_, Symptom>(
            "SELECT id, name, category, symptom_type FROM symptoms ORDER BY category, name",
        )
        .fetch_all(&self.pool)
        .await?;

        let options = sqlx::query_as::<_, SymptomOption>(
            "SELECT id, symptom_id, label FROM symptom_options ORDER BY label",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_symptom = HashMap::<Uuid, Vec<SymptomOption>>::new();
        for option in options {
            by_symptom.entry(option.symptom_id).or_default().push(option);
        }

        Ok(symptoms
            .into_iter()
            .map(|symptom| SymptomWithOptions {
                options: by_symptom.remove(&symptom.id).unwrap_or_default(),
                symptom,
            })
            .collect())
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>> {
        fetch_user(&mut *self.tx, user_id).await
    }

    async fn insert_cycle(&mut self, user_id: Uuid, start_date: NaiveDate) -> Result<Cycle> {
        let cycle = Cycle::new(user_id, start_date);

        let cycle = sqlx::query_as::<_, Cycle>(
            r#"
            INSERT INTO cycles (id, user_id, start_date, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(cycle.id)
        .bind(cycle.user_id)
        .bind(cycle.start_date)
        .bind(cycle.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        tracing::debug!("Created cycle {} for user {}", cycle.id, user_id);
        Ok(cycle)
    }

    async fn find_latest_cycle(&mut self, user_id: Uuid, filter: CycleFilter) -> Result<Option<Cycle>> {
        fetch_latest_cycle(&mut *self.tx, user_id, filter).await
    }

    async fn update_cycle(&mut self, cycle_id: Uuid, patch: CyclePatch) -> Result<()> {
        patch_cycle(&mut *self.tx, cycle_id, patch).await
    }

    async fn upsert_symptom_log(
        &mut self,
        user_id: Uuid,
        log_date: NaiveDate,
        logged_at: DateTime<Utc>,
        cycle_id: Option<Uuid>,
    ) -> Result<SymptomLog> {
        let log = sqlx::query_as::<_, SymptomLog>(
            r#"
            INSERT INTO symptom_logs (id, user_id, cycle_id, log_date, logged_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, log_date) DO UPDATE SET cycle_id = EXCLUDED.cycle_id
            RETURNING id, user_id, cycle_id, log_date, logged_at, note
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(cycle_id)
        .bind(log_date)
        .bind(logged_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(log)
    }

    async fn set_symptom_log_note(&mut self, log_id: Uuid, note: &str) -> Result<()> {
        sqlx::query("UPDATE symptom_logs SET note = $1 WHERE id = $2")
            .bind(note)
            .bind(log_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_symptom_log_details(&mut self, log_id: Uuid) -> Result<u64> {
        let rows = sqlx::query("DELETE FROM symptom_log_details WHERE symptom_log_id = $1")
            .bind(log_id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        Ok(rows)
    }

    async fn insert_symptom_log_detail(&mut self, log_id: Uuid, entry: SymptomEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO symptom_log_details (id, symptom_log_id, symptom_id, symptom_option_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(log_id)
        .bind(entry.symptom_id)
        .bind(entry.option_id)
        .execute(&mut *self.tx)
        .await
        .map_err(map_detail_insert_error)?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgStoreTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
