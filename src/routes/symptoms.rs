use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    extract::{State, Query},
    Json,
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::LogSymptoms;
use crate::error::AppError;
use crate::models::{SymptomEntry, SymptomLogEntry, SymptomWithOptions};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LogSymptomsRequest {
    pub user_id: Uuid,
    pub logged_at: DateTime<Utc>,
    pub note: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<SymptomEntry>,
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: Uuid,
}

#[derive(Deserialize)]
struct DayQuery {
    user_id: Uuid,
    date: NaiveDate,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/symptom-log", post(log_symptoms).get(get_symptom_log))
        .route("/symptom-logs", get(get_symptom_logs))
        .route("/symptoms", get(get_symptom_catalog))
        .with_state(state)
}

async fn log_symptoms(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LogSymptomsRequest>,
) -> Result<StatusCode, AppError> {
    let request = LogSymptoms {
        logged_at: body.logged_at,
        note: body.note,
        symptoms: body.symptoms,
    };

    state.symptoms.log_symptoms(body.user_id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_symptom_log(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<SymptomLogEntry>, AppError> {
    let log = state.symptoms.for_day(query.user_id, query.date).await?;
    Ok(Json(log))
}

async fn get_symptom_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<SymptomLogEntry>>, AppError> {
    let logs = state.symptoms.history(query.user_id).await?;
    Ok(Json(logs))
}

async fn get_symptom_catalog(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SymptomWithOptions>>, AppError> {
    let catalog = state.symptoms.catalog().await?;
    Ok(Json(catalog))
}
