use std::sync::Arc;

use axum::{Router, routing::get, Json, extract::{State, Query}};
use axum::http::StatusCode;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::CycleEvent;
use crate::error::AppError;
use crate::models::{Cycle, CycleSummary};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct CycleEventRequest {
    pub user_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/cycle", get(get_cycle_summary).post(record_cycle_event))
        .route("/cycles", get(get_cycle_history))
        .with_state(state)
}

async fn record_cycle_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CycleEventRequest>,
) -> Result<StatusCode, AppError> {
    let event = CycleEvent {
        start_date: body.start_date,
        end_date: body.end_date,
    };

    state.cycles.record_cycle_event(body.user_id, event).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_cycle_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserQuery>,
) -> Result<Json<CycleSummary>, AppError> {
    let today = state.clock.today();
    let summary = state.cycles.summary(params.user_id, today).await?;
    Ok(Json(summary))
}

async fn get_cycle_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserQuery>,
) -> Result<Json<Vec<Cycle>>, AppError> {
    let cycles = state.cycles.history(params.user_id).await?;
    Ok(Json(cycles))
}
