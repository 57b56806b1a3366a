use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::CycleStatsResponse;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CycleStatsQuery {
    user_id: Uuid,
}

pub async fn get_cycle_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CycleStatsQuery>,
) -> Result<Json<CycleStatsResponse>, AppError> {
    let stats = state.cycles.stats(query.user_id).await?;
    Ok(Json(stats))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/cycle-stats", get(get_cycle_stats))
        .with_state(state)
}
