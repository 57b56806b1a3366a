use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use joycycles_tracker::{
    app,
    clock::FixedClock,
    config::Config,
    models::{Symptom, SymptomType},
    state::AppState,
    store::MemoryStore,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn router(store: &MemoryStore) -> Router {
    let today = NaiveDate::from_ymd_opt(2025, 2, 10).unwrap();
    app(AppState::new(
        Config::default(),
        Arc::new(store.clone()),
        Arc::new(FixedClock::on(today)),
    ))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn cycle_events_derive_lengths_end_to_end() {
    let store = MemoryStore::new();
    let user = Uuid::new_v4();
    store.insert_user(user, None).await;
    let router = router(&store);

    for body in [
        json!({ "user_id": user, "start_date": "2025-01-01" }),
        json!({ "user_id": user, "start_date": "2025-01-28" }),
        json!({ "user_id": user, "end_date": "2025-02-03" }),
    ] {
        let (status, _) = send(&router, "POST", "/cycle", Some(body)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, cycles) = send(&router, "GET", &format!("/cycles?user_id={user}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cycles[0]["cycle_length"], 27);
    assert_eq!(cycles[0]["is_cycle_normal"], true);
    assert_eq!(cycles[1]["period_length"], 7);
    assert_eq!(cycles[1]["is_period_normal"], true);
    assert_eq!(cycles[1]["end_date"], "2025-02-03");

    let (status, summary) = send(&router, "GET", &format!("/cycle?user_id={user}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["start_date"], "2025-01-28");
    assert_eq!(summary["cycle_day"], 14);
    assert_eq!(summary["is_period_ongoing"], false);

    let (status, stats) = send(&router, "GET", &format!("/cycle-stats?user_id={user}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["average_cycle_length"], 27.0);
    assert_eq!(stats["cycle_stats"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn cycle_event_errors_map_to_status_codes() {
    let store = MemoryStore::new();
    let user = Uuid::new_v4();
    store.insert_user(user, None).await;
    let router = router(&store);

    let unknown = json!({ "user_id": Uuid::new_v4(), "start_date": "2025-01-01" });
    let (status, _) = send(&router, "POST", "/cycle", Some(unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let empty = json!({ "user_id": user });
    let (status, _) = send(&router, "POST", "/cycle", Some(empty)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&router, "GET", &format!("/cycle?user_id={user}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn symptom_log_replaces_details_for_the_day() {
    let store = MemoryStore::new();
    let user = Uuid::new_v4();
    store.insert_user(user, None).await;

    let cramps = Symptom {
        id: Uuid::new_v4(),
        name: "Cramps".into(),
        category: "pain".into(),
        symptom_type: SymptomType::Basic,
    };
    let bloating = Symptom {
        id: Uuid::new_v4(),
        name: "Bloating".into(),
        category: "digestion".into(),
        symptom_type: SymptomType::Basic,
    };
    let (cramps_id, bloating_id) = (cramps.id, bloating.id);
    store.insert_symptom(cramps, vec![]).await;
    store.insert_symptom(bloating, vec![]).await;
    let router = router(&store);

    let first = json!({
        "user_id": user,
        "logged_at": "2025-02-01T08:30:00Z",
        "note": "day one",
        "symptoms": [{ "symptom_id": cramps_id }]
    });
    let second = json!({
        "user_id": user,
        "logged_at": "2025-02-01T19:00:00Z",
        "symptoms": [{ "symptom_id": bloating_id }]
    });
    for body in [first, second] {
        let (status, _) = send(&router, "POST", "/symptom-log", Some(body)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, log) = send(
        &router,
        "GET",
        &format!("/symptom-log?user_id={user}&date=2025-02-01"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(log["note"], "day one");
    let details = log["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["symptom_id"], bloating_id.to_string());

    let (status, catalog) = send(&router, "GET", "/symptoms", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(catalog.as_array().map(Vec::len), Some(2));
    assert_eq!(catalog[0]["symptom_type"], "BASIC");
}

#[tokio::test]
async fn health_check_responds() {
    let router = router(&MemoryStore::new());
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
