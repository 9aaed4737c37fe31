//! Integration tests for the HTTP gateway against a local axum server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use habit_sync::gateway::HttpGateway;
use habit_sync::prelude::*;
use parking_lot::Mutex;
use rstest::rstest;
use serde_json::{Value, json};
use tokio::net::TcpListener;

const OWNER: OwnerId = OwnerId::new(42);

type Recorded = Arc<Mutex<Vec<Value>>>;

fn habit_row(id: &str) -> Value {
    json!({
        "id": id,
        "telegram_id": 42,
        "title": "Push-ups",
        "category": "sport",
        "icon": "dumbbell",
        "color": "#F59E0B",
        "streak": 1,
        "completed_dates": ["2025-01-07"],
        "total_completions": 1,
        "created_at": "2025-01-01T08:00:00+00:00",
        "reminder_enabled": false,
        "reminder_time": null
    })
}

async fn serve(router: Router) -> HttpGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    HttpGateway::new(&format!("http://{address}"), Duration::from_secs(5)).unwrap()
}

// =============================================================================
// Success paths
// =============================================================================

#[rstest]
#[tokio::test]
async fn list_sends_the_owner_and_decodes_rows() {
    let queries: Arc<Mutex<Vec<HashMap<String, String>>>> = Arc::default();
    let router = Router::new()
        .route(
            "/api/habits",
            get(
                |State(queries): State<Arc<Mutex<Vec<HashMap<String, String>>>>>,
                 Query(query): Query<HashMap<String, String>>| async move {
                    queries.lock().push(query);
                    Json(json!([habit_row("a"), habit_row("b")]))
                },
            ),
        )
        .with_state(Arc::clone(&queries));
    let gateway = serve(router).await;

    let habits = gateway.list_habits(OWNER).await.unwrap();

    assert_eq!(habits.len(), 2);
    assert_eq!(habits[0].id, HabitId::new("a"));
    assert_eq!(habits[0].category, Category::Sport);
    assert_eq!(queries.lock()[0].get("telegram_id").map(String::as_str), Some("42"));
}

#[rstest]
#[tokio::test]
async fn toggle_uses_the_wire_names() {
    let bodies: Recorded = Arc::default();
    let router = Router::new()
        .route(
            "/api/habits",
            patch(|State(bodies): State<Recorded>, Json(body): Json<Value>| async move {
                bodies.lock().push(body);
                Json(json!({ "habit": habit_row("a"), "pointsDelta": 10 }))
            }),
        )
        .with_state(Arc::clone(&bodies));
    let gateway = serve(router).await;
    let request = ToggleCompletion {
        habit_id: HabitId::new("a"),
        day: Day::from_ymd(2025, 1, 7).unwrap(),
        owner_id: OWNER,
    };

    let response = gateway.toggle_completion(&request).await.unwrap();

    assert_eq!(response.points_delta, 10);
    assert_eq!(
        bodies.lock()[0],
        json!({ "habit_id": "a", "date": "2025-01-07", "telegram_id": 42 })
    );
}

#[rstest]
#[tokio::test]
async fn upsert_returns_the_stored_user() {
    let router = Router::new().route(
        "/api/user",
        post(|Json(body): Json<Value>| async move {
            Json(json!({
                "telegram_id": body["telegram_id"],
                "username": body["username"],
                "total_points": 120
            }))
        }),
    );
    let gateway = serve(router).await;
    let mut request = UpsertUser::new(OWNER);
    request.profile.username = Some("runner".to_string());

    let user = gateway.upsert_user(&request).await.unwrap();

    assert_eq!(user.id, OWNER);
    assert_eq!(user.total_points, 120);
    assert_eq!(user.profile.username.as_deref(), Some("runner"));
}

// =============================================================================
// Failure mapping
// =============================================================================

#[rstest]
#[tokio::test]
async fn error_bodies_become_server_errors() {
    let router = Router::new().route(
        "/api/habits",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "telegram_id and title are required" })),
            )
        }),
    );
    let gateway = serve(router).await;

    let error = gateway
        .create_habit(&NewHabit::new(OWNER, "Swim", Category::Sport))
        .await
        .unwrap_err();

    assert_eq!(
        error,
        GatewayError::server(400, "telegram_id and title are required")
    );
}

#[rstest]
#[case("upstream timed out\n", "upstream timed out")]
#[case("", "Bad Gateway")]
#[tokio::test]
async fn plain_error_bodies_are_kept(#[case] body: &'static str, #[case] expected: &str) {
    let router = Router::new().route(
        "/api/habits",
        get(move || async move { (StatusCode::BAD_GATEWAY, body) }),
    );
    let gateway = serve(router).await;

    let error = gateway.list_habits(OWNER).await.unwrap_err();

    assert_eq!(error, GatewayError::server(502, expected));
    assert_eq!(error.status(), Some(502));
}

#[rstest]
#[tokio::test]
async fn malformed_success_bodies_are_decode_errors() {
    let router = Router::new().route("/api/habits", get(|| async { "<html>oops</html>" }));
    let gateway = serve(router).await;

    let error = gateway.list_habits(OWNER).await.unwrap_err();

    assert!(matches!(error, GatewayError::Decode { .. }));
}

#[rstest]
#[tokio::test]
async fn null_habits_are_decode_errors() {
    let router = Router::new().route("/api/habits", post(|| async { Json(Value::Null) }));
    let gateway = serve(router).await;

    let error = gateway
        .create_habit(&NewHabit::new(OWNER, "Swim", Category::Sport))
        .await
        .unwrap_err();

    assert!(matches!(error, GatewayError::Decode { .. }));
}

#[rstest]
#[tokio::test]
async fn unacknowledged_deletes_fail() {
    let router = Router::new().route(
        "/api/habits",
        delete(|| async { Json(json!({ "success": false })) }),
    );
    let gateway = serve(router).await;

    let error = gateway.delete_habit(&HabitId::new("a")).await.unwrap_err();

    assert_eq!(error.status(), Some(200));
}

#[rstest]
#[tokio::test]
async fn unreachable_servers_are_network_errors() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    let gateway =
        HttpGateway::new(&format!("http://{address}"), Duration::from_secs(1)).unwrap();

    let error = gateway.list_habits(OWNER).await.unwrap_err();

    assert!(matches!(error, GatewayError::Network { .. }));
}
