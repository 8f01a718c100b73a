//! Integration tests over the HTTP surface: auth, permission gating, and
//! the read endpoints that serve the scheduling UI.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use campanile::alert::AlertController;
use campanile::auth::hash_password;
use campanile::holiday::HolidayResolver;
use campanile::scheduler::service::SchedulerHandle;
use campanile::scheduler::{ConfigSnapshot, DEFAULT_LOOKAHEAD_LIMIT_DAYS};
use campanile::state::AppState;
use campanile::store::ConfigStore;
use campanile::web::auth::AuthConfig;
use campanile::web::create_router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn write_fixture_config(dir: &std::path::Path) {
    let admin_hash = hash_password("admin-pw").unwrap();
    let reader_hash = hash_password("reader-pw").unwrap();

    std::fs::write(
        dir.join("users.json"),
        json!({
            "admin": {"hash": admin_hash, "full_name": "Admin", "role": "admin"},
            "reader": {"hash": reader_hash, "full_name": "Reader", "role": "reader"},
        })
        .to_string(),
    )
    .unwrap();

    std::fs::write(
        dir.join("roles_config.json"),
        json!({
            "roles": {
                "admin": {"permissions": {"admin:has_all_permissions": true}},
                "reader": {"permissions": {}},
            }
        })
        .to_string(),
    )
    .unwrap();

    std::fs::write(
        dir.join("donnees_sonneries.json"),
        json!({
            "sonneries": {},
            "journees_types": {
                "Standard": {
                    "nom": "Standard",
                    "periodes": [
                        {"nom": "P1", "debut": "08:00:00", "fin": "09:00:00", "son_debut": "bell.mp3"}
                    ]
                }
            },
            "planning_hebdomadaire": {"monday": "Standard"},
            "exceptions_planning": {},
            "vacances": {},
        })
        .to_string(),
    )
    .unwrap();
}

async fn test_app() -> axum::Router {
    let dir = tempfile::tempdir().unwrap();
    write_fixture_config(dir.path());

    let config_store = Arc::new(ConfigStore::load(dir.path().to_path_buf()).await.unwrap());
    let holiday_resolver = HolidayResolver::default();
    let alert_controller = Arc::new(AlertController::new("ffplay".to_string(), dir.path().to_path_buf()));

    let data = config_store.snapshot().await;
    let snapshot = ConfigSnapshot {
        day_types: data.day_types,
        weekly_plan: data.weekly_plan,
        exceptions: data.exceptions,
        holiday_resolver: holiday_resolver.clone(),
        lookahead_limit_days: DEFAULT_LOOKAHEAD_LIMIT_DAYS,
    };
    let scheduler = SchedulerHandle::new(snapshot, "ffplay".to_string(), dir.path().to_path_buf(), None);

    let app_state = AppState::new(config_store, holiday_resolver, alert_controller, scheduler);
    // `dir` must outlive the router under test; leak it for the test's duration.
    std::mem::forget(dir);
    create_router(app_state, AuthConfig::default())
}

async fn login(app: &axum::Router, username: &str, password: &str) -> Option<String> {
    let body = json!({"username": username, "password": password}).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    if response.status() != StatusCode::OK {
        return None;
    }
    response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn login_with_valid_credentials_sets_session_cookie() {
    let app = test_app().await;
    let cookie = login(&app, "admin", "admin-pw").await;
    assert!(cookie.is_some());
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = test_app().await;
    let body = json!({"username": "admin", "password": "wrong"}).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_route_without_session_is_unauthorized() {
    let app = test_app().await;
    let request = Request::builder().uri("/api/admin/users").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reader_is_forbidden_from_admin_routes() {
    let app = test_app().await;
    let cookie = login(&app, "reader", "reader-pw").await.unwrap();

    let request = Request::builder()
        .uri("/api/admin/users")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_can_list_users() {
    let app = test_app().await;
    let cookie = login(&app, "admin", "admin-pw").await.unwrap();

    let request = Request::builder()
        .uri("/api/admin/users")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.get("admin").is_some());
    assert!(body.get("reader").is_some());
}

#[tokio::test]
async fn calendar_view_classifies_requested_month() {
    let app = test_app().await;
    let cookie = login(&app, "reader", "reader-pw").await.unwrap();

    let request = Request::builder()
        .uri("/api/calendar_view?year=2025-2026&view_type=month&month=9")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    // Monday 2025-09-01 runs the "Standard" day-type per the fixture's weekly plan.
    let day = &body["days"]["2025-09-01"];
    assert_eq!(day["type"], "weekday_day_type");
    assert_eq!(day["day_type_name"], "Standard");
}

#[tokio::test]
async fn daily_schedule_expands_configured_day_type() {
    let app = test_app().await;
    let cookie = login(&app, "reader", "reader-pw").await.unwrap();

    let request = Request::builder()
        .uri("/api/daily_schedule?date=2025-09-01")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["label"], "Start P1");
}

#[tokio::test]
async fn health_endpoint_is_public() {
    let app = test_app().await;
    let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
