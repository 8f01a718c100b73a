//! Web API endpoints for planning control, alerts, calendar views, and
//! configuration administration.

use axum::{
    Extension, Router,
    body::Body,
    extract::{Path, Query, Request, State},
    response::{Json, Response},
    routing::{delete, get, post, put},
};

use crate::model::{DayClassification, Exception, Holiday, VacationPeriod};
use crate::permissions::PermissionNode;
use crate::schedule::DayType;
use crate::store::{GeneralParams, Role, User};
use crate::web::auth::{self as web_auth, AuthConfig};
use crate::web::error::{ApiError, ApiErrorCode};
use crate::web::extractors::{require_permission, AuthUser};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tower_http::{
    classify::ServerErrorsFailureClass, compression::CompressionLayer, cors::{Any, CorsLayer},
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{Span, debug, trace, warn};

use crate::state::AppState;
use crate::status::ServiceStatus;

/// Creates the web server router.
pub fn create_router(app_state: AppState, auth_config: AuthConfig) -> Router {
    let api_router = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/planning/activate", post(activate_planning))
        .route("/planning/deactivate", post(deactivate_planning))
        .route("/alert/trigger/{file}", post(trigger_alert))
        .route("/alert/stop", post(stop_alert))
        .route("/alert/end", post(end_alert))
        .route("/calendar_view", get(calendar_view))
        .route("/daily_schedule", get(daily_schedule))
        .route("/config/reload", post(reload_config))
        .with_state(app_state.clone());

    let auth_router = Router::new()
        .route("/auth/login", post(web_auth::auth_login))
        .route("/auth/logout", post(web_auth::auth_logout))
        .route("/auth/me", get(web_auth::auth_me))
        .layer(Extension(auth_config))
        .with_state(app_state.clone());

    let admin_router = Router::new()
        .route("/admin/users", get(list_users).put(upsert_user))
        .route("/admin/users/{username}", delete(delete_user))
        .route("/admin/roles", get(list_roles).put(upsert_role))
        .route("/admin/general", get(get_general).put(update_general))
        .route("/admin/day_types", get(list_day_types))
        .route(
            "/admin/day_types/{name}",
            put(upsert_day_type).delete(delete_day_type),
        )
        .route("/admin/weekly_plan", get(get_weekly_plan))
        .route("/admin/weekly_plan/{weekday}", put(set_weekly_plan_entry))
        .route("/admin/exceptions", get(list_exceptions))
        .route(
            "/admin/exceptions/{date}",
            put(set_exception).delete(remove_exception),
        )
        .with_state(app_state);

    Router::new()
        .nest("/api", api_router)
        .nest("/api", auth_router)
        .nest("/api", admin_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer((
            CompressionLayer::new()
                .zstd(true)
                .br(true)
                .gzip(true)
                .quality(tower_http::CompressionLevel::Fastest),
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    tracing::debug_span!("request", path = request.uri().path())
                })
                .on_request(())
                .on_body_chunk(())
                .on_eos(())
                .on_response(
                    |response: &Response<Body>, latency: Duration, _span: &Span| {
                        let latency_threshold = if cfg!(debug_assertions) {
                            Duration::from_millis(100)
                        } else {
                            Duration::from_millis(1000)
                        };

                        let (latency_str, status) = (
                            format!("{latency:.2?}"),
                            format!(
                                "{} {}",
                                response.status().as_u16(),
                                response.status().canonical_reason().unwrap_or("??")
                            ),
                        );

                        if latency > latency_threshold {
                            warn!(latency = latency_str, status = status, "Response");
                        } else {
                            debug!(latency = latency_str, status = status, "Response");
                        }
                    },
                )
                .on_failure(
                    |error: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                        warn!(
                            error = ?error,
                            latency = format!("{latency:.2?}"),
                            "Request failed"
                        );
                    },
                ),
            TimeoutLayer::new(Duration::from_secs(10)),
        ))
}

/// Health check endpoint.
async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Serialize)]
struct SchedulerStatus {
    active: bool,
    next_ring_instant: Option<String>,
    next_ring_label: Option<String>,
    last_error: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: ServiceStatus,
    version: String,
    services: BTreeMap<String, ServiceStatus>,
    scheduler: SchedulerStatus,
    alert: crate::alert::AlertStatus,
}

/// `GET /api/status` — composite scheduler/alert view; also reaps the alert
/// process as a side effect of reading its status.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let services: BTreeMap<String, ServiceStatus> = state.service_statuses.all().into_iter().collect();

    let overall_status = if services.values().any(|s| matches!(s, ServiceStatus::Error)) {
        ServiceStatus::Error
    } else if services.is_empty() {
        ServiceStatus::Disabled
    } else {
        ServiceStatus::Active
    };

    let scheduler = SchedulerStatus {
        active: state.scheduler.is_active(),
        next_ring_instant: state.scheduler.next_ring_instant_iso().await,
        next_ring_label: state.scheduler.next_ring_label().await,
        last_error: state.scheduler.last_error().await.map(|(message, _)| message),
    };

    let alert = state.alert_controller.current_status().await;

    Json(StatusResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        services,
        scheduler,
        alert,
    })
}

/// `POST /api/planning/activate` → Scheduler.Start.
async fn activate_planning(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "control:scheduler_activate").await?;
    state.scheduler.start();
    Ok(Json(json!({ "active": true })))
}

/// `POST /api/planning/deactivate` → Scheduler.Stop.
async fn deactivate_planning(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "control:scheduler_deactivate").await?;
    state.scheduler.stop();
    Ok(Json(json!({ "active": false })))
}

async fn general_params(state: &AppState) -> Option<GeneralParams> {
    state.config_store.snapshot().await.general
}

/// `POST /api/alert/trigger/{file}` — gated by `control:alert_trigger_any`
/// plus a file-specific permission if `file` matches the configured
/// PPMS or attentat sound.
async fn trigger_alert(State(state): State<AppState>, auth_user: AuthUser, Path(file): Path<String>) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "control:alert_trigger_any").await?;

    let general = general_params(&state).await;
    if let Some(general) = &general {
        if let Some(ppms) = &general.sonnerie_ppms
            && crate::alert::requires_file_specific_permission(&file, std::path::Path::new(ppms))
        {
            require_permission(&state, &auth_user, "control:alert_trigger_ppms").await?;
        }
        if let Some(attentat) = &general.sonnerie_attentat
            && crate::alert::requires_file_specific_permission(&file, std::path::Path::new(attentat))
        {
            require_permission(&state, &auth_user, "control:alert_trigger_attentat").await?;
        }
    }

    let audio_device = general.as_ref().and_then(|g| g.nom_peripherique_audio_sonneries.clone());
    state
        .alert_controller
        .trigger(&file, audio_device.as_deref())
        .await
        .map_err(ApiError::bad_request)?;

    Ok(Json(json!({ "triggered": file })))
}

/// `POST /api/alert/stop` → Alert.Stop.
async fn stop_alert(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "control:alert_trigger_any").await?;
    state.alert_controller.stop().await;
    Ok(Json(json!({ "stopped": true })))
}

/// `POST /api/alert/end` → Alert.End, playing the configured end-of-alert sound.
async fn end_alert(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "control:alert_trigger_any").await?;
    let general = general_params(&state).await;
    let end_sound = general.as_ref().and_then(|g| g.sonnerie_fin_alerte.clone());
    let audio_device = general.as_ref().and_then(|g| g.nom_peripherique_audio_sonneries.clone());
    state.alert_controller.end(end_sound.as_deref(), audio_device.as_deref()).await;
    Ok(Json(json!({ "ended": true })))
}

#[derive(Deserialize)]
struct CalendarViewParams {
    year: String,
    #[serde(default = "default_view_type")]
    view_type: String,
    month: Option<u32>,
    trimester: Option<u32>,
    semester: Option<u32>,
}

fn default_view_type() -> String {
    "year".to_string()
}

fn parse_academic_year(year: &str) -> Option<i32> {
    let (start, _end) = year.split_once('-')?;
    start.parse().ok()
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn last_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    first_next.pred_opt()
}

/// Resolves a calendar-view request to an inclusive date range within the
/// academic year starting `start_year` (September `start_year` through
/// August `start_year + 1`).
fn view_range(start_year: i32, view_type: &str, params: &CalendarViewParams) -> Result<(NaiveDate, NaiveDate), ApiError> {
    match view_type {
        "year" => {
            let start = first_of_month(start_year, 9).ok_or_else(|| ApiError::bad_request("invalid year"))?;
            let end = last_of_month(start_year + 1, 8).ok_or_else(|| ApiError::bad_request("invalid year"))?;
            Ok((start, end))
        }
        "semester" => {
            let semester = params.semester.ok_or_else(|| ApiError::bad_request("semester view requires 'semester'"))?;
            match semester {
                1 => Ok((
                    first_of_month(start_year, 9).unwrap(),
                    last_of_month(start_year + 1, 1).unwrap(),
                )),
                2 => Ok((
                    first_of_month(start_year + 1, 2).unwrap(),
                    last_of_month(start_year + 1, 8).unwrap(),
                )),
                other => Err(ApiError::bad_request(format!("semester must be 1 or 2, got {other}"))),
            }
        }
        "trimester" => {
            let trimester = params.trimester.ok_or_else(|| ApiError::bad_request("trimester view requires 'trimester'"))?;
            match trimester {
                1 => Ok((first_of_month(start_year, 9).unwrap(), last_of_month(start_year, 11).unwrap())),
                2 => Ok((first_of_month(start_year, 12).unwrap(), last_of_month(start_year + 1, 2).unwrap())),
                3 => Ok((first_of_month(start_year + 1, 3).unwrap(), last_of_month(start_year + 1, 8).unwrap())),
                other => Err(ApiError::bad_request(format!("trimester must be 1, 2 or 3, got {other}"))),
            }
        }
        "month" => {
            let month = params.month.ok_or_else(|| ApiError::bad_request("month view requires 'month'"))?;
            if !(1..=12).contains(&month) {
                return Err(ApiError::bad_request(format!("month must be 1-12, got {month}")));
            }
            let year = if month >= 9 { start_year } else { start_year + 1 };
            let start = first_of_month(year, month).ok_or_else(|| ApiError::bad_request("invalid month"))?;
            let end = last_of_month(year, month).ok_or_else(|| ApiError::bad_request("invalid month"))?;
            Ok((start, end))
        }
        other => Err(ApiError::new(ApiErrorCode::BadRequest, format!("unknown view_type '{other}'"))),
    }
}

/// `GET /api/calendar_view` — classifies every date in the requested range.
async fn calendar_view(State(state): State<AppState>, _auth_user: AuthUser, Query(params): Query<CalendarViewParams>) -> Result<Json<Value>, ApiError> {
    let start_year = parse_academic_year(&params.year).ok_or_else(|| ApiError::bad_request("year must be 'YYYY-YYYY'"))?;
    let (start, end) = view_range(start_year, &params.view_type, &params)?;

    let data = state.config_store.snapshot().await;
    let resolver = state.holiday_resolver.read().await;

    let mut days: BTreeMap<String, DayClassification> = BTreeMap::new();
    let mut date = start;
    while date <= end {
        let classification = resolver.classify(date, &data.weekly_plan, &data.exceptions);
        days.insert(date.format("%Y-%m-%d").to_string(), classification);
        date = date.succ_opt().ok_or_else(|| ApiError::internal_error("date overflow while building calendar view"))?;
    }

    let vacations: Vec<&VacationPeriod> = resolver.vacation_periods().iter().filter(|v| v.start_date <= end && v.end_date_inclusive >= start).collect();
    let holidays: Vec<Holiday> = resolver
        .holidays()
        .filter(|(date, _)| **date >= start && **date <= end)
        .map(|(date, description)| Holiday { date: *date, description: description.clone() })
        .collect();

    Ok(Json(json!({
        "days": days,
        "vacations": vacations,
        "holidays": holidays,
        "debugParams": {
            "startYear": start_year,
            "viewType": params.view_type,
            "rangeStart": start.format("%Y-%m-%d").to_string(),
            "rangeEnd": end.format("%Y-%m-%d").to_string(),
        },
    })))
}

#[derive(Deserialize)]
struct DailyScheduleParams {
    date: NaiveDate,
}

/// `GET /api/daily_schedule?date=YYYY-MM-DD` → Scheduler.ScheduleForDate.
async fn daily_schedule(State(state): State<AppState>, _auth_user: AuthUser, Query(params): Query<DailyScheduleParams>) -> Json<Value> {
    let events = state.scheduler.schedule_for_date(params.date).await;
    Json(json!({ "date": params.date.format("%Y-%m-%d").to_string(), "events": events }))
}

/// `POST /api/config/reload` → ConfigStore.ReloadAll + Scheduler.ReloadConfig.
async fn reload_config(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "config:reload").await?;

    let report = state.config_store.reload_all().await;
    let snapshot = state.build_scheduler_snapshot().await;
    state.scheduler.reload_config(snapshot).await;

    Ok(Json(json!({
        "usersOk": report.users.is_ok(),
        "rolesOk": report.roles.is_ok(),
        "generalOk": report.general.is_ok(),
        "sonneriesOk": report.sonneries.is_ok(),
    })))
}

async fn list_users(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<BTreeMap<String, User>>, ApiError> {
    require_permission(&state, &auth_user, "admin:users").await?;
    Ok(Json(state.config_store.snapshot().await.users))
}

#[derive(Deserialize)]
struct UpsertUserRequest {
    username: String,
    password: Option<String>,
    #[serde(default)]
    full_name: String,
    role: String,
    #[serde(default)]
    custom_permissions: Option<PermissionNode>,
}

async fn upsert_user(State(state): State<AppState>, auth_user: AuthUser, Json(request): Json<UpsertUserRequest>) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "admin:users").await?;

    let hash = match request.password {
        Some(password) => crate::auth::hash_password(&password).map_err(ApiError::bad_request)?,
        None => {
            let existing = state.config_store.snapshot().await.users.get(&request.username).cloned();
            existing
                .map(|u| u.hash)
                .ok_or_else(|| ApiError::bad_request("password is required when creating a new user"))?
        }
    };

    let user = User {
        hash,
        full_name: request.full_name,
        role: request.role,
        custom_permissions: request.custom_permissions,
    };
    state.config_store.upsert_user(request.username.clone(), user).await?;
    Ok(Json(json!({ "username": request.username })))
}

async fn delete_user(State(state): State<AppState>, auth_user: AuthUser, Path(username): Path<String>) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "admin:users").await?;
    let removed = state.config_store.delete_user(&username).await?;
    if !removed {
        return Err(ApiError::not_found(format!("no such user '{username}'")));
    }
    Ok(Json(json!({ "deleted": username })))
}

async fn list_roles(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<BTreeMap<String, Role>>, ApiError> {
    require_permission(&state, &auth_user, "admin:roles").await?;
    Ok(Json(state.config_store.snapshot().await.roles))
}

#[derive(Deserialize)]
struct UpsertRoleRequest {
    name: String,
    permissions: PermissionNode,
}

async fn upsert_role(State(state): State<AppState>, auth_user: AuthUser, Json(request): Json<UpsertRoleRequest>) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "admin:roles").await?;
    state.config_store.upsert_role(request.name.clone(), Role { permissions: request.permissions }).await?;
    Ok(Json(json!({ "name": request.name })))
}

async fn get_general(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<Option<GeneralParams>>, ApiError> {
    require_permission(&state, &auth_user, "admin:general").await?;
    Ok(Json(state.config_store.snapshot().await.general))
}

async fn update_general(State(state): State<AppState>, auth_user: AuthUser, Json(general): Json<GeneralParams>) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "admin:general").await?;
    state.config_store.update_general(general).await?;
    Ok(Json(json!({ "updated": true })))
}

async fn list_day_types(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<BTreeMap<String, DayType>>, ApiError> {
    require_permission(&state, &auth_user, "config:write").await?;
    Ok(Json(state.config_store.snapshot().await.day_types))
}

async fn upsert_day_type(State(state): State<AppState>, auth_user: AuthUser, Path(name): Path<String>, Json(mut day_type): Json<DayType>) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "config:write").await?;
    day_type.name = name;
    state.config_store.upsert_day_type(day_type.clone()).await?;
    rebuild_scheduler(&state).await;
    Ok(Json(json!({ "name": day_type.name })))
}

async fn delete_day_type(State(state): State<AppState>, auth_user: AuthUser, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "config:write").await?;
    state.config_store.delete_day_type(&name).await?;
    rebuild_scheduler(&state).await;
    Ok(Json(json!({ "deleted": name })))
}

async fn get_weekly_plan(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "config:write").await?;
    let plan = state.config_store.snapshot().await.weekly_plan;
    let by_name: BTreeMap<String, Option<String>> = plan.into_iter().map(|(day, name)| (weekday_name(day).to_string(), name)).collect();
    Ok(Json(json!(by_name)))
}

#[derive(Deserialize)]
struct SetWeeklyPlanRequest {
    day_type_name: Option<String>,
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn weekday_from_path(name: &str) -> Result<Weekday, ApiError> {
    match name.to_ascii_lowercase().as_str() {
        "monday" => Ok(Weekday::Mon),
        "tuesday" => Ok(Weekday::Tue),
        "wednesday" => Ok(Weekday::Wed),
        "thursday" => Ok(Weekday::Thu),
        "friday" => Ok(Weekday::Fri),
        "saturday" => Ok(Weekday::Sat),
        "sunday" => Ok(Weekday::Sun),
        other => Err(ApiError::bad_request(format!("unknown weekday '{other}'"))),
    }
}

async fn set_weekly_plan_entry(State(state): State<AppState>, auth_user: AuthUser, Path(weekday): Path<String>, Json(request): Json<SetWeeklyPlanRequest>) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "config:write").await?;
    let day = weekday_from_path(&weekday)?;
    state.config_store.set_weekly_plan_entry(day, request.day_type_name).await?;
    rebuild_scheduler(&state).await;
    Ok(Json(json!({ "weekday": weekday })))
}

async fn list_exceptions(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<BTreeMap<NaiveDate, Exception>>, ApiError> {
    require_permission(&state, &auth_user, "config:write").await?;
    Ok(Json(state.config_store.snapshot().await.exceptions))
}

async fn set_exception(State(state): State<AppState>, auth_user: AuthUser, Path(date): Path<NaiveDate>, Json(exception): Json<Exception>) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "config:write").await?;
    state.config_store.set_exception(date, exception).await?;
    rebuild_scheduler(&state).await;
    Ok(Json(json!({ "date": date.format("%Y-%m-%d").to_string() })))
}

async fn remove_exception(State(state): State<AppState>, auth_user: AuthUser, Path(date): Path<NaiveDate>) -> Result<Json<Value>, ApiError> {
    require_permission(&state, &auth_user, "config:write").await?;
    let removed = state.config_store.remove_exception(date).await?;
    if !removed {
        return Err(ApiError::not_found(format!("no exception on {date}")));
    }
    rebuild_scheduler(&state).await;
    Ok(Json(json!({ "deleted": date.format("%Y-%m-%d").to_string() })))
}

/// Every config write that affects scheduling pushes a fresh snapshot to the
/// Scheduler Core so the next event is never computed from stale data.
async fn rebuild_scheduler(state: &AppState) {
    let snapshot = state.build_scheduler_snapshot().await;
    state.scheduler.reload_config(snapshot).await;
}
