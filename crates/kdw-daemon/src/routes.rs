//! Axum router and all HTTP handlers for kdw-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Scenario tests in `tests/` compose the bare router.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use kdw_reconcile::{
    CycleError, ProviderError, RegistrationError, Registration, StoreError, SubjectError,
};
use kdw_schemas::{NewUser, SubjectId};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    api_types::{
        CreateUserRequest, CreateUserResponse, ErrorResponse, HealthResponse, RefreshResponse,
        RegisterResponse, StatusSnapshot, SubjectView,
    },
    scheduler::SchedulerError,
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/scheduler/start", post(scheduler_start))
        .route("/v1/scheduler/stop", post(scheduler_stop))
        .route("/v1/cycles/run", post(cycles_run))
        .route("/v1/users", post(create_user))
        .route("/v1/subjects", get(list_subjects).post(register_subject))
        .route("/v1/subjects/:id/active", put(toggle_active))
        .route("/v1/subjects/:id/log", get(subject_log))
        .route("/v1/subjects/:id/refresh", post(refresh_subject))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, code: &str, detail: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            detail: detail.to_string(),
        }),
    )
        .into_response()
}

fn store_error_response(e: &StoreError) -> Response {
    match e {
        StoreError::Unavailable(_) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", e)
        }
        StoreError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "NOT_FOUND", e),
        StoreError::Conflict(_) => error_response(StatusCode::CONFLICT, "CONFLICT", e),
        StoreError::Query(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_QUERY_FAILED", e)
        }
    }
}

fn provider_error_response(e: &ProviderError) -> Response {
    error_response(StatusCode::BAD_GATEWAY, "PROVIDER_FAILED", e)
}

fn scheduler_error_response(e: SchedulerError) -> Response {
    let (status, code) = match e {
        SchedulerError::AlreadyRunning => (StatusCode::CONFLICT, "ALREADY_RUNNING"),
        SchedulerError::NotRunning => (StatusCode::CONFLICT, "NOT_RUNNING"),
        SchedulerError::ZeroPeriod => (StatusCode::INTERNAL_SERVER_ERROR, "ZERO_PERIOD"),
    };
    error_response(status, code, e)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

async fn snapshot(st: &AppState) -> StatusSnapshot {
    let stats = st.scheduler.stats().await;
    StatusSnapshot {
        daemon_uptime_secs: uptime_secs(),
        scheduler: st.scheduler.state(),
        poll_interval_secs: st.scheduler.period().as_secs(),
        ratio_threshold: st.engine.ratio_threshold(),
        provider: st.engine.provider_name().to_string(),
        cycles_completed: stats.cycles_completed,
        cycles_failed: stats.cycles_failed,
        last_cycle: stats.last_cycle,
        last_error: stats.last_error,
    }
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(snapshot(&st).await))
}

// ---------------------------------------------------------------------------
// GET /v1/stream (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Cycle(_) => "cycle",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}

// ---------------------------------------------------------------------------
// POST /v1/scheduler/start, /v1/scheduler/stop
// ---------------------------------------------------------------------------

pub(crate) async fn scheduler_start(State(st): State<Arc<AppState>>) -> Response {
    if let Err(e) = st.scheduler.start() {
        return scheduler_error_response(e);
    }
    info!("scheduler/start");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "INFO".to_string(),
        msg: "scheduler started".to_string(),
    });
    (StatusCode::OK, Json(snapshot(&st).await)).into_response()
}

pub(crate) async fn scheduler_stop(State(st): State<Arc<AppState>>) -> Response {
    if let Err(e) = st.scheduler.stop().await {
        return scheduler_error_response(e);
    }
    info!("scheduler/stop");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "INFO".to_string(),
        msg: "scheduler stopped".to_string(),
    });
    (StatusCode::OK, Json(snapshot(&st).await)).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/cycles/run
// ---------------------------------------------------------------------------

/// Run one cycle now. Waits for any in-flight cycle to finish first.
pub(crate) async fn cycles_run(State(st): State<Arc<AppState>>) -> Response {
    match st.scheduler.run_once().await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(CycleError::ListActive(e)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "CYCLE_ABORTED", e)
        }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/users
// ---------------------------------------------------------------------------

pub(crate) async fn create_user(
    State(st): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Response {
    let new = NewUser {
        auth_id: Uuid::new_v4().to_string(),
        email: req.email,
        phone_number: req.phone_number,
    };
    match st.admin.create_user(&new).await {
        Ok(user) => {
            info!(user_id = user.id, "user created");
            (
                StatusCode::CREATED,
                Json(CreateUserResponse {
                    id: user.id,
                    auth_id: user.auth_id,
                }),
            )
                .into_response()
        }
        Err(e) => store_error_response(&e),
    }
}

// ---------------------------------------------------------------------------
// GET/POST /v1/subjects
// ---------------------------------------------------------------------------

pub(crate) async fn list_subjects(State(st): State<Arc<AppState>>) -> Response {
    match st.admin.list_subjects().await {
        Ok(subjects) => {
            let views: Vec<SubjectView> = subjects.into_iter().map(SubjectView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(e) => store_error_response(&e),
    }
}

/// Register a subject and seed its log. Holds the cycle gate so the seed
/// commit cannot interleave with a running cycle.
pub(crate) async fn register_subject(
    State(st): State<Arc<AppState>>,
    Json(req): Json<Registration>,
) -> Response {
    let gate = st.scheduler.cycle_gate();
    let _cycle = gate.lock().await;

    match st.registrar.register(&req).await {
        Ok(registered) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                subject: SubjectView::from(registered.subject),
                log: registered.log,
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(player = %req.identity.display_name(), error = %e, "registration refused");
            match &e {
                RegistrationError::UnknownOwner(_) => {
                    error_response(StatusCode::NOT_FOUND, "UNKNOWN_OWNER", &e)
                }
                RegistrationError::IdentityNotFound(_) => {
                    error_response(StatusCode::NOT_FOUND, "IDENTITY_NOT_FOUND", &e)
                }
                RegistrationError::Provider(p) => provider_error_response(p),
                RegistrationError::AlreadyTracked { .. } => {
                    error_response(StatusCode::CONFLICT, "ALREADY_TRACKED", &e)
                }
                RegistrationError::Store(s) => store_error_response(s),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PUT /v1/subjects/:id/active
// ---------------------------------------------------------------------------

pub(crate) async fn toggle_active(
    State(st): State<Arc<AppState>>,
    Path(id): Path<SubjectId>,
) -> Response {
    match st.admin.toggle_active(id).await {
        Ok(subject) => {
            info!(subject_id = id, active = subject.active, "subject active toggled");
            (StatusCode::OK, Json(SubjectView::from(subject))).into_response()
        }
        Err(e) => store_error_response(&e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/subjects/:id/log
// ---------------------------------------------------------------------------

pub(crate) async fn subject_log(
    State(st): State<Arc<AppState>>,
    Path(id): Path<SubjectId>,
) -> Response {
    match st.store.get_log(id).await {
        Ok(Some(log)) => (StatusCode::OK, Json(log)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("no performance log for subject {id}"),
        ),
        Err(e) => store_error_response(&e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/subjects/:id/refresh
// ---------------------------------------------------------------------------

pub(crate) async fn refresh_subject(
    State(st): State<Arc<AppState>>,
    Path(id): Path<SubjectId>,
) -> Response {
    let gate = st.scheduler.cycle_gate();
    let _cycle = gate.lock().await;

    match st.engine.reconcile_subject_by_id(id).await {
        Ok(update) => (
            StatusCode::OK,
            Json(RefreshResponse {
                subject_id: id,
                update,
            }),
        )
            .into_response(),
        Err(SubjectError::Fetch(e)) => {
            warn!(subject_id = id, error = %e, "refresh failed at provider");
            provider_error_response(&e)
        }
        Err(SubjectError::Store(e)) => store_error_response(&e),
    }
}
