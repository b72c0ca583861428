//! HTTP API: owner-scoped task CRUD and filtered listings.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET` | `/tasks` | list with `is_urgent`, `is_overdue`, `priority`, `status`, `ordering` |
//! | `POST` | `/tasks` | create |
//! | `GET` | `/tasks/{id}` | fetch |
//! | `PUT`, `PATCH` | `/tasks/{id}` | partial update |
//! | `DELETE` | `/tasks/{id}` | delete |
//!
//! The caller is identified by the `X-User-Id` header (a UUID). Every error
//! is returned as `{"error": "..."}`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, FixedOffset, Utc};
use taskpulse::{Clock, NewTask, TaskError, TaskFilter, TaskPatch, TaskService, TaskStore};
use taskpulse_proto::api::{
    CreateTaskRequest, DeletedBody, ErrorBody, TaskResponse, UpdateTaskRequest,
};
use taskpulse_proto::task::{OwnerId, Priority, Status, TaskId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::present;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared state for all handlers.
pub struct AppState<S, C> {
    /// Task operations.
    pub service: TaskService<S, C>,
    /// Timezone deadlines are read and rendered in.
    pub display_offset: FixedOffset,
}

impl<S, C> AppState<S, C> {
    /// Creates the handler state.
    #[must_use]
    pub const fn new(service: TaskService<S, C>, display_offset: FixedOffset) -> Self {
        Self {
            service,
            display_offset,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request (bad JSON syntax, wrong content type).
    #[error("{0}")]
    BadRequest(String),

    /// Missing or malformed caller identity.
    #[error("{0}")]
    Unauthorized(String),

    /// No such route or task.
    #[error("{0}")]
    NotFound(String),

    /// Well-formed request with invalid field values.
    #[error("{0}")]
    Unprocessable(String),

    /// Error from the task service.
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Task(e) => match e {
                TaskError::TitleEmpty | TaskError::TitleTooLong => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                TaskError::NotFound(_) => StatusCode::NOT_FOUND,
                TaskError::Forbidden(_) => StatusCode::FORBIDDEN,
                TaskError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            Self::Task(TaskError::Store(e)) => {
                tracing::error!(error = %e, "storage failure while handling request");
                "internal server error".to_string()
            }
            Self::Task(TaskError::Forbidden(_)) => "no access to this task".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => Self::Unprocessable(e.body_text()),
            other => Self::BadRequest(other.body_text()),
        }
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Reads the caller's id from the `X-User-Id` header.
fn caller(headers: &HeaderMap) -> Result<OwnerId, ApiError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("missing X-User-Id header".to_string()))?;
    raw.to_str()
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| ApiError::Unauthorized("invalid X-User-Id header".to_string()))
}

/// Unparseable ids cannot name a task, so they are reported as missing.
fn task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound("task not found".to_string()))
}

/// Empty strings in nullable fields mean "no value".
fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn parse_deadline(
    raw: Option<String>,
    offset: FixedOffset,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    blank_to_none(raw)
        .map(|s| present::parse_deadline(&s, offset))
        .transpose()
        .map_err(|e| ApiError::Unprocessable(e.to_string()))
}

/// Query-string truthiness: `1`, `true`, `on` and `yes` count as set.
fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Adds every comma-separated code in `value` to `into`, skipping repeats.
fn push_codes<T>(into: &mut Vec<T>, value: &str) -> Result<(), ApiError>
where
    T: std::str::FromStr + PartialEq,
    T::Err: std::fmt::Display,
{
    for code in value.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let parsed = code
            .parse::<T>()
            .map_err(|e| ApiError::Unprocessable(e.to_string()))?;
        if !into.contains(&parsed) {
            into.push(parsed);
        }
    }
    Ok(())
}

/// Parses the listing query string into a filter and an ordering key.
///
/// `priority` and `status` may be repeated (`priority=HIGH&priority=LOW`),
/// given in array form (`priority[]=HIGH`) or comma separated.
fn parse_listing(query: Option<&str>) -> Result<(TaskFilter, Option<String>), ApiError> {
    let mut filter = TaskFilter::all();
    let mut ordering = None;

    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "is_urgent" => filter.urgent = truthy(&value),
            "is_overdue" => filter.overdue = truthy(&value),
            "priority" | "priority[]" => push_codes::<Priority>(&mut filter.priorities, &value)?,
            "status" | "status[]" => push_codes::<Status>(&mut filter.statuses, &value)?,
            "ordering" => ordering = Some(value.into_owned()),
            _ => {}
        }
    }

    Ok((filter, ordering))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_tasks<S: TaskStore + 'static, C: Clock>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let owner = caller(&headers)?;
    let (filter, ordering) = parse_listing(query.as_deref())?;
    let tasks = state
        .service
        .list(owner, &filter, ordering.as_deref())
        .await?;
    Ok(Json(
        tasks
            .into_iter()
            .map(|t| present::task_response(t, state.display_offset))
            .collect(),
    ))
}

async fn create_task<S: TaskStore + 'static, C: Clock>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let owner = caller(&headers)?;
    let Json(req) = body?;

    let new = NewTask {
        title: req.title,
        description: blank_to_none(req.description),
        deadline: parse_deadline(req.deadline, state.display_offset)?,
        priority: req.priority,
        status: req.status,
        tags: blank_to_none(req.tags),
    };
    let task = state.service.create(owner, new).await?;
    Ok((
        StatusCode::CREATED,
        Json(present::task_response(task, state.display_offset)),
    ))
}

async fn get_task<S: TaskStore + 'static, C: Clock>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let owner = caller(&headers)?;
    let task = state.service.get(owner, task_id(&id)?).await?;
    Ok(Json(present::task_response(task, state.display_offset)))
}

async fn update_task<S: TaskStore + 'static, C: Clock>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let owner = caller(&headers)?;
    let id = task_id(&id)?;
    let Json(req) = body?;

    let deadline = match req.deadline {
        None => None,
        Some(raw) => Some(parse_deadline(raw, state.display_offset)?),
    };
    let patch = TaskPatch {
        title: req.title,
        description: req.description.map(blank_to_none),
        deadline,
        priority: req.priority,
        status: req.status,
        tags: req.tags.map(blank_to_none),
    };
    let task = state.service.update(owner, id, patch).await?;
    Ok(Json(present::task_response(task, state.display_offset)))
}

async fn delete_task<S: TaskStore + 'static, C: Clock>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DeletedBody>, ApiError> {
    let owner = caller(&headers)?;
    state.service.delete(owner, task_id(&id)?).await?;
    Ok(Json(DeletedBody {
        message: "task deleted".to_string(),
    }))
}

async fn no_route() -> ApiError {
    ApiError::NotFound("no such route".to_string())
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Builds the API router over `state`.
pub fn router<S: TaskStore + 'static, C: Clock>(state: Arc<AppState<S, C>>) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks::<S, C>).post(create_task::<S, C>))
        .route(
            "/tasks/{id}",
            get(get_task::<S, C>)
                .put(update_task::<S, C>)
                .patch(update_task::<S, C>)
                .delete(delete_task::<S, C>),
        )
        .fallback(no_route)
        .with_state(state)
}

/// Starts the API server on `addr` and returns the bound address and a join
/// handle. The server drains and exits once `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state<S: TaskStore + 'static, C: Clock>(
    addr: &str,
    state: Arc<AppState<S, C>>,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "api server error");
        }
    });

    Ok((bound_addr, handle))
}
