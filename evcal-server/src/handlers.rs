use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use evcal_core::{CatalogEvent, SourceEvent, prelude::*};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

type UserLock = Arc<tokio::sync::Mutex<()>>;

/// 按用户串行化读-改-写
///
/// 只为当前持有或等待锁的用户保留表项，最后一个持有者释放时删除。
#[derive(Clone, Default)]
pub struct UserLocks {
    inner: Arc<Mutex<HashMap<String, UserLock>>>,
}

impl UserLocks {
    fn table(&self) -> MutexGuard<'_, HashMap<String, UserLock>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn acquire(&self, user_id: &str) -> UserGuard {
        let lock = self
            .table()
            .entry(user_id.to_string())
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;

        UserGuard {
            locks: self.clone(),
            user_id: user_id.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table().len()
    }
}

/// 持有期间同一用户的其他写请求等待
struct UserGuard {
    locks: UserLocks,
    user_id: String,
    lock: UserLock,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        self.guard.take();

        // 表和本守卫各持有一份引用时，没有其他请求在等待
        let mut table = self.locks.table();
        let idle = table
            .get(&self.user_id)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if idle {
            table.remove(&self.user_id);
        }
    }
}

/// 应用状态
#[derive(Clone)]
pub struct AppState<S: StorageBackend + Clone> {
    pub service: CalendarService<S>,
    pub locks: UserLocks,
}

/// 健康检查响应
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// 错误响应
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

#[derive(Deserialize)]
struct RangeQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct RemoveQuery {
    date: NaiveDate,
}

#[derive(Serialize)]
struct StatusResponse {
    source_id: String,
    committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<CalendarEntry>,
}

#[derive(Deserialize)]
struct RecurrenceRequest {
    event: CatalogEvent,
    pattern: RecurrencePattern,
}

#[derive(Serialize)]
struct RecurrenceResponse {
    created: usize,
}

#[derive(Deserialize)]
struct IcsQuery {
    calendar_name: Option<String>,
    reminder_minutes: Option<u32>,
}

pub fn create_app<S>(service: CalendarService<S>) -> Router
where
    S: StorageBackend + Clone + 'static,
{
    create_app_with_locks(service, UserLocks::default())
}

fn create_app_with_locks<S>(service: CalendarService<S>, locks: UserLocks) -> Router
where
    S: StorageBackend + Clone + 'static,
{
    let state = AppState { service, locks };

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(
            "/users/{user_id}/commitments",
            post(commit_handler::<S>)
                .get(list_handler::<S>)
                .delete(remove_handler::<S>),
        )
        .route(
            "/users/{user_id}/commitments/{source_id}",
            get(status_handler::<S>),
        )
        .route("/users/{user_id}/conflicts", post(conflicts_handler::<S>))
        .route(
            "/users/{user_id}/recurrences",
            post(recurrence_handler::<S>),
        )
        .route("/users/{user_id}/calendar.ics", get(ics_handler::<S>))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// 根路径处理器
async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Event Calendar Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Per-user calendar commitments with conflict detection and recurrence",
        "endpoints": {
            "health": "/health",
            "commitments": "/users/{user_id}/commitments",
            "conflicts": "/users/{user_id}/conflicts",
            "recurrences": "/users/{user_id}/recurrences",
            "calendar": "/users/{user_id}/calendar.ics"
        }
    }))
}

/// 健康检查处理器
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// 添加活动
async fn commit_handler<S: StorageBackend + Clone + 'static>(
    Path(user_id): Path<String>,
    State(state): State<AppState<S>>,
    Json(raw): Json<CatalogEvent>,
) -> Result<impl IntoResponse, AppError> {
    let event = SourceEvent::try_from(raw)?;

    let _guard = state.locks.acquire(&user_id).await;
    let outcome = state.service.commit(&user_id, &event).await;

    let status = match outcome.status {
        CommitStatus::Ok | CommitStatus::Conflict => StatusCode::CREATED,
        CommitStatus::AlreadyCommitted => StatusCode::OK,
        CommitStatus::Failed => StatusCode::SERVICE_UNAVAILABLE,
    };
    Ok((status, Json(outcome)))
}

/// 列出条目，未指定区间时返回全部
async fn list_handler<S: StorageBackend + Clone + 'static>(
    Path(user_id): Path<String>,
    Query(range): Query<RangeQuery>,
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, AppError> {
    let entries = match (range.from, range.to) {
        (None, None) => state.service.all_entries(&user_id).await?,
        (from, to) => {
            state
                .service
                .entries_in_range(
                    &user_id,
                    from.unwrap_or(NaiveDate::MIN),
                    to.unwrap_or(NaiveDate::MAX),
                )
                .await?
        }
    };
    Ok(Json(entries))
}

/// 删除某天的全部条目
async fn remove_handler<S: StorageBackend + Clone + 'static>(
    Path(user_id): Path<String>,
    Query(query): Query<RemoveQuery>,
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    let _guard = state.locks.acquire(&user_id).await;
    let outcome = state.service.remove_on_date(&user_id, query.date).await;

    let status = if outcome.error.is_some() {
        StatusCode::SERVICE_UNAVAILABLE
    } else if outcome.removed.is_empty() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    (status, Json(outcome))
}

/// 查询源活动是否已添加
async fn status_handler<S: StorageBackend + Clone + 'static>(
    Path((user_id, source_id)): Path<(String, String)>,
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state
        .service
        .entry_for_source(&user_id, &source_id)
        .await?;
    Ok(Json(StatusResponse {
        source_id,
        committed: entry.is_some(),
        entry,
    }))
}

/// 仅检查冲突
async fn conflicts_handler<S: StorageBackend + Clone + 'static>(
    Path(user_id): Path<String>,
    State(state): State<AppState<S>>,
    Json(raw): Json<CatalogEvent>,
) -> Result<impl IntoResponse, AppError> {
    let event = SourceEvent::try_from(raw)?;
    let conflicts = state.service.check_conflicts(&user_id, &event).await?;
    Ok(Json(conflicts))
}

/// 按重复规则添加
async fn recurrence_handler<S: StorageBackend + Clone + 'static>(
    Path(user_id): Path<String>,
    State(state): State<AppState<S>>,
    Json(request): Json<RecurrenceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let event = SourceEvent::try_from(request.event)?;

    let _guard = state.locks.acquire(&user_id).await;
    let created = state
        .service
        .expand_recurrence(&user_id, &event, &request.pattern)
        .await?;

    tracing::info!("{} 添加 {} 个重复活动", user_id, created);
    Ok((StatusCode::CREATED, Json(RecurrenceResponse { created })))
}

/// 导出ICS日历
async fn ics_handler<S: StorageBackend + Clone + 'static>(
    Path(user_id): Path<String>,
    Query(query): Query<IcsQuery>,
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, AppError> {
    let entries = state.service.all_entries(&user_id).await?;

    let defaults = IcsOptions::default();
    let options = IcsOptions {
        calendar_name: query
            .calendar_name
            .or_else(|| Some(format!("Events - {}", user_id))),
        reminder_minutes: query.reminder_minutes.or(defaults.reminder_minutes),
        ..defaults
    };
    let ics_content = IcsExporter::new(options).export(&entries);

    Ok((
        StatusCode::OK,
        [("Content-Type", "text/calendar; charset=utf-8")],
        ics_content,
    ))
}

/// 应用错误类型
#[derive(Debug)]
struct AppError(evcal_core::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use evcal_core::Error;

        let (status, error_message) = match &self.0 {
            Error::InvalidEvent { .. } => (StatusCode::BAD_REQUEST, "invalid event"),
            Error::InvalidPattern(_) => (StatusCode::BAD_REQUEST, "invalid pattern"),
            Error::Config(_) => (StatusCode::BAD_REQUEST, "invalid configuration"),
            Error::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable"),
            Error::Json(_) | Error::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            message: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<evcal_core::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
