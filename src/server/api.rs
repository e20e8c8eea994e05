use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flame_common::{
    AppPatch, BookmarkPatch, Category, CategoryKind, CategoryPatch, CategoryView, NewApp,
    NewBookmark, NewCategory, ReorderItem, SearchQuery,
};

use super::auth::Caller;
use super::db::DbHandle;
use crate::errors::FlameError;
use crate::integrations::IntegrationSync;
use crate::settings::Settings;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub sync: Arc<IntegrationSync>,
    pub auth_token: Option<String>,
    pub uploads_dir: PathBuf,
}

pub type SharedState = Arc<AppState>;

// ── Envelope ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

fn created<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, ok(data))
}

/// Reorder body. The list is keyed by the collection name.
#[derive(Deserialize)]
pub struct ReorderRequest {
    #[serde(alias = "apps", alias = "bookmarks", alias = "categories")]
    pub items: Vec<ReorderItem>,
}

#[derive(Serialize)]
struct ConfigEntry {
    key: String,
    value: Value,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "You need to be logged in to access this route".to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (
            status,
            Json(serde_json::json!({"success": false, "error": message})),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<FlameError>() {
            Some(e) if e.is_not_found() => ApiError::NotFound(e.to_string()),
            Some(e @ (FlameError::Validation(_) | FlameError::InvalidSetting { .. })) => {
                ApiError::BadRequest(e.to_string())
            }
            _ => {
                tracing::error!("request failed: {:#}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<FlameError> for ApiError {
    fn from(err: FlameError) -> Self {
        anyhow::Error::from(err).into()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/0/reorder", put(reorder_categories))
        .route(
            "/api/categories/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/api/apps", get(list_apps).post(create_app))
        .route("/api/apps/0/reorder", put(reorder_apps))
        .route(
            "/api/apps/{id}",
            get(get_app).put(update_app).delete(delete_app),
        )
        .route("/api/bookmarks", get(list_bookmarks).post(create_bookmark))
        .route("/api/bookmarks/0/reorder", put(reorder_bookmarks))
        .route(
            "/api/bookmarks/{id}",
            get(get_bookmark).put(update_bookmark).delete(delete_bookmark),
        )
        .route("/api/config", get(get_config).put(update_config))
        .route("/api/config/{key}", get(get_config_key))
        .route("/api/queries", get(list_queries).post(create_query))
        .route(
            "/api/queries/{prefix}",
            put(update_query).delete(delete_query),
        )
        .route("/uploads/{*file}", get(serve_upload))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

async fn load_settings(state: &SharedState) -> Result<Settings, ApiError> {
    Ok(state.db.call(|db| db.load_settings()).await?)
}

/// Integration failures are logged and never reach the caller.
async fn refresh_integrations(state: &SharedState) {
    if let Err(e) = state.sync.refresh(&state.db).await {
        tracing::warn!(error = %e, "integration refresh failed");
    }
}

async fn health_check() -> &'static str {
    "ok"
}

// ── Categories ────────────────────────────────────────────────────────

async fn list_categories(
    State(state): State<SharedState>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    refresh_integrations(&state).await;
    let order = load_settings(&state).await?.use_ordering;
    let visibility = caller.visibility();
    let categories = state
        .db
        .call(move |db| db.list_categories(None, order, visibility))
        .await?;
    Ok(ok(categories))
}

/// `{id}` is a numeric id or a category kind (`apps`, `bookmarks`).
async fn get_category(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let order = load_settings(&state).await?.use_ordering;
    let visibility = caller.visibility();

    if let Ok(kind) = id.parse::<CategoryKind>() {
        let categories = state
            .db
            .call(move |db| db.list_categories(Some(kind), order, visibility))
            .await?;
        return Ok(ok(categories).into_response());
    }

    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid category id {}", id)))?;
    let view = state
        .db
        .call(move |db| db.get_category_view(id, order, visibility))
        .await?;
    match view.or_else(|| Category::synthetic(id).map(CategoryView::empty)) {
        Some(view) => Ok(ok(view).into_response()),
        None => Err(FlameError::CategoryNotFound { id }.into()),
    }
}

async fn create_category(
    State(state): State<SharedState>,
    caller: Caller,
    Json(req): Json<NewCategory>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    let pin = load_settings(&state).await?.pin_categories_by_default;
    let category = state
        .db
        .call(move |db| db.create_category(&req, pin))
        .await?;
    tracing::info!(id = category.id, name = %category.name, "category created");
    Ok(created(category))
}

async fn update_category(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<CategoryPatch>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    let category = state
        .db
        .call(move |db| db.update_category(id, &req))
        .await?;
    Ok(ok(category))
}

async fn delete_category(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    let deleted = state.db.call(move |db| db.delete_category(id)).await?;
    tracing::info!(
        id,
        apps = deleted.apps,
        bookmarks = deleted.bookmarks,
        "category deleted"
    );
    Ok(ok(deleted))
}

async fn reorder_categories(
    State(state): State<SharedState>,
    caller: Caller,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    state
        .db
        .call(move |db| db.reorder_categories(&req.items))
        .await?;
    Ok(ok(serde_json::json!({})))
}

// ── Apps ──────────────────────────────────────────────────────────────

async fn list_apps(
    State(state): State<SharedState>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    refresh_integrations(&state).await;
    let order = load_settings(&state).await?.use_ordering;
    let visibility = caller.visibility();
    let apps = state
        .db
        .call(move |db| db.list_apps(order, visibility))
        .await?;
    Ok(ok(apps))
}

async fn create_app(
    State(state): State<SharedState>,
    caller: Caller,
    Json(req): Json<NewApp>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    let pin = load_settings(&state).await?.pin_apps_by_default;
    let app = state.db.call(move |db| db.create_app(&req, pin)).await?;
    tracing::info!(id = app.id, name = %app.name, "app created");
    Ok(created(app))
}

async fn get_app(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let app = state.db.call(move |db| db.get_app(id)).await?;
    match app {
        Some(app) if caller.authenticated || app.is_public => Ok(ok(app)),
        _ => Err(FlameError::AppNotFound { id }.into()),
    }
}

async fn update_app(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<AppPatch>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    let app = state.db.call(move |db| db.update_app(id, &req)).await?;
    Ok(ok(app))
}

async fn delete_app(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    state.db.call(move |db| db.delete_app(id)).await?;
    Ok(ok(serde_json::json!({})))
}

async fn reorder_apps(
    State(state): State<SharedState>,
    caller: Caller,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    state.db.call(move |db| db.reorder_apps(&req.items)).await?;
    Ok(ok(serde_json::json!({})))
}

// ── Bookmarks ─────────────────────────────────────────────────────────

async fn list_bookmarks(
    State(state): State<SharedState>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    let order = load_settings(&state).await?.use_ordering;
    let visibility = caller.visibility();
    let bookmarks = state
        .db
        .call(move |db| db.list_bookmarks(order, visibility))
        .await?;
    Ok(ok(bookmarks))
}

async fn create_bookmark(
    State(state): State<SharedState>,
    caller: Caller,
    Json(req): Json<NewBookmark>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    let pin = load_settings(&state).await?.pin_bookmarks_by_default;
    let bookmark = state
        .db
        .call(move |db| db.create_bookmark(&req, pin))
        .await?;
    Ok(created(bookmark))
}

async fn get_bookmark(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let bookmark = state.db.call(move |db| db.get_bookmark(id)).await?;
    match bookmark {
        Some(b) if caller.authenticated || b.is_public => Ok(ok(b)),
        _ => Err(FlameError::BookmarkNotFound { id }.into()),
    }
}

async fn update_bookmark(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<BookmarkPatch>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    let bookmark = state
        .db
        .call(move |db| db.update_bookmark(id, &req))
        .await?;
    Ok(ok(bookmark))
}

async fn delete_bookmark(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    state.db.call(move |db| db.delete_bookmark(id)).await?;
    Ok(ok(serde_json::json!({})))
}

async fn reorder_bookmarks(
    State(state): State<SharedState>,
    caller: Caller,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    state
        .db
        .call(move |db| db.reorder_bookmarks(&req.items))
        .await?;
    Ok(ok(serde_json::json!({})))
}

// ── Config ────────────────────────────────────────────────────────────

async fn get_config(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(ok(load_settings(&state).await?.to_map()))
}

async fn get_config_key(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = load_settings(&state).await?;
    match settings.get(&key) {
        Some(value) => Ok(ok(ConfigEntry { key, value })),
        None => Err(FlameError::SettingNotFound { key }.into()),
    }
}

async fn update_config(
    State(state): State<SharedState>,
    caller: Caller,
    Json(patch): Json<Map<String, Value>>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    let keys: Vec<String> = patch.keys().cloned().collect();
    let settings = state.db.call(move |db| db.update_settings(&patch)).await?;
    tracing::info!(?keys, "config updated");
    Ok(ok(settings.to_map()))
}

// ── Custom search queries ─────────────────────────────────────────────

async fn list_queries(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let queries = state.db.call(|db| db.list_queries()).await?;
    Ok(ok(queries))
}

async fn create_query(
    State(state): State<SharedState>,
    caller: Caller,
    Json(req): Json<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    let query = state.db.call(move |db| db.create_query(&req)).await?;
    Ok(created(query))
}

async fn update_query(
    State(state): State<SharedState>,
    caller: Caller,
    Path(prefix): Path<String>,
    Json(req): Json<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    let query = state
        .db
        .call(move |db| db.update_query(&prefix, &req))
        .await?;
    Ok(ok(query))
}

async fn delete_query(
    State(state): State<SharedState>,
    caller: Caller,
    Path(prefix): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require()?;
    state.db.call(move |db| db.delete_query(&prefix)).await?;
    Ok(ok(serde_json::json!({})))
}

// ── Uploaded icons ────────────────────────────────────────────────────

async fn serve_upload(
    State(state): State<SharedState>,
    Path(file_path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Reject path traversal
    if file_path.contains("..") || file_path.starts_with('/') || file_path.contains('\\') {
        return Err(ApiError::BadRequest("Invalid path".into()));
    }

    let full_path = state.uploads_dir.join(&file_path);
    if !full_path.is_file() {
        return Err(ApiError::NotFound(format!("File not found: {}", file_path)));
    }

    let mime = mime_guess::from_path(&full_path).first_or_octet_stream();
    let bytes = tokio::fs::read(&full_path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read upload: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        bytes,
    ))
}
