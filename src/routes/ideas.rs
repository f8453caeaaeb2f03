use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::*;
use crate::db::IdeaRepository;
use crate::error::{AppError, AppResult};
use crate::routes::auth::Commission;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_ideas).put(put_ideas))
        .route("/sections/new", post(create_section))
        .route("/sections/delete", post(delete_section))
        .route("/items/new", post(create_item))
        .route("/items/update", post(update_item))
        .route("/items/delete", post(delete_item))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct IdeasResponse {
    pub data: Vec<IdeaSectionPayload>,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct SectionRequest {
    pub key: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct SectionKeyRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreateRequest {
    pub section_key: String,
    pub text: String,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdateRequest {
    pub section_key: String,
    pub id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRefRequest {
    pub section_key: String,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub ok: bool,
    pub item: IdeaItemPayload,
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_ideas(
    State(state): State<Arc<AppState>>,
    _session: Commission,
) -> AppResult<Json<IdeasResponse>> {
    let data = IdeaRepository::fetch_grouped(&state.db).await?;
    Ok(Json(IdeasResponse { data }))
}

/// Whole-document replace, exactly as the board page saves. The shape is
/// validated before any write; the swap itself is transactional.
async fn put_ideas(
    State(state): State<Arc<AppState>>,
    _session: Commission,
    Json(payload): Json<serde_json::Value>,
) -> AppResult<Json<OkResponse>> {
    let data = payload
        .get("data")
        .filter(|d| d.is_array())
        .cloned()
        .ok_or_else(|| AppError::Validation("Invalid payload".to_string()))?;
    let data: Vec<IdeaSectionPayload> = serde_json::from_value(data)
        .map_err(|_| AppError::Validation("Invalid payload".to_string()))?;

    IdeaRepository::replace_all(&state.db, &data).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn create_section(
    State(state): State<Arc<AppState>>,
    _session: Commission,
    Json(request): Json<SectionRequest>,
) -> AppResult<Json<OkResponse>> {
    let key = request.key.trim().to_string();
    if key.is_empty() || request.title.trim().is_empty() {
        return Err(AppError::Validation("key y title requeridos".to_string()));
    }
    IdeaRepository::upsert_section(&state.db, &key, request.title.trim()).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn delete_section(
    State(state): State<Arc<AppState>>,
    _session: Commission,
    Json(request): Json<SectionKeyRequest>,
) -> AppResult<Json<OkResponse>> {
    let removed = IdeaRepository::delete_section(&state.db, request.key.trim()).await?;
    if !removed {
        return Err(AppError::NotFound("Sección no encontrada".to_string()));
    }
    Ok(Json(OkResponse { ok: true }))
}

async fn create_item(
    State(state): State<Arc<AppState>>,
    _session: Commission,
    Json(request): Json<ItemCreateRequest>,
) -> AppResult<Json<ItemResponse>> {
    if request.text.trim().is_empty() {
        return Err(AppError::Validation("text requerido".to_string()));
    }
    let item = IdeaRepository::add_item(
        &state.db,
        request.section_key.trim(),
        request.id.as_deref(),
        request.text.trim(),
    )
    .await?
    .ok_or_else(|| AppError::NotFound("Sección no encontrada".to_string()))?;

    Ok(Json(ItemResponse { ok: true, item }))
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    _session: Commission,
    Json(request): Json<ItemUpdateRequest>,
) -> AppResult<Json<OkResponse>> {
    let updated = IdeaRepository::update_item(
        &state.db,
        request.section_key.trim(),
        request.id.trim(),
        request.text.trim(),
    )
    .await?;
    if !updated {
        return Err(AppError::NotFound("Idea no encontrada".to_string()));
    }
    Ok(Json(OkResponse { ok: true }))
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    _session: Commission,
    Json(request): Json<ItemRefRequest>,
) -> AppResult<Json<OkResponse>> {
    let removed =
        IdeaRepository::delete_item(&state.db, request.section_key.trim(), request.id.trim())
            .await?;
    if !removed {
        return Err(AppError::NotFound("Idea no encontrada".to_string()));
    }
    Ok(Json(OkResponse { ok: true }))
}
