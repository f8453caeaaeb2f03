use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::*;
use crate::db::EventRepository;
use crate::error::{AppError, AppResult};
use crate::routes::auth::Commission;
use crate::services::schedule;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_events))
        .route("/new", post(create_event))
        .route("/update", post(update_event))
        .route("/delete", post(delete_event))
        .route("/attend", post(attend_event))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub img: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub provisional: Option<bool>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    #[serde(rename = "match")]
    pub target: EventMatch,
    #[serde(default)]
    pub patch: EventPatch,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<EventView>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub ok: bool,
    pub event: EventView,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Public listing, earliest event first, with the civil date/time strings
/// the pages render derived in the fixed timezone.
async fn list_events(State(state): State<Arc<AppState>>) -> AppResult<Json<EventsResponse>> {
    let events = EventRepository::list(&state.db).await?;
    Ok(Json(EventsResponse {
        events: events.into_iter().map(EventView::from).collect(),
    }))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    _session: Commission,
    Json(request): Json<CreateEventRequest>,
) -> AppResult<Json<EventResponse>> {
    let title = request.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::Validation("title requerido".to_string()));
    }

    // Either an explicit instant or a complete civil date+time pair.
    let starts_at = match (&request.starts_at, normalized(&request.date), normalized(&request.time))
    {
        (Some(instant), _, _) => *instant,
        (None, Some(date), Some(time)) => schedule::combine_civil(date, time)?,
        _ => {
            return Err(AppError::Validation(
                "Se necesita startsAt o date y time".to_string(),
            ))
        }
    };

    let event = EventRepository::create(
        &state.db,
        NewEvent {
            title,
            img: request.img.unwrap_or_default(),
            description: request.description.unwrap_or_default(),
            location: request.location.unwrap_or_default(),
            provisional: request.provisional.unwrap_or(false),
            starts_at,
            attendees: request.attendees.unwrap_or_default(),
            tags: request.tags.unwrap_or_default(),
        },
    )
    .await?;

    tracing::info!("Event created: \"{}\" ({})", event.title, event.id);
    Ok(Json(EventResponse {
        ok: true,
        event: event.into(),
    }))
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    _session: Commission,
    Json(request): Json<UpdateEventRequest>,
) -> AppResult<Json<EventResponse>> {
    let event = EventRepository::update(&state.db, &request.target, &request.patch)
        .await?
        .ok_or_else(|| AppError::NotFound("Evento no encontrado".to_string()))?;

    tracing::info!("Event updated: \"{}\" ({})", event.title, event.id);
    Ok(Json(EventResponse {
        ok: true,
        event: event.into(),
    }))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    _session: Commission,
    Json(target): Json<EventMatch>,
) -> AppResult<Json<OkResponse>> {
    let removed = EventRepository::delete(&state.db, &target).await?;
    if !removed {
        return Err(AppError::NotFound("Evento no encontrado".to_string()));
    }
    Ok(Json(OkResponse { ok: true }))
}

/// Authoritative side of the attendance toggle: membership is recomputed
/// from the store for the cookie-identified user and the concrete action
/// performed is reported back for client reconciliation.
async fn attend_event(
    State(state): State<Arc<AppState>>,
    session: Commission,
    Json(request): Json<AttendRequest>,
) -> AppResult<Json<AttendOutcome>> {
    let user = session
        .username
        .ok_or_else(|| AppError::Unauthorized("Usuario no identificado".to_string()))?;

    let (event, action) =
        EventRepository::apply_attendance(&state.db, &request.target, &user, request.action)
            .await?
            .ok_or_else(|| AppError::NotFound("Evento no encontrado".to_string()))?;

    match action {
        EffectiveAction::Add => {
            tracing::info!("{} se apuntó a \"{}\"", user, event.title);
        }
        EffectiveAction::Remove => {
            tracing::info!("{} canceló asistencia a \"{}\"", user, event.title);
        }
        EffectiveAction::Noop => {}
    }

    Ok(Json(AttendOutcome { ok: true, action }))
}
