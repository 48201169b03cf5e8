//! HTTP surface for the matcher.
//!
//! Routes are generic over the store so the same router serves the
//! PostgreSQL store in production and the in-memory store in tests and
//! demos.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{FixedOffset, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ApiError;
use crate::matching;
use crate::models::{NewSession, Session, WeeklyAvailability};
use crate::store::SessionStore;

/// Application state shared across handlers
pub struct AppState<S> {
    pub store: Arc<S>,
    /// Offset used to place session start times into weekly slots
    pub offset: FixedOffset,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            offset: self.offset,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityBody {
    #[serde(default)]
    pub weekday_morning: bool,
    #[serde(default)]
    pub weekday_afternoon: bool,
    #[serde(default)]
    pub weekday_evening: bool,
    #[serde(default)]
    pub weekend_morning: bool,
    #[serde(default)]
    pub weekend_afternoon: bool,
    #[serde(default)]
    pub weekend_evening: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ParticipationBody {
    pub player_id: Uuid,
}

pub fn create_router<S: SessionStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/users/:user_id/matches", get(get_matches::<S>))
        .route(
            "/api/users/:user_id/availability",
            get(get_availability::<S>).put(put_availability::<S>),
        )
        .route("/api/sessions", post(create_session::<S>))
        .route("/api/sessions/:session_id/join", post(join_session::<S>))
        .route("/api/sessions/:session_id/leave", post(leave_session::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/users/:user_id/matches
///
/// Upcoming sessions, best fit for the user's weekly availability first.
async fn get_matches<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let ranked =
        matching::rank_for_user(state.store.as_ref(), user_id, Utc::now(), state.offset).await?;
    Ok(Json(ranked))
}

async fn get_availability<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<WeeklyAvailability>, ApiError> {
    state
        .store
        .get_availability(user_id)
        .await?
        .map(Json)
        .ok_or(ApiError::AvailabilityNotFound(user_id))
}

/// PUT /api/users/:user_id/availability
///
/// Replaces any previous submission.
async fn put_availability<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<AvailabilityBody>,
) -> Result<Json<WeeklyAvailability>, ApiError> {
    let availability = WeeklyAvailability {
        user_id,
        weekday_morning: body.weekday_morning,
        weekday_afternoon: body.weekday_afternoon,
        weekday_evening: body.weekday_evening,
        weekend_morning: body.weekend_morning,
        weekend_afternoon: body.weekend_afternoon,
        weekend_evening: body.weekend_evening,
        notes: body.notes,
    };
    state.store.upsert_availability(&availability).await?;
    Ok(Json(availability))
}

/// POST /api/sessions
///
/// The host becomes the session's first player.
async fn create_session<S: SessionStore>(
    State(state): State<AppState<S>>,
    Json(body): Json<NewSession>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = state.store.create_session(body).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn join_session<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<ParticipationBody>,
) -> Result<Json<Session>, ApiError> {
    let session = state.store.join_session(session_id, body.player_id).await?;
    Ok(Json(session))
}

async fn leave_session<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<ParticipationBody>,
) -> Result<Json<Session>, ApiError> {
    let session = state.store.leave_session(session_id, body.player_id).await?;
    Ok(Json(session))
}
