use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Session {0} is full")]
    SessionFull(Uuid),

    #[error("Player {player_id} already joined session {session_id}")]
    AlreadyJoined { session_id: Uuid, player_id: Uuid },

    #[error("Player {player_id} is not in session {session_id}")]
    NotJoined { session_id: Uuid, player_id: Uuid },

    #[error("The host cannot leave session {0}")]
    HostCannotLeave(Uuid),

    #[error("Invalid session: {0}")]
    InvalidSession(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Availability not found for user {0}")]
    AvailabilityNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::AvailabilityNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::InvalidSession(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(
                StoreError::SessionFull(_)
                | StoreError::AlreadyJoined { .. }
                | StoreError::NotJoined { .. }
                | StoreError::HostCannotLeave(_),
            ) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {self}");
            return (status, "Internal server error").into_response();
        }

        (status, self.to_string()).into_response()
    }
}
