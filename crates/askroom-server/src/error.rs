//! Errors reported to HTTP callers.

use askroom_core::InvalidId;
use askroom_store::StoreError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::subscription::SubscribeError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("store failure: {0}")]
    StoreFailure(#[source] StoreError),
    #[error("{0}")]
    TransportUpgradeFailed(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::StoreFailure(_) => "STORE_FAILURE",
            Self::TransportUpgradeFailed(_) => "TRANSPORT_UPGRADE_FAILED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::TransportUpgradeFailed(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            other => Self::StoreFailure(other),
        }
    }
}

impl From<InvalidId> for ApiError {
    fn from(e: InvalidId) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::InvalidInput(e.body_text())
    }
}

impl From<SubscribeError> for ApiError {
    fn from(e: SubscribeError) -> Self {
        match e {
            SubscribeError::RoomNotFound(room_id) => Self::NotFound(format!("room {room_id} not found")),
            SubscribeError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::StoreFailure(e) => {
                error!(error = %e, "store call failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({ "error": { "code": self.code(), "message": message } });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askroom_core::RoomId;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn invalid_input_is_400() {
        let (status, body) = body_json(ApiError::InvalidInput("theme is empty".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
        assert_eq!(body["error"]["message"], "theme is empty");
    }

    #[tokio::test]
    async fn store_not_found_maps_to_404() {
        let err: ApiError = StoreError::NotFound("message x".into()).into();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "message x not found");
    }

    #[tokio::test]
    async fn store_failure_hides_details() {
        let err: ApiError = StoreError::Database("disk I/O error at /secret/path".into()).into();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "STORE_FAILURE");
        assert!(!body.to_string().contains("/secret/path"));
    }

    #[tokio::test]
    async fn subscribe_errors_map() {
        let room = RoomId::new();
        let (status, _) = body_json(SubscribeError::RoomNotFound(room).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            body_json(SubscribeError::Store(StoreError::Io("gone".into())).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn upgrade_failure_is_400() {
        let (status, body) = body_json(ApiError::TransportUpgradeFailed("not a websocket".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "TRANSPORT_UPGRADE_FAILED");
    }

    #[test]
    fn invalid_id_maps_to_invalid_input() {
        let err: ApiError = "zzz".parse::<RoomId>().unwrap_err().into();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }
}
