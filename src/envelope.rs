use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Uniform envelope returned by every seller endpoint.
///
/// Exactly one of `data`/`error` is populated and `success` always agrees
/// with which one it is. Both fields serialize as explicit `null`s when
/// absent so the wire shape is identical across outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> RestResponse<T> {
    pub fn ok(message: &str, data: T) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data: Some(data),
            error: None,
        }
    }

    fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Closed set of failure reasons a service call can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Forbidden,
    Unauthorized,
    Unexpected,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceError {
    message: String,
    kind: FailureKind,
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::NotFound,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::Forbidden,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::Unauthorized,
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::Unexpected,
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

// Failures raised outside the domain set carry no classification of their
// own and land on the internal-error branch.
impl From<axum::extract::multipart::MultipartError> for ServiceError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::unexpected(format!("multipart decode failed: {err}"))
    }
}

/// Fixed strings an endpoint contributes to the translator.
#[derive(Debug, Clone, Copy)]
pub struct Replies {
    pub operation: &'static str,
    pub success: &'static str,
    /// 404 message used when a service signals absence with an empty result
    /// instead of raising `NotFound`.
    pub missing: &'static str,
}

pub const NOT_FOUND_CODE: &str = "NOT_FOUND";
pub const FORBIDDEN_CODE: &str = "FORBIDDEN";
pub const UNAUTHENTICATED_MESSAGE: &str = "User not authenticated";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error occurred";

pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::NotFound => StatusCode::NOT_FOUND,
        FailureKind::Forbidden => StatusCode::FORBIDDEN,
        FailureKind::Unauthorized => StatusCode::UNAUTHORIZED,
        FailureKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Translate the outcome of one service call into `(status, envelope)`.
///
/// The status depends only on the failure kind, never on message content.
/// 404/403 surface the domain message in `message` and a fixed code in
/// `error`; 401/500 keep `message` fixed and carry the detail in `error`, so
/// internal messages never reach the user-facing field.
pub fn respond<T: Serialize>(replies: &Replies, outcome: Result<T, ServiceError>) -> Response {
    match outcome {
        Ok(value) => (
            StatusCode::OK,
            Json(RestResponse::ok(replies.success, value)),
        )
            .into_response(),
        Err(err) => failure::<T>(replies, err),
    }
}

/// Like [`respond`], for operations that expect a real entity back: an empty
/// success is rewritten to `NotFound` before serialization. Guards against
/// services that report absence by returning nothing rather than failing.
pub fn respond_entity<T: Serialize>(
    replies: &Replies,
    outcome: Result<Option<T>, ServiceError>,
) -> Response {
    let outcome = outcome
        .and_then(|value| value.ok_or_else(|| ServiceError::not_found(replies.missing)));
    respond(replies, outcome)
}

fn failure<T: Serialize>(replies: &Replies, err: ServiceError) -> Response {
    let kind = err.kind();
    match kind {
        FailureKind::Unexpected => error!(
            target = "market.api",
            operation = replies.operation,
            detail = %err.detail(),
            "request failed",
        ),
        _ => warn!(
            target = "market.api",
            operation = replies.operation,
            detail = %err.detail(),
            "request rejected",
        ),
    }

    let status = status_for(kind);
    let envelope: RestResponse<T> = match kind {
        FailureKind::NotFound => RestResponse::failed(err.message, NOT_FOUND_CODE),
        FailureKind::Forbidden => RestResponse::failed(err.message, FORBIDDEN_CODE),
        FailureKind::Unauthorized => RestResponse::failed(UNAUTHENTICATED_MESSAGE, err.message),
        FailureKind::Unexpected => RestResponse::failed(INTERNAL_ERROR_MESSAGE, err.message),
    };
    (status, Json(envelope)).into_response()
}

const AUTH: Replies = Replies {
    operation: "authenticate",
    success: "Authenticated",
    missing: "User not found",
};

/// Envelope-shaped rejection for the auth middleware, which runs before any
/// endpoint reply table is in scope.
pub fn unauthenticated(detail: &str) -> Response {
    failure::<serde_json::Value>(&AUTH, ServiceError::unauthorized(detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    const REPLIES: Replies = Replies {
        operation: "check_service_package_validity",
        success: "Service package validity checked successfully",
        missing: "Service package not found",
    };

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Payload {
        valid: bool,
    }

    async fn decode(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).expect("json body");
        (status, value)
    }

    #[tokio::test]
    async fn success_maps_to_ok_envelope() {
        let response = respond(&REPLIES, Ok(Payload { valid: true }));
        let (status, body) = decode(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], Value::Bool(true));
        assert_eq!(body["message"], "Service package validity checked successfully");
        assert_eq!(body["data"]["valid"], Value::Bool(true));
        assert_eq!(body["error"], Value::Null);
    }

    #[tokio::test]
    async fn not_found_maps_to_404_with_code() {
        let err = ServiceError::not_found("Seller profile not found for user: alice");
        let response = respond::<Payload>(&REPLIES, Err(err));
        let (status, body) = decode(response).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], Value::Bool(false));
        assert_eq!(body["message"], "Seller profile not found for user: alice");
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn forbidden_maps_to_403_with_code() {
        let err = ServiceError::forbidden("Seller not approved. Current status: PENDING");
        let response = respond::<Payload>(&REPLIES, Err(err));
        let (status, body) = decode(response).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Seller not approved. Current status: PENDING");
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["error"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn unauthorized_keeps_fixed_message() {
        let err = ServiceError::unauthorized("token signature rejected");
        let response = respond::<Payload>(&REPLIES, Err(err));
        let (status, body) = decode(response).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "User not authenticated");
        assert_eq!(body["error"], "token signature rejected");
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn unexpected_never_leaks_detail_into_message() {
        let err = ServiceError::unexpected("connection pool exhausted at replica 3");
        let response = respond::<Payload>(&REPLIES, Err(err));
        let (status, body) = decode(response).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error occurred");
        assert_eq!(body["error"], "connection pool exhausted at replica 3");
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn empty_success_coerces_to_not_found() {
        let response = respond_entity::<Payload>(&REPLIES, Ok(None));
        let (status, body) = decode(response).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], Value::Bool(false));
        assert_eq!(body["message"], "Service package not found");
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn present_entity_passes_through() {
        let response = respond_entity(&REPLIES, Ok(Some(Payload { valid: false })));
        let (status, body) = decode(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["valid"], Value::Bool(false));
        assert_eq!(body["error"], Value::Null);
    }

    #[test]
    fn translation_is_deterministic() {
        let first = serde_json::to_vec(&RestResponse::ok(REPLIES.success, Payload { valid: true }))
            .expect("serialize");
        let second = serde_json::to_vec(&RestResponse::ok(REPLIES.success, Payload { valid: true }))
            .expect("serialize");
        assert_eq!(first, second);
    }

    #[test]
    fn envelope_populates_exactly_one_side() {
        let ok = RestResponse::ok("m", Payload { valid: true });
        assert!(ok.success && ok.data.is_some() && ok.error.is_none());

        let failed: RestResponse<Payload> = RestResponse::failed("m", "E");
        assert!(!failed.success && failed.data.is_none() && failed.error.is_some());
    }

    #[test]
    fn wire_shape_keeps_null_fields() {
        let failed = serde_json::to_value(RestResponse::<Payload>::failed("m", "E"))
            .expect("serialize");
        assert!(failed.get("data").is_some_and(Value::is_null));

        let ok = serde_json::to_value(RestResponse::ok("m", Payload { valid: false }))
            .expect("serialize");
        assert!(ok.get("error").is_some_and(Value::is_null));
    }

    #[test]
    fn status_depends_only_on_kind() {
        assert_eq!(status_for(FailureKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(FailureKind::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_for(FailureKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(FailureKind::Unexpected),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
