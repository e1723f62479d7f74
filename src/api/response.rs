//! Uniform JSON envelope shared by every endpoint.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

/// Response envelope: `status` is `true` on success, `data` carries payloads
/// on success, `errors` carries field-level validation details.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse {
    pub status: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

#[must_use]
pub fn success(message: &str, status: StatusCode, data: Option<Value>) -> Response {
    let body = ApiResponse {
        status: true,
        message: message.to_string(),
        data,
        errors: None,
    };
    (status, Json(body)).into_response()
}

#[must_use]
pub fn error(message: &str, status: StatusCode, errors: Option<Value>) -> Response {
    let body = ApiResponse {
        status: false,
        message: message.to_string(),
        data: None,
        errors,
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::json;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn success_envelope_omits_empty_fields() {
        let response = success("Login successful.", StatusCode::OK, None);
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(
            body,
            json!({"status": true, "message": "Login successful."})
        );
    }

    #[tokio::test]
    async fn success_envelope_carries_data() {
        let response = success(
            "Login successful.",
            StatusCode::OK,
            Some(json!({"token_type": "Bearer"})),
        );
        let body = body_json(response).await;
        assert_eq!(body["status"], true);
        assert_eq!(body["data"]["token_type"], "Bearer");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn error_envelope_carries_field_errors() {
        let response = error(
            "Validation failed.",
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(json!({"email": ["The email has already been taken."]})),
        );
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["status"], false);
        assert_eq!(
            body["errors"]["email"][0],
            "The email has already been taken."
        );
        assert!(body.get("data").is_none());
    }
}
