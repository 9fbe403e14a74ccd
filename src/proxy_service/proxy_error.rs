use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// Failures that can still be reported with a regular, fully buffered response.
#[derive(Debug, Error)]
pub enum ProxyError {
  #[error("Unauthorized: Invalid API Key")]
  Unauthorized,
  #[error("Failed to connect to OpenAI")]
  UpstreamConnection(#[source] reqwest::Error),
  #[error("Payload Too Large")]
  PayloadTooLarge,
  #[error("Internal Server Error")]
  Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
  error: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  details: Option<String>,
}

impl ProxyError {
  fn details(&self) -> Option<String> {
    match self {
      ProxyError::Unauthorized | ProxyError::PayloadTooLarge => None,
      ProxyError::UpstreamConnection(err) => Some(err.to_string()),
      ProxyError::Internal(message) => Some(message.clone()),
    }
  }
}

impl ResponseError for ProxyError {
  fn status_code(&self) -> StatusCode {
    match self {
      ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
      ProxyError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
      ProxyError::UpstreamConnection(_) | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let message = self.to_string();
    let body = json_error(&message, self.details());

    HttpResponse::build(self.status_code())
      .content_type(ContentType::json())
      .body(body)
  }
}

/// Serializes `{"error": ..., "details": ...}`, leaving `details` out when absent.
pub fn json_error(error: &str, details: Option<String>) -> Bytes {
  let body = ErrorBody { error, details };

  match serde_json::to_vec(&body) {
    Ok(bytes) => Bytes::from(bytes),
    Err(_) => Bytes::from_static(br#"{"error":"Internal Server Error"}"#),
  }
}
