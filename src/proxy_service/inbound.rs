use actix_web::web::Query;
use actix_web::HttpRequest;
use bytes::Bytes;
use log::warn;
use reqwest::header::HeaderMap;
use reqwest::Method;

use crate::proxy_service::proxy_config::{ProxyConfig, API_KEY_HEADER, API_KEY_QUERY_PARAM};
use crate::proxy_service::proxy_error::ProxyError;

pub const CONTENT_TRANSFER_ENCODING: &str = "content-transfer-encoding";

/// One client request as seen by the proxy, independent of the server framework.
#[derive(Debug, Clone)]
pub struct InboundRequest {
  pub method: Method,
  pub raw_path: String,
  pub query: Vec<(String, String)>,
  pub headers: HeaderMap,
  pub body: Option<Bytes>,
  pub is_base64_encoded: bool,
}

impl InboundRequest {
  pub fn new(method: Method, raw_path: &str) -> Self {
    InboundRequest {
      method,
      raw_path: String::from(raw_path),
      query: Vec::new(),
      headers: HeaderMap::new(),
      body: None,
      is_base64_encoded: false,
    }
  }

  pub fn from_http(request: &HttpRequest) -> Self {
    let query = match Query::<Vec<(String, String)>>::from_query(request.query_string()) {
      Ok(query_params) => query_params.into_inner(),
      Err(err) => {
        warn!("Unable to parse query parameters, none will be forwarded upstream: {}", err);
        Vec::new()
      }
    };

    let mut headers = HeaderMap::with_capacity(request.headers().len());
    for (name, value) in request.headers() {
      headers.append(name.clone(), value.clone());
    }

    let is_base64_encoded = headers
      .get(CONTENT_TRANSFER_ENCODING)
      .and_then(|value| value.to_str().ok())
      .is_some_and(|value| value.trim().eq_ignore_ascii_case("base64"));

    let mut inbound = InboundRequest::new(request.method().clone(), request.path());
    inbound.query = query;
    inbound.headers = headers;
    inbound.is_base64_encoded = is_base64_encoded;
    inbound
  }

  /// Empty payloads count as "no body".
  pub fn with_body(mut self, body: Bytes) -> Self {
    self.body = if body.is_empty() { None } else { Some(body) };
    self
  }

  /// Client credential from the `x-api-key` header, falling back to the `api_key` query parameter.
  pub fn credential(&self) -> Option<&str> {
    self
      .headers
      .get(API_KEY_HEADER)
      .and_then(|value| value.to_str().ok())
      .filter(|value| !value.is_empty())
      .or_else(|| {
        self
          .query
          .iter()
          .find(|(name, _)| name == API_KEY_QUERY_PARAM)
          .map(|(_, value)| value.as_str())
          .filter(|value| !value.is_empty())
      })
  }
}

pub fn authenticate(config: &ProxyConfig, request: &InboundRequest) -> Result<(), ProxyError> {
  match request.credential() {
    Some(credential) if credential == config.client_api_key.as_ref() => Ok(()),
    _ => Err(ProxyError::Unauthorized),
  }
}
