use base64::engine::general_purpose;
use base64::Engine;
use bytes::Bytes;
use reqwest::header::{
  HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST,
  PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE, USER_AGENT,
};
use reqwest::{Client, Method, RequestBuilder};

use crate::proxy_service::inbound::{InboundRequest, CONTENT_TRANSFER_ENCODING};
use crate::proxy_service::proxy_config::{ProxyConfig, API_KEY_HEADER, API_KEY_QUERY_PARAM, UPSTREAM_PATH_PREFIX};
use crate::proxy_service::proxy_error::ProxyError;

const KEEP_ALIVE: &str = "keep-alive";

/// Headers never copied from the client to the upstream.
const STRIPPED_REQUEST_HEADERS: &[HeaderName] = &[
  HOST,
  USER_AGENT,
  AUTHORIZATION,
  CONTENT_LENGTH,
  CONNECTION,
  PROXY_AUTHENTICATE,
  PROXY_AUTHORIZATION,
  TE,
  TRAILER,
  TRANSFER_ENCODING,
  UPGRADE,
];

const STRIPPED_REQUEST_HEADER_NAMES: &[&str] = &[API_KEY_HEADER, CONTENT_TRANSFER_ENCODING, KEEP_ALIVE];

#[derive(Debug)]
pub struct OutboundRequest {
  pub method: Method,
  pub path: String,
  pub query: Vec<(String, String)>,
  pub headers: HeaderMap,
  pub body: Option<Bytes>,
}

impl OutboundRequest {
  pub fn build(config: &ProxyConfig, inbound: &InboundRequest) -> Result<Self, ProxyError> {
    Ok(OutboundRequest {
      method: inbound.method.clone(),
      path: upstream_path(&inbound.raw_path),
      query: forwarded_query(&inbound.query),
      headers: upstream_headers(config, &inbound.headers),
      body: decode_body(inbound)?,
    })
  }

  pub fn url(&self, config: &ProxyConfig) -> String {
    format!("{}{}", config.upstream_url, self.path)
  }

  pub fn into_request(self, client: &Client, config: &ProxyConfig) -> RequestBuilder {
    let mut builder = client.request(self.method.clone(), self.url(config)).headers(self.headers);

    if !self.query.is_empty() {
      builder = builder.query(&self.query);
    }

    if let Some(body) = self.body {
      builder = builder.body(body);
    }

    builder
  }
}

/// Prefixes the inbound path with `/v1/`, collapsing a single leading slash.
pub fn upstream_path(raw_path: &str) -> String {
  let relative = raw_path.strip_prefix('/').unwrap_or(raw_path);
  format!("{}{}", UPSTREAM_PATH_PREFIX, relative)
}

fn forwarded_query(query: &[(String, String)]) -> Vec<(String, String)> {
  query
    .iter()
    .filter(|(name, _)| name != API_KEY_QUERY_PARAM)
    .cloned()
    .collect()
}

fn upstream_headers(config: &ProxyConfig, inbound: &HeaderMap) -> HeaderMap {
  let mut headers = HeaderMap::with_capacity(inbound.len() + 3);

  for (name, value) in inbound {
    if STRIPPED_REQUEST_HEADERS.contains(name) || STRIPPED_REQUEST_HEADER_NAMES.contains(&name.as_str()) {
      continue;
    }
    headers.append(name.clone(), value.clone());
  }

  if headers.get(CONTENT_TYPE).map_or(true, |value| value.is_empty()) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
  }
  headers.insert(AUTHORIZATION, config.upstream_authorization.clone());
  headers.insert(CONNECTION, HeaderValue::from_static(KEEP_ALIVE));

  headers
}

fn decode_body(inbound: &InboundRequest) -> Result<Option<Bytes>, ProxyError> {
  let Some(body) = &inbound.body else {
    return Ok(None);
  };

  if !inbound.is_base64_encoded {
    return Ok(Some(body.clone()));
  }

  let trimmed = body.trim_ascii();
  general_purpose::STANDARD
    .decode(trimmed)
    .map(|decoded| Some(Bytes::from(decoded)))
    .map_err(|err| ProxyError::Internal(format!("Invalid base64 request body: {}", err)))
}
