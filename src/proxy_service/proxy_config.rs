use reqwest::header::{HeaderValue, InvalidHeaderValue};
use reqwest::Url;
use std::fmt::{Debug, Formatter};
use thiserror::Error;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openai.com";
pub const UPSTREAM_PATH_PREFIX: &str = "/v1/";
pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY_PARAM: &str = "api_key";
pub const DEFAULT_MAX_BODY_SIZE: usize = 6 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("{0} must not be empty")]
  EmptySecret(&'static str),
  #[error("upstream API key is not a valid header value: {0}")]
  InvalidUpstreamKey(#[from] InvalidHeaderValue),
  #[error("invalid upstream url '{url}': {reason}")]
  InvalidUpstreamUrl { url: String, reason: String },
}

/// Immutable proxy settings, built once at startup and shared by every worker.
pub struct ProxyConfig {
  pub client_api_key: Box<str>,
  pub upstream_authorization: HeaderValue,
  pub upstream_url: Box<str>,
  pub max_body_size: usize,
}

impl ProxyConfig {
  pub fn new(client_api_key: &str, upstream_api_key: &str, upstream_url: &str) -> Result<Self, ConfigError> {
    if client_api_key.is_empty() {
      return Err(ConfigError::EmptySecret("REVERSE_PROXY_API_KEY"));
    }

    if upstream_api_key.is_empty() {
      return Err(ConfigError::EmptySecret("OPENAI_API_KEY"));
    }

    let mut upstream_authorization = HeaderValue::from_str(&format!("Bearer {}", upstream_api_key))?;
    upstream_authorization.set_sensitive(true);

    let parsed = Url::parse(upstream_url).map_err(|err| ConfigError::InvalidUpstreamUrl {
      url: upstream_url.to_string(),
      reason: err.to_string(),
    })?;

    if parsed.query().is_some() || parsed.fragment().is_some() {
      return Err(ConfigError::InvalidUpstreamUrl {
        url: upstream_url.to_string(),
        reason: String::from("query strings and fragments are not allowed"),
      });
    }

    if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
      return Err(ConfigError::InvalidUpstreamUrl {
        url: upstream_url.to_string(),
        reason: String::from("expected an http(s) base url"),
      });
    }

    Ok(ProxyConfig {
      client_api_key: Box::from(client_api_key),
      upstream_authorization,
      upstream_url: Box::from(upstream_url.trim_end_matches('/')),
      max_body_size: DEFAULT_MAX_BODY_SIZE,
    })
  }

  pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
    self.max_body_size = max_body_size;
    self
  }
}

impl Debug for ProxyConfig {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProxyConfig")
      .field("client_api_key", &"<redacted>")
      .field("upstream_authorization", &"<redacted>")
      .field("upstream_url", &self.upstream_url)
      .field("max_body_size", &self.max_body_size)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builds_bearer_header_and_trims_base_url() {
    let config = ProxyConfig::new("client-secret", "sk-upstream", "https://api.openai.com/").unwrap();

    assert_eq!(config.upstream_authorization.to_str().unwrap(), "Bearer sk-upstream");
    assert!(config.upstream_authorization.is_sensitive());
    assert_eq!(config.upstream_url.as_ref(), "https://api.openai.com");
    assert_eq!(config.max_body_size, DEFAULT_MAX_BODY_SIZE);
  }

  #[test]
  fn rejects_empty_secrets() {
    assert!(matches!(
      ProxyConfig::new("", "sk-upstream", DEFAULT_UPSTREAM_URL),
      Err(ConfigError::EmptySecret("REVERSE_PROXY_API_KEY"))
    ));
    assert!(matches!(
      ProxyConfig::new("client-secret", "", DEFAULT_UPSTREAM_URL),
      Err(ConfigError::EmptySecret("OPENAI_API_KEY"))
    ));
  }

  #[test]
  fn rejects_unusable_upstream_values() {
    assert!(matches!(
      ProxyConfig::new("client-secret", "sk-bad\nkey", DEFAULT_UPSTREAM_URL),
      Err(ConfigError::InvalidUpstreamKey(_))
    ));
    assert!(matches!(
      ProxyConfig::new("client-secret", "sk-upstream", "not a url"),
      Err(ConfigError::InvalidUpstreamUrl { .. })
    ));
    assert!(matches!(
      ProxyConfig::new("client-secret", "sk-upstream", "ftp://files.example.com"),
      Err(ConfigError::InvalidUpstreamUrl { .. })
    ));
  }

  #[test]
  fn rejects_upstream_url_with_query_or_fragment() {
    assert!(matches!(
      ProxyConfig::new("client-secret", "sk-upstream", "https://api.openai.com?x=1"),
      Err(ConfigError::InvalidUpstreamUrl { .. })
    ));
    assert!(matches!(
      ProxyConfig::new("client-secret", "sk-upstream", "https://api.openai.com/#top"),
      Err(ConfigError::InvalidUpstreamUrl { .. })
    ));
  }

  #[test]
  fn debug_output_hides_secrets() {
    let config = ProxyConfig::new("client-secret", "sk-upstream", DEFAULT_UPSTREAM_URL).unwrap();
    let printed = format!("{:?}", config);

    assert!(!printed.contains("client-secret"));
    assert!(!printed.contains("sk-upstream"));
    assert!(printed.contains("api.openai.com"));
  }
}
