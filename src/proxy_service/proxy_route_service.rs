use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use actix_web::{dev, Error, HttpRequest, HttpResponse};
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse};
use actix_web::http::header::CONTENT_LENGTH;
use bytes::{Bytes, BytesMut};
use futures_core::future::LocalBoxFuture;
use futures_util::{FutureExt, StreamExt};
use log::{debug, error, info};
use reqwest::Client;
use crate::proxy_service::inbound::{authenticate, InboundRequest};
use crate::proxy_service::outbound::OutboundRequest;
use crate::proxy_service::proxy_config::ProxyConfig;
use crate::proxy_service::proxy_error::ProxyError;
use crate::proxy_service::relay::UnsentResponse;

pub struct ProxyRouteService {
  config: Arc<ProxyConfig>,
  http_client: Client,
}

impl Service<ServiceRequest> for ProxyRouteService {
  type Response = ServiceResponse;
  type Error = Error;
  type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

  dev::always_ready!();

  fn call(&self, req: ServiceRequest) -> Self::Future {
    let (http_request, payload) = req.into_parts();
    let http_client = self.http_client.clone();
    let config = self.config.clone();

    Box::pin(async move {
      let response = AssertUnwindSafe(ProxyRouteService::exec(http_client, config, &http_request, payload))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
          let message = panic_message(panic.as_ref());
          error!("Caught an unexpected error: {}", message);
          UnsentResponse::new().reject(ProxyError::Internal(message))
        });

      Ok(ServiceResponse::new(http_request, response))
    })
  }
}

impl ProxyRouteService {
  pub fn new(http_client: Client, config: Arc<ProxyConfig>) -> Self {
    Self { config, http_client }
  }

  async fn exec(http_client: Client, config: Arc<ProxyConfig>, http: &HttpRequest, payload: Payload) -> HttpResponse {
    let response = UnsentResponse::new();
    let inbound = InboundRequest::from_http(http);
    info!("Received request {} {}", inbound.method, inbound.raw_path);

    if let Err(err) = authenticate(&config, &inbound) {
      error!("Unauthorized access: Invalid API key.");
      return response.reject(err);
    }

    let inbound = match ProxyRouteService::read_body(http, payload, config.max_body_size).await {
      Ok(body) => inbound.with_body(body),
      Err(err) => {
        error!("Reading request body failed {:?}", err);
        return response.reject(err);
      }
    };

    let outbound = match OutboundRequest::build(&config, &inbound) {
      Ok(outbound) => outbound,
      Err(err) => {
        error!("Building upstream request failed {:?}", err);
        return response.reject(err);
      }
    };

    debug!(
      "Forwarding request to OpenAI: {} {} query={:?} headers={:?}",
      outbound.method,
      outbound.url(&config),
      outbound.query,
      outbound.headers
    );

    match outbound.into_request(&http_client, &config).send().await {
      Ok(upstream) => response.commit(upstream),
      Err(err) => {
        error!("Error making request to OpenAI: {}", err);
        response.reject(ProxyError::UpstreamConnection(err))
      }
    }
  }

  async fn read_body(http: &HttpRequest, mut payload: Payload, limit: usize) -> Result<Bytes, ProxyError> {
    let declared_length = http
      .headers()
      .get(CONTENT_LENGTH)
      .and_then(|value| value.to_str().ok())
      .and_then(|value| value.parse::<usize>().ok());

    if declared_length.is_some_and(|length| length > limit) {
      return Err(ProxyError::PayloadTooLarge);
    }

    let mut body_buffer = BytesMut::with_capacity(initial_capacity(declared_length));

    while let Some(chunk) = payload.next().await {
      let bytes = chunk.map_err(|err| ProxyError::Internal(err.to_string()))?;

      if body_buffer.len() + bytes.len() > limit {
        return Err(ProxyError::PayloadTooLarge);
      }
      body_buffer.extend_from_slice(&bytes);
    }

    Ok(body_buffer.freeze())
  }
}

const MAX_INITIAL_BODY_CAPACITY: usize = 64 * 1024;

/// The declared length is only a hint; the buffer grows as bytes actually arrive.
fn initial_capacity(declared_length: Option<usize>) -> usize {
  declared_length.unwrap_or_default().min(MAX_INITIAL_BODY_CAPACITY)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    String::from(*message)
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message.clone()
  } else {
    String::from("unknown panic")
  }
}
