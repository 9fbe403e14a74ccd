use std::sync::Arc;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::Error;
use futures_core::future::LocalBoxFuture;
use log::debug;
use reqwest::Client;
use crate::proxy_service::proxy_config::ProxyConfig;
use crate::proxy_service::proxy_route_service::ProxyRouteService;

/// Builds one [`ProxyRouteService`] per worker; every worker shares the same
/// config and connection pool.
#[derive(Clone)]
pub struct ProxyRouteServiceFactory {
  config: Arc<ProxyConfig>,
  http_client: Client,
}

impl ServiceFactory<ServiceRequest> for ProxyRouteServiceFactory {
  type Response = ServiceResponse;
  type Error = Error;
  type Config = ();
  type Service = ProxyRouteService;
  type InitError = ();
  type Future = LocalBoxFuture<'static, Result<Self::Service, Self::InitError>>;

  fn new_service(&self, _: Self::Config) -> Self::Future {
    debug!("Starting proxy service for {}", self.config.upstream_url);
    let service = ProxyRouteService::new(self.http_client.clone(), self.config.clone());

    Box::pin(async move { Ok(service) })
  }
}

impl ProxyRouteServiceFactory {
  pub fn create(http_client: Client, proxy_config: Arc<ProxyConfig>) -> Self {
    Self {
      config: proxy_config,
      http_client,
    }
  }
}
