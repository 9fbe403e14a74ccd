//! Authenticating pass-through to the OpenAI API.
//!
//! A request flows `inbound` (credential check) -> `outbound` (path, header
//! and body rewrite) -> `relay` (head once, then body chunks as they arrive).

pub mod inbound;
pub mod outbound;
pub mod proxy_config;
pub mod proxy_error;
pub mod proxy_factory;
pub mod proxy_route_service;
pub mod relay;

pub use proxy_config::ProxyConfig;
pub use proxy_factory::ProxyRouteServiceFactory;
