mod http_client;
mod proxy_service;
mod std_logger;

use std::io::{ErrorKind, Result};
use std::sync::Arc;
use actix_cors::Cors;
use actix_web::middleware::{Condition, Logger};
use actix_web::{App, HttpServer};
use clap::Parser;
use log::{info, LevelFilter};
use http_client::HttpClientConfig;
use proxy_service::proxy_config::{DEFAULT_MAX_BODY_SIZE, DEFAULT_UPSTREAM_URL};
use proxy_service::{ProxyConfig, ProxyRouteServiceFactory};
use std_logger::StdLogger;

/// Authenticating streaming reverse proxy for the OpenAI API.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
  #[arg(long, env = "HTTP_BIND", default_value = "0.0.0.0")]
  bind: String,

  #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
  port: u16,

  #[arg(long, env = "HTTP_WORKER_COUNT", default_value_t = 4)]
  workers: usize,

  /// Outbound HTTP or SOCKS proxy used to reach the upstream.
  #[arg(long, env = "HTTP_PROXY_URL")]
  proxy_url: Option<String>,

  #[arg(long, env = "HTTP_PROXY_USER")]
  proxy_user: Option<String>,

  #[arg(long, env = "HTTP_PROXY_PASS", hide_env_values = true)]
  proxy_pass: Option<String>,

  /// Key clients must present in `x-api-key` or `?api_key=`.
  #[arg(long, env = "REVERSE_PROXY_API_KEY", hide_env_values = true)]
  reverse_proxy_api_key: String,

  /// Key sent upstream as a bearer token.
  #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
  openai_api_key: String,

  #[arg(long, env = "UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
  upstream_url: String,

  #[arg(long, env = "HTTP_MAX_BODY_SIZE", default_value_t = DEFAULT_MAX_BODY_SIZE)]
  max_body_size: usize,

  /// Answer CORS preflights and allow any origin.
  #[arg(long, env = "HTTP_CORS")]
  cors: bool,

  #[arg(long, env = "LOG_LEVEL", default_value = "info")]
  log_level: LevelFilter,
}

#[actix_web::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  StdLogger::init(args.log_level).map_err(|err| std::io::Error::new(ErrorKind::Other, err))?;

  let proxy_config = ProxyConfig::new(&args.reverse_proxy_api_key, &args.openai_api_key, &args.upstream_url)
    .map_err(|err| std::io::Error::new(ErrorKind::InvalidInput, err))?
    .with_max_body_size(args.max_body_size);
  let proxy_config = Arc::new(proxy_config);

  let http_client = HttpClientConfig {
    http_proxy: args.proxy_url,
    user: args.proxy_user,
    pass: args.proxy_pass,
  }
  .to_client()
  .map_err(|err| std::io::Error::new(ErrorKind::Other, err))?;

  info!(
    "Proxying {}:{} to {} with {} workers.",
    &args.bind, args.port, proxy_config.upstream_url, args.workers
  );

  let proxy_factory = ProxyRouteServiceFactory::create(http_client, proxy_config);
  let cors_enabled = args.cors;

  HttpServer::new(move || {
    App::new()
      .wrap(Condition::new(cors_enabled, Cors::permissive()))
      .wrap(access_logger())
      .default_service(proxy_factory.clone())
  })
  .workers(args.workers)
  .bind((args.bind, args.port))?
  .run()
  .await
}

/// Access log line with the path only; the query string may carry `api_key`.
fn access_logger() -> Logger {
  Logger::new("%a \"%{method}xi %U\" %s %T").custom_request_replace("method", |req| req.method().to_string())
}
