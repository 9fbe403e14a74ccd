use std::convert::Infallible;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use actix_web::{HttpResponse, ResponseError};
use bytes::Bytes;
use futures_core::stream::LocalBoxStream;
use futures_core::{ready, Stream};
use futures_util::StreamExt;
use log::{debug, error, info};
use reqwest::header::{
  HeaderName, CONNECTION, CONTENT_LENGTH, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING,
  UPGRADE,
};
use reqwest::Response;

use crate::proxy_service::proxy_error::{json_error, ProxyError};

/// Framing headers owned by each hop; the relayed body is re-framed as a stream.
const STRIPPED_RESPONSE_HEADERS: &[HeaderName] = &[
  CONNECTION,
  CONTENT_LENGTH,
  PROXY_AUTHENTICATE,
  PROXY_AUTHORIZATION,
  TE,
  TRAILER,
  TRANSFER_ENCODING,
  UPGRADE,
];

const STREAM_ERROR: &str = "Error streaming from OpenAI";

/// A response that has not been sent yet.
///
/// Consuming it either produces one buffered error response or commits the
/// upstream head and streams the body; once committed, failures can only be
/// reported inside the body.
pub struct UnsentResponse(());

impl UnsentResponse {
  pub fn new() -> Self {
    UnsentResponse(())
  }

  pub fn reject(self, error: ProxyError) -> HttpResponse {
    error.error_response()
  }

  pub fn commit(self, upstream: Response) -> HttpResponse {
    info!("OpenAI response status: {}", upstream.status());
    debug!("OpenAI response headers: {:?}", upstream.headers());

    let mut response = HttpResponse::build(upstream.status());
    for (name, value) in upstream.headers() {
      if is_stripped_response_header(name) {
        continue;
      }
      response.append_header((name.clone(), value.clone()));
    }

    response.streaming(RelayStream::new(upstream.bytes_stream().boxed_local()))
  }
}

impl Default for UnsentResponse {
  fn default() -> Self {
    Self::new()
  }
}

fn is_stripped_response_header(name: &HeaderName) -> bool {
  STRIPPED_RESPONSE_HEADERS.contains(name) || name.as_str() == "keep-alive"
}

/// Forwards upstream chunks in arrival order. An upstream error ends the stream
/// after one JSON error fragment.
pub struct RelayStream<E> {
  upstream: Option<LocalBoxStream<'static, Result<Bytes, E>>>,
}

impl<E> RelayStream<E> {
  pub fn new(upstream: LocalBoxStream<'static, Result<Bytes, E>>) -> Self {
    RelayStream {
      upstream: Some(upstream),
    }
  }
}

impl<E: Display> Stream for RelayStream<E> {
  type Item = Result<Bytes, Infallible>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let Some(upstream) = self.upstream.as_mut() else {
      return Poll::Ready(None);
    };

    match ready!(upstream.poll_next_unpin(cx)) {
      Some(Ok(chunk)) => Poll::Ready(Some(Ok(chunk))),
      Some(Err(err)) => {
        error!("Error from OpenAI response stream: {}", err);
        self.upstream = None;
        Poll::Ready(Some(Ok(json_error(STREAM_ERROR, Some(err.to_string())))))
      }
      None => {
        info!("OpenAI response stream ended.");
        self.upstream = None;
        Poll::Ready(None)
      }
    }
  }
}
