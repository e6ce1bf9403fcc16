//! HTTP service.
//!
//! One request per connection: parse it, record an `http-access` event, answer from the
//! simulator table, the asset directory or with a 404, then close.

pub mod request;
pub mod response;

use std::sync::Arc;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use self::request::read_request;
use self::response::{resolve, write_response};
use super::service::{serve, WorkerContext};
use crate::configuration::service_config::{HttpConfig, ServiceBaseConfig};
use crate::error_handling::types::{ServiceError, SessionError};
use crate::event::EventEmitter;
use crate::session_management::Session;

pub const PROTOCOL: &str = "http";

pub async fn run(
    base: ServiceBaseConfig,
    config: Arc<HttpConfig>,
    ctx: WorkerContext,
) -> Result<(), ServiceError> {
    debug!(
        "{}: {} simulated URI(s), assets in {}",
        base.application,
        config.request_simulator.len(),
        config.assets_dir.display()
    );
    let emitter = ctx.emitter.clone();
    serve(&base, PROTOCOL, &ctx, move |stream, session| {
        handle_connection(stream, session, config.clone(), emitter.clone())
    })
    .await
}

/// Serves exactly one request on `stream`.
pub async fn handle_connection<S>(
    mut stream: S,
    session: Session,
    config: Arc<HttpConfig>,
    emitter: EventEmitter,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            warn!("http {}: {}", session.id, e);
            return Ok(());
        }
    };

    let event = session
        .app_event("http-access")
        .detail("http.method", request.method.as_str())
        .detail("http.host", request.host.as_str())
        .detail("http.url", request.target.as_str())
        .detail("http.request_headers", request.headers_detail())
        .detail("http.request_body", request.body.clone())
        .build();
    emitter.emit_logged(event).await;

    let response = resolve(&request, &config).await;
    debug!(
        "http {} {} {} -> {}",
        session.id, request.method, request.target, response.status
    );
    write_response(&mut stream, &response, request.version).await?;
    stream.shutdown().await?;
    Ok(())
}
