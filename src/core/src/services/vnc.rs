//! VNC service.
//!
//! Every connection sees the same still image, decoded once per worker. A session
//! pairs an RFB codec task with a feed loop that re-offers the image at 30 frames per
//! second; client input is drained and discarded.

pub mod codec;
pub mod feed;

use std::sync::Arc;
use std::time::Duration;

use log::{info, trace};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use self::codec::{FramebufferCodec, RfbCodec, SharedImage};
use self::feed::{frame_interval, run_feed_loop};
use super::service::{serve, WorkerContext};
use crate::configuration::config::absolute_path;
use crate::configuration::service_config::{ServiceBaseConfig, VncConfig};
use crate::error_handling::types::{ServiceError, SessionError};
use crate::event::EventEmitter;
use crate::session_management::Session;

pub const PROTOCOL: &str = "vnc";
const CLIENT_EVENT_QUEUE: usize = 64;

/// Worker entry point.
///
/// # Errors
///
/// * `ServiceError::ImageLoad` if the configured image cannot be decoded
/// * `ServiceError::BindFailed` if the address cannot be bound
pub async fn run(
    base: ServiceBaseConfig,
    config: Arc<VncConfig>,
    ctx: WorkerContext,
) -> Result<(), ServiceError> {
    let path = absolute_path(&config.img_path);
    let image = Arc::new(SharedImage::load(&path)?);
    info!(
        "{} serves {} ({}x{})",
        base.application,
        path.display(),
        image.width(),
        image.height()
    );
    let emitter = ctx.emitter.clone();

    serve(&base, PROTOCOL, &ctx, move |stream, session| {
        handle_connection(
            stream,
            session,
            config.clone(),
            image.clone(),
            emitter.clone(),
            frame_interval(),
        )
    })
    .await
}

/// Runs one VNC session until the client goes away.
pub async fn handle_connection<S>(
    stream: S,
    session: Session,
    config: Arc<VncConfig>,
    image: Arc<SharedImage>,
    emitter: EventEmitter,
    period: Duration,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    emitter.emit_logged(session.app_event("vnc-connect").build()).await;

    let (feed_tx, feed_rx) = watch::channel(None);
    let (events_tx, mut events) = mpsc::channel(CLIENT_EVENT_QUEUE);
    let codec: Box<dyn FramebufferCodec> = Box::new(RfbCodec::new(
        stream,
        config.version.clone(),
        image.width(),
        image.height(),
    ));
    let codec_task = tokio::spawn(codec.serve(feed_rx, events_tx));

    let close = CancellationToken::new();
    let feed_task = tokio::spawn(run_feed_loop(image, feed_tx, close.clone(), period));

    while let Some(event) = events.recv().await {
        trace!("vnc {}: {:?}", session.id, event);
    }
    close.cancel();

    let ticks = feed_task.await.unwrap_or_default();
    trace!("vnc {}: {} frames offered", session.id, ticks);
    match codec_task.await {
        Ok(result) => result,
        Err(e) => Err(SessionError::Protocol(format!("vnc codec task failed: {}", e))),
    }
}
