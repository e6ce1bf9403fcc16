use std::sync::Arc;
use std::time::Duration;

use log::trace;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::codec::{Frame, SharedImage};

pub const FRAMES_PER_SECOND: u32 = 30;

pub fn frame_interval() -> Duration {
    Duration::from_secs(1) / FRAMES_PER_SECOND
}

/// Offers `image` to the codec once per `period` until `close` fires.
///
/// The `watch` slot holds a single frame: a tick the codec has not consumed yet is
/// replaced by the next one, never queued. Returns the number of ticks offered.
pub async fn run_feed_loop(
    image: Arc<SharedImage>,
    feed: watch::Sender<Frame>,
    close: CancellationToken,
    period: Duration,
) -> u64 {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = close.cancelled() => {
                trace!("vnc feed closed after {} ticks", ticks);
                return ticks;
            }
            _ = ticker.tick() => {
                feed.send_replace(Some(Arc::clone(&image)));
                ticks += 1;
            }
        }
    }
}
