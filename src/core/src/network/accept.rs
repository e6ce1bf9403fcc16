//! # Accept Adapter
//!
//! Turns a listener's blocking accept loop into a channel of accepted connections so a
//! service worker can `select!` between new connections and cancellation.
//!
//! ```text
//! ┌─────────────┐   accept()   ┌──────────────┐  unbounded mpsc  ┌──────────────┐
//! │ TcpListener │─────────────▶│ accept task  │─────────────────▶│ worker loop  │
//! └─────────────┘              └──────────────┘                  └──────────────┘
//! ```
//!
//! The accept task exits silently on the first accept error (including listener closure).
//! Dropping its sender is the only termination signal: the receiver then yields `None`.
//! Workers use a separate cancellation token to tell shutdown apart from an accept failure.

use log::debug;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

/// Spawns the accept loop for `listener`.
///
/// Returns the receiving end of the delivery channel and the handle of the accept task;
/// aborting the handle drops the listener.
///
/// # Examples
///
/// ```rust,no_run
/// use ruche::network::forward_listener;
/// use tokio::net::TcpListener;
///
/// # async fn run() -> std::io::Result<()> {
/// let listener = TcpListener::bind("127.0.0.1:0").await?;
/// let (mut connections, accept_task) = forward_listener(listener);
/// while let Some(stream) = connections.recv().await {
///     drop(stream);
/// }
/// accept_task.abort();
/// # Ok(())
/// # }
/// ```
pub fn forward_listener(listener: TcpListener) -> (UnboundedReceiver<TcpStream>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {}", peer);
                    if tx.send(stream).is_err() {
                        // worker is gone
                        return;
                    }
                }
                Err(err) => {
                    debug!("accept loop stopped: {}", err);
                    return;
                }
            }
        }
    });

    (rx, handle)
}
