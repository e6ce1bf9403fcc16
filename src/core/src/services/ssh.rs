//! SSH service.
//!
//! Host key generation, `russh` server settings and the per-connection driver. The
//! authentication callbacks and the channel state machine live in [`handler`].

pub mod handler;
pub mod shell;
pub mod wire;

use std::io::ErrorKind;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use russh::keys::{Algorithm, PrivateKey};
use russh::{MethodKind, MethodSet, SshId};
use tokio::net::TcpStream;

use self::handler::{session_id_key, SshHandler};
use super::service::{serve, WorkerContext};
use super::simulator::CommandSimulator;
use crate::configuration::service_config::{ServiceBaseConfig, SshConfig};
use crate::error_handling::types::{ServiceError, SessionError};
use crate::event::EventEmitter;

pub const PROTOCOL: &str = "ssh";

/// Worker entry point. The host key is generated once and shared by every session.
pub async fn run(
    base: ServiceBaseConfig,
    config: Arc<SshConfig>,
    ctx: WorkerContext,
) -> Result<(), ServiceError> {
    let key = PrivateKey::random(&mut rand::rng(), Algorithm::Ed25519)
        .map_err(|e| ServiceError::KeyGeneration(e.to_string()))?;
    let server_config = Arc::new(server_config(&config, key));
    let simulator = CommandSimulator::new(config.simulator.clone());
    let emitter = ctx.emitter.clone();
    info!("{} host key generated, banner {}", base.application, config.version);

    serve(&base, PROTOCOL, &ctx, move |stream, session| {
        let handler = SshHandler::new(session, config.clone(), simulator.clone(), emitter.clone());
        handle_connection(stream, server_config.clone(), handler, emitter.clone())
    })
    .await
}

/// `russh` settings for one worker.
pub fn server_config(config: &SshConfig, key: PrivateKey) -> russh::server::Config {
    russh::server::Config {
        server_id: SshId::Standard(config.version.clone().into()),
        methods: MethodSet::from(&[MethodKind::Password, MethodKind::PublicKey][..]),
        keys: vec![key],
        max_auth_attempts: config.max_auth_tries,
        auth_rejection_time: Duration::ZERO,
        auth_rejection_time_initial: Some(Duration::ZERO),
        ..Default::default()
    }
}

async fn handle_connection(
    stream: TcpStream,
    server_config: Arc<russh::server::Config>,
    handler: SshHandler,
    emitter: EventEmitter,
) -> Result<(), SessionError> {
    let session = handler.session().clone();
    let authenticated = handler.authenticated_flag();

    let result = match russh::server::run_stream(server_config, stream, handler).await {
        Ok(running) => running.await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if is_disconnect(&e) => {
            debug!("ssh {} disconnected: {}", session.id, e);
            Ok(())
        }
        Err(e) => {
            if !authenticated.load(Ordering::SeqCst) {
                let event = session
                    .event("ssh-connect-failed")
                    .detail("error", e.to_string())
                    .detail(session_id_key("ssh-connect-failed", None), session.id_string())
                    .build();
                emitter.emit_logged(event).await;
            }
            Err(e)
        }
    }
}

fn is_disconnect(error: &SessionError) -> bool {
    let io = match error {
        SessionError::Io(e) => e,
        SessionError::Ssh(russh::Error::IO(e)) => e,
        SessionError::Ssh(russh::Error::Disconnect) => return true,
        _ => return false,
    };
    matches!(
        io.kind(),
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> SshConfig {
        SshConfig {
            version: "SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6".to_string(),
            hostname: "localhost".to_string(),
            motd: String::new(),
            accounts: Vec::new(),
            max_auth_tries: 5,
            simulator: HashMap::new(),
        }
    }

    #[test]
    fn test_server_config() {
        let key = PrivateKey::random(&mut rand::rng(), Algorithm::Ed25519).unwrap();
        let server = server_config(&config(), key);
        assert_eq!(server.max_auth_attempts, 5);
        assert_eq!(server.keys.len(), 1);
        assert!(matches!(&server.server_id, SshId::Standard(v) if v.ends_with("0.6")));
    }

    #[test]
    fn test_disconnect_classification() {
        let eof = std::io::Error::new(ErrorKind::UnexpectedEof, "eof");
        assert!(is_disconnect(&SessionError::Io(eof)));
        assert!(!is_disconnect(&SessionError::Protocol("bad".to_string())));
    }
}
