use std::future::Future;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{http, ssh, telnet, vnc};
use crate::configuration::service_config::{ProtocolConfig, ServiceBaseConfig};
use crate::error_handling::types::{ServiceError, SessionError};
use crate::event::EventEmitter;
use crate::network::{forward_listener, resolve_endpoints};
use crate::session_management::Session;

/// Everything a worker receives from the controller.
#[derive(Clone)]
pub struct WorkerContext {
    /// Process-wide shutdown signal.
    pub cancel: CancellationToken,
    pub emitter: EventEmitter,
    /// Unrecoverable worker errors, such as a failed bind, are reported here.
    pub fatal: UnboundedSender<ServiceError>,
}

/// One configured protocol instance.
#[derive(Debug)]
pub struct ServiceDescriptor {
    base: ServiceBaseConfig,
    protocol: ProtocolConfig,
    running: bool,
}

impl ServiceDescriptor {
    pub fn new(base: ServiceBaseConfig, protocol: ProtocolConfig) -> Self {
        Self {
            base,
            protocol,
            running: false,
        }
    }

    pub fn base(&self) -> &ServiceBaseConfig {
        &self.base
    }

    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Spawns the worker. A descriptor can only be started once.
    ///
    /// # Errors
    ///
    /// * `ServiceError::AlreadyRunning` if the worker was already started; nothing is spawned
    pub fn start(&mut self, ctx: WorkerContext) -> Result<JoinHandle<()>, ServiceError> {
        if self.running {
            return Err(ServiceError::AlreadyRunning(self.name()));
        }
        self.running = true;

        let base = self.base.clone();
        let protocol = self.protocol.clone();
        let name = self.name();
        info!("Starting {}", name);

        Ok(tokio::spawn(async move {
            let fatal = ctx.fatal.clone();
            let result = match protocol {
                ProtocolConfig::Ssh(config) => ssh::run(base, config, ctx).await,
                ProtocolConfig::Telnet(config) => telnet::run(base, config, ctx).await,
                ProtocolConfig::Http(config) => http::run(base, config, ctx).await,
                ProtocolConfig::Vnc(config) => vnc::run(base, config, ctx).await,
            };
            match result {
                Ok(()) => info!("{} stopped", name),
                Err(e) => {
                    error!("{} failed: {}", name, e);
                    let _ = fatal.send(e);
                }
            }
        }))
    }

    fn name(&self) -> String {
        format!(
            "{} service {} on {}",
            self.protocol.protocol_name(),
            self.base.application,
            self.base.bind_address()
        )
    }
}

/// Binds the service address and hands every accepted connection to `handler` on its own
/// task, until `ctx.cancel` fires.
///
/// Cancellation only stops accepting; sessions already spawned run to completion.
///
/// # Errors
///
/// * `ServiceError::BindFailed` if the address cannot be bound
pub async fn serve<H, Fut>(
    base: &ServiceBaseConfig,
    protocol: &'static str,
    ctx: &WorkerContext,
    handler: H,
) -> Result<(), ServiceError>
where
    H: Fn(TcpStream, Session) -> Fut,
    Fut: Future<Output = Result<(), SessionError>> + Send + 'static,
{
    let address = base.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ServiceError::BindFailed {
            address: address.clone(),
            source,
        })?;
    info!("{} listening on {}", protocol, address);

    let (mut connections, acceptor) = forward_listener(listener);
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                info!("{} on {} stops accepting connections", protocol, address);
                break;
            }
            next = connections.recv() => {
                let Some(stream) = next else {
                    warn!("{} on {}: accept loop ended", protocol, address);
                    break;
                };
                let (source, destination) = resolve_endpoints(&stream);
                let session = Session::new(protocol, base.application.clone(), source, destination);
                let id = session.id;
                debug!(
                    "{} connection {} from {}:{}",
                    protocol, id, session.source.ip, session.source.port
                );
                let task = handler(stream, session);
                tokio::spawn(async move {
                    match task.await {
                        Ok(()) => debug!("{} session {} closed", protocol, id),
                        Err(e) => info!("{} session {} ended: {}", protocol, id, e),
                    }
                });
            }
        }
    }
    acceptor.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::service_config::TelnetConfig;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    fn base(port: u16) -> ServiceBaseConfig {
        ServiceBaseConfig {
            protocol: "telnet".to_string(),
            application: "test".to_string(),
            enable: true,
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    fn context() -> (WorkerContext, mpsc::UnboundedReceiver<ServiceError>) {
        let (fatal, fatal_rx) = mpsc::unbounded_channel();
        (
            WorkerContext {
                cancel: CancellationToken::new(),
                emitter: EventEmitter::disabled(),
                fatal,
            },
            fatal_rx,
        )
    }

    fn telnet_descriptor(port: u16) -> ServiceDescriptor {
        ServiceDescriptor::new(
            base(port),
            ProtocolConfig::Telnet(Arc::new(TelnetConfig {
                prompt: "$ ".to_string(),
                motd: String::new(),
                accounts: Vec::new(),
                max_auth_tries: 4,
                simulator: HashMap::new(),
            })),
        )
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (ctx, _fatal) = context();
        let mut descriptor = telnet_descriptor(0);
        let handle = descriptor.start(ctx.clone()).unwrap();
        assert!(descriptor.is_running());
        assert!(matches!(
            descriptor.start(ctx.clone()),
            Err(ServiceError::AlreadyRunning(_))
        ));
        ctx.cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let (ctx, mut fatal) = context();
        let mut descriptor = telnet_descriptor(port);
        descriptor.start(ctx).unwrap().await.unwrap();
        assert!(matches!(
            fatal.recv().await,
            Some(ServiceError::BindFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_serve_dispatches_and_stops_on_cancel() {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let (ctx, _fatal) = context();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let worker_ctx = ctx.clone();
        let worker = tokio::spawn(async move {
            serve(&base(port), "telnet", &worker_ctx, move |_stream, session| {
                let seen = seen_tx.clone();
                async move {
                    let _ = seen.send(session.destination.port);
                    Ok(())
                }
            })
            .await
        });

        let mut client = None;
        for _ in 0..50 {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(stream) => {
                    client = Some(stream);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        let mut client = client.expect("service never listened");
        client.write_all(b"x").await.unwrap();
        assert_eq!(seen_rx.recv().await, Some(port));

        ctx.cancel.cancel();
        assert!(worker.await.unwrap().is_ok());
    }
}
