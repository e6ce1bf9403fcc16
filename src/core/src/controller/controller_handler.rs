use std::future::Future;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;

use crate::configuration::config::{discover_service_files, Config};
use crate::configuration::service_config::ServiceFile;
use crate::error_handling::types::*;
use crate::event::EventPipeline;
use crate::services::{ServiceDescriptor, ServiceRegistry, WorkerContext};

/// Top-level supervisor: owns the configuration, the protocol registry and, while
/// running, the event pipeline and every service worker.
pub struct Controller {
    pub config: Config,
    registry: ServiceRegistry,
}

impl Controller {
    /// Checks that the services directory exists.
    ///
    /// # Errors
    ///
    /// * `ControllerError::ConfigurationError` if `services_dir` is missing
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        let services_dir = config.services_dir_absolute();
        if !services_dir.is_dir() {
            error!("Services directory {} not found", services_dir.display());
            return Err(ControllerError::ConfigurationError(
                ConfigError::DirectoryDoesNotExist(services_dir.display().to_string()),
            ));
        }
        Ok(Self {
            config,
            registry: ServiceRegistry::with_builtin_protocols(),
        })
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Builds one descriptor per enabled service file. Unreadable or malformed files and
    /// unknown protocols are skipped.
    pub fn load_services(&self) -> Result<Vec<ServiceDescriptor>, ControllerError> {
        let files = discover_service_files(&self.config.services_dir_absolute())?;
        let mut descriptors = Vec::with_capacity(files.len());

        for path in files {
            let file = match ServiceFile::load(&path) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            if !file.base.enable {
                info!("{} is disabled", path.display());
                continue;
            }
            let constructor = match self.registry.resolve(&file.base.protocol) {
                Ok(constructor) => constructor,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            match constructor(file.base, &file.table) {
                Ok(descriptor) => {
                    debug!("Loaded {}", path.display());
                    descriptors.push(descriptor);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(descriptors)
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Starts the pipeline and every enabled service, then waits for `shutdown` or for a
    /// fatal worker or sink error. Either way the workers are cancelled and the event
    /// queues drained before returning.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), ControllerError>
    where
        F: Future<Output = ()>,
    {
        let (sink_fatal_tx, mut sink_fatal) = unbounded_channel();
        let pipeline = EventPipeline::from_outputs(&self.config.outputs, Some(sink_fatal_tx)).await?;
        let descriptors = self.load_services()?;
        if descriptors.is_empty() {
            warn!("No service is enabled");
        }

        let cancel = CancellationToken::new();
        let (service_fatal_tx, mut service_fatal) = unbounded_channel();
        let ctx = WorkerContext {
            cancel: cancel.clone(),
            emitter: pipeline.emitter(),
            fatal: service_fatal_tx,
        };

        let mut workers = Vec::with_capacity(descriptors.len());
        for mut descriptor in descriptors {
            match descriptor.start(ctx.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => warn!("{}", e),
            }
        }
        drop(ctx);
        info!("{} service(s) started", workers.len());

        let outcome = tokio::select! {
            _ = shutdown => {
                info!("Shutdown requested");
                Ok(())
            }
            Some(e) = service_fatal.recv() => Err(ControllerError::ServiceError(e)),
            Some(e) = sink_fatal.recv() => Err(ControllerError::SinkError(e)),
        };

        cancel.cancel();
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Service worker panicked: {}", e);
            }
        }
        pipeline.shutdown().await;
        outcome
    }
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;
    use tokio::sync::oneshot;

    fn config(root: &Path) -> Config {
        let services = root.join("services");
        fs::create_dir_all(&services).unwrap();
        Config::from_toml_str(&format!(
            "services_dir = {:?}\n[outputs.file]\nenable = true\nfile_path = {:?}\n",
            services.display().to_string(),
            root.join("events.jsonl").display().to_string()
        ))
        .unwrap()
    }

    fn service_file(root: &Path, name: &str, content: &str) {
        fs::write(root.join("services").join(name), content).unwrap();
    }

    #[test]
    fn test_missing_services_dir() {
        let config = Config::from_toml_str("services_dir = \"/nonexistent/ruche\"").unwrap();
        assert!(matches!(
            Controller::new(config),
            Err(ControllerError::ConfigurationError(ConfigError::DirectoryDoesNotExist(_)))
        ));
    }

    #[test]
    fn test_load_services_skips_bad_files() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        service_file(dir.path(), "a.toml", "protocol = \"http\"\nport = 8080\nenable = true\n");
        service_file(dir.path(), "b.toml", "protocol = \"gopher\"\nport = 70\nenable = true\n");
        service_file(dir.path(), "c.toml", "this is not toml");
        service_file(dir.path(), "d.toml", "protocol = \"http\"\nport = 8081\nenable = false\n");
        service_file(dir.path(), "e.toml", "protocol = \"vnc\"\nport = 5900\nenable = true\n");

        let controller = Controller::new(config).unwrap();
        let descriptors = controller.load_services().unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].base().port, 8080);
    }

    #[tokio::test]
    async fn test_shutdown_stops_workers() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        service_file(
            dir.path(),
            "http.toml",
            "protocol = \"http\"\nenable = true\nhost = \"127.0.0.1\"\nport = 0\n",
        );
        let mut controller = Controller::new(config).unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let run = tokio::spawn(async move {
            controller
                .run_until(async {
                    let _ = rx.await;
                })
                .await
        });
        tx.send(()).unwrap();
        assert!(run.await.unwrap().is_ok());
        assert!(dir.path().join("events.jsonl").exists());
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        service_file(
            dir.path(),
            "telnet.toml",
            &format!("protocol = \"telnet\"\nenable = true\nhost = \"127.0.0.1\"\nport = {}\n", port),
        );
        let mut controller = Controller::new(config).unwrap();
        let result = controller.run_until(std::future::pending()).await;
        assert!(matches!(
            result,
            Err(ControllerError::ServiceError(ServiceError::BindFailed { .. }))
        ));
    }
}
