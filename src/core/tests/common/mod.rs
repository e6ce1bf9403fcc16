#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use ruche::configuration::service_config::ServiceFile;
use ruche::event::{EventPipeline, MemorySink};
use ruche::services::{ServiceRegistry, WorkerContext};
use tokio::net::TcpStream;
use tokio::sync::mpsc::unbounded_channel;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One running service worker on a loopback port, recording into a [`MemorySink`].
pub struct Harness {
    pub port: u16,
    pub sink: MemorySink,
    cancel: CancellationToken,
    pipeline: EventPipeline,
    worker: JoinHandle<()>,
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Starts the service described by `service` (protocol keys only; the address is added).
pub fn start_service(service: &str) -> Harness {
    let port = free_port();
    let content = format!(
        "enable = true\nhost = \"127.0.0.1\"\nport = {}\n{}",
        port, service
    );
    let file = ServiceFile::parse(Path::new("service.toml"), &content).unwrap();
    let registry = ServiceRegistry::with_builtin_protocols();
    let constructor = registry.resolve(&file.base.protocol).unwrap();
    let mut descriptor = constructor(file.base, &file.table).unwrap();

    let sink = MemorySink::new();
    let pipeline = EventPipeline::new(vec![Box::new(sink.clone())], None);
    let cancel = CancellationToken::new();
    let (fatal, _) = unbounded_channel();
    let worker = descriptor
        .start(WorkerContext {
            cancel: cancel.clone(),
            emitter: pipeline.emitter(),
            fatal,
        })
        .unwrap();

    Harness {
        port,
        sink,
        cancel,
        pipeline,
        worker,
    }
}

impl Harness {
    /// Connects once the worker is listening.
    pub async fn connect(&self) -> TcpStream {
        for _ in 0..100 {
            if let Ok(stream) = TcpStream::connect(("127.0.0.1", self.port)).await {
                return stream;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("service on port {} never started listening", self.port);
    }

    /// Stops the worker and drains the event queue.
    pub async fn stop(self) -> MemorySink {
        self.cancel.cancel();
        self.worker.await.unwrap();
        // let session tasks finish their last emit
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.pipeline.shutdown().await;
        self.sink
    }
}
