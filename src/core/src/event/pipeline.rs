//! Event Pipeline
//!
//! Fans serialized events out to every enabled sink.
//!
//! ```text
//!                       ┌──────────────┐     ┌───────────────┐
//!   session ─┐          │ bounded mpsc │ ──► │ consumer loop │ ──► FileSink
//!   session ─┼─ emit ─► ├──────────────┤     ├───────────────┤
//!   session ─┘          │ bounded mpsc │ ──► │ consumer loop │ ──► KafkaSink
//!                       └──────────────┘     └───────────────┘
//! ```
//!
//! Each event is encoded once and the same line is queued for every sink. A full queue
//! suspends the producing session until the consumer catches up; nothing is dropped.
//! On shutdown every queue is closed, the consumers drain what was already accepted and
//! then release their sink.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::file_sink::FileSink;
use super::kafka_sink::{self, KafkaSink};
use super::sink::{EventSink, FailurePolicy};
use super::types::Event;
use crate::configuration::config::{absolute_path, OutputsConfig};
use crate::error_handling::types::{EventError, SinkError};

/// Per-sink queue capacity.
pub const EVENT_QUEUE_CAPACITY: usize = 1000;

struct SinkQueue {
    name: &'static str,
    sender: Sender<Arc<str>>,
}

/// Cheap handle sessions use to submit events.
#[derive(Clone)]
pub struct EventEmitter {
    queues: Arc<Vec<SinkQueue>>,
}

impl EventEmitter {
    /// Emitter with no sink attached; every emission succeeds without effect.
    pub fn disabled() -> Self {
        Self {
            queues: Arc::new(Vec::new()),
        }
    }

    pub fn sink_count(&self) -> usize {
        self.queues.len()
    }

    /// Encodes `event` once and queues it on every sink.
    ///
    /// Suspends while a sink's queue is full.
    ///
    /// # Errors
    ///
    /// * `EventError::Serialization` if the event cannot be encoded; nothing is queued
    /// * `EventError::PipelineClosed` if a sink's queue was closed by shutdown
    pub async fn emit(&self, event: &Event) -> Result<(), EventError> {
        if self.queues.is_empty() {
            return Ok(());
        }
        let line: Arc<str> = Arc::from(event.to_json()?);
        let mut closed = false;
        for queue in self.queues.iter() {
            if queue.sender.send(line.clone()).await.is_err() {
                debug!("{} queue closed, dropping {}", queue.name, event.event_type());
                closed = true;
            }
        }
        if closed {
            return Err(EventError::PipelineClosed);
        }
        Ok(())
    }

    /// Emits and logs failures. Sessions use this since an event error never ends them.
    pub async fn emit_logged(&self, event: Event) {
        if let Err(e) = self.emit(&event).await {
            error!("Failed to emit {} event: {}", event.event_type(), e);
        }
    }
}

/// Owns the consumer tasks. Built once by the controller, handed to workers through
/// [`EventEmitter`] clones.
pub struct EventPipeline {
    emitter: EventEmitter,
    shutdown: CancellationToken,
    consumers: Vec<JoinHandle<()>>,
}

impl EventPipeline {
    /// Starts one consumer per sink.
    ///
    /// - `fatal` - receives the error of a sink whose policy is [`FailurePolicy::Escalate`]
    pub fn new(sinks: Vec<Box<dyn EventSink>>, fatal: Option<UnboundedSender<SinkError>>) -> Self {
        Self::with_capacity(sinks, EVENT_QUEUE_CAPACITY, fatal)
    }

    pub fn with_capacity(
        sinks: Vec<Box<dyn EventSink>>,
        capacity: usize,
        fatal: Option<UnboundedSender<SinkError>>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let mut queues = Vec::with_capacity(sinks.len());
        let mut consumers = Vec::with_capacity(sinks.len());

        for sink in sinks {
            let (sender, receiver) = mpsc::channel(capacity.max(1));
            queues.push(SinkQueue {
                name: sink.name(),
                sender,
            });
            consumers.push(tokio::spawn(consume(
                sink,
                receiver,
                shutdown.clone(),
                fatal.clone(),
            )));
        }

        Self {
            emitter: EventEmitter {
                queues: Arc::new(queues),
            },
            shutdown,
            consumers,
        }
    }

    /// Opens the sinks enabled in `outputs`.
    ///
    /// # Errors
    ///
    /// Fails if the event file cannot be opened or the broker cannot be reached.
    pub async fn from_outputs(
        outputs: &OutputsConfig,
        fatal: Option<UnboundedSender<SinkError>>,
    ) -> Result<Self, SinkError> {
        let mut sinks: Vec<Box<dyn EventSink>> = Vec::new();

        if outputs.file.enable {
            let sink = FileSink::open(absolute_path(&outputs.file.file_path)).await?;
            sinks.push(Box::new(sink));
        }

        if outputs.kafka.enable {
            match kafka_sink::validate(&outputs.kafka) {
                Ok(()) => sinks.push(Box::new(KafkaSink::connect(&outputs.kafka).await?)),
                Err(e) => error!("Kafka output disabled: {}", e),
            }
        }

        if sinks.is_empty() {
            warn!("No event output is enabled, events will be discarded");
        }

        Ok(Self::new(sinks, fatal))
    }

    pub fn emitter(&self) -> EventEmitter {
        self.emitter.clone()
    }

    /// Closes every queue and waits for the consumers to drain them.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for consumer in self.consumers {
            if let Err(e) = consumer.await {
                error!("Event consumer task failed: {}", e);
            }
        }
        info!("Event pipeline stopped");
    }
}

async fn consume(
    mut sink: Box<dyn EventSink>,
    mut receiver: Receiver<Arc<str>>,
    shutdown: CancellationToken,
    fatal: Option<UnboundedSender<SinkError>>,
) {
    let mut draining = false;
    loop {
        let next = if draining {
            receiver.recv().await
        } else {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    receiver.close();
                    draining = true;
                    continue;
                }
                line = receiver.recv() => line,
            }
        };
        let Some(line) = next else {
            break;
        };

        if let Err(e) = sink.write(&line).await {
            match sink.failure_policy() {
                FailurePolicy::LogAndContinue => {
                    error!("{} sink failed to write event: {}", sink.name(), e);
                }
                FailurePolicy::Escalate => {
                    error!("{} sink failed, stopping: {}", sink.name(), e);
                    receiver.close();
                    if let Some(fatal) = &fatal {
                        let _ = fatal.send(e);
                    }
                    return;
                }
            }
        }
    }

    if let Err(e) = sink.close().await {
        error!("Failed to close {} sink: {}", sink.name(), e);
    }
    debug!("{} consumer stopped", sink.name());
}
