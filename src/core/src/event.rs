//! Event subsystem
//!
//! Sessions describe what an attacker did as [`Event`]s and hand them to an
//! [`EventEmitter`]; the [`EventPipeline`] fans each serialized event out to every enabled
//! sink through a bounded queue with one consumer per sink.
//!
//! Components:
//! - `types`: the immutable `Event` record and its ordered details.
//! - `sink`: the `EventSink` trait implemented by every destination.
//! - `file_sink`: append-only JSON lines file.
//! - `kafka_sink`: message-queue publisher.
//! - `memory_sink`: in-process capture of emitted lines.
//! - `pipeline`: queues, consumer loops and ordered shutdown.

pub mod file_sink;
pub mod kafka_sink;
pub mod memory_sink;
pub mod pipeline;
pub mod sink;
pub mod types;

pub use memory_sink::MemorySink;
pub use pipeline::{EventEmitter, EventPipeline, EVENT_QUEUE_CAPACITY};
pub use sink::{EventSink, FailurePolicy};
pub use types::{DetailValue, Details, Event, EventBuilder};
