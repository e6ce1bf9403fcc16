//! Event Sink Trait
//!
//! This module defines the `EventSink` trait, the interface every event destination
//! implements.
//!
//! A sink receives already-serialized events, one line at a time and in submission order,
//! from the single consumer loop the pipeline runs for it.

use crate::error_handling::types::SinkError;
use async_trait::async_trait;

/// What the consumer loop does when a sink fails to persist an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the error and keep consuming.
    LogAndContinue,
    /// Report the error to the supervisor and stop consuming.
    Escalate,
}

#[async_trait]
pub trait EventSink: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::LogAndContinue
    }

    /// Persists or publishes one serialized event.
    ///
    /// - `line` - canonical JSON encoding of the event, without trailing newline.
    async fn write(&mut self, line: &str) -> Result<(), SinkError>;

    /// Releases the backing resource once the queue has been drained.
    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
