//! Per-connection session state shared by every protocol.
//!
//! A [`session::Session`] is created when a connection is accepted and dropped when the
//! connection ends. It carries the identity of the connection and prefills the common
//! fields of every event the protocol state machine records.

/// Submodule for session data structures and utilities.
pub mod session;

pub use session::Session;
