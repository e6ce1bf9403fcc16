//! Process supervisor.
//!
//! The [`Controller`] wires configuration, the event pipeline and the service workers
//! together and owns their shutdown order: stop accepting, then drain the event queues.

pub mod controller_handler;

pub use controller_handler::Controller;
