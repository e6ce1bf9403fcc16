//! Emulated network services.
//!
//! Every enabled service file becomes one [`ServiceDescriptor`] whose worker owns a
//! listener and spawns one session task per accepted connection. The protocol modules
//! only describe what a session does; binding, accepting and cancellation live in
//! [`service`].
//!
//! ```text
//!   registry ── constructor ──► ServiceDescriptor ── start ──► worker
//!                                                               │
//!                                     forward_listener ◄────────┤
//!                                                               ▼
//!                                                   session task per connection
//!                                                               │
//!                                                               ▼
//!                                                         EventEmitter
//! ```

pub mod http;
pub mod registry;
pub mod service;
pub mod simulator;
pub mod ssh;
pub mod telnet;
pub mod vnc;

pub use registry::ServiceRegistry;
pub use service::{ServiceDescriptor, WorkerContext};
pub use simulator::{CommandSimulator, LINE_ENDING};
