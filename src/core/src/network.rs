pub mod accept;
pub mod address;

pub use accept::forward_listener;
pub use address::{resolve_endpoints, Endpoint};
