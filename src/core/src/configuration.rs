pub mod config;
pub mod service_config;
pub mod types;

pub use config::Config;
pub use service_config::{ProtocolConfig, ServiceBaseConfig};
pub use types::Account;
