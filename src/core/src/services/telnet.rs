//! Telnet service.
//!
//! A plain-text login prompt followed by a simulated shell. The state machine is in
//! [`session`], line input and option stripping in [`terminal`].

pub mod session;
pub mod terminal;

use std::sync::Arc;

use super::service::{serve, WorkerContext};
use super::simulator::CommandSimulator;
use crate::configuration::service_config::{ServiceBaseConfig, TelnetConfig};
use crate::error_handling::types::ServiceError;

pub use session::{LoginState, TelnetSession};

pub const PROTOCOL: &str = "telnet";

pub async fn run(
    base: ServiceBaseConfig,
    config: Arc<TelnetConfig>,
    ctx: WorkerContext,
) -> Result<(), ServiceError> {
    let simulator = CommandSimulator::new(config.simulator.clone());
    let emitter = ctx.emitter.clone();

    serve(&base, PROTOCOL, &ctx, move |stream, session| {
        TelnetSession::new(stream, session, config.clone(), simulator.clone(), emitter.clone()).run()
    })
    .await
}
