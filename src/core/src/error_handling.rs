//! Error types shared across the agent.

pub mod types;
