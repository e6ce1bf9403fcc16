pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod event;
pub mod network;
pub mod services;
pub mod session_management;
