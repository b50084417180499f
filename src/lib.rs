//! Library crate for port-scanner exposing reusable modules.
pub mod error;
pub mod ports;
pub mod scanner;
pub mod server;
pub mod services;
pub mod types;
