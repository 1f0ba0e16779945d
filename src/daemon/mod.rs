//! The long-running service: HTTP API and its backing services.

pub mod http;
pub mod services;
