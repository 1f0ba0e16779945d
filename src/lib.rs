//! burnshare: self-destructing file sharing.
//!
//! A sender uploads a file and receives a public id and a secret owner
//! token. Recipients may download it a limited number of times, subject to
//! geographic, user-agent, delay and transport-security gates, after which
//! it is removed.

pub mod audit;
pub mod commands;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod reliability;
pub mod utils;

pub use error::{Error, Result};
