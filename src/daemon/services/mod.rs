//! Collaborators behind the lifecycle manager.

pub mod blob;
pub mod db;
pub mod geo;
pub mod notify;
