//! Request and response bodies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::lifecycle::FileValidation;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: &'static str,
    pub file_id: String,
    pub owner_token: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(rename = "ownerToken")]
    pub owner_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub file_info: BTreeMap<String, FileValidation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfigResponse {
    /// Upload ceiling in MiB.
    pub max_file_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
