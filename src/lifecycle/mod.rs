//! File lifecycle: creation, gated download, receipt confirmation, owner
//! deletion and expiry.
//!
//! ```text
//! Creating --commit--> Active --last download--> PendingConfirmation --confirm--> (gone)
//!     |                  |                               |
//!     +--rollback--------+--owner delete / expiry--------+-----------------------> (gone)
//! ```

mod manager;
mod sweep;
#[cfg(test)]
mod testing;

pub use manager::LifecycleManager;
pub use sweep::ExpirySweeper;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DOWNLOAD_COUNT, DEFAULT_EXPIRY_DAYS, MAX_DELAY_MINUTES, MAX_DOWNLOAD_COUNT,
    MAX_EXPIRY_DAYS, MAX_FILENAME_FIELD_LEN, MIN_DOWNLOAD_COUNT, MIN_EXPIRY_DAYS,
};
use crate::error::{Error, Result};
use crate::policy::DenyReason;
use crate::policy::sanitize::{is_valid_email, is_valid_token_input};

/// An upload as received from the sender.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub data: Vec<u8>,
    pub filename: String,
    pub media_type: String,
    pub email: Option<String>,
    pub expiry_days: u32,
    pub count: u32,
    pub delay_minutes: u32,
    pub only_eea: bool,
    pub include_other_european: bool,
}

impl Default for UploadRequest {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            filename: String::new(),
            media_type: String::new(),
            email: None,
            expiry_days: DEFAULT_EXPIRY_DAYS,
            count: DEFAULT_DOWNLOAD_COUNT,
            delay_minutes: 0,
            only_eea: false,
            include_other_european: false,
        }
    }
}

impl UploadRequest {
    /// Check bounds on the sender-controlled fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_EXPIRY_DAYS..=MAX_EXPIRY_DAYS).contains(&self.expiry_days) {
            return Err(Error::validation(format!(
                "expiry must be between {MIN_EXPIRY_DAYS} and {MAX_EXPIRY_DAYS} days"
            )));
        }
        if !(MIN_DOWNLOAD_COUNT..=MAX_DOWNLOAD_COUNT).contains(&self.count) {
            return Err(Error::validation(format!(
                "count must be between {MIN_DOWNLOAD_COUNT} and {MAX_DOWNLOAD_COUNT}"
            )));
        }
        if self.delay_minutes > MAX_DELAY_MINUTES {
            return Err(Error::validation(format!(
                "delay must be between 0 and {MAX_DELAY_MINUTES} minutes"
            )));
        }
        if self.filename.len() > MAX_FILENAME_FIELD_LEN {
            return Err(Error::validation("filename too long"));
        }
        if let Some(email) = self.email.as_deref()
            && !is_valid_email(email)
        {
            return Err(Error::validation("invalid email address"));
        }
        Ok(())
    }
}

/// Credentials returned once on a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub file_id: String,
    pub owner_token: String,
}

/// File content handed back to a permitted recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedFile {
    pub data: Vec<u8>,
    pub filename: String,
    pub media_type: String,
}

/// Result of a download attempt on a known file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Served(ServedFile),
    Denied(DenyReason),
    /// The download count is exhausted.
    Expired,
}

impl DownloadOutcome {
    /// Label for the downloads counter.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Served(_) => "served",
            Self::Denied(_) => "denied",
            Self::Expired => "expired",
        }
    }
}

/// One `{fileId, ownerToken}` pair submitted for validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedFile {
    pub file_id: String,
    pub owner_token: String,
}

impl OwnedFile {
    pub fn is_well_formed(&self) -> bool {
        is_valid_token_input(&self.file_id) && is_valid_token_input(&self.owner_token)
    }
}

/// Owner's view of one file. All fields empty means the file is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileValidation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
