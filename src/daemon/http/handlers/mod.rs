//! HTTP API handlers.

pub mod files;
pub mod meta;

pub(crate) use files::{confirm_receipt, delete_file, download_file, upload_file, validate_files};
pub(crate) use meta::{health, public_config, save_stats};

use super::AppError;
use crate::policy::sanitize::is_valid_token_input;

/// Reject path and query ids that cannot have been issued.
fn check_token_input(value: &str, what: &str) -> Result<(), AppError> {
    if is_valid_token_input(value) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "{what} must be 3 to 64 printable ASCII characters"
        )))
    }
}
