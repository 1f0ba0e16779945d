//! Shared utility functions.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;

/// Generate `len` random bytes from the OS CSPRNG, base64url-encoded
/// without padding.
///
/// # Examples
///
/// ```
/// use burnshare::utils::gen_token;
///
/// let token = gen_token(20);
/// assert_eq!(token.len(), 27);
/// assert!(token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
/// ```
pub fn gen_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Internal blob key, independent of the public id.
pub fn gen_storage_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Format bytes in human-readable form.
///
/// # Examples
///
/// ```
/// use burnshare::utils::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 bytes");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(25 * 1024 * 1024), "25.0 MB");
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        0 => "0 bytes".to_string(),
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{b} bytes"),
    }
}
