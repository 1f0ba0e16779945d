//! Input sanitization for client-supplied metadata.
//!
//! Sanitizers never fail: they strip what is not acceptable and may return
//! an empty string. Validators return `false` for input that must be rejected.

use regex::Regex;
use std::sync::LazyLock;

use crate::constants::{
    MAX_EMAIL_LEN, MAX_FILENAME_LEN, MAX_TOKEN_INPUT_LEN, MAX_USER_AGENT_LEN, MIN_TOKEN_INPUT_LEN,
};

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f\x7f-\x9f]").expect("valid regex"));

static MIME_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9!#$&\-^_+.]{0,126}/[a-z0-9][a-z0-9!#$&\-^_+.]{0,126}$")
        .expect("valid regex")
});

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Truncate to at most `max` bytes without splitting a character.
fn truncate_on_char_boundary(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

fn is_printable(c: char) -> bool {
    !c.is_control() && (c == ' ' || !c.is_whitespace())
}

/// Reduce a client-supplied filename to a safe display name.
///
/// Keeps only the last path segment, strips control and non-printable
/// characters and path separators, and caps the result at 255 bytes.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();

    let stripped = CONTROL_CHARS.replace_all(base, "");
    let filtered: String = stripped
        .trim()
        .chars()
        .filter(|&c| is_printable(c) && c != '/' && c != '\\')
        .collect();

    if filtered == "." || filtered == ".." {
        return String::new();
    }

    truncate_on_char_boundary(filtered, MAX_FILENAME_LEN)
}

/// Normalize a media type, returning an empty string if it is not
/// a plausible `type/subtype`.
pub fn sanitize_media_type(media_type: &str) -> String {
    let lowered = media_type.trim().to_lowercase();
    let essence = match lowered.split_once(';') {
        Some((before, _)) => before.trim(),
        None => lowered.as_str(),
    };

    if MIME_TYPE.is_match(essence) {
        essence.to_string()
    } else {
        String::new()
    }
}

/// Strip control characters and cap the user agent at 512 bytes.
pub fn sanitize_user_agent(user_agent: &str) -> String {
    let stripped = CONTROL_CHARS.replace_all(user_agent, "");
    truncate_on_char_boundary(stripped.trim().to_string(), MAX_USER_AGENT_LEN)
}

/// File ids and owner tokens: printable ASCII, 3 to 64 characters.
pub fn is_valid_token_input(token: &str) -> bool {
    (MIN_TOKEN_INPUT_LEN..=MAX_TOKEN_INPUT_LEN).contains(&token.len())
        && token.bytes().all(|b| b.is_ascii_graphic())
}

pub fn is_valid_email(email: &str) -> bool {
    (4..=MAX_EMAIL_LEN).contains(&email.len()) && EMAIL.is_match(email)
}
