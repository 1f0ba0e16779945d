//! Shared security utilities.
//!
//! Centralizes the owner-token comparison and the user-agent block list so
//! the lifecycle manager and the HTTP layer behave identically.

use subtle::{Choice, ConstantTimeEq};

/// Constant-time equality of two tokens as a [`Choice`].
///
/// The comparison touches every byte of equal-length inputs regardless of
/// where they differ. Inputs of different length compare unequal; only the
/// length is observable.
pub fn token_eq(presented: &str, stored: &str) -> Choice {
    presented.as_bytes().ct_eq(stored.as_bytes())
}

/// Check whether a presented owner token matches the stored one.
///
/// # Examples
///
/// ```
/// use burnshare::reliability::security::tokens_match;
///
/// assert!(tokens_match("s3cret-token", "s3cret-token"));
/// assert!(!tokens_match("s3cret-tokem", "s3cret-token"));
/// assert!(!tokens_match("", "s3cret-token"));
/// ```
pub fn tokens_match(presented: &str, stored: &str) -> bool {
    !stored.is_empty() && bool::from(token_eq(presented, stored))
}

/// Check if a user agent contains any blocked substring.
///
/// Matching is case-sensitive. Empty patterns are ignored so a stray `""` in
/// the config does not block every client.
///
/// # Examples
///
/// ```
/// use burnshare::reliability::security::is_user_agent_disallowed;
///
/// let blocked = vec!["python-requests".to_string()];
/// assert!(is_user_agent_disallowed("python-requests/2.31", &blocked));
/// assert!(!is_user_agent_disallowed("Mozilla/5.0", &blocked));
/// assert!(!is_user_agent_disallowed("anything", &[]));
/// ```
pub fn is_user_agent_disallowed(user_agent: &str, blocked_patterns: &[String]) -> bool {
    blocked_patterns
        .iter()
        .filter(|pattern| !pattern.is_empty())
        .any(|pattern| user_agent.contains(pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("abcdef", "abcdef"));
        assert!(!tokens_match("abcdeg", "abcdef"));
        assert!(!tokens_match("abcde", "abcdef"));
        assert!(!tokens_match("", ""));
    }

    #[test]
    fn test_empty_tokens_do_not_match_each_other() {
        assert!(!tokens_match("", ""));
    }

    #[test]
    fn test_token_eq_is_choice_based() {
        // The comparison yields a `subtle::Choice` (an opaque u8 produced
        // without data-dependent branches) for every mismatch position.
        let stored = "0123456789abcdef";
        for pos in 0..stored.len() {
            let mut presented = stored.as_bytes().to_vec();
            presented[pos] ^= 0x01;
            let presented = String::from_utf8(presented).unwrap();
            let choice: Choice = token_eq(&presented, stored);
            assert_eq!(choice.unwrap_u8(), 0, "mismatch at {pos} must be rejected");
        }
        assert_eq!(token_eq(stored, stored).unwrap_u8(), 1);
    }

    #[test]
    fn test_user_agent_patterns() {
        let blocked = vec!["Wget".to_string(), String::new()];
        assert!(is_user_agent_disallowed("Wget/1.21", &blocked));
        assert!(!is_user_agent_disallowed("wget/1.21", &blocked));
        assert!(!is_user_agent_disallowed("Mozilla/5.0", &blocked));
    }
}
