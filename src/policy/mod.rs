//! Download gating: geographic policy, user-agent blocking and transport
//! security.
//!
//! Everything here is a pure function of the request metadata and the file
//! record. The lifecycle manager evaluates the gates in a fixed order and
//! turns the first failure into a [`DenyReason`].

pub mod sanitize;
pub mod tls;

use std::fmt;

use crate::model::{ClientInfo, SharedFile};
use crate::reliability::security::is_user_agent_disallowed;

pub use tls::{TlsRejection, TlsValidator};

/// EEA members outside the EU.
pub const EEA_NON_EU: &[&str] = &["Norway", "Liechtenstein", "Iceland"];

/// European countries admitted when a file opts into `include_other_european`.
pub const OTHER_EUROPEAN: &[&str] = &[
    "Switzerland",
    "United Kingdom",
    "Monaco",
    "San Marino",
    "Andorra",
    "Vatican City",
];

/// Internal reason a download was refused. All of these surface as 403.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Upload delay has not elapsed yet.
    NotYetAvailable,
    /// Requester location is outside the permitted area (or unknown).
    Location,
    /// User agent matched the configured block list.
    UserAgent,
    /// Transport parameters failed validation.
    Transport(TlsRejection),
}

impl DenyReason {
    /// Message returned to the requester.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::NotYetAvailable => "file not yet downloadable",
            Self::Location | Self::UserAgent => "download from this location forbidden",
            Self::Transport(_) => "insecure connection, download forbidden",
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotYetAvailable => "not_yet_available",
            Self::Location => "location",
            Self::UserAgent => "user_agent",
            Self::Transport(_) => "transport",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotYetAvailable => write!(f, "file not yet available"),
            Self::Location => write!(f, "location not permitted"),
            Self::UserAgent => write!(f, "user agent not permitted"),
            Self::Transport(rejection) => write!(f, "{rejection}"),
        }
    }
}

/// Decides whether a given requester may download a file.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    disallowed_user_agents: Vec<String>,
}

impl AccessPolicy {
    pub fn new(disallowed_user_agents: Vec<String>) -> Self {
        Self {
            disallowed_user_agents,
        }
    }

    /// Geographic check against the file's EEA flags.
    ///
    /// Files without `only_eea` are downloadable from anywhere. Otherwise the
    /// client needs a resolved location inside the EEA, or inside the wider
    /// European set when `include_other_european` is set.
    pub fn is_allowed(&self, file: &SharedFile, client: &ClientInfo) -> bool {
        if !file.only_eea {
            return true;
        }

        let Some(location) = &client.location else {
            return false;
        };

        if location.is_eu || EEA_NON_EU.contains(&location.country.as_str()) {
            return true;
        }

        file.include_other_european && OTHER_EUROPEAN.contains(&location.country.as_str())
    }

    /// Case-sensitive substring match against the configured block list.
    pub fn is_user_agent_disallowed(&self, user_agent: &str) -> bool {
        is_user_agent_disallowed(user_agent, &self.disallowed_user_agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileState, Location};
    use chrono::Utc;

    fn file(only_eea: bool, include_other: bool) -> SharedFile {
        let now = Utc::now();
        SharedFile {
            file_id: "fid".to_string(),
            owner_token: "tok".to_string(),
            storage_key: "key".to_string(),
            display_name: String::new(),
            media_type: String::new(),
            recipient_email: None,
            initial_count: 1,
            remaining_count: 1,
            expiry_days: 14,
            available_after: now,
            only_eea,
            include_other_european: include_other,
            created_at: now,
            state: FileState::Active,
        }
    }

    fn client_in(country: &str, is_eu: bool) -> ClientInfo {
        ClientInfo {
            location: Some(Location {
                continent: "Europe".to_string(),
                country: country.to_string(),
                is_eu,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_unrestricted_file_always_allowed() {
        let policy = AccessPolicy::default();
        assert!(policy.is_allowed(&file(false, false), &ClientInfo::default()));
        assert!(policy.is_allowed(&file(false, false), &client_in("United States", false)));
    }

    #[test]
    fn test_eu_member_allowed() {
        let policy = AccessPolicy::default();
        assert!(policy.is_allowed(&file(true, false), &client_in("Germany", true)));
    }

    #[test]
    fn test_non_european_denied() {
        let policy = AccessPolicy::default();
        assert!(!policy.is_allowed(&file(true, false), &client_in("United States", false)));
        assert!(!policy.is_allowed(&file(true, true), &client_in("United States", false)));
    }

    #[test]
    fn test_missing_location_denied() {
        let policy = AccessPolicy::default();
        assert!(!policy.is_allowed(&file(true, true), &ClientInfo::default()));
    }

    #[test]
    fn test_eea_members_outside_eu_allowed() {
        let policy = AccessPolicy::default();
        for country in EEA_NON_EU {
            assert!(policy.is_allowed(&file(true, false), &client_in(country, false)));
        }
    }

    #[test]
    fn test_switzerland_depends_on_include_other() {
        let policy = AccessPolicy::default();
        let swiss = client_in("Switzerland", false);
        assert!(!policy.is_allowed(&file(true, false), &swiss));
        assert!(policy.is_allowed(&file(true, true), &swiss));
    }

    #[test]
    fn test_user_agent_block_list() {
        let policy = AccessPolicy::new(vec!["curl/".to_string(), "BadBot".to_string()]);
        assert!(policy.is_user_agent_disallowed("curl/8.4.0"));
        assert!(policy.is_user_agent_disallowed("Mozilla/5.0 (compatible; BadBot/1.0)"));
        assert!(!policy.is_user_agent_disallowed("Mozilla/5.0 (X11; Linux x86_64)"));
        // case-sensitive
        assert!(!policy.is_user_agent_disallowed("badbot"));
    }

    #[test]
    fn test_deny_reason_messages() {
        assert_eq!(
            DenyReason::NotYetAvailable.public_message(),
            "file not yet downloadable"
        );
        assert_eq!(DenyReason::UserAgent.label(), "user_agent");
        let transport = DenyReason::Transport(TlsRejection::WeakCipher(0x0005));
        assert!(transport.to_string().contains("0x0005"));
    }
}
