//! Domain records shared between the lifecycle manager, the repository and
//! the HTTP layer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a persisted shared file.
///
/// `Deleted` has no representation: a deleted file has no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Row inserted, blob not yet committed. Invisible to lookups.
    Creating,
    /// Downloadable while `remaining_count > 0`.
    Active,
    /// Count exhausted and blob removed; row kept until receipt confirmation.
    PendingConfirmation,
}

impl FileState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::PendingConfirmation => "pending_confirmation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "creating" => Some(Self::Creating),
            "active" => Some(Self::Active),
            "pending_confirmation" => Some(Self::PendingConfirmation),
            _ => None,
        }
    }
}

/// Role of a client record relative to its parent file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// The uploader.
    Source,
    /// A recipient whose download succeeded.
    Destination,
    /// A recipient whose download attempt was blocked.
    Denied,
}

impl ClientRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
            Self::Denied => "denied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "source" => Some(Self::Source),
            "destination" => Some(Self::Destination),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }
}

/// Resolved geographic location of a client address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub continent: String,
    pub country: String,
    #[serde(default)]
    pub subdivision1: String,
    #[serde(default)]
    pub subdivision2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub is_eu: bool,
}

/// Metadata about one party touching a file: the uploader or a recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub addr: String,
    pub user_agent: String,
    pub tls_version: String,
    pub tls_cipher_suite: String,
    pub location: Option<Location>,
}

/// A client record as persisted, carrying its role and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub role: ClientRole,
    pub info: ClientInfo,
    pub recorded_at: DateTime<Utc>,
}

/// The central entity: one uploaded file and its sharing policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFile {
    pub file_id: String,
    pub owner_token: String,
    pub storage_key: String,
    pub display_name: String,
    pub media_type: String,
    pub recipient_email: Option<String>,
    pub initial_count: u32,
    pub remaining_count: u32,
    pub expiry_days: u32,
    pub available_after: DateTime<Utc>,
    pub only_eea: bool,
    pub include_other_european: bool,
    pub created_at: DateTime<Utc>,
    pub state: FileState,
}

impl SharedFile {
    /// Instant after which the sweeper removes this file.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::days(i64::from(self.expiry_days))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Name used for the download attachment. Falls back to the public id;
    /// the storage key never leaves the service.
    pub fn attachment_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.file_id
        } else {
            &self.display_name
        }
    }
}

/// A recorded visit to an external URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsVisit {
    pub url: String,
    pub client: Option<ClientInfo>,
    pub recorded_at: DateTime<Utc>,
}
