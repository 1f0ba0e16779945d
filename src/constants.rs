//! Shared constants and defaults.

/// Default listen address for the HTTP API.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default upload ceiling in MiB.
pub const DEFAULT_MAX_UPLOAD_MIB: u64 = 25;

/// Default number of random bytes behind a public file id.
pub const DEFAULT_ID_LENGTH: usize = 20;

/// Largest id length whose base64url form still fits in 64 characters.
pub const MAX_ID_LENGTH: usize = 48;

/// Number of random bytes behind an owner token.
pub const OWNER_TOKEN_LEN: usize = 20;

/// Default directory for stored blobs.
pub const DEFAULT_STORE_PATH: &str = "files";

/// Default SQLite database path.
pub const DEFAULT_DATABASE_PATH: &str = "burnshare.db";

/// Default config file path.
pub const DEFAULT_CONFIG_FILE: &str = "burnshare.toml";

/// Grace period for in-flight requests on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 20;

/// Upper bound for a single request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

// Rate limiting
pub const DEFAULT_RATE_LIMIT_RPS: f64 = 10.0;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 20;
pub const DEFAULT_RATE_LIMIT_SWEEP_SECS: u64 = 60;
pub const DEFAULT_RATE_LIMIT_IDLE_SECS: u64 = 180;

// Upload bounds
pub const MIN_EXPIRY_DAYS: u32 = 1;
pub const MAX_EXPIRY_DAYS: u32 = 14;
pub const DEFAULT_EXPIRY_DAYS: u32 = 14;
pub const MIN_DOWNLOAD_COUNT: u32 = 1;
pub const MAX_DOWNLOAD_COUNT: u32 = 15;
pub const DEFAULT_DOWNLOAD_COUNT: u32 = 1;
pub const MAX_DELAY_MINUTES: u32 = 1440;

/// Maximum stored length of a display name as submitted (before sanitizing).
pub const MAX_FILENAME_FIELD_LEN: usize = 1024;
/// Maximum length of a sanitized display name in bytes.
pub const MAX_FILENAME_LEN: usize = 255;
/// Maximum length of a sanitized user agent in bytes.
pub const MAX_USER_AGENT_LEN: usize = 512;
/// Maximum length of a recipient email address.
pub const MAX_EMAIL_LEN: usize = 255;
/// Maximum length of a recorded stats URL.
pub const MAX_STATS_URL_LEN: usize = 255;

/// Bounds for file ids and owner tokens supplied by clients.
pub const MIN_TOKEN_INPUT_LEN: usize = 3;
pub const MAX_TOKEN_INPUT_LEN: usize = 64;

/// Default TLS header names set by a terminating proxy.
/// Plain SMTP submission port.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// SMTP port using implicit TLS.
pub const SMTPS_PORT: u16 = 465;

pub const DEFAULT_TLS_VERSION_HEADER: &str = "X-TLS-Version";
pub const DEFAULT_TLS_CIPHER_HEADER: &str = "X-TLS-CipherSuite";

/// User agent persisted when client metadata collection is off.
pub const REDACTED_USER_AGENT: &str = "none";

/// Process exit codes are a single byte.
pub const MAX_EXIT_CODE: usize = 255;
