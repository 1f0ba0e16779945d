//! Configuration types for the burnshare service.
//!
//! Configuration is a single TOML file. Every field has a default, so an
//! empty file (or no file at all) yields a working development setup:
//!
//! - [`Config`] - top-level settings (listen address, limits, paths)
//! - [`DatabaseConfig`] - persistent store
//! - [`MailConfig`] - notification relay and templates
//! - [`HeaderConfig`] - headers set by the terminating proxy
//! - [`RateLimitConfig`] - per-source admission control
//! - [`TlsValidationConfig`] - transport security policy for downloads
//!
//! Unknown keys are rejected so typos do not silently fall back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::constants;
use crate::daemon::services::notify::template;
use crate::policy::tls::parse_tls_version;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Root configuration (`burnshare.toml`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Upload ceiling in MiB.
    #[serde(default = "default_max_upload_size_mib")]
    pub max_upload_size_mib: u64,
    /// Random bytes per file id (before base64url encoding).
    #[serde(default = "default_id_length")]
    pub id_length: usize,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Persist client address, user agent and location with each record.
    #[serde(default)]
    pub save_client_info: bool,
    /// MaxMind City database (`.mmdb`) or TOML network table used to
    /// resolve client locations. Without it every location is unknown and
    /// EEA-restricted files cannot be downloaded.
    #[serde(default)]
    pub geoip_path: Option<PathBuf>,
    #[serde(default)]
    pub disallowed_user_agents: Vec<String>,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter listen address. Disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub headers: HeaderConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub tls_validation: TlsValidationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_driver")]
    pub driver: String,
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailConfig {
    /// HTTP endpoint accepting JSON mail messages.
    #[serde(default)]
    pub relay_url: Option<String>,
    /// SMTP server. Notifications are only logged when neither this nor
    /// `relay_url` is set.
    #[serde(default)]
    pub smtp_host: Option<String>,
    /// Port 465 uses implicit TLS; any other port upgrades with STARTTLS
    /// when the server offers it.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Authenticates only when non-empty.
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_pass: String,
    #[serde(default = "default_mail_from")]
    pub from: String,
    #[serde(default = "default_mail_subject")]
    pub subject: String,
    #[serde(default = "default_mail_subject_receipt")]
    pub subject_receipt: String,
    #[serde(default = "default_mail_body")]
    pub body: String,
    #[serde(default = "default_mail_denied_msg")]
    pub denied_msg: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderConfig {
    /// Header carrying the negotiated TLS version.
    #[serde(default = "default_tls_version_header")]
    pub tls_version: String,
    /// Header carrying the negotiated cipher suite.
    #[serde(default = "default_tls_cipher_header")]
    pub tls_cipher_suite: String,
    /// Take the client address from the first `X-Forwarded-For` hop.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sustained tokens per second per source. May be fractional.
    #[serde(default = "default_rps")]
    pub rps: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsValidationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum accepted version, e.g. `"1.2"` or `"0x0303"`.
    #[serde(default = "default_min_tls_version")]
    pub min_version: String,
    /// Extra cipher suite ids (decimal or hex) to refuse.
    #[serde(default)]
    pub blocked_ciphers: Vec<String>,
}

fn default_listen_addr() -> String {
    constants::DEFAULT_LISTEN_ADDR.to_string()
}

fn default_max_upload_size_mib() -> u64 {
    constants::DEFAULT_MAX_UPLOAD_MIB
}

fn default_id_length() -> usize {
    constants::DEFAULT_ID_LENGTH
}

fn default_store_path() -> PathBuf {
    PathBuf::from(constants::DEFAULT_STORE_PATH)
}

fn default_shutdown_grace_secs() -> u64 {
    constants::DEFAULT_SHUTDOWN_GRACE_SECS
}

fn default_request_timeout_secs() -> u64 {
    constants::DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_database_driver() -> String {
    "sqlite".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from(constants::DEFAULT_DATABASE_PATH)
}

fn default_smtp_port() -> u16 {
    constants::DEFAULT_SMTP_PORT
}

fn default_mail_from() -> String {
    "root@localhost".to_string()
}

fn default_mail_subject() -> String {
    "File has been accessed: {{.FileID}}".to_string()
}

fn default_mail_subject_receipt() -> String {
    "File download confirmed: {{.FileID}}".to_string()
}

fn default_mail_body() -> String {
    "File download with id {{.FileID}} has been attempted. {{.DeniedMsg}}".to_string()
}

fn default_mail_denied_msg() -> String {
    "Download was denied.".to_string()
}

fn default_tls_version_header() -> String {
    constants::DEFAULT_TLS_VERSION_HEADER.to_string()
}

fn default_tls_cipher_header() -> String {
    constants::DEFAULT_TLS_CIPHER_HEADER.to_string()
}

const fn default_true() -> bool {
    true
}

fn default_rps() -> f64 {
    constants::DEFAULT_RATE_LIMIT_RPS
}

fn default_burst() -> u32 {
    constants::DEFAULT_RATE_LIMIT_BURST
}

fn default_sweep_interval_secs() -> u64 {
    constants::DEFAULT_RATE_LIMIT_SWEEP_SECS
}

fn default_idle_timeout_secs() -> u64 {
    constants::DEFAULT_RATE_LIMIT_IDLE_SECS
}

fn default_min_tls_version() -> String {
    "1.2".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_upload_size_mib: default_max_upload_size_mib(),
            id_length: default_id_length(),
            store_path: default_store_path(),
            save_client_info: false,
            geoip_path: None,
            disallowed_user_agents: Vec::new(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            log_format: LogFormat::default(),
            metrics_addr: None,
            database: DatabaseConfig::default(),
            mail: MailConfig::default(),
            headers: HeaderConfig::default(),
            rate_limit: RateLimitConfig::default(),
            tls_validation: TlsValidationConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: default_database_driver(),
            path: default_database_path(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_user: String::new(),
            smtp_pass: String::new(),
            from: default_mail_from(),
            subject: default_mail_subject(),
            subject_receipt: default_mail_subject_receipt(),
            body: default_mail_body(),
            denied_msg: default_mail_denied_msg(),
        }
    }
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            tls_version: default_tls_version_header(),
            tls_cipher_suite: default_tls_cipher_header(),
            trust_forwarded_for: false,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: default_rps(),
            burst: default_burst(),
            sweep_interval_secs: default_sweep_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Default for TlsValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_version: default_min_tls_version(),
            blocked_ciphers: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid TOML,
    /// or has unknown keys or mistyped values.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from `path`, falling back to defaults when the file does not
    /// exist. The boolean is `false` when defaults were used.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than a missing file.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();
        match fs::metadata(path) {
            Ok(_) => Ok((Self::load_from(path)?, true)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((Self::default(), false)),
            Err(e) => Err(e).with_context(|| format!("Failed to stat config file: {}", path.display())),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid TOML or unknown keys.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Upload ceiling in bytes.
    #[must_use]
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_size_mib.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error listing every problem found if any check fails.
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Listener and limits
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "listen_addr '{}' is not a valid socket address (e.g. 0.0.0.0:8080)",
                self.listen_addr
            ));
        }

        if self.max_upload_size_mib == 0 {
            errors.push("max_upload_size_mib cannot be 0".to_string());
        } else if self.max_upload_size_mib > 1024 {
            warnings.push(format!(
                "max_upload_size_mib {} is very high (> 1 GiB); uploads are buffered in memory",
                self.max_upload_size_mib
            ));
        }

        if self.id_length < 3 {
            errors.push(format!("id_length must be at least 3 (got {})", self.id_length));
        } else if self.id_length > constants::MAX_ID_LENGTH {
            errors.push(format!(
                "id_length must be at most {} so encoded ids stay within {} characters (got {})",
                constants::MAX_ID_LENGTH,
                constants::MAX_TOKEN_INPUT_LEN,
                self.id_length
            ));
        } else if self.id_length < 8 {
            warnings.push(format!(
                "id_length {} is short; file ids may be guessable",
                self.id_length
            ));
        }

        if self.store_path.as_os_str().is_empty() {
            errors.push("store_path cannot be empty".to_string());
        }

        if self.request_timeout_secs == 0 {
            errors.push("request_timeout_secs cannot be 0".to_string());
        }

        if let Some(geoip) = &self.geoip_path {
            if !geoip.is_file() {
                errors.push(format!("geoip_path does not exist: {}", geoip.display()));
            }
        } else {
            warnings.push(
                "geoip_path is not set; files restricted to the EEA cannot be downloaded".to_string(),
            );
        }

        if let Some(addr) = &self.metrics_addr
            && addr.parse::<SocketAddr>().is_err()
        {
            errors.push(format!("metrics_addr '{addr}' is not a valid socket address"));
        }

        // 2. Database
        if self.database.driver != "sqlite" {
            errors.push(format!(
                "Unsupported database driver '{}'. Supported drivers: sqlite",
                self.database.driver
            ));
        }
        if self.database.path.as_os_str() == ":memory:" {
            warnings.push("database.path is ':memory:'; records are lost on restart".to_string());
        }

        // 3. Mail
        for (name, value) in [
            ("mail.subject", &self.mail.subject),
            ("mail.subject_receipt", &self.mail.subject_receipt),
            ("mail.body", &self.mail.body),
        ] {
            if let Err(e) = template::check(value) {
                errors.push(format!("{name}: {e}"));
            }
        }
        if let Some(relay) = &self.mail.relay_url {
            match url::Url::parse(relay) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {},
                Ok(parsed) => errors.push(format!(
                    "mail.relay_url must use http or https (got '{}')",
                    parsed.scheme()
                )),
                Err(e) => errors.push(format!("mail.relay_url '{relay}' is invalid: {e}")),
            }
        }
        if let Some(host) = &self.mail.smtp_host {
            if self.mail.relay_url.is_some() {
                errors.push("mail.relay_url and mail.smtp_host are mutually exclusive".to_string());
            }
            if host.trim().is_empty() {
                errors.push("mail.smtp_host cannot be empty".to_string());
            }
            if self.mail.smtp_port == 0 {
                errors.push("mail.smtp_port cannot be 0".to_string());
            }
            if let Err(e) = self.mail.from.parse::<lettre::message::Mailbox>() {
                errors.push(format!("mail.from '{}' is not a valid address: {e}", self.mail.from));
            }
            if self.mail.smtp_user.is_empty() && !self.mail.smtp_pass.is_empty() {
                warnings.push("mail.smtp_pass is set without mail.smtp_user; it is ignored".to_string());
            }
        }

        // 4. Rate limiting
        if self.rate_limit.enabled {
            if !self.rate_limit.rps.is_finite() || self.rate_limit.rps <= 0.0 {
                errors.push(format!(
                    "rate_limit.rps must be positive (got {})",
                    self.rate_limit.rps
                ));
            }
            if self.rate_limit.burst == 0 {
                errors.push("rate_limit.burst cannot be 0".to_string());
            }
            if self.rate_limit.sweep_interval_secs == 0 {
                errors.push("rate_limit.sweep_interval_secs cannot be 0".to_string());
            }
        }

        // 5. Transport security
        if parse_tls_version(&self.tls_validation.min_version).is_none() {
            errors.push(format!(
                "tls_validation.min_version '{}' is invalid (expected e.g. \"1.2\" or \"0x0303\")",
                self.tls_validation.min_version
            ));
        }
        if self.tls_validation.enabled
            && (self.headers.tls_version.is_empty() || self.headers.tls_cipher_suite.is_empty())
        {
            warnings.push(
                "tls_validation is enabled but a TLS header name is empty; that parameter is never checked"
                    .to_string(),
            );
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
