//! Transport security validation for downloads.
//!
//! The negotiated TLS version and cipher suite arrive as opaque strings,
//! either from the local handshake or from headers set by a trusted
//! terminating proxy. Both sources are validated the same way.

use anyhow::{Result, bail};
use std::fmt;

use crate::config::TlsValidationConfig;

pub const TLS_1_0: u16 = 0x0301;
pub const TLS_1_1: u16 = 0x0302;
pub const TLS_1_2: u16 = 0x0303;
pub const TLS_1_3: u16 = 0x0304;

/// Historically broken suites: RC4, 3DES, static-RSA key exchange and the
/// CBC-SHA256 variants. Not configurable.
pub const WEAK_CIPHERS: &[u16] = &[
    0x0005, // TLS_RSA_WITH_RC4_128_SHA
    0x000a, // TLS_RSA_WITH_3DES_EDE_CBC_SHA
    0x002f, // TLS_RSA_WITH_AES_128_CBC_SHA
    0x0035, // TLS_RSA_WITH_AES_256_CBC_SHA
    0x003c, // TLS_RSA_WITH_AES_128_CBC_SHA256
    0x009c, // TLS_RSA_WITH_AES_128_GCM_SHA256
    0x009d, // TLS_RSA_WITH_AES_256_GCM_SHA384
    0xc007, // TLS_ECDHE_ECDSA_WITH_RC4_128_SHA
    0xc011, // TLS_ECDHE_RSA_WITH_RC4_128_SHA
    0xc012, // TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA
    0xc023, // TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256
    0xc027, // TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256
];

/// Why a transport was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsRejection {
    /// Version or cipher could not be parsed.
    InvalidFormat(String),
    /// Version is older than the configured minimum.
    BelowMinimum { version: String, minimum: String },
    /// Cipher is on the hardcoded weak list.
    WeakCipher(u16),
    /// Cipher is on the configured deny-list.
    BlockedCipher(u16),
}

impl fmt::Display for TlsRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat(input) => write!(f, "invalid TLS parameter format: {input}"),
            Self::BelowMinimum { version, minimum } => write!(
                f,
                "TLS version {version} is below minimum required version {minimum}"
            ),
            Self::WeakCipher(id) => write!(f, "weak cipher 0x{id:04x} not allowed"),
            Self::BlockedCipher(id) => {
                write!(f, "cipher 0x{id:04x} is blocked by configuration")
            },
        }
    }
}

impl std::error::Error for TlsRejection {}

/// Parse a 16-bit protocol identifier given in decimal or `0x` hex.
fn parse_numeric(input: &str) -> Option<u16> {
    if let Some(hex) = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16).ok()
    } else {
        input.parse::<u16>().ok()
    }
}

/// Parse a TLS version as a raw protocol id (`771`, `0x0303`) or dotted `1.x`.
pub fn parse_tls_version(input: &str) -> Option<u16> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Some(id) = parse_numeric(input) {
        return Some(id);
    }
    match input.split_once('.') {
        Some(("1", "0")) => Some(TLS_1_0),
        Some(("1", "1")) => Some(TLS_1_1),
        Some(("1", "2")) => Some(TLS_1_2),
        Some(("1", "3")) => Some(TLS_1_3),
        _ => None,
    }
}

/// Parse a cipher suite id in decimal or `0x` hex.
pub fn parse_cipher(input: &str) -> Option<u16> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    parse_numeric(input)
}

/// Validates reported TLS parameters against configured policy.
#[derive(Debug, Clone)]
pub struct TlsValidator {
    enabled: bool,
    min_version: u16,
    min_version_label: String,
    blocked_ciphers: Vec<u16>,
}

impl TlsValidator {
    /// Build a validator from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured minimum version cannot be parsed.
    pub fn new(config: &TlsValidationConfig) -> Result<Self> {
        let Some(min_version) = parse_tls_version(&config.min_version) else {
            bail!(
                "invalid minimum TLS version '{}' (expected e.g. \"1.2\" or \"0x0303\")",
                config.min_version
            );
        };

        // Unparseable deny-list entries are ignored rather than rejected.
        let blocked_ciphers = config
            .blocked_ciphers
            .iter()
            .filter_map(|c| parse_cipher(c))
            .collect();

        Ok(Self {
            enabled: config.enabled,
            min_version,
            min_version_label: config.min_version.clone(),
            blocked_ciphers,
        })
    }

    /// A validator that accepts everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            min_version: 0,
            min_version_label: String::new(),
            blocked_ciphers: Vec::new(),
        }
    }

    /// Validate a reported version and cipher.
    ///
    /// # Errors
    ///
    /// Returns the first [`TlsRejection`] that applies.
    pub fn validate(&self, version: &str, cipher: &str) -> Result<(), TlsRejection> {
        if !self.enabled {
            return Ok(());
        }
        if version.is_empty() && cipher.is_empty() {
            return Ok(());
        }

        let parsed = parse_tls_version(version)
            .ok_or_else(|| TlsRejection::InvalidFormat(version.to_string()))?;

        if parsed < self.min_version {
            return Err(TlsRejection::BelowMinimum {
                version: version.to_string(),
                minimum: self.min_version_label.clone(),
            });
        }

        if !cipher.is_empty() {
            let suite =
                parse_cipher(cipher).ok_or_else(|| TlsRejection::InvalidFormat(cipher.to_string()))?;
            if WEAK_CIPHERS.contains(&suite) {
                return Err(TlsRejection::WeakCipher(suite));
            }
            if self.blocked_ciphers.contains(&suite) {
                return Err(TlsRejection::BlockedCipher(suite));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(min: &str, blocked: &[&str]) -> TlsValidator {
        TlsValidator::new(&TlsValidationConfig {
            enabled: true,
            min_version: min.to_string(),
            blocked_ciphers: blocked.iter().map(|s| (*s).to_string()).collect(),
        })
        .unwrap()
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!(parse_tls_version("1.0"), Some(TLS_1_0));
        assert_eq!(parse_tls_version("1.1"), Some(TLS_1_1));
        assert_eq!(parse_tls_version("1.2"), Some(TLS_1_2));
        assert_eq!(parse_tls_version("1.3"), Some(TLS_1_3));
        assert_eq!(parse_tls_version("771"), Some(TLS_1_2));
        assert_eq!(parse_tls_version("0x0304"), Some(TLS_1_3));
        assert_eq!(parse_tls_version(""), None);
        assert_eq!(parse_tls_version("invalid"), None);
        assert_eq!(parse_tls_version("2.0"), None);
        assert_eq!(parse_tls_version("70000"), None);
    }

    #[test]
    fn test_below_minimum_rejected() {
        let v = validator("1.2", &[]);
        assert!(matches!(
            v.validate("1.1", ""),
            Err(TlsRejection::BelowMinimum { .. })
        ));
        assert!(matches!(
            v.validate(&TLS_1_0.to_string(), ""),
            Err(TlsRejection::BelowMinimum { .. })
        ));
    }

    #[test]
    fn test_current_versions_accepted() {
        let v = validator("1.2", &[]);
        assert!(v.validate("1.3", "").is_ok());
        assert!(v.validate(&TLS_1_2.to_string(), "").is_ok());
        // TLS_AES_128_GCM_SHA256
        assert!(v.validate("1.3", "4865").is_ok());
    }

    #[test]
    fn test_weak_cipher_rejected_regardless_of_version() {
        let v = validator("1.0", &[]);
        for version in ["1.0", "1.2", "1.3"] {
            assert_eq!(
                v.validate(version, "0x0005"),
                Err(TlsRejection::WeakCipher(0x0005))
            );
            assert_eq!(
                v.validate(version, &0xc027u16.to_string()),
                Err(TlsRejection::WeakCipher(0xc027))
            );
        }
    }

    #[test]
    fn test_configured_blocked_cipher() {
        // TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 is not weak by default
        let v = validator("1.2", &["0xc02f", "garbage"]);
        assert_eq!(
            v.validate("1.2", "49199"),
            Err(TlsRejection::BlockedCipher(0xc02f))
        );
        assert!(v.validate("1.2", "0xc030").is_ok());
    }

    #[test]
    fn test_invalid_format() {
        let v = validator("1.2", &[]);
        assert!(matches!(
            v.validate("tls-one-two", ""),
            Err(TlsRejection::InvalidFormat(_))
        ));
        assert!(matches!(
            v.validate("1.2", "ECDHE-RSA"),
            Err(TlsRejection::InvalidFormat(_))
        ));
        // A cipher without a version is still a malformed report.
        assert!(matches!(
            v.validate("", "4865"),
            Err(TlsRejection::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_no_information_passes() {
        let v = validator("1.3", &[]);
        assert!(v.validate("", "").is_ok());
    }

    #[test]
    fn test_disabled_passes_everything() {
        let v = TlsValidator::new(&TlsValidationConfig {
            enabled: false,
            min_version: "1.3".to_string(),
            blocked_ciphers: vec![],
        })
        .unwrap();
        assert!(v.validate("1.0", "0x0005").is_ok());
        assert!(TlsValidator::disabled().validate("junk", "junk").is_ok());
    }

    #[test]
    fn test_invalid_minimum_is_a_config_error() {
        let result = TlsValidator::new(&TlsValidationConfig {
            enabled: true,
            min_version: "latest".to_string(),
            blocked_ciphers: vec![],
        });
        assert!(result.is_err());
    }
}
