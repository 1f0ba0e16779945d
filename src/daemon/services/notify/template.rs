//! Mail templates with `{{.Field}}` placeholders.
//!
//! Templates are parsed once at startup so a typo in a field name fails
//! configuration validation instead of every notification.

use std::fmt;

use crate::model::Location;

/// Template parse failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unclosed placeholder starting at byte {0}")]
    Unclosed(usize),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("placeholder must start with '.', got '{0}'")]
    NotAField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    FileId,
    Addr,
    UserAgent,
    SrcTlsVersion,
    SrcTlsCipherSuite,
    DstTlsVersion,
    DstTlsCipherSuite,
    Location,
    LocationContinent,
    LocationCountry,
    LocationCity,
    DeniedMsg,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "FileID" => Self::FileId,
            "Addr" => Self::Addr,
            "UserAgent" => Self::UserAgent,
            "SrcTLSVersion" => Self::SrcTlsVersion,
            "SrcTLSCipherSuite" => Self::SrcTlsCipherSuite,
            "DstTLSVersion" => Self::DstTlsVersion,
            "DstTLSCipherSuite" => Self::DstTlsCipherSuite,
            "Location" => Self::Location,
            "Location.Continent" => Self::LocationContinent,
            "Location.Country" => Self::LocationCountry,
            "Location.City" => Self::LocationCity,
            "DeniedMsg" => Self::DeniedMsg,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Values available to a template.
#[derive(Debug, Clone, Default)]
pub struct MailFields {
    pub file_id: String,
    pub addr: String,
    pub user_agent: String,
    pub src_tls_version: String,
    pub src_tls_cipher_suite: String,
    pub dst_tls_version: String,
    pub dst_tls_cipher_suite: String,
    pub location: Option<Location>,
    /// Empty unless the attempt was denied.
    pub denied_msg: String,
}

struct LocationDisplay<'a>(&'a Location);

impl fmt::Display for LocationDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = self.0;
        if !loc.city.is_empty() {
            write!(f, "{}, ", loc.city)?;
        }
        write!(f, "{}", loc.country)?;
        if !loc.continent.is_empty() {
            write!(f, " ({})", loc.continent)?;
        }
        Ok(())
    }
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns an error for unclosed placeholders or unknown field names.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or(TemplateError::Unclosed(offset + start))?;
            let inner = after_open[..end].trim();
            let name = inner
                .strip_prefix('.')
                .ok_or_else(|| TemplateError::NotAField(inner.to_string()))?;
            let field =
                Field::from_name(name).ok_or_else(|| TemplateError::UnknownField(name.to_string()))?;
            segments.push(Segment::Field(field));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Render with the given values. Missing location parts render empty.
    pub fn render(&self, fields: &MailFields) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => {
                    let loc = fields.location.as_ref();
                    match field {
                        Field::FileId => out.push_str(&fields.file_id),
                        Field::Addr => out.push_str(&fields.addr),
                        Field::UserAgent => out.push_str(&fields.user_agent),
                        Field::SrcTlsVersion => out.push_str(&fields.src_tls_version),
                        Field::SrcTlsCipherSuite => out.push_str(&fields.src_tls_cipher_suite),
                        Field::DstTlsVersion => out.push_str(&fields.dst_tls_version),
                        Field::DstTlsCipherSuite => out.push_str(&fields.dst_tls_cipher_suite),
                        Field::Location => {
                            if let Some(loc) = loc {
                                out.push_str(&LocationDisplay(loc).to_string());
                            }
                        },
                        Field::LocationContinent => {
                            out.push_str(loc.map_or("", |l| l.continent.as_str()));
                        },
                        Field::LocationCountry => {
                            out.push_str(loc.map_or("", |l| l.country.as_str()));
                        },
                        Field::LocationCity => out.push_str(loc.map_or("", |l| l.city.as_str())),
                        Field::DeniedMsg => out.push_str(&fields.denied_msg),
                    }
                },
            }
        }
        out
    }
}

/// Check that a template parses.
///
/// # Errors
///
/// Returns the parse error.
pub fn check(source: &str) -> Result<(), TemplateError> {
    Template::parse(source).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> MailFields {
        MailFields {
            file_id: "abc123".to_string(),
            addr: "198.51.100.7".to_string(),
            user_agent: "curl/8.4.0".to_string(),
            dst_tls_version: "772".to_string(),
            location: Some(Location {
                continent: "Europe".to_string(),
                country: "Germany".to_string(),
                city: "Berlin".to_string(),
                is_eu: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_fields() {
        let t = Template::parse("File {{.FileID}} from {{ .Addr }} ({{.UserAgent}})").unwrap();
        assert_eq!(
            t.render(&fields()),
            "File abc123 from 198.51.100.7 (curl/8.4.0)"
        );
    }

    #[test]
    fn test_render_location() {
        let t = Template::parse("{{.Location}} / {{.Location.Country}} / {{.Location.City}}").unwrap();
        assert_eq!(
            t.render(&fields()),
            "Berlin, Germany (Europe) / Germany / Berlin"
        );

        let mut no_loc = fields();
        no_loc.location = None;
        assert_eq!(t.render(&no_loc), " /  / ");
    }

    #[test]
    fn test_denied_message_empty_when_allowed() {
        let t = Template::parse("Attempted. {{.DeniedMsg}}").unwrap();
        assert_eq!(t.render(&fields()), "Attempted. ");

        let mut denied = fields();
        denied.denied_msg = "Download was denied.".to_string();
        assert_eq!(t.render(&denied), "Attempted. Download was denied.");
    }

    #[test]
    fn test_literal_only_and_empty() {
        assert_eq!(Template::parse("plain").unwrap().render(&fields()), "plain");
        assert_eq!(Template::parse("").unwrap().render(&fields()), "");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Template::parse("a {{.FileID").unwrap_err(),
            TemplateError::Unclosed(2)
        );
        assert_eq!(
            Template::parse("{{.Denied}}").unwrap_err(),
            TemplateError::UnknownField("Denied".to_string())
        );
        assert!(matches!(
            Template::parse("{{FileID}}"),
            Err(TemplateError::NotAField(_))
        ));
    }

    #[test]
    fn test_defaults_parse() {
        use crate::config::MailConfig;
        let mail = MailConfig::default();
        assert!(check(&mail.subject).is_ok());
        assert!(check(&mail.subject_receipt).is_ok());
        assert!(check(&mail.body).is_ok());
    }
}
