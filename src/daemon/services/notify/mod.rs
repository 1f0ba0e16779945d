//! Best-effort owner notifications.
//!
//! Messages go out over SMTP ([`SmtpNotifier`]), to an HTTP mail relay
//! ([`RelayNotifier`]), or only to the log ([`LogNotifier`]).
//!
//! The lifecycle manager composes a [`MailMessage`] when a file with a
//! recipient email is downloaded, blocked or confirmed, and hands it to
//! [`Mailer::dispatch`]. Delivery runs on a detached task: failures are
//! logged and never affect the request that triggered them.

pub mod template;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::AsyncSmtpTransportBuilder;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::model::{ClientInfo, SharedFile};
use crate::reliability::{RetryConfig, retry_anyhow};
use template::{MailFields, Template};

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers rendered messages.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns an error if delivery fails.
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Notifier that only logs. Used when no relay is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        info!(
            target: "notify",
            to = %message.to,
            subject = %message.subject,
            "Notification (no relay configured)"
        );
        Ok(())
    }
}

/// Notifier posting JSON messages to an HTTP mail relay.
#[derive(Clone)]
pub struct RelayNotifier {
    client: reqwest::Client,
    url: String,
    retry: RetryConfig,
}

impl RelayNotifier {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("burnshare/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build relay HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            retry: RetryConfig::network(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Notifier for RelayNotifier {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let client = &self.client;
        let url = self.url.as_str();
        retry_anyhow(self.retry.clone(), "mail relay", move || async move {
            client
                .post(url)
                .json(message)
                .send()
                .await
                .context("Failed to reach mail relay")?
                .error_for_status()
                .context("Mail relay rejected message")?;
            Ok(())
        })
        .await
    }
}

/// Notifier delivering over SMTP.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    retry: RetryConfig,
}

impl SmtpNotifier {
    /// Connections are opened lazily on first send.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS parameters cannot be built for `host`.
    pub fn new(host: &str, port: u16, user: &str, pass: &str) -> Result<Self> {
        let mut builder = smtp_builder(host, port)?
            .port(port)
            .timeout(Some(Duration::from_secs(10)));
        if !user.is_empty() {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }
        Ok(Self {
            transport: builder.build(),
            retry: RetryConfig::network(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(any(feature = "native-tls", feature = "rustls"))]
fn smtp_builder(host: &str, port: u16) -> Result<AsyncSmtpTransportBuilder> {
    use lettre::transport::smtp::client::{Tls, TlsParameters};

    let params = TlsParameters::new(host.to_string())
        .with_context(|| format!("Invalid SMTP TLS parameters for {host}"))?;
    let tls = if port == crate::constants::SMTPS_PORT {
        Tls::Wrapper(params)
    } else {
        Tls::Opportunistic(params)
    };
    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).tls(tls))
}

#[cfg(not(any(feature = "native-tls", feature = "rustls")))]
fn smtp_builder(host: &str, _port: u16) -> Result<AsyncSmtpTransportBuilder> {
    warn!(host, "Built without a TLS backend; SMTP traffic is unencrypted");
    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
}

/// Build a plain-text message.
///
/// # Errors
///
/// Returns an error if either address does not parse.
pub fn to_email(message: &MailMessage) -> Result<Message> {
    let from: Mailbox = message
        .from
        .parse()
        .with_context(|| format!("Invalid sender address '{}'", message.from))?;
    let to: Mailbox = message
        .to
        .parse()
        .with_context(|| format!("Invalid recipient address '{}'", message.to))?;
    Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .context("Failed to build mail message")
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let email = to_email(message)?;
        let transport = &self.transport;
        let email = &email;
        retry_anyhow(self.retry.clone(), "smtp", move || async move {
            transport
                .send(email.clone())
                .await
                .context("SMTP delivery failed")?;
            Ok(())
        })
        .await
    }
}

/// Which subject template to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    /// A download succeeded or was attempted and blocked.
    Access,
    /// The recipient confirmed receipt.
    Receipt,
}

/// Composes notifications from templates and dispatches them.
#[derive(Clone)]
pub struct Mailer {
    from: String,
    subject: Template,
    subject_receipt: Template,
    body: Template,
    denied_msg: String,
    notifier: Arc<dyn Notifier>,
}

impl Mailer {
    /// # Errors
    ///
    /// Returns an error if a template does not parse.
    pub fn new(config: &MailConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        Ok(Self {
            from: config.from.clone(),
            subject: Template::parse(&config.subject).context("Invalid mail.subject")?,
            subject_receipt: Template::parse(&config.subject_receipt)
                .context("Invalid mail.subject_receipt")?,
            body: Template::parse(&config.body).context("Invalid mail.body")?,
            denied_msg: config.denied_msg.clone(),
            notifier,
        })
    }

    /// Build a mailer from configuration: the HTTP relay when a relay URL is
    /// set, SMTP when a host is set, otherwise log only.
    ///
    /// # Errors
    ///
    /// Returns an error if a template does not parse or the transport
    /// cannot be built.
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let notifier: Arc<dyn Notifier> = match (&config.relay_url, &config.smtp_host) {
            (Some(url), _) => Arc::new(RelayNotifier::new(url.clone())?),
            (None, Some(host)) => {
                info!(host = %host, port = config.smtp_port, "Sending notifications over SMTP");
                Arc::new(SmtpNotifier::new(
                    host,
                    config.smtp_port,
                    &config.smtp_user,
                    &config.smtp_pass,
                )?)
            },
            (None, None) => Arc::new(LogNotifier),
        };
        Self::new(config, notifier)
    }

    /// Render a message for `file`, or `None` if it has no recipient email.
    pub fn compose(
        &self,
        kind: MailKind,
        file: &SharedFile,
        source: Option<&ClientInfo>,
        client: &ClientInfo,
        allowed: bool,
    ) -> Option<MailMessage> {
        let to = file.recipient_email.as_deref().filter(|e| !e.is_empty())?;

        let fields = MailFields {
            file_id: file.file_id.clone(),
            addr: client.addr.clone(),
            user_agent: client.user_agent.clone(),
            src_tls_version: source.map(|s| s.tls_version.clone()).unwrap_or_default(),
            src_tls_cipher_suite: source
                .map(|s| s.tls_cipher_suite.clone())
                .unwrap_or_default(),
            dst_tls_version: client.tls_version.clone(),
            dst_tls_cipher_suite: client.tls_cipher_suite.clone(),
            location: client.location.clone(),
            denied_msg: if allowed {
                String::new()
            } else {
                self.denied_msg.clone()
            },
        };

        let subject = match kind {
            MailKind::Access => &self.subject,
            MailKind::Receipt => &self.subject_receipt,
        };

        Some(MailMessage {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.render(&fields),
            body: self.body.render(&fields),
        })
    }

    /// Send on a detached task. Errors are logged at warn.
    pub fn dispatch(&self, file_id: &str, message: MailMessage) {
        let notifier = Arc::clone(&self.notifier);
        let file_id = file_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&message).await {
                warn!(file_id = %file_id, error = %format!("{e:#}"), "Failed to send notification");
            }
        });
    }
}
