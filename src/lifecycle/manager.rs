//! The lifecycle manager.

use anyhow::{Context, anyhow};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{
    DownloadOutcome, FileValidation, OwnedFile, ServedFile, UploadReceipt, UploadRequest,
};
use crate::audit::{AuditEvent, log_audit_event};
use crate::config::Config;
use crate::constants::{MAX_STATS_URL_LEN, OWNER_TOKEN_LEN, REDACTED_USER_AGENT};
use crate::daemon::services::blob::BlobStore;
use crate::daemon::services::db::{self, SharedRepository};
use crate::daemon::services::notify::{MailKind, MailMessage, Mailer};
use crate::error::{Error, Result};
use crate::metrics;
use crate::model::{ClientInfo, FileState, SharedFile, StatsVisit};
use crate::policy::sanitize::{sanitize_filename, sanitize_media_type};
use crate::policy::{AccessPolicy, DenyReason, TlsValidator};
use crate::reliability::security::tokens_match;
use crate::utils::{gen_storage_key, gen_token};

/// Owns every state transition of a shared file.
///
/// `Clone` is cheap; all collaborators are shared handles.
#[derive(Clone)]
pub struct LifecycleManager {
    repo: SharedRepository,
    blobs: BlobStore,
    mailer: Arc<Mailer>,
    policy: AccessPolicy,
    tls: TlsValidator,
    id_length: usize,
    save_client_info: bool,
}

impl LifecycleManager {
    /// A manager with permissive gating: no user-agent block list and
    /// transport validation off. Use the `with_*` builders to tighten it.
    pub fn new(repo: SharedRepository, blobs: BlobStore, mailer: Mailer) -> Self {
        Self {
            repo,
            blobs,
            mailer: Arc::new(mailer),
            policy: AccessPolicy::default(),
            tls: TlsValidator::disabled(),
            id_length: crate::constants::DEFAULT_ID_LENGTH,
            save_client_info: true,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_tls_validator(mut self, tls: TlsValidator) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_id_length(mut self, id_length: usize) -> Self {
        self.id_length = id_length;
        self
    }

    #[must_use]
    pub fn with_save_client_info(mut self, save: bool) -> Self {
        self.save_client_info = save;
        self
    }

    /// Open every collaborator named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database, blob directory, mail templates or
    /// TLS policy cannot be set up.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let repo = db::open(&config.database).context("Failed to open database")?;
        let blobs = BlobStore::file(&config.store_path)
            .with_context(|| format!("Failed to open store path {}", config.store_path.display()))?;
        let mailer = Mailer::from_config(&config.mail)?;
        let tls = TlsValidator::new(&config.tls_validation)?;

        Ok(Self::new(repo, blobs, mailer)
            .with_policy(AccessPolicy::new(config.disallowed_user_agents.clone()))
            .with_tls_validator(tls)
            .with_id_length(config.id_length)
            .with_save_client_info(config.save_client_info))
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.repo
    }

    /// Client metadata as it may be stored.
    fn persisted(&self, client: &ClientInfo) -> ClientInfo {
        if self.save_client_info {
            client.clone()
        } else {
            ClientInfo {
                addr: String::new(),
                user_agent: REDACTED_USER_AGENT.to_string(),
                tls_version: client.tls_version.clone(),
                tls_cipher_suite: client.tls_cipher_suite.clone(),
                location: None,
            }
        }
    }

    /// Store a new file and return its id and owner token.
    ///
    /// The row is inserted in state `Creating`, the blob is written, and
    /// the row is then flipped to `Active`. Any failure undoes the earlier
    /// steps; ids are returned only once the file is downloadable.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for out-of-range fields, [`Error::Internal`]
    /// for storage failures.
    pub async fn upload(&self, request: UploadRequest, source: &ClientInfo) -> Result<UploadReceipt> {
        request.validate()?;

        let display_name = sanitize_filename(&request.filename);
        let mut media_type = sanitize_media_type(&request.media_type);
        if media_type.is_empty() && !display_name.is_empty() {
            media_type = mime_guess::from_path(&display_name)
                .first_raw()
                .unwrap_or_default()
                .to_string();
        }

        let now = Utc::now();
        let file = SharedFile {
            file_id: gen_token(self.id_length),
            owner_token: gen_token(OWNER_TOKEN_LEN),
            storage_key: gen_storage_key(),
            display_name,
            media_type,
            recipient_email: request.email.filter(|e| !e.is_empty()),
            initial_count: request.count,
            remaining_count: request.count,
            expiry_days: request.expiry_days,
            available_after: now + Duration::minutes(i64::from(request.delay_minutes)),
            only_eea: request.only_eea,
            include_other_european: request.include_other_european,
            created_at: now,
            state: FileState::Creating,
        };

        self.repo
            .insert_creating(&file, &self.persisted(source))
            .await
            .context("Failed to insert file record")?;

        if let Err(e) = self.blobs.put(&file.storage_key, &request.data).await {
            if let Err(cleanup) = self.repo.remove(&file.file_id).await {
                error!(
                    file_id = %file.file_id,
                    error = %format!("{cleanup:#}"),
                    "Failed to roll back file record"
                );
            }
            return Err(e.context("Failed to store file").into());
        }

        let committed = match self.repo.activate(&file.file_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(anyhow!("File record vanished before activation")),
            Err(e) => Err(e.context("Failed to activate file")),
        };
        if let Err(e) = committed {
            for cleanup in self.remove_file(&file).await {
                error!(
                    file_id = %file.file_id,
                    error = %format!("{cleanup:#}"),
                    "Failed to clean up uncommitted upload"
                );
            }
            return Err(e.into());
        }

        metrics::record_upload();
        info!(
            file_id = %file.file_id,
            size = request.data.len(),
            count = file.initial_count,
            expiry_days = file.expiry_days,
            "File uploaded"
        );

        Ok(UploadReceipt {
            file_id: file.file_id,
            owner_token: file.owner_token,
        })
    }

    /// Attempt a download on behalf of `client`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown ids, [`Error::Internal`] for storage
    /// failures. Gating outcomes are returned as [`DownloadOutcome`].
    pub async fn download(&self, file_id: &str, client: &ClientInfo) -> Result<DownloadOutcome> {
        let outcome = self.try_download(file_id, client).await;
        metrics::record_download(match &outcome {
            Ok(outcome) => outcome.label(),
            Err(Error::NotFound) => "not_found",
            Err(_) => "error",
        });
        outcome
    }

    async fn try_download(&self, file_id: &str, client: &ClientInfo) -> Result<DownloadOutcome> {
        let file = self.repo.find(file_id).await?.ok_or(Error::NotFound)?;

        if file.remaining_count < 1 {
            return Ok(DownloadOutcome::Expired);
        }

        let now = Utc::now();
        let denial = if now < file.available_after {
            debug!(file_id, available_after = %file.available_after, "File not yet available");
            Some(DenyReason::NotYetAvailable)
        } else {
            self.evaluate(&file, client)
        };

        if let Some(reason) = denial {
            if let Err(e) = self
                .repo
                .record_denied(file_id, &self.persisted(client), now)
                .await
            {
                warn!(file_id, error = %format!("{e:#}"), "Failed to record denied attempt");
            }
            log_audit_event(AuditEvent::DownloadDenied {
                file_id,
                remote_addr: &client.addr,
                reason: reason.label(),
            });
            info!(file_id, %reason, "Download denied");
            self.notify(MailKind::Access, &file, client, false).await;
            return Ok(DownloadOutcome::Denied(reason));
        }

        let Some(data) = self.blobs.get(&file.storage_key).await? else {
            error!(file_id, "Blob missing for active file");
            return Err(Error::NotFound);
        };

        let Some(remaining) = self
            .repo
            .consume(file_id, &self.persisted(client), now)
            .await?
        else {
            return Ok(DownloadOutcome::Expired);
        };

        if remaining == 0 {
            match self.blobs.remove(&file.storage_key).await {
                Ok(_) => debug!(file_id, "Last download served, blob removed"),
                Err(e) => warn!(file_id, error = %format!("{e:#}"), "Failed to remove exhausted blob"),
            }
        }

        info!(file_id, remaining, "File downloaded");
        self.notify(MailKind::Access, &file, client, true).await;

        let media_type = if file.media_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            file.media_type.clone()
        };
        Ok(DownloadOutcome::Served(ServedFile {
            data,
            filename: file.attachment_name().to_string(),
            media_type,
        }))
    }

    /// Location, then user agent, then transport.
    fn evaluate(&self, file: &SharedFile, client: &ClientInfo) -> Option<DenyReason> {
        if !self.policy.is_allowed(file, client) {
            return Some(DenyReason::Location);
        }
        if self.policy.is_user_agent_disallowed(&client.user_agent) {
            return Some(DenyReason::UserAgent);
        }
        self.tls
            .validate(&client.tls_version, &client.tls_cipher_suite)
            .err()
            .map(DenyReason::Transport)
    }

    /// Confirm receipt. Returns `true` if the file was removed, which only
    /// happens once the download count is exhausted.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown ids, [`Error::Internal`] if removal
    /// fails.
    pub async fn confirm(&self, file_id: &str, client: &ClientInfo) -> Result<bool> {
        let file = self.repo.find(file_id).await?.ok_or(Error::NotFound)?;

        // Compose first: the source record goes away with the row.
        let message = self.compose(MailKind::Receipt, &file, client, true).await;

        // The blob went with the last download; only the row is left.
        let removed = if file.state == FileState::PendingConfirmation {
            self.repo
                .remove(file_id)
                .await
                .with_context(|| format!("Failed to remove record of {file_id}"))?;
            info!(file_id, "Receipt confirmed, file removed");
            true
        } else {
            debug!(file_id, "Receipt confirmed while downloads remain");
            false
        };

        if let Some(message) = message {
            self.mailer.dispatch(file_id, message);
        }
        Ok(removed)
    }

    /// Owner-initiated deletion.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::Unauthorized`] on token mismatch, or
    /// [`Error::Internal`] if the blob or the row could not be removed.
    pub async fn delete(&self, file_id: &str, owner_token: &str) -> Result<()> {
        let file = self.repo.find(file_id).await?.ok_or(Error::NotFound)?;

        if !tokens_match(owner_token, &file.owner_token) {
            log_audit_event(AuditEvent::OwnerTokenMismatch {
                file_id,
                operation: "delete",
            });
            return Err(Error::Unauthorized);
        }

        let errors = self.remove_file(&file).await;
        if errors.is_empty() {
            log_audit_event(AuditEvent::FileDeleted {
                file_id,
                initiator: "owner",
            });
            return Ok(());
        }

        for e in &errors {
            error!(file_id, error = %format!("{e:#}"), "File deletion failed");
        }
        Err(Error::Internal(anyhow!(
            "file deletion failed with {} error(s)",
            errors.len()
        )))
    }

    /// Report expiry and remaining count for each owned file.
    ///
    /// Unknown ids yield an empty entry and token mismatches an error entry;
    /// one entry never affects another.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if any id or token is malformed,
    /// [`Error::Internal`] on storage failure.
    pub async fn validate(&self, files: &[OwnedFile]) -> Result<BTreeMap<String, FileValidation>> {
        if files.iter().any(|f| !f.is_well_formed()) {
            return Err(Error::validation(
                "fileId and ownerToken must be 3 to 64 printable ASCII characters",
            ));
        }

        let mut report = BTreeMap::new();
        for owned in files {
            let entry = match self.repo.find(&owned.file_id).await? {
                None => FileValidation::default(),
                Some(file) if !tokens_match(&owned.owner_token, &file.owner_token) => {
                    log_audit_event(AuditEvent::OwnerTokenMismatch {
                        file_id: &owned.file_id,
                        operation: "validate",
                    });
                    FileValidation {
                        error: Some("Owner token mismatch".to_string()),
                        ..Default::default()
                    }
                },
                Some(file) => FileValidation {
                    expiry_date: Some(file.expires_at()),
                    count: Some(file.remaining_count),
                    error: None,
                },
            };
            report.insert(owned.file_id.clone(), entry);
        }
        Ok(report)
    }

    /// Record a visit to an external URL.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] unless `url` is an absolute http(s) URL of at
    /// most 255 characters.
    pub async fn record_visit(&self, url: &str, client: &ClientInfo) -> Result<()> {
        if url.is_empty() || url.len() > MAX_STATS_URL_LEN {
            return Err(Error::validation("invalid url"));
        }
        let parsed = url::Url::parse(url).map_err(|_| Error::validation("invalid url"))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(Error::validation("invalid url"));
        }

        let visit = StatsVisit {
            url: url.to_string(),
            client: self.save_client_info.then(|| client.clone()),
            recorded_at: Utc::now(),
        };
        self.repo
            .insert_visit(&visit)
            .await
            .context("Failed to store stats")?;
        Ok(())
    }

    /// Remove blob and row, each independently. Returns every failure.
    pub(super) async fn remove_file(&self, file: &SharedFile) -> Vec<anyhow::Error> {
        let mut errors = Vec::new();

        if let Err(e) = self.blobs.remove(&file.storage_key).await {
            errors.push(e.context(format!("Failed to remove blob of {}", file.file_id)));
        }
        if let Err(e) = self.repo.remove(&file.file_id).await {
            errors.push(e.context(format!("Failed to remove record of {}", file.file_id)));
        }

        errors
    }

    /// Every row, including uncommitted ones.
    pub(super) async fn all_files(&self) -> anyhow::Result<Vec<SharedFile>> {
        self.repo.list_all().await
    }

    async fn compose(
        &self,
        kind: MailKind,
        file: &SharedFile,
        client: &ClientInfo,
        allowed: bool,
    ) -> Option<MailMessage> {
        file.recipient_email.as_ref()?;

        let source = match self.repo.source_client(&file.file_id).await {
            Ok(source) => source.map(|record| record.info),
            Err(e) => {
                warn!(file_id = %file.file_id, error = %format!("{e:#}"), "Failed to load source client");
                None
            },
        };
        self.mailer
            .compose(kind, file, source.as_ref(), client, allowed)
    }

    async fn notify(&self, kind: MailKind, file: &SharedFile, client: &ClientInfo, allowed: bool) {
        if let Some(message) = self.compose(kind, file, client, allowed).await {
            self.mailer.dispatch(&file.file_id, message);
        }
    }
}
