//! Shared fixtures for lifecycle tests.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use super::{FileValidation, LifecycleManager, OwnedFile, UploadReceipt};
use crate::config::MailConfig;
use crate::daemon::services::blob::{BlobBackend, BlobStore, MemoryBlobBackend};
use crate::daemon::services::db::{FileRepository, SqliteRepository};
use crate::daemon::services::notify::testing::ChannelNotifier;
use crate::daemon::services::notify::{MailMessage, Mailer};
use crate::model::{ClientInfo, ClientRecord, ClientRole, Location, SharedFile, StatsVisit};

/// Memory backend whose writes and removals can be made to fail.
#[derive(Clone, Default)]
pub struct FailingBlobBackend {
    inner: MemoryBlobBackend,
    fail_put: Arc<AtomicBool>,
    fail_remove: Arc<AtomicBool>,
}

impl FailingBlobBackend {
    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobBackend for FailingBlobBackend {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        if self.fail_remove.load(Ordering::SeqCst) {
            bail!("permission denied");
        }
        self.inner.remove(key).await
    }
}

/// SQLite repository whose activation step can be made to fail or to find
/// nothing.
#[derive(Clone)]
pub struct FailingRepository {
    inner: Arc<SqliteRepository>,
    fail_activate: Arc<AtomicBool>,
    lose_activate: Arc<AtomicBool>,
}

impl FailingRepository {
    fn new() -> Self {
        Self {
            inner: Arc::new(SqliteRepository::memory().unwrap()),
            fail_activate: Arc::default(),
            lose_activate: Arc::default(),
        }
    }

    pub fn fail_activate(&self, fail: bool) {
        self.fail_activate.store(fail, Ordering::SeqCst);
    }

    /// Make `activate` report that no row was waiting.
    pub fn lose_activate(&self, lose: bool) {
        self.lose_activate.store(lose, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileRepository for FailingRepository {
    async fn insert_creating(&self, file: &SharedFile, source: &ClientInfo) -> Result<()> {
        self.inner.insert_creating(file, source).await
    }

    async fn activate(&self, file_id: &str) -> Result<bool> {
        if self.fail_activate.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        if self.lose_activate.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.activate(file_id).await
    }

    async fn find(&self, file_id: &str) -> Result<Option<SharedFile>> {
        self.inner.find(file_id).await
    }

    async fn clients(&self, file_id: &str, role: ClientRole) -> Result<Vec<ClientRecord>> {
        self.inner.clients(file_id, role).await
    }

    async fn record_denied(
        &self,
        file_id: &str,
        client: &ClientInfo,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.record_denied(file_id, client, at).await
    }

    async fn consume(
        &self,
        file_id: &str,
        client: &ClientInfo,
        at: DateTime<Utc>,
    ) -> Result<Option<u32>> {
        self.inner.consume(file_id, client, at).await
    }

    async fn remove(&self, file_id: &str) -> Result<bool> {
        self.inner.remove(file_id).await
    }

    async fn list_all(&self) -> Result<Vec<SharedFile>> {
        self.inner.list_all().await
    }

    async fn insert_visit(&self, visit: &StatsVisit) -> Result<()> {
        self.inner.insert_visit(visit).await
    }

    async fn visits(&self) -> Result<Vec<StatsVisit>> {
        self.inner.visits().await
    }
}

pub struct Harness {
    pub manager: LifecycleManager,
    pub blobs: MemoryBlobBackend,
    pub failing: FailingBlobBackend,
    pub repo: FailingRepository,
    pub mail: mpsc::UnboundedReceiver<MailMessage>,
}

impl Harness {
    pub fn new() -> Self {
        let failing = FailingBlobBackend::default();
        let blobs = failing.inner.clone();
        let (notifier, mail) = ChannelNotifier::new();
        let mailer = Mailer::new(&MailConfig::default(), Arc::new(notifier)).unwrap();
        let repo = FailingRepository::new();
        let manager = LifecycleManager::new(
            Arc::new(repo.clone()),
            BlobStore::custom(failing.clone()),
            mailer,
        );
        Self {
            manager,
            blobs,
            failing,
            repo,
            mail,
        }
    }

    pub async fn validate_one(&self, receipt: &UploadReceipt) -> FileValidation {
        let mut report = self
            .manager
            .validate(&[OwnedFile {
                file_id: receipt.file_id.clone(),
                owner_token: receipt.owner_token.clone(),
            }])
            .await
            .unwrap();
        report.remove(&receipt.file_id).unwrap()
    }

    pub async fn next_mail(&mut self) -> MailMessage {
        tokio::time::timeout(std::time::Duration::from_secs(2), self.mail.recv())
            .await
            .expect("mail within timeout")
            .expect("mail channel open")
    }
}

pub fn eu_client() -> ClientInfo {
    ClientInfo {
        addr: "192.0.2.10".to_string(),
        user_agent: "Mozilla/5.0".to_string(),
        tls_version: String::new(),
        tls_cipher_suite: String::new(),
        location: Some(Location {
            continent: "Europe".to_string(),
            country: "Germany".to_string(),
            city: "Berlin".to_string(),
            is_eu: true,
            ..Default::default()
        }),
    }
}

pub fn us_client() -> ClientInfo {
    ClientInfo {
        addr: "198.51.100.7".to_string(),
        location: Some(Location {
            continent: "North America".to_string(),
            country: "United States".to_string(),
            ..Default::default()
        }),
        ..eu_client()
    }
}
