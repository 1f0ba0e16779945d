//! Repository trait for file lifecycle persistence.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{ClientInfo, ClientRecord, ClientRole, SharedFile, StatsVisit};

/// Persistence operations used by the lifecycle manager.
///
/// Every multi-statement write is atomic. Rows in state
/// [`Creating`](crate::model::FileState::Creating) are invisible to
/// [`find`](Self::find); only [`list_all`](Self::list_all) and
/// [`remove`](Self::remove) see them.
#[async_trait]
pub trait FileRepository: Send + Sync + 'static {
    /// Insert a new file in state `Creating` together with its source client.
    async fn insert_creating(&self, file: &SharedFile, source: &ClientInfo) -> Result<()>;

    /// Flip `Creating -> Active`. Returns `false` if no such row was waiting.
    async fn activate(&self, file_id: &str) -> Result<bool>;

    /// Look up a visible (non-`Creating`) file.
    async fn find(&self, file_id: &str) -> Result<Option<SharedFile>>;

    /// Client records of one role for a file, oldest first.
    async fn clients(&self, file_id: &str, role: ClientRole) -> Result<Vec<ClientRecord>>;

    /// Append a `Denied` client record.
    async fn record_denied(
        &self,
        file_id: &str,
        client: &ClientInfo,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically take one download from an active file and append the
    /// destination client.
    ///
    /// Returns the remaining count after the decrement, or `None` if the
    /// file had nothing left (or is gone). When the count reaches zero the
    /// state becomes `PendingConfirmation` in the same transaction.
    async fn consume(
        &self,
        file_id: &str,
        client: &ClientInfo,
        at: DateTime<Utc>,
    ) -> Result<Option<u32>>;

    /// Delete a row (any state) and its client records. Returns `false` if
    /// it did not exist.
    async fn remove(&self, file_id: &str) -> Result<bool>;

    /// Every row, including `Creating` ones.
    async fn list_all(&self) -> Result<Vec<SharedFile>>;

    async fn insert_visit(&self, visit: &StatsVisit) -> Result<()>;

    async fn visits(&self) -> Result<Vec<StatsVisit>>;

    /// The uploader's record.
    async fn source_client(&self, file_id: &str) -> Result<Option<ClientRecord>> {
        Ok(self
            .clients(file_id, ClientRole::Source)
            .await?
            .into_iter()
            .next())
    }

    /// Successful downloads, in order.
    async fn destination_clients(&self, file_id: &str) -> Result<Vec<ClientRecord>> {
        self.clients(file_id, ClientRole::Destination).await
    }

    /// Blocked download attempts, in order.
    async fn denied_attempts(&self, file_id: &str) -> Result<Vec<ClientRecord>> {
        self.clients(file_id, ClientRole::Denied).await
    }
}
