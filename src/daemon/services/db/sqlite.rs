//! SQLite implementation of [`FileRepository`].

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::migrations::run_migrations;
use super::repository::FileRepository;
use crate::model::{ClientInfo, ClientRecord, ClientRole, FileState, Location, SharedFile, StatsVisit};

const FILE_COLUMNS: &str = "file_id, owner_token, storage_key, display_name, media_type, \
     recipient_email, initial_count, remaining_count, expiry_days, available_after, only_eea, \
     include_other_european, created_at, state";

/// SQLite-backed repository.
///
/// `Clone` is cheap; clones share one connection.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (creating if needed) a database file and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // WAL mode for concurrent readers during writes
        let _: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to enable WAL journal")?;

        Self::init(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .context("Task join error")?
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("Timestamp out of range: {ms}"))
}

fn location_to_json(location: Option<&Location>) -> Result<Option<String>> {
    location
        .map(|l| serde_json::to_string(l).context("Failed to encode location"))
        .transpose()
}

/// File row as stored, before conversion to domain types.
struct FileRow {
    file_id: String,
    owner_token: String,
    storage_key: String,
    display_name: String,
    media_type: String,
    recipient_email: Option<String>,
    initial_count: u32,
    remaining_count: u32,
    expiry_days: u32,
    available_after: i64,
    only_eea: bool,
    include_other_european: bool,
    created_at: i64,
    state: String,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_id: row.get(0)?,
            owner_token: row.get(1)?,
            storage_key: row.get(2)?,
            display_name: row.get(3)?,
            media_type: row.get(4)?,
            recipient_email: row.get(5)?,
            initial_count: row.get(6)?,
            remaining_count: row.get(7)?,
            expiry_days: row.get(8)?,
            available_after: row.get(9)?,
            only_eea: row.get(10)?,
            include_other_european: row.get(11)?,
            created_at: row.get(12)?,
            state: row.get(13)?,
        })
    }

    fn into_file(self) -> Result<SharedFile> {
        let state = FileState::parse(&self.state)
            .ok_or_else(|| anyhow!("Unknown state '{}' for file {}", self.state, self.file_id))?;
        Ok(SharedFile {
            available_after: from_millis(self.available_after)?,
            created_at: from_millis(self.created_at)?,
            file_id: self.file_id,
            owner_token: self.owner_token,
            storage_key: self.storage_key,
            display_name: self.display_name,
            media_type: self.media_type,
            recipient_email: self.recipient_email,
            initial_count: self.initial_count,
            remaining_count: self.remaining_count,
            expiry_days: self.expiry_days,
            only_eea: self.only_eea,
            include_other_european: self.include_other_european,
            state,
        })
    }
}

struct ClientRow {
    role: String,
    addr: String,
    user_agent: String,
    tls_version: String,
    tls_cipher_suite: String,
    location: Option<String>,
    recorded_at: i64,
}

impl ClientRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            role: row.get(0)?,
            addr: row.get(1)?,
            user_agent: row.get(2)?,
            tls_version: row.get(3)?,
            tls_cipher_suite: row.get(4)?,
            location: row.get(5)?,
            recorded_at: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<ClientRecord> {
        let role = ClientRole::parse(&self.role)
            .ok_or_else(|| anyhow!("Unknown client role '{}'", self.role))?;
        let location = self
            .location
            .map(|json| serde_json::from_str::<Location>(&json))
            .transpose()
            .context("Failed to decode client location")?;
        Ok(ClientRecord {
            role,
            info: ClientInfo {
                addr: self.addr,
                user_agent: self.user_agent,
                tls_version: self.tls_version,
                tls_cipher_suite: self.tls_cipher_suite,
                location,
            },
            recorded_at: from_millis(self.recorded_at)?,
        })
    }
}

fn insert_client(
    conn: &Connection,
    file_id: &str,
    role: ClientRole,
    client: &ClientInfo,
    at: DateTime<Utc>,
) -> Result<()> {
    let location = location_to_json(client.location.as_ref())?;
    conn.execute(
        "INSERT INTO clients (file_id, role, addr, user_agent, tls_version, tls_cipher_suite, \
         location, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            file_id,
            role.as_str(),
            client.addr,
            client.user_agent,
            client.tls_version,
            client.tls_cipher_suite,
            location,
            to_millis(at),
        ],
    )
    .with_context(|| format!("Failed to insert {} client for file {file_id}", role.as_str()))?;
    Ok(())
}

#[async_trait]
impl FileRepository for SqliteRepository {
    async fn insert_creating(&self, file: &SharedFile, source: &ClientInfo) -> Result<()> {
        let file = file.clone();
        let source = source.clone();
        self.run(move |conn| {
            let tx = conn.transaction().context("Failed to begin transaction")?;
            tx.execute(
                &format!("INSERT INTO shared_files ({FILE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"),
                params![
                    file.file_id,
                    file.owner_token,
                    file.storage_key,
                    file.display_name,
                    file.media_type,
                    file.recipient_email,
                    file.initial_count,
                    file.remaining_count,
                    file.expiry_days,
                    to_millis(file.available_after),
                    file.only_eea,
                    file.include_other_european,
                    to_millis(file.created_at),
                    FileState::Creating.as_str(),
                ],
            )
            .with_context(|| format!("Failed to insert file {}", file.file_id))?;
            insert_client(&tx, &file.file_id, ClientRole::Source, &source, file.created_at)?;
            tx.commit().context("Failed to commit file insert")?;
            Ok(())
        })
        .await
    }

    async fn activate(&self, file_id: &str) -> Result<bool> {
        let file_id = file_id.to_string();
        self.run(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE shared_files SET state = ?1 WHERE file_id = ?2 AND state = ?3",
                    params![
                        FileState::Active.as_str(),
                        file_id,
                        FileState::Creating.as_str()
                    ],
                )
                .with_context(|| format!("Failed to activate file {file_id}"))?;
            Ok(changed == 1)
        })
        .await
    }

    async fn find(&self, file_id: &str) -> Result<Option<SharedFile>> {
        let file_id = file_id.to_string();
        self.run(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {FILE_COLUMNS} FROM shared_files WHERE file_id = ?1 AND state != ?2"),
                    params![file_id, FileState::Creating.as_str()],
                    FileRow::from_row,
                )
                .optional()
                .with_context(|| format!("Failed to look up file {file_id}"))?;
            row.map(FileRow::into_file).transpose()
        })
        .await
    }

    async fn clients(&self, file_id: &str, role: ClientRole) -> Result<Vec<ClientRecord>> {
        let file_id = file_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT role, addr, user_agent, tls_version, tls_cipher_suite, location, \
                     recorded_at FROM clients WHERE file_id = ?1 AND role = ?2 ORDER BY id",
                )
                .context("Failed to prepare client query")?;
            let rows = stmt
                .query_map(params![file_id, role.as_str()], ClientRow::from_row)
                .context("Failed to query clients")?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row.context("Failed to read client row")?.into_record()?);
            }
            Ok(records)
        })
        .await
    }

    async fn record_denied(
        &self,
        file_id: &str,
        client: &ClientInfo,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let file_id = file_id.to_string();
        let client = client.clone();
        self.run(move |conn| insert_client(conn, &file_id, ClientRole::Denied, &client, at))
            .await
    }

    async fn consume(
        &self,
        file_id: &str,
        client: &ClientInfo,
        at: DateTime<Utc>,
    ) -> Result<Option<u32>> {
        let file_id = file_id.to_string();
        let client = client.clone();
        self.run(move |conn| {
            let tx = conn.transaction().context("Failed to begin transaction")?;
            let remaining: Option<u32> = tx
                .query_row(
                    "UPDATE shared_files \
                     SET remaining_count = remaining_count - 1, \
                         state = CASE WHEN remaining_count = 1 THEN ?1 ELSE state END \
                     WHERE file_id = ?2 AND remaining_count > 0 AND state = ?3 \
                     RETURNING remaining_count",
                    params![
                        FileState::PendingConfirmation.as_str(),
                        file_id,
                        FileState::Active.as_str()
                    ],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("Failed to decrement count for file {file_id}"))?;

            let Some(remaining) = remaining else {
                return Ok(None);
            };

            insert_client(&tx, &file_id, ClientRole::Destination, &client, at)?;
            tx.commit().context("Failed to commit download")?;
            Ok(Some(remaining))
        })
        .await
    }

    async fn remove(&self, file_id: &str) -> Result<bool> {
        let file_id = file_id.to_string();
        self.run(move |conn| {
            let changed = conn
                .execute("DELETE FROM shared_files WHERE file_id = ?1", params![file_id])
                .with_context(|| format!("Failed to delete file {file_id}"))?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<SharedFile>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {FILE_COLUMNS} FROM shared_files ORDER BY created_at"))
                .context("Failed to prepare file listing")?;
            let rows = stmt
                .query_map([], FileRow::from_row)
                .context("Failed to list files")?;

            let mut files = Vec::new();
            for row in rows {
                files.push(row.context("Failed to read file row")?.into_file()?);
            }
            Ok(files)
        })
        .await
    }

    async fn insert_visit(&self, visit: &StatsVisit) -> Result<()> {
        let visit = visit.clone();
        self.run(move |conn| {
            let client = visit
                .client
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .context("Failed to encode stats client")?;
            conn.execute(
                "INSERT INTO stats_visits (url, client, recorded_at) VALUES (?1, ?2, ?3)",
                params![visit.url, client, to_millis(visit.recorded_at)],
            )
            .context("Failed to store stats visit")?;
            Ok(())
        })
        .await
    }

    async fn visits(&self) -> Result<Vec<StatsVisit>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare("SELECT url, client, recorded_at FROM stats_visits ORDER BY id")
                .context("Failed to prepare stats query")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .context("Failed to query stats")?;

            let mut visits = Vec::new();
            for row in rows {
                let (url, client, recorded_at) = row.context("Failed to read stats row")?;
                let client = client
                    .map(|json| serde_json::from_str::<ClientInfo>(&json))
                    .transpose()
                    .context("Failed to decode stats client")?;
                visits.push(StatsVisit {
                    url,
                    client,
                    recorded_at: from_millis(recorded_at)?,
                });
            }
            Ok(visits)
        })
        .await
    }
}
