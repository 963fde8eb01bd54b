//! Storage for saved connections, webhooks and MCP servers.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

use crate::error::RepositoryError;
use crate::models::{ConnectionConfig, McpConnection, WebhookConnection};

pub const CONNECTIONS_FILE: &str = "connections.json";
pub const WEBHOOKS_FILE: &str = "webhooks.json";
pub const MCP_SERVERS_FILE: &str = "mcp_servers.json";

/// A record that can be stored in a repository.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

impl Record for ConnectionConfig {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Record for WebhookConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Record for McpConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Keyed storage of records, in insertion order.
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    async fn list(&self) -> Result<Vec<T>, RepositoryError>;

    async fn get(&self, id: &str) -> Result<Option<T>, RepositoryError>;

    /// Insert a record, or replace the one with the same id.
    async fn upsert(&self, record: T) -> Result<(), RepositoryError>;

    /// Remove a record. Returns whether it existed.
    async fn remove(&self, id: &str) -> Result<bool, RepositoryError>;

    /// Look a record up by id, falling back to its name.
    async fn find(&self, id_or_name: &str) -> Result<T, RepositoryError> {
        let records = self.list().await?;
        records
            .iter()
            .find(|r| r.id() == id_or_name)
            .or_else(|| records.iter().find(|r| r.name() == id_or_name))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id_or_name.to_string()))
    }
}

fn upsert_into<T: Record>(records: &mut Vec<T>, record: T) {
    match records.iter_mut().find(|r| r.id() == record.id()) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

fn remove_from<T: Record>(records: &mut Vec<T>, id: &str) -> bool {
    let before = records.len();
    records.retain(|r| r.id() != id);
    records.len() != before
}

/// Repository that lives for the lifetime of the process.
pub struct MemoryRepository<T> {
    records: RwLock<Vec<T>>,
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn list(&self) -> Result<Vec<T>, RepositoryError> {
        Ok(self.records.read().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.id() == id)
            .cloned())
    }

    async fn upsert(&self, record: T) -> Result<(), RepositoryError> {
        upsert_into(&mut *self.records.write().await, record);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, RepositoryError> {
        Ok(remove_from(&mut *self.records.write().await, id))
    }
}

/// Repository persisted as a JSON array in one file.
///
/// Every mutation rewrites the whole file through a temporary file.
pub struct JsonFileRepository<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Record> JsonFileRepository<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<T>, RepositoryError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, records: &[T]) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl<T: Record> Repository<T> for JsonFileRepository<T> {
    async fn list(&self) -> Result<Vec<T>, RepositoryError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn get(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_iter().find(|r| r.id() == id))
    }

    async fn upsert(&self, record: T) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        upsert_into(&mut records, record);
        self.store(&records).await
    }

    async fn remove(&self, id: &str) -> Result<bool, RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let removed = remove_from(&mut records, id);
        if removed {
            self.store(&records).await?;
        }
        Ok(removed)
    }
}
