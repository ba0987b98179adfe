//! Persistent stores that receive mirrored counters.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::record::RateLimitRecord;
use crate::error::{LimiterError, Result};

/// Write-only store for rate limit records.
///
/// Records are keyed by session id; an upsert overwrites the previous record
/// for that session.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Insert or replace the record for `record.session_id`.
    async fn upsert(&self, record: RateLimitRecord) -> Result<()>;
}

/// In-process store, mostly useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, RateLimitRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the stored record for a session.
    pub fn get(&self, session_id: &str) -> Option<RateLimitRecord> {
        self.records.get(session_id).map(|r| r.value().clone())
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn upsert(&self, record: RateLimitRecord) -> Result<()> {
        self.records.insert(record.session_id.clone(), record);
        Ok(())
    }
}

/// Store that keeps every record in a single JSON file.
///
/// The file holds an object keyed by session id and is rewritten through a
/// temporary file and a rename on each upsert.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tmp_path: PathBuf,
    records: Mutex<BTreeMap<String, RateLimitRecord>>,
}

impl FileStore {
    /// Open a file store, loading records already present at `path`.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tmp_path = sibling_tmp_path(&path)?;

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %path.display(),
            records = records.len(),
            "Opened rate limit file store"
        );

        Ok(Self {
            path,
            tmp_path,
            records: Mutex::new(records),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the stored record for a session.
    pub async fn get(&self, session_id: &str) -> Option<RateLimitRecord> {
        self.records.lock().await.get(session_id).cloned()
    }
}

/// `<name>.tmp` next to `path`, distinct from `path` whatever its extension.
fn sibling_tmp_path(path: &Path) -> Result<PathBuf> {
    let mut name = path.file_name().map(OsString::from).ok_or_else(|| {
        LimiterError::Config(format!("store path {} has no file name", path.display()))
    })?;
    name.push(".tmp");
    Ok(path.with_file_name(name))
}

#[async_trait]
impl RateLimitStore for FileStore {
    async fn upsert(&self, record: RateLimitRecord) -> Result<()> {
        // Held across the write so concurrent upserts cannot reorder files.
        let mut records = self.records.lock().await;
        records.insert(record.session_id.clone(), record);

        let encoded = serde_json::to_vec_pretty(&*records)?;
        tokio::fs::write(&self.tmp_path, encoded).await?;
        tokio::fs::rename(&self.tmp_path, &self.path).await?;

        debug!(path = %self.path.display(), records = records.len(), "Wrote rate limit records");
        Ok(())
    }
}
