//! Stats store
//!
//! Owns the canonical [`AggregateRecord`]. All changes go through
//! [`StatsStore::mutate`], which hands them to a single writer task, so
//! concurrent callers are serialized and no update is lost. Readers take a
//! [`StatsStore::snapshot`], which is the last record the writer published.

mod persist;
mod record;
mod writer;

pub use record::{AggregateRecord, Counters, Visit};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};

use writer::{Command, CommandSender};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed stats document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to persist stats: {0}")]
    Persist(String),
    #[error("stats writer is not running")]
    WriterStopped,
}

/// Handle to the store. Cheap to clone; every clone talks to the same writer.
#[derive(Clone)]
pub struct StatsStore {
    path: PathBuf,
    commands: CommandSender,
    published: watch::Receiver<Arc<AggregateRecord>>,
}

impl StatsStore {
    /// Read the persisted record at `path`, creating a zero-valued one if
    /// none exists. A malformed document yields a fresh record.
    pub async fn load(path: &Path) -> AggregateRecord {
        let path = path.to_path_buf();
        let fallback = path.clone();
        match tokio::task::spawn_blocking(move || persist::load(&path)).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("Failed to load stats store {}: {}", fallback.display(), e);
                AggregateRecord::new(chrono::Utc::now())
            }
        }
    }

    /// Load the record and start the writer task that owns it
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let record = Self::load(&path).await;
        tracing::info!(
            "Stats store opened: {} ({} visits, {} sessions)",
            path.display(),
            record.total_visits,
            record.sessions.len()
        );

        let (commands, published) = writer::start_writer(path.clone(), record);
        Self { path, commands, published }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `mutation` and wait until the result has been written out.
    ///
    /// An `Err` means the change could not be made durable; it has still
    /// been applied to the in-memory record unless the writer is gone.
    pub async fn mutate<F>(&self, mutation: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut AggregateRecord) + Send + 'static,
    {
        let (done, ack) = oneshot::channel();
        self.commands
            .send(Command { mutation: Box::new(mutation), done })
            .map_err(|_| StoreError::WriterStopped)?;
        ack.await.map_err(|_| StoreError::WriterStopped)?
    }

    /// The latest consistent record
    pub fn snapshot(&self) -> Result<Arc<AggregateRecord>, StoreError> {
        if self.commands.is_closed() {
            return Err(StoreError::WriterStopped);
        }
        Ok(Arc::clone(&self.published.borrow()))
    }

    /// Remove sessions whose last visit is older than `retention`
    pub async fn prune_idle_sessions(&self, retention: chrono::Duration) -> Result<(), StoreError> {
        self.mutate(move |record| {
            let now = chrono::Utc::now();
            let removed = record.prune_sessions(now - retention, now);
            if removed > 0 {
                tracing::info!("Pruned {} sessions idle for more than {} days", removed, retention.num_days());
            }
        })
        .await
    }
}
