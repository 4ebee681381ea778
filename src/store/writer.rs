//! Single writer task for the stats store
//!
//! Mutations are sent to a channel and applied one after another by the task
//! that owns the record. Mutations already queued are drained into a batch so
//! a burst of requests costs a single rewrite of the document.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use super::persist;
use super::record::AggregateRecord;
use super::StoreError;

/// A change to apply to the record. Must not panic.
pub type Mutation = Box<dyn FnOnce(&mut AggregateRecord) + Send>;

pub struct Command {
    pub mutation: Mutation,
    pub done: oneshot::Sender<Result<(), StoreError>>,
}

/// Sender handle for queueing mutations
pub type CommandSender = mpsc::UnboundedSender<Command>;

const BATCH_SIZE: usize = 100;

/// Start the writer task. Returns the command sender and the receiver that
/// always holds the latest published record.
pub fn start_writer(
    path: PathBuf,
    record: AggregateRecord,
) -> (CommandSender, watch::Receiver<Arc<AggregateRecord>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (published_tx, published_rx) = watch::channel(Arc::new(record.clone()));

    tokio::spawn(writer_task(path, record, rx, published_tx));

    (tx, published_rx)
}

async fn writer_task(
    path: PathBuf,
    mut record: AggregateRecord,
    mut rx: mpsc::UnboundedReceiver<Command>,
    published: watch::Sender<Arc<AggregateRecord>>,
) {
    info!("Stats writer started (path={}, batch_size={})", path.display(), BATCH_SIZE);

    let mut pending = Vec::with_capacity(BATCH_SIZE);

    while let Some(command) = rx.recv().await {
        (command.mutation)(&mut record);
        pending.push(command.done);

        while pending.len() < BATCH_SIZE {
            match rx.try_recv() {
                Ok(command) => {
                    (command.mutation)(&mut record);
                    pending.push(command.done);
                }
                Err(_) => break,
            }
        }

        published.send_replace(Arc::new(record.clone()));

        let result = flush(&path, &record).await;
        for done in pending.drain(..) {
            let _ = done.send(result.clone().map_err(StoreError::Persist));
        }
    }

    info!("Stats writer shutting down");
}

/// Persist the record on the blocking pool
async fn flush(path: &Path, record: &AggregateRecord) -> Result<(), String> {
    let data = serde_json::to_vec_pretty(record).map_err(|e| e.to_string())?;
    let path = path.to_path_buf();

    let result = match tokio::task::spawn_blocking(move || persist::write_atomic(&path, &data)).await {
        Ok(written) => written.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match &result {
        Ok(()) => debug!("Flushed stats store ({} visits)", record.total_visits),
        Err(e) => error!("Failed to flush stats store: {}", e),
    }
    result
}
