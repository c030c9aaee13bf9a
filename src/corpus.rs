//! Corpus index: the passages available for retrieval and their embeddings.
//!
//! The index is rehydrated from a JSON snapshot written by an [`Ingestor`].
//! [`CorpusStore`] loads it once, rebuilds it when the snapshot is missing or
//! unreadable, and swaps whole indexes behind an `Arc` so readers never see
//! a half-built one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ndarray::Array1;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{CorpusLoadError, Result, RetrievalError};
use crate::providers::Ingestor;

pub type Embedding = Array1<f64>;

/// Source reference used when a snapshot record has no `file` field.
pub const DEFAULT_SOURCE: &str = "platform.pdf";

/// One retrievable passage (a page of a source document).
#[derive(Debug, Clone, PartialEq)]
pub struct PassageRecord {
    /// 1-based page number within `source`.
    pub id: u32,
    pub source: String,
    pub embedding: Embedding,
}

/// On-disk shape of a passage record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub page_num: u32,
    #[serde(default = "default_source")]
    pub file: String,
    pub embedding: Vec<f64>,
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

/// Immutable, ordered set of passages sharing one embedding dimensionality.
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
    records: Vec<PassageRecord>,
    dims: Option<usize>,
}

impl CorpusIndex {
    /// Builds an index, rejecting zero page numbers, empty embeddings and
    /// records whose dimensionality differs from the first record's.
    pub fn new(records: Vec<PassageRecord>) -> std::result::Result<Self, CorpusLoadError> {
        let dims = records.first().map(|r| r.embedding.len());

        for (index, record) in records.iter().enumerate() {
            if record.id == 0 {
                return Err(CorpusLoadError::Invalid {
                    index,
                    reason: "page numbers start at 1".to_string(),
                });
            }
            if record.embedding.is_empty() {
                return Err(CorpusLoadError::Invalid {
                    index,
                    reason: "embedding is empty".to_string(),
                });
            }
            if Some(record.embedding.len()) != dims {
                return Err(CorpusLoadError::Invalid {
                    index,
                    reason: format!(
                        "embedding has {} dimensions, expected {}",
                        record.embedding.len(),
                        dims.unwrap_or_default()
                    ),
                });
            }
        }

        Ok(CorpusIndex { records, dims })
    }

    /// Reads and validates a snapshot file.
    pub async fn load(path: &Path) -> std::result::Result<Self, CorpusLoadError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CorpusLoadError::Missing(path.to_path_buf()));
            }
            Err(e) => {
                return Err(CorpusLoadError::Io {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        if raw.trim().is_empty() {
            return Err(CorpusLoadError::Empty(path.to_path_buf()));
        }

        let snapshot: Vec<SnapshotRecord> =
            serde_json::from_str(&raw).map_err(|e| CorpusLoadError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if snapshot.is_empty() {
            return Err(CorpusLoadError::Empty(path.to_path_buf()));
        }

        let records = snapshot
            .into_iter()
            .map(|r| PassageRecord {
                id: r.page_num,
                source: r.file,
                embedding: Array1::from(r.embedding),
            })
            .collect();

        CorpusIndex::new(records)
    }

    /// Writes records in the snapshot format, creating parent directories.
    ///
    /// The JSON goes to a sibling temp file that is then renamed over `path`,
    /// so a concurrent [`load`](Self::load) sees the old or the new snapshot,
    /// never a partial one.
    pub async fn save(path: &Path, records: &[SnapshotRecord]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .with_context(|| format!("snapshot path {:?} has no file name", path))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        let json = serde_json::to_vec(records)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Records in ingestion order.
    pub fn records(&self) -> &[PassageRecord] {
        &self.records
    }

    /// Shared embedding dimensionality, `None` for an empty index.
    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load-once holder for the active [`CorpusIndex`].
///
/// Loading, rebuilding and reloading run one at a time behind `loading`;
/// readers only ever take the short `current` lock.
pub struct CorpusStore {
    snapshot: Option<PathBuf>,
    ingestor: Option<Arc<dyn Ingestor>>,
    current: RwLock<Option<Arc<CorpusIndex>>>,
    loading: Mutex<()>,
}

impl CorpusStore {
    /// A store backed by a snapshot file, rebuilt through `ingestor` when
    /// the file cannot be loaded.
    pub fn from_snapshot(snapshot: impl Into<PathBuf>, ingestor: Option<Arc<dyn Ingestor>>) -> Self {
        CorpusStore {
            snapshot: Some(snapshot.into()),
            ingestor,
            current: RwLock::new(None),
            loading: Mutex::new(()),
        }
    }

    /// A store over an index already in memory.
    pub fn from_index(index: CorpusIndex) -> Self {
        CorpusStore {
            snapshot: None,
            ingestor: None,
            current: RwLock::new(Some(Arc::new(index))),
            loading: Mutex::new(()),
        }
    }

    fn installed(&self) -> Option<Arc<CorpusIndex>> {
        self.current.read().clone()
    }

    /// Returns the active index, loading (and if needed rebuilding) it on
    /// first use. Concurrent first calls share a single load.
    pub async fn index(&self) -> Result<Arc<CorpusIndex>> {
        if let Some(index) = self.installed() {
            return Ok(index);
        }

        let _guard = self.loading.lock().await;
        if let Some(index) = self.installed() {
            debug!("corpus index loaded by a concurrent caller");
            return Ok(index);
        }

        let snapshot = self.snapshot_path()?;
        let index = match CorpusIndex::load(snapshot).await {
            Ok(index) => index,
            Err(first) => {
                warn!(error = %first, "corpus snapshot unusable, rebuilding");
                self.rebuild_and_load(snapshot, &first.to_string()).await?
            }
        };

        Ok(self.install(index))
    }

    /// Rebuilds the snapshot through the ingestor and swaps in the result.
    pub async fn reload(&self) -> Result<Arc<CorpusIndex>> {
        let _guard = self.loading.lock().await;
        let snapshot = self.snapshot_path()?;
        let index = self.rebuild_and_load(snapshot, "reload requested").await?;
        Ok(self.install(index))
    }

    fn snapshot_path(&self) -> Result<&Path> {
        self.snapshot
            .as_deref()
            .ok_or_else(|| RetrievalError::CorpusUnavailable {
                reason: "no snapshot configured".to_string(),
            })
    }

    /// Runs the ingestor, then loads what it wrote. Either failure is
    /// `CorpusUnavailable`, prefixed with `cause`.
    async fn rebuild_and_load(&self, snapshot: &Path, cause: &str) -> Result<CorpusIndex> {
        let Some(ingestor) = self.ingestor.as_ref() else {
            return Err(RetrievalError::CorpusUnavailable {
                reason: format!("{cause}; no ingestor configured"),
            });
        };

        let pages = ingestor
            .rebuild_corpus(snapshot)
            .await
            .map_err(|e| RetrievalError::CorpusUnavailable {
                reason: format!("{cause}; rebuild failed: {e:#}"),
            })?;
        info!(pages, snapshot = ?snapshot, "corpus rebuilt");

        CorpusIndex::load(snapshot)
            .await
            .map_err(|second| RetrievalError::CorpusUnavailable {
                reason: format!("{cause}; after rebuild: {second}"),
            })
    }

    fn install(&self, index: CorpusIndex) -> Arc<CorpusIndex> {
        let index = Arc::new(index);
        info!(records = index.len(), dims = ?index.dims(), "corpus index loaded");
        *self.current.write() = Some(Arc::clone(&index));
        index
    }
}
