//! JSON checkpoint backend
//!
//! The whole checkpoint lives in memory and is written as a single document
//! on every save. Writes go to a sibling temporary file which is then
//! renamed over the checkpoint, so readers never see a half-written file.

use crate::checkpoint::traits::{CheckpointError, CheckpointResult, CheckpointStore};
use crate::checkpoint::{CheckpointMetadata, CrawlRecord, QueuedUrl, CHECKPOINT_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointDocument {
    metadata: Option<CheckpointMetadata>,
    #[serde(default)]
    records: BTreeMap<String, CrawlRecord>,
    #[serde(default)]
    queue: Vec<QueuedUrl>,
}

/// JSON file checkpoint backend
pub struct JsonCheckpoint {
    path: PathBuf,
    doc: CheckpointDocument,
}

impl JsonCheckpoint {
    /// Opens a checkpoint file, starting empty if it does not exist
    ///
    /// # Returns
    ///
    /// * `Ok(JsonCheckpoint)` - Loaded or empty checkpoint
    /// * `Err(CheckpointError)` - The file is unreadable, malformed or from a newer version
    pub fn open(path: &Path) -> CheckpointResult<Self> {
        let doc = match fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => CheckpointDocument::default(),
            Ok(text) => serde_json::from_str::<CheckpointDocument>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckpointDocument::default(),
            Err(e) => return Err(e.into()),
        };

        if let Some(meta) = &doc.metadata {
            if meta.version > CHECKPOINT_VERSION {
                return Err(CheckpointError::UnsupportedVersion(meta.version));
            }
        }
        for (key, record) in &doc.records {
            if key != &record.url {
                return Err(CheckpointError::Corrupt(format!(
                    "record key {} does not match its url {}",
                    key, record.url
                )));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persist(&self) -> CheckpointResult<()> {
        let tmp = self.tmp_path();
        let bytes = serde_json::to_vec_pretty(&self.doc)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(
            path = %self.path.display(),
            records = self.doc.records.len(),
            "Checkpoint written"
        );
        Ok(())
    }
}

impl CheckpointStore for JsonCheckpoint {
    // ===== Metadata =====

    fn metadata(&self) -> CheckpointResult<Option<CheckpointMetadata>> {
        Ok(self.doc.metadata.clone())
    }

    fn begin(&mut self, config_name: &str, fingerprint: &str) -> CheckpointResult<()> {
        let mut meta = CheckpointMetadata::new(config_name, fingerprint);
        if let Some(existing) = &self.doc.metadata {
            meta.created_at = existing.created_at;
            meta.progress_marker = existing.progress_marker;
        }
        self.doc.metadata = Some(meta);
        self.persist()
    }

    fn reset(&mut self) -> CheckpointResult<()> {
        self.doc = CheckpointDocument::default();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ===== Records =====

    fn load(&self) -> CheckpointResult<HashMap<String, CrawlRecord>> {
        Ok(self
            .doc
            .records
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn get(&self, url: &str) -> CheckpointResult<Option<CrawlRecord>> {
        Ok(self.doc.records.get(url).cloned())
    }

    fn save(&mut self, records: &[CrawlRecord], marker: u64) -> CheckpointResult<()> {
        for record in records {
            self.doc.records.insert(record.url.clone(), record.clone());
        }
        if let Some(meta) = self.doc.metadata.as_mut() {
            meta.last_updated = Utc::now();
            meta.progress_marker = marker;
        }
        self.persist()
    }

    // ===== Queue =====

    fn save_queue(&mut self, queue: &[QueuedUrl]) -> CheckpointResult<()> {
        self.doc.queue = queue.to_vec();
        self.persist()
    }

    fn load_queue(&self) -> CheckpointResult<Vec<QueuedUrl>> {
        Ok(self.doc.queue.clone())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn backend_name(&self) -> &'static str {
        "json"
    }
}
