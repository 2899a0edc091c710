use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::AppResult;
use crate::model::Checkpoint;

/// The persisted documents that form the contract between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Preflight,
    Takeoff,
    Landing,
    Checkpoint,
}

impl Artifact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Artifact::Preflight => "preflight",
            Artifact::Takeoff => "takeoff",
            Artifact::Landing => "landing",
            Artifact::Checkpoint => "checkpoint",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Preflight => "preflight.json",
            Artifact::Takeoff => "takeoff.json",
            Artifact::Landing => "landing.json",
            Artifact::Checkpoint => "checkpoint.json",
        }
    }
}

pub trait ArtifactStore: Send + Sync {
    fn read(&self, artifact: Artifact) -> AppResult<Option<String>>;

    /// Replaces the whole document.
    fn write(&self, artifact: Artifact, contents: &str) -> AppResult<()>;
}

pub fn load_document<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    artifact: Artifact,
) -> AppResult<Option<T>> {
    store
        .read(artifact)?
        .map(|contents| serde_json::from_str::<T>(&contents))
        .transpose()
        .map_err(Into::into)
}

pub fn save_document<T: Serialize>(
    store: &dyn ArtifactStore,
    artifact: Artifact,
    document: &T,
) -> AppResult<()> {
    let serialized = serde_json::to_string_pretty(document)?;
    store.write(artifact, &serialized)
}

/// A missing, unreadable or malformed checkpoint means a fresh start.
pub fn load_checkpoint(store: &dyn ArtifactStore) -> Option<Checkpoint> {
    match load_document::<Checkpoint>(store, Artifact::Checkpoint) {
        Ok(Some(checkpoint)) => Some(checkpoint),
        Ok(None) => None,
        Err(err) => {
            warn!(
                target: "checkpoint",
                error = %err,
                "ignoring unusable checkpoint; starting fresh"
            );
            None
        }
    }
}

/// One JSON file per artifact inside a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_of(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }
}

impl ArtifactStore for FileStore {
    fn read(&self, artifact: Artifact) -> AppResult<Option<String>> {
        match fs::read_to_string(self.path_of(artifact)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, artifact: Artifact, contents: &str) -> AppResult<()> {
        let path = self.path_of(artifact);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, contents)?;
        fs::rename(&staging, &path)?;
        debug!(artifact = artifact.as_str(), path = %path.display(), "artifact written");
        Ok(())
    }
}

/// In-process store; also counts writes per artifact.
#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<HashMap<Artifact, String>>>,
    writes: Arc<Mutex<HashMap<Artifact, usize>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self, artifact: Artifact) -> usize {
        self.writes.lock().get(&artifact).copied().unwrap_or(0)
    }
}

impl ArtifactStore for MemoryStore {
    fn read(&self, artifact: Artifact) -> AppResult<Option<String>> {
        Ok(self.documents.lock().get(&artifact).cloned())
    }

    fn write(&self, artifact: Artifact, contents: &str) -> AppResult<()> {
        self.documents.lock().insert(artifact, contents.to_string());
        *self.writes.lock().entry(artifact).or_insert(0) += 1;
        Ok(())
    }
}
