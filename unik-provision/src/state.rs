//! Persisted entity state: images, instances, volumes.
//!
//! `FileState` is the single authority for the entity collections. The
//! contract has two rules:
//!
//! - `modify_*` grants the closure exclusive mutable access to one whole
//!   collection; an `Err` from the closure aborts every visible effect of
//!   the call.
//! - a successful `modify_*` is durable before it returns: the new state
//!   is written to a temp file and renamed over `state.json`, then
//!   published in memory. Modify and persist are one atomic step, so a
//!   crash can never lose an acknowledged update.
//!
//! Reads hand out cloned snapshots only; mutating a snapshot has no
//! effect on stored state.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use unik_types::{Image, Instance, UnikError, UnikResult, Volume};

/// The three persisted collections, keyed by entity id.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
struct Collections {
    #[serde(default)]
    images: HashMap<String, Image>,
    #[serde(default)]
    instances: HashMap<String, Instance>,
    #[serde(default)]
    volumes: HashMap<String, Volume>,
}

/// File-backed entity store with atomic modify+persist.
///
/// One lock covers all three collections, which keeps concurrent
/// `modify_*` calls mutually exclusive and rules out lost updates
/// between callers in the same process.
pub struct FileState {
    path: PathBuf,
    inner: Mutex<Collections>,
}

impl FileState {
    /// Open the store at `path`, restoring any previously persisted
    /// collections. A missing file starts an empty store; a corrupt file
    /// is an error, since this state is authoritative rather than a
    /// rebuildable cache.
    pub fn load(path: impl Into<PathBuf>) -> UnikResult<Self> {
        let path = path.into();
        let collections = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                UnikError::Storage(format!("reading state file {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&contents).map_err(|e| {
                UnikError::Storage(format!("parsing state file {}: {}", path.display(), e))
            })?
        } else {
            tracing::debug!(path = %path.display(), "state file not found, starting empty");
            Collections::default()
        };
        Ok(Self {
            path,
            inner: Mutex::new(collections),
        })
    }

    /// Mutate the image collection; aborts all effects if `f` errors.
    pub fn modify_images<F>(&self, f: F) -> UnikResult<()>
    where
        F: FnOnce(&mut HashMap<String, Image>) -> UnikResult<()>,
    {
        let mut guard = self.inner.lock();
        let mut scratch = guard.images.clone();
        f(&mut scratch)?;
        let mut next = guard.clone();
        next.images = scratch;
        persist(&self.path, &next)?;
        *guard = next;
        Ok(())
    }

    /// Mutate the instance collection; aborts all effects if `f` errors.
    pub fn modify_instances<F>(&self, f: F) -> UnikResult<()>
    where
        F: FnOnce(&mut HashMap<String, Instance>) -> UnikResult<()>,
    {
        let mut guard = self.inner.lock();
        let mut scratch = guard.instances.clone();
        f(&mut scratch)?;
        let mut next = guard.clone();
        next.instances = scratch;
        persist(&self.path, &next)?;
        *guard = next;
        Ok(())
    }

    /// Mutate the volume collection; aborts all effects if `f` errors.
    pub fn modify_volumes<F>(&self, f: F) -> UnikResult<()>
    where
        F: FnOnce(&mut HashMap<String, Volume>) -> UnikResult<()>,
    {
        let mut guard = self.inner.lock();
        let mut scratch = guard.volumes.clone();
        f(&mut scratch)?;
        let mut next = guard.clone();
        next.volumes = scratch;
        persist(&self.path, &next)?;
        *guard = next;
        Ok(())
    }

    /// Persist the current collections.
    ///
    /// Retained for contract compatibility; `modify_*` already persists
    /// atomically, so this is only useful after out-of-band recovery.
    pub fn save(&self) -> UnikResult<()> {
        let guard = self.inner.lock();
        persist(&self.path, &guard)
    }

    pub fn get_image(&self, id: &str) -> Option<Image> {
        self.inner.lock().images.get(id).cloned()
    }

    pub fn get_image_by_name(&self, name: &str) -> Option<Image> {
        self.inner
            .lock()
            .images
            .values()
            .find(|i| i.name == name)
            .cloned()
    }

    pub fn get_instance(&self, id: &str) -> Option<Instance> {
        self.inner.lock().instances.get(id).cloned()
    }

    pub fn get_volume(&self, id: &str) -> Option<Volume> {
        self.inner.lock().volumes.get(id).cloned()
    }

    pub fn list_images(&self) -> Vec<Image> {
        self.inner.lock().images.values().cloned().collect()
    }

    pub fn list_instances(&self) -> Vec<Instance> {
        self.inner.lock().instances.values().cloned().collect()
    }

    pub fn list_volumes(&self) -> Vec<Volume> {
        self.inner.lock().volumes.values().cloned().collect()
    }
}

/// Write the collections to a temp file and rename it over `path`.
fn persist(path: &Path, collections: &Collections) -> UnikResult<()> {
    let json = serde_json::to_string_pretty(collections)
        .map_err(|e| UnikError::Storage(format!("serializing state: {}", e)))?;

    let dir = path.parent().ok_or_else(|| {
        UnikError::Storage(format!("state file {} has no parent dir", path.display()))
    })?;
    std::fs::create_dir_all(dir)
        .map_err(|e| UnikError::Storage(format!("creating state dir {}: {}", dir.display(), e)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| UnikError::Storage(format!("creating temp state file: {}", e)))?;
    tmp.write_all(json.as_bytes())
        .map_err(|e| UnikError::Storage(format!("writing temp state file: {}", e)))?;
    tmp.persist(path).map_err(|e| {
        UnikError::Storage(format!("renaming state file into {}: {}", path.display(), e))
    })?;

    tracing::debug!(path = %path.display(), "persisted state");
    Ok(())
}
