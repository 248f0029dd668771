// # File Resource Store
//
// File-based implementation of ResourceStore with crash recovery.
//
// ## Purpose
//
// Lets a daemon keep resource declarations and their observed status in a
// single JSON document. Users edit specs in the file and ask the daemon to
// `reload()`; the reconciler writes status back through `patch_status`.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: JSON parse failures on load
// - Automatic backup: Keeps .backup of last known good document
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "resources": [
//     {
//       "metadata": { "name": "home", "namespace": "default" },
//       "spec": { "hostname": "home.example.com", "ddnsService": { ... } },
//       "status": { "lastUpdate": { "failed": false, ... } }
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::Error;
use crate::patch::MergePatch;
use crate::resource::{Hostname, ResourceId};
use crate::store::memory::apply_status_patch;
use crate::traits::resource_store::{ResourceStore, WatchStream};

/// Resource file format version
/// Used for future migration if format changes
const STORE_FILE_VERSION: &str = "1.0";

const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// File-based resource store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use dnsync_core::store::FileResourceStore;
/// use dnsync_core::traits::ResourceStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileResourceStore::new("/var/lib/dnsync/hostnames.json").await?;
///
///     for id in store.list().await? {
///         println!("managing {}", id);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileResourceStore {
    path: PathBuf,
    resources: Arc<RwLock<HashMap<ResourceId, Hostname>>>,
    events: broadcast::Sender<ResourceId>,
}

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(default)]
    resources: Vec<Hostname>,
}

impl FileResourceStore {
    /// Create or load a file resource store
    ///
    /// This will:
    /// 1. Try to load the existing file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with no resources
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let resources = Self::load_with_recovery(&path).await?;
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);

        Ok(Self {
            path,
            resources: Arc::new(RwLock::new(index(resources)?)),
            events,
        })
    }

    /// Re-read the file and apply spec changes
    ///
    /// New resources are added as written. For known resources only the spec
    /// is taken from disk; the in-memory status stays authoritative. Resources
    /// missing from the file are dropped. Every added, changed or removed id is
    /// emitted on the watch stream.
    ///
    /// # Returns
    ///
    /// The ids that changed
    ///
    /// # Errors
    ///
    /// A file that cannot be read or parsed is reported as is. Neither the
    /// in-memory resources nor the file (or its backup) are touched.
    pub async fn reload(&self) -> Result<Vec<ResourceId>, Error> {
        let on_disk = index(Self::load(&self.path).await?)?;
        let mut changed = Vec::new();

        {
            let mut guard = self.resources.write().await;

            guard.retain(|id, _| {
                let keep = on_disk.contains_key(id);
                if !keep {
                    changed.push(id.clone());
                }
                keep
            });

            for (id, hostname) in on_disk {
                match guard.get_mut(&id) {
                    Some(existing) if existing.spec == hostname.spec => {}
                    Some(existing) => {
                        existing.spec = hostname.spec;
                        changed.push(id);
                    }
                    None => {
                        guard.insert(id.clone(), hostname);
                        changed.push(id);
                    }
                }
            }
        }

        changed.sort();
        for id in &changed {
            let _ = self.events.send(id.clone());
        }

        tracing::info!(
            "Reloaded {}: {} resource(s) changed",
            self.path.display(),
            changed.len()
        );
        Ok(changed)
    }

    /// Load resources from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main file
    /// 2. If JSON parse error, try loading backup
    /// 3. If backup also fails, start with no resources
    async fn load_with_recovery(path: &Path) -> Result<Vec<Hostname>, Error> {
        match Self::load(path).await {
            Ok(resources) => {
                tracing::debug!("Loaded {} resource(s) from {}", resources.len(), path.display());
                Ok(resources)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with no resources.");
                    return Ok(Vec::new());
                }

                match Self::load(&backup_path).await {
                    Ok(resources) => {
                        tracing::info!("Recovered {} resource(s) from backup", resources.len());
                        if let Err(restore_err) =
                            Self::restore_from_backup(path, &backup_path).await
                        {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(resources)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with no resources.",
                            backup_err
                        );
                        Ok(Vec::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load resources from file
    ///
    /// Read failures surface as `Error::Store`; parse failures as `Error::Json`.
    async fn load(path: &Path) -> Result<Vec<Hostname>, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.resources)
    }

    /// Write all resources to file atomically
    async fn write(path: &Path, resources: &HashMap<ResourceId, Hostname>) -> Result<(), Error> {
        // Stable order keeps diffs of the file readable
        let ordered: BTreeMap<&ResourceId, &Hostname> = resources.iter().collect();
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            resources: ordered.into_values().cloned().collect(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::store(format!("Failed to serialize resources: {}", e)))?;

        let temp_path = Self::temp_path(path);
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            out.flush().await.map_err(|e| {
                Error::store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if path.exists() {
            let backup_path = Self::backup_path(path);
            if let Err(e) = fs::copy(path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::trace!("Resources written to file: {}", path.display());
        Ok(())
    }

    /// Restore store file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored store file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.to_path_buf();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Index resources by id, rejecting duplicates
fn index(resources: Vec<Hostname>) -> Result<HashMap<ResourceId, Hostname>, Error> {
    let mut map = HashMap::with_capacity(resources.len());
    for hostname in resources {
        let id = hostname.id();
        if map.insert(id.clone(), hostname).is_some() {
            return Err(Error::config(format!("duplicate resource {}", id)));
        }
    }
    Ok(map)
}

#[async_trait]
impl ResourceStore for FileResourceStore {
    async fn get(&self, id: &ResourceId) -> Result<Option<Hostname>, Error> {
        let guard = self.resources.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn patch_status(&self, id: &ResourceId, patch: &MergePatch) -> Result<(), Error> {
        // Memory only takes the patch once the file holds it. The commit runs
        // as its own task so a cancelled caller cannot stop it between the
        // rename and the memory update.
        let mut guard = Arc::clone(&self.resources).write_owned().await;
        let current = guard
            .get(id)
            .ok_or_else(|| Error::not_found(format!("{} no longer exists", id)))?;
        let patched = apply_status_patch(current, patch)?;

        let mut next = guard.clone();
        next.insert(id.clone(), patched);

        let path = self.path.clone();
        let commit = tokio::spawn(async move {
            Self::write(&path, &next).await?;
            *guard = next;
            Ok::<(), Error>(())
        });

        commit
            .await
            .map_err(|e| Error::status_patch(format!("status write task failed: {}", e)))?
            .map_err(|e| Error::status_patch(e.to_string()))
    }

    async fn list(&self) -> Result<Vec<ResourceId>, Error> {
        let guard = self.resources.read().await;
        let mut ids: Vec<ResourceId> = guard.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn watch(&self) -> WatchStream {
        let stream = BroadcastStream::new(self.events.subscribe())
            .filter_map(|event| event.ok());
        Box::pin(stream)
    }
}
