use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU32, Ordering::Relaxed},
};

use log::{info, warn};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::store_entry::StoreEntry;
use crate::video_id::VideoId;

/// Version of the on-disk layout. Bumped whenever the entry format or the
/// fingerprint algorithms change; a mismatch drops every stored entry rather
/// than attempting migration.
pub const SCHEMA_VERSION: u32 = 1;

// Types defining the on-disk format of the store.
#[derive(Serialize, Deserialize)]
struct StoreDiskFormat {
    schema_version: u32,
    entries: HashMap<VideoId, StoreEntry>,
}

/// The in-memory entry map plus its disk persistence. Writers (insert,
/// remove, modify) take the write lock; readers (fetch, scans) share the
/// read lock, so queries run concurrently with each other but never overlap
/// a mutation.
pub struct BaseStore {
    store_path: PathBuf,
    save_threshold: u32,
    modified_count: AtomicU32,
    entries: RwLock<HashMap<VideoId, StoreEntry>>,
}

impl BaseStore {
    /// Load the store at `store_path`, or start empty if no file exists.
    ///
    /// Returns the store and whether existing content was discarded (a
    /// schema version mismatch, or a file that could not be decoded). The
    /// caller is expected to re-sync metadata when that flag is set.
    pub fn open(store_path: PathBuf, save_threshold: u32) -> Result<(Self, bool), StoreError> {
        let (entries, discarded) = Self::load_entries_from_disk(&store_path)?;

        let ret = Self {
            store_path,
            save_threshold,
            modified_count: AtomicU32::new(0),
            entries: RwLock::new(entries),
        };
        Ok((ret, discarded))
    }

    fn load_entries_from_disk(
        store_path: &Path,
    ) -> Result<(HashMap<VideoId, StoreEntry>, bool), StoreError> {
        if !store_path.exists() {
            info!(target: "store_startup", "creating new store file: {}", store_path.display());
            return Ok((HashMap::new(), false));
        }

        let file = std::fs::File::open(store_path).map_err(|e| StoreError::StoreFileIo {
            src: e,
            path: store_path.to_path_buf(),
        })?;

        let reader = std::io::BufReader::new(file);
        let disk_format: StoreDiskFormat = match bincode::deserialize_from(reader) {
            Ok(data) => data,
            Err(e) => {
                // an unreadable store is treated like a version mismatch
                warn!(target: "store_startup",
                    "store file at {} could not be decoded ({e}), discarding it",
                    store_path.display()
                );
                return Ok((HashMap::new(), true));
            }
        };

        if disk_format.schema_version != SCHEMA_VERSION {
            info!(target: "store_startup",
                "store schema version {} does not match current version {SCHEMA_VERSION}, discarding {} entries",
                disk_format.schema_version,
                disk_format.entries.len()
            );
            return Ok((HashMap::new(), true));
        }

        info!(target: "store_startup",
            "loaded store. path: {}, entries: {}",
            store_path.display(),
            disk_format.entries.len()
        );
        Ok((disk_format.entries, false))
    }

    /// Write the store to disk if it has unsaved changes.
    pub fn save(&self) -> Result<(), StoreError> {
        if self.modified_count.load(Relaxed) > 0 {
            self.modified_count.store(0, Relaxed);
            self.save_inner()
        } else {
            Ok(())
        }
    }

    fn save_inner(&self) -> Result<(), StoreError> {
        let io_err = |e: std::io::Error| StoreError::StoreFileIo {
            src: e,
            path: self.store_path.clone(),
        };

        if !self.store_path.exists() {
            if let Some(parent_dir) = self.store_path.parent() {
                std::fs::create_dir_all(parent_dir).map_err(io_err)?;
            }
        }

        // If the application dies while saving we risk losing the store, so
        // save to a temporary file and rename it into place.
        let temp_store_path = self.store_path.with_extension("tmp");

        let readable_entries = self.entries.read();
        info!(target: "store_transactions",
            "saving store at {} with {} entries",
            self.store_path.display(),
            readable_entries.len()
        );

        let temp_file = std::fs::File::create(&temp_store_path).map_err(io_err)?;
        let mut writer = std::io::BufWriter::new(temp_file);

        let disk_format = StoreDiskFormatRef {
            schema_version: SCHEMA_VERSION,
            entries: &readable_entries,
        };
        bincode::serialize_into(&mut writer, &disk_format).map_err(|e| StoreError::Serialization {
            src: format!("{e}"),
            path: self.store_path.clone(),
        })?;

        let temp_file = writer.into_inner().map_err(|e| StoreError::StoreFileIo {
            src: e.into_error(),
            path: self.store_path.clone(),
        })?;
        temp_file.sync_all().map_err(io_err)?;

        std::fs::rename(&temp_store_path, &self.store_path).map_err(io_err)?;
        Ok(())
    }

    /////////////////////////////
    // Wrappers for the entry map.
    /////////////////////////////

    pub fn insert(&self, id: VideoId, entry: StoreEntry) -> Result<(), StoreError> {
        info!(target: "store_insert", "inserting: {id}");
        {
            let mut writable = self.entries.write();
            writable.insert(id, entry);
        }
        self.bump_modified_count()
    }

    pub fn remove(&self, id: &VideoId) -> Result<(), StoreError> {
        info!(target: "store_remove", "removing: {id}");
        {
            let mut writable = self.entries.write();
            writable.remove(id);
        }
        self.bump_modified_count()
    }

    /// Run `mutate` against the entry for `id` under the write lock.
    pub fn modify(
        &self,
        id: &VideoId,
        mutate: impl FnOnce(&mut StoreEntry),
    ) -> Result<(), StoreError> {
        {
            let mut writable = self.entries.write();
            let entry = writable.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
            mutate(entry);
        }
        self.bump_modified_count()
    }

    fn bump_modified_count(&self) -> Result<(), StoreError> {
        let prev_count = self.modified_count.fetch_add(1, Relaxed);
        if prev_count == self.save_threshold.saturating_sub(1) {
            self.modified_count.store(0, Relaxed);
            self.save_inner()
        } else {
            Ok(())
        }
    }

    pub fn fetch(&self, id: &VideoId) -> Result<StoreEntry, StoreError> {
        match self.entries.read().get(id) {
            Some(entry) => Ok(entry.clone()),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    pub fn contains(&self, id: &VideoId) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn ids(&self) -> Vec<VideoId> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Shared read access for scans. Holders block writers but not other
    /// readers.
    pub fn read(&self) -> RwLockReadGuard<'_, HashMap<VideoId, StoreEntry>> {
        self.entries.read()
    }
}

// serialize without cloning the whole entry map
#[derive(Serialize)]
struct StoreDiskFormatRef<'a> {
    schema_version: u32,
    entries: &'a HashMap<VideoId, StoreEntry>,
}
