//! Key-value record stores.
//!
//! Layout of a [`DirStore`] directory:
//! ```text
//! region.meta.json      - format name and schema version
//! records/
//!   00000000000000002c.rec - one file per key, named by the hex-encoded key
//! ```

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Current schema version of a `DirStore` directory.
const STORE_SCHEMA_VERSION: u32 = 1;
const STORE_FORMAT: &str = "chunk-kv";
const META_FILE: &str = "region.meta.json";
const RECORDS_DIR: &str = "records";

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema version mismatch: store has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("unsupported store format '{0}'")]
    UnsupportedFormat(String),
    #[error("empty key")]
    EmptyKey,
}

/// Byte-keyed record storage backing one region.
///
/// Implementations use interior mutability: handles are shared between the
/// host's generation pipeline and the existence probe on a single thread.
pub trait KeyValueStore {
    /// Read the record stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value` under `key`, replacing any previous record.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Whether a record exists under `key`.
    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Shared reference to one live storage instance.
///
/// The epoch identifies the instance: a region that reloads its storage gets
/// a new epoch, which tells holders of the old handle to re-acquire.
#[derive(Clone)]
pub struct StorageHandle {
    epoch: u64,
    store: Rc<dyn KeyValueStore>,
}

impl StorageHandle {
    pub fn new(epoch: u64, store: Rc<dyn KeyValueStore>) -> Self {
        Self { epoch, store }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// In-memory record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RefCell<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.borrow().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        self.records.borrow_mut().insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

/// Metadata stored in region.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub format: String,
    pub schema_version: u32,
}

/// Directory-backed record store with schema versioning.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
    meta: StoreMeta,
}

impl DirStore {
    /// Open or create a store at the given path.
    ///
    /// Fails closed when an existing directory carries a different format or
    /// schema version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(RECORDS_DIR))?;

        let meta_path = root.join(META_FILE);
        let meta = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.format != STORE_FORMAT {
                return Err(StoreError::UnsupportedFormat(meta.format));
            }
            if meta.schema_version != STORE_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: STORE_SCHEMA_VERSION,
                });
            }
            meta
        } else {
            let meta = StoreMeta {
                format: STORE_FORMAT.to_string(),
                schema_version: STORE_SCHEMA_VERSION,
            };
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            tracing::debug!(path = %root.display(), "created record store");
            meta
        };

        Ok(Self { root, meta })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    /// Number of records on disk.
    pub fn record_count(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        for entry in std::fs::read_dir(self.root.join(RECORDS_DIR))? {
            if entry?.path().extension().is_some_and(|ext| ext == "rec") {
                count += 1;
            }
        }
        Ok(count)
    }

    fn record_path(&self, key: &[u8]) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        Ok(self
            .root
            .join(RECORDS_DIR)
            .join(format!("{}.rec", hex::encode(key))))
    }
}

impl KeyValueStore for DirStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(self.record_path(key)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        std::fs::write(self.record_path(key)?, value)?;
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.record_path(key)?.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{ChunkDataKey, chunk_key};
    use pregen_common::CellCoord;

    #[test]
    fn memory_store_put_get() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        let key = chunk_key(CellCoord::new(1, 1), ChunkDataKey::NewVersion);
        assert_eq!(store.get(&key).unwrap(), None);
        store.put(&key, &[9]).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(vec![9]));
        assert!(store.contains(&key).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_store_rejects_empty_key() {
        let store = MemoryStore::new();
        assert!(matches!(store.put(&[], &[1]), Err(StoreError::EmptyKey)));
    }

    #[test]
    fn handle_exposes_epoch_and_store() {
        let store = Rc::new(MemoryStore::new());
        store.put(b"k", b"v").unwrap();
        let handle = StorageHandle::new(7, store);
        assert_eq!(handle.epoch(), 7);
        assert!(handle.store().contains(b"k").unwrap());
    }

    #[test]
    fn dir_store_open_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::open(tmp.path().join("overworld")).unwrap();
        assert!(store.root().join("records").is_dir());
        assert!(store.root().join("region.meta.json").is_file());
        assert_eq!(store.meta().schema_version, STORE_SCHEMA_VERSION);
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn dir_store_records_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("overworld");
        let key = chunk_key(CellCoord::new(-3, 8), ChunkDataKey::OldVersion);

        {
            let store = DirStore::open(&path).unwrap();
            store.put(&key, &[1, 2, 3]).unwrap();
        }

        let store = DirStore::open(&path).unwrap();
        assert!(store.contains(&key).unwrap());
        assert_eq!(store.get(&key).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.record_count().unwrap(), 1);

        let missing = chunk_key(CellCoord::new(-3, 8), ChunkDataKey::NewVersion);
        assert!(!store.contains(&missing).unwrap());
        assert_eq!(store.get(&missing).unwrap(), None);
    }

    #[test]
    fn dir_store_schema_mismatch_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("overworld");
        let _store = DirStore::open(&path).unwrap();

        let meta_path = path.join("region.meta.json");
        let mut meta: StoreMeta =
            serde_json::from_reader(std::fs::File::open(&meta_path).unwrap()).unwrap();
        meta.schema_version = 999;
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path).unwrap(), &meta).unwrap();

        match DirStore::open(&path) {
            Err(StoreError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, STORE_SCHEMA_VERSION);
            }
            Err(e) => panic!("expected SchemaMismatch, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn dir_store_foreign_format_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("anvil");
        std::fs::create_dir_all(&path).unwrap();
        let meta = StoreMeta {
            format: "anvil".into(),
            schema_version: STORE_SCHEMA_VERSION,
        };
        serde_json::to_writer(std::fs::File::create(path.join("region.meta.json")).unwrap(), &meta)
            .unwrap();

        assert!(matches!(
            DirStore::open(&path),
            Err(StoreError::UnsupportedFormat(f)) if f == "anvil"
        ));
    }

    #[test]
    fn dir_store_names_records_by_hex_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::open(tmp.path().join("world")).unwrap();
        let key = chunk_key(CellCoord::new(-1, 2), ChunkDataKey::OldVersion);
        store.put(&key, &[1]).unwrap();

        let path = store.root().join(RECORDS_DIR).join("ffffffff0200000076.rec");
        assert!(path.is_file());
        assert_eq!(store.record_count().unwrap(), 1);
    }
}
