//! The embedded key-value store contract and the RocksDB backend.

use crate::error::{Error, Result};
use rocksdb::{DB, Options};
use std::path::Path;

/// An ordered set of puts committed atomically.
///
/// The index never deletes records, so a batch is puts only.
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push((key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.ops
    }
}

/// Contract the index requires from its embedded key-value store.
///
/// `write_batch` must be atomic: either every put becomes visible or none
/// does. Point reads must be read-committed with respect to batch commits;
/// the commit is the index's linearization point.
pub trait Store {
    /// Point read. `Ok(None)` means the key is truly absent, which is
    /// distinct from a read failure.
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Whether the key is present, without reading its value.
    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// Commit a batch atomically.
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// Ordered iteration over keys starting with `prefix`. The cursor is
    /// scoped to a single operation and must not outlive a batch commit.
    fn iterate(
        &self,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_>>;

    /// Size estimate of the backing store in bytes.
    fn estimate_size(&self) -> Result<u64>;
}

impl<T: Store + ?Sized> Store for std::sync::Arc<T> {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).read(key)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        (**self).exists(key)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        (**self).write_batch(batch)
    }

    fn iterate(
        &self,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_>> {
        (**self).iterate(prefix)
    }

    fn estimate_size(&self) -> Result<u64> {
        (**self).estimate_size()
    }
}

/// RocksDB-backed store.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Optimize for a write-once, point-read workload
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        // Enable bloom filters for faster lookups
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }
}

impl Store for RocksStore {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.db.get(key)?.is_some())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for (key, value) in batch.into_ops() {
            rocks_batch.put(key, value);
        }
        Ok(self.db.write(rocks_batch)?)
    }

    fn iterate(
        &self,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_>> {
        let owned_prefix = prefix.to_vec();
        let iter = self
            .db
            .iterator(rocksdb::IteratorMode::From(
                prefix,
                rocksdb::Direction::Forward,
            ))
            .map(|item| {
                item.map(|(key, value)| (key.to_vec(), value.to_vec()))
                    .map_err(Error::from)
            })
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(&owned_prefix),
                Err(_) => true,
            });
        Ok(Box::new(iter))
    }

    fn estimate_size(&self) -> Result<u64> {
        Ok(self
            .db
            .property_int_value("rocksdb.estimate-live-data-size")?
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, RocksStore) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = RocksStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn batch_writes_are_readable() {
        let (_dir, store) = open_temp();

        let mut batch = WriteBatch::new();
        batch.put(&b"ka"[..], &b"va"[..]);
        batch.put(&b"kb"[..], &b"vb"[..]);
        store.write_batch(batch).unwrap();

        assert_eq!(store.read(b"ka").unwrap(), Some(b"va".to_vec()));
        assert!(store.exists(b"kb").unwrap());
        assert_eq!(store.read(b"missing").unwrap(), None);
        assert!(!store.exists(b"missing").unwrap());
    }

    #[test]
    fn overwrite_in_place() {
        let (_dir, store) = open_temp();

        let mut batch = WriteBatch::new();
        batch.put(&b"k"[..], &b"old"[..]);
        store.write_batch(batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(&b"k"[..], &b"new"[..]);
        store.write_batch(batch).unwrap();

        assert_eq!(store.read(b"k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn iteration_is_ordered_and_prefix_scoped() {
        let (_dir, store) = open_temp();

        let mut batch = WriteBatch::new();
        batch.put(&b"t\x00\x00\x00\x02"[..], &b"two"[..]);
        batch.put(&b"t\x00\x00\x00\x01"[..], &b"one"[..]);
        batch.put(&b"s\xab"[..], &b"other"[..]);
        store.write_batch(batch).unwrap();

        let entries: Vec<_> = store
            .iterate(b"t")
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, b"one".to_vec());
        assert_eq!(entries[1].1, b"two".to_vec());
    }
}
