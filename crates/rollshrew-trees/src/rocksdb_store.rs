//! RocksDB implementation of KeyValueStoreLike

use crate::traits::{BatchLike, KeyValueStoreLike};
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct RocksDbStore {
    pub db: Arc<DB>,
}

impl RocksDbStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, rocksdb::Error> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }
}

pub struct RocksDbBatch(pub WriteBatch);

impl BatchLike for RocksDbBatch {
    fn default() -> Self {
        Self(WriteBatch::default())
    }

    fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(&mut self, k: K, v: V) {
        self.0.put(k, v);
    }

    fn delete<K: AsRef<[u8]>>(&mut self, k: K) {
        self.0.delete(k);
    }
}

impl KeyValueStoreLike for RocksDbStore {
    type Batch = RocksDbBatch;
    type Error = rocksdb::Error;

    fn write(&mut self, batch: RocksDbBatch) -> Result<(), Self::Error> {
        self.db.write(batch.0)
    }

    fn get_immutable<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>, Self::Error> {
        self.db.get(key)
    }

    fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(&mut self, key: K, value: V) -> Result<(), Self::Error> {
        self.db.put(key, value)
    }

    fn delete<K: AsRef<[u8]>>(&mut self, key: K) -> Result<(), Self::Error> {
        self.db.delete(key)
    }

    fn scan_prefix<K: AsRef<[u8]>>(&self, prefix: K) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Self::Error> {
        let prefix = prefix.as_ref();
        let mut results = Vec::new();
        let mut iter = self.db.raw_iterator();
        iter.seek(prefix);
        while iter.valid() {
            match (iter.key(), iter.value()) {
                (Some(key), Some(value)) if key.starts_with(prefix) => {
                    results.push((key.to_vec(), value.to_vec()));
                }
                _ => break,
            }
            iter.next();
        }
        iter.status()?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_scan_stops_at_prefix_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RocksDbStore::open(dir.path()).unwrap();
        store.put(b"tree:a", b"1").unwrap();
        store.put(b"tree:b", b"2").unwrap();
        store.put(b"trie:c", b"3").unwrap();
        let mut batch = store.create_batch();
        batch.delete(b"tree:a");
        store.write(batch).unwrap();
        assert_eq!(store.scan_prefix(b"tree:").unwrap(), vec![(b"tree:b".to_vec(), b"2".to_vec())]);
    }
}
