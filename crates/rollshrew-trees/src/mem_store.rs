//! In-memory key-value store

use crate::traits::{BatchLike, KeyValueStoreLike};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Ordered in-memory store. Clones share the same underlying map.
#[derive(Clone, Default, Debug)]
pub struct MemStore {
    db: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        self.db.lock().map_err(|_| anyhow!("mem store lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|db| db.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Operation {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

#[derive(Default)]
pub struct MemStoreBatch {
    operations: Vec<Operation>,
}

impl MemStoreBatch {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl BatchLike for MemStoreBatch {
    fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(&mut self, key: K, value: V) {
        self.operations
            .push(Operation::Put(key.as_ref().to_vec(), value.as_ref().to_vec()));
    }

    fn delete<K: AsRef<[u8]>>(&mut self, key: K) {
        self.operations.push(Operation::Delete(key.as_ref().to_vec()));
    }

    fn default() -> Self {
        Default::default()
    }
}

impl KeyValueStoreLike for MemStore {
    type Batch = MemStoreBatch;
    type Error = anyhow::Error;

    fn write(&mut self, batch: Self::Batch) -> Result<(), Self::Error> {
        let mut db = self.lock()?;
        for operation in batch.operations {
            match operation {
                Operation::Put(key, value) => {
                    db.insert(key, value);
                }
                Operation::Delete(key) => {
                    db.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn get_immutable<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>, Self::Error> {
        let db = self.lock()?;
        Ok(db.get(key.as_ref()).cloned())
    }

    fn put<K, V>(&mut self, key: K, value: V) -> Result<(), Self::Error>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut db = self.lock()?;
        db.insert(key.as_ref().to_vec(), value.as_ref().to_vec());
        Ok(())
    }

    fn delete<K: AsRef<[u8]>>(&mut self, key: K) -> Result<(), Self::Error> {
        let mut db = self.lock()?;
        db.remove(key.as_ref());
        Ok(())
    }

    fn scan_prefix<K: AsRef<[u8]>>(&self, prefix: K) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Self::Error> {
        let prefix = prefix.as_ref();
        let db = self.lock()?;
        Ok(db
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_applies_puts_and_deletes_in_order() {
        let mut store = MemStore::new();
        store.put(b"a/1", b"x").unwrap();
        let mut batch = store.create_batch();
        batch.put(b"a/2", b"y");
        batch.delete(b"a/1");
        batch.put(b"b/1", b"z");
        store.write(batch).unwrap();

        assert_eq!(store.get_immutable(b"a/1").unwrap(), None);
        let scanned = store.scan_prefix(b"a/").unwrap();
        assert_eq!(scanned, vec![(b"a/2".to_vec(), b"y".to_vec())]);
        assert_eq!(store.len(), 2);
    }
}
