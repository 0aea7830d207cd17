use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{errors::Error, store::KvStore, Result};

#[derive(Default)]
struct MemoryInner {
    strings: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// In-process `KvStore`.
///
/// Used by tests and for running the relay without Redis. Set members come back
/// in lexical order. `fail_all(true)` makes every call return `Error::Store`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Store("memory store unavailable".to_string()));
        }
        self.inner
            .lock()
            .map_err(|_| Error::Store("memory store poisoned".to_string()))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn add_member(&self, set_key: &str, member: &str) -> Result<()> {
        self.guard()?
            .sets
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<()> {
        if let Some(set) = self.guard()?.sets.get_mut(set_key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn is_member(&self, set_key: &str, member: &str) -> Result<bool> {
        Ok(self
            .guard()?
            .sets
            .get(set_key)
            .is_some_and(|s| s.contains(member)))
    }

    async fn members(&self, set_key: &str) -> Result<Vec<String>> {
        Ok(self
            .guard()?
            .sets
            .get(set_key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.guard()?
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.guard()?.strings.get(key).cloned())
    }

    async fn set_hash_fields(&self, key: &str, fields: &[(&str, &str)]) -> Result<()> {
        let mut inner = self.guard()?;
        let hash = inner.hashes.entry(key.to_string()).or_default();
        for (f, v) in fields {
            hash.insert(f.to_string(), v.to_string());
        }
        Ok(())
    }

    async fn get_hash_fields(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>> {
        let inner = self.guard()?;
        let hash = inner.hashes.get(key);
        Ok(fields
            .iter()
            .map(|f| hash.and_then(|h| h.get(*f).cloned()))
            .collect())
    }
}
