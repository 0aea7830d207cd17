//! Key-value store port.
//!
//! Mirrors the handful of Redis primitives the relay needs: sets, strings and
//! hashes. Every operation is independent per key; no transactions.

use async_trait::async_trait;

use crate::Result;

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn add_member(&self, set_key: &str, member: &str) -> Result<()>;
    async fn remove_member(&self, set_key: &str, member: &str) -> Result<()>;
    async fn is_member(&self, set_key: &str, member: &str) -> Result<bool>;
    async fn members(&self, set_key: &str) -> Result<Vec<String>>;

    async fn set_string(&self, key: &str, value: &str) -> Result<()>;
    /// `None` when the key does not exist.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    async fn set_hash_fields(&self, key: &str, fields: &[(&str, &str)]) -> Result<()>;
    /// One entry per requested field, `None` where the field is absent.
    async fn get_hash_fields(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>>;
}
