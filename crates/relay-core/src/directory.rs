//! Known users, block list and cached display names, all kept in the `KvStore`.

use std::sync::Arc;

use crate::{domain::UserId, messaging::types::Sender, store::KvStore, Result};

pub const KNOWN_USERS_KEY: &str = "telegram_bot_users";
pub const BLOCKED_USERS_KEY: &str = "blocked_users";

const FIRST_NAME: &str = "first_name";
const LAST_NAME: &str = "last_name";
const USERNAME: &str = "username";

fn profile_key(user_id: UserId) -> String {
    format!("user:{}", user_id.0)
}

/// Cached `{first_name, last_name, username}` of a user. Empty strings when unknown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// `@username (First Last)`, falling back to the full name, then `Unknown`.
    pub fn display_name(&self) -> String {
        let full = self.full_name();
        match (self.username.is_empty(), full.is_empty()) {
            (false, false) => format!("@{} ({full})", self.username),
            (false, true) => format!("@{}", self.username),
            (true, false) => full,
            (true, true) => "Unknown".to_string(),
        }
    }
}

impl From<&Sender> for UserProfile {
    fn from(s: &Sender) -> Self {
        Self {
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone().unwrap_or_default(),
            username: s.username.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn KvStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Record the sender's profile and, unless blocked, add them to the known set.
    pub async fn observe(&self, sender: &Sender) -> Result<()> {
        self.store_profile(sender.user_id, &UserProfile::from(sender))
            .await?;
        if !self.is_blocked(sender.user_id).await? {
            self.store
                .add_member(KNOWN_USERS_KEY, &sender.user_id.0.to_string())
                .await?;
        }
        Ok(())
    }

    pub async fn store_profile(&self, user_id: UserId, profile: &UserProfile) -> Result<()> {
        self.store
            .set_hash_fields(
                &profile_key(user_id),
                &[
                    (FIRST_NAME, profile.first_name.as_str()),
                    (LAST_NAME, profile.last_name.as_str()),
                    (USERNAME, profile.username.as_str()),
                ],
            )
            .await
    }

    pub async fn profile(&self, user_id: UserId) -> Result<UserProfile> {
        let mut vals = self
            .store
            .get_hash_fields(&profile_key(user_id), &[FIRST_NAME, LAST_NAME, USERNAME])
            .await?
            .into_iter();
        let mut next = || vals.next().flatten().unwrap_or_default();
        Ok(UserProfile {
            first_name: next(),
            last_name: next(),
            username: next(),
        })
    }

    pub async fn is_blocked(&self, user_id: UserId) -> Result<bool> {
        self.store
            .is_member(BLOCKED_USERS_KEY, &user_id.0.to_string())
            .await
    }

    pub async fn block(&self, user_id: UserId) -> Result<()> {
        self.store
            .add_member(BLOCKED_USERS_KEY, &user_id.0.to_string())
            .await
    }

    pub async fn unblock(&self, user_id: UserId) -> Result<()> {
        self.store
            .remove_member(BLOCKED_USERS_KEY, &user_id.0.to_string())
            .await
    }

    /// Blocked users in ascending id order, so pages are stable between renders.
    pub async fn blocked_users(&self) -> Result<Vec<UserId>> {
        self.id_set(BLOCKED_USERS_KEY).await
    }

    pub async fn known_users(&self) -> Result<Vec<UserId>> {
        self.id_set(KNOWN_USERS_KEY).await
    }

    async fn id_set(&self, key: &str) -> Result<Vec<UserId>> {
        let mut ids: Vec<UserId> = self
            .store
            .members(key)
            .await?
            .iter()
            .filter_map(|s| s.trim().parse::<i64>().ok())
            .filter(|id| *id != 0)
            .map(UserId)
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn stats(&self) -> Result<UserStats> {
        let total = self.known_users().await?.len();
        let blocked = self.blocked_users().await?.len();
        Ok(UserStats {
            total,
            blocked,
            active: total.saturating_sub(blocked),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserStats {
    pub total: usize,
    pub active: usize,
    pub blocked: usize,
}
