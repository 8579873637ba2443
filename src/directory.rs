//! User directory
//!
//! Resolves the authenticated principal (the user's email, as forwarded by the
//! authentication gateway) to an internal user id. Account management lives
//! elsewhere; this service only reads.

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::types::UserId;

/// Directory record for a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl User {
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a principal to a user id
    async fn resolve(&self, principal: &str) -> ApiResult<UserId>;

    /// Fetch a user by id
    async fn lookup(&self, user_id: &UserId) -> ApiResult<User>;
}

/// Directory held in memory, optionally seeded from a JSON file
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<UserId, User>,
    /// Lowercased email -> user id
    email_index: DashMap<String, UserId>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.insert(user);
        }
        directory
    }

    /// Load users from a JSON array file. A missing file yields an empty
    /// directory.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!("Users file {:?} not found, starting with an empty directory", path);
            return Ok(Self::new());
        }

        let json = tokio::fs::read_to_string(path).await?;
        let users: Vec<User> = serde_json::from_str(&json)?;
        let directory = Self::with_users(users);
        tracing::info!("Loaded {} users from {:?}", directory.len(), path);
        Ok(directory)
    }

    pub fn insert(&self, user: User) {
        self.email_index
            .insert(user.email.to_lowercase(), user.id.clone());
        self.users.insert(user.id.clone(), user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn resolve(&self, principal: &str) -> ApiResult<UserId> {
        self.email_index
            .get(&principal.trim().to_lowercase())
            .map(|r| r.value().clone())
            .ok_or_else(|| ApiError::identity_not_found(format!("No user with email {principal}")))
    }

    async fn lookup(&self, user_id: &UserId) -> ApiResult<User> {
        self.users
            .get(user_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| ApiError::identity_not_found(format!("No user with id {user_id}")))
    }
}
