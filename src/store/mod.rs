//! Document storage collaborators.
//!
//! # Data Flow
//! ```text
//! AccountService ──▶ UserStore  (find_by_username, find_by_id, save)
//! PostService    ──▶ PostStore  (find_by_id, list, count, insert, update, delete)
//!                        │
//!                        ▼
//!                  memory.rs (DashMap-backed, selected by `memory://`)
//! ```
//!
//! # Design Decisions
//! - Stores are reached through async traits so a networked backend can be
//!   dropped in without touching the services
//! - Username uniqueness is enforced at write time and surfaces as
//!   `StoreError::DuplicateKey`, never as a panic
//! - Callers translate `StoreError` into the API taxonomy at the call site

pub mod memory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryStore;

/// Identifier of a user record. Also the subject of identity tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of a post record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(Uuid);

impl PostId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PostId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PostId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A registered user. `username` is stored trimmed and lower-cased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A blog post. `author_id` refers to a [`UserRecord`] but does not own it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage-layer failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("record not found")]
    NotFound,

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Credential store.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError>;

    /// Persist a new user; fails with `DuplicateKey` when the username is taken.
    async fn save(&self, user: UserRecord) -> Result<UserRecord, StoreError>;
}

/// Post store.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn find_by_id(&self, id: &PostId) -> Result<Option<PostRecord>, StoreError>;

    /// Posts ordered newest first.
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<PostRecord>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    async fn insert(&self, post: PostRecord) -> Result<PostRecord, StoreError>;

    /// Replace an existing post; fails with `NotFound` if it is gone.
    async fn update(&self, post: PostRecord) -> Result<PostRecord, StoreError>;

    /// Remove a post, returning it if it existed.
    async fn delete(&self, id: &PostId) -> Result<Option<PostRecord>, StoreError>;
}
