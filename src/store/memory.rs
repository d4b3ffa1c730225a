//! In-process document store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{PostId, PostRecord, PostStore, StoreError, UserId, UserRecord, UserStore};

/// A thread-safe in-memory store for users and posts.
///
/// Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<UserId, UserRecord>>,
    /// Unique index: normalized username -> id.
    usernames: Arc<DashMap<String, UserId>>,
    posts: Arc<DashMap<PostId, PostRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let Some(id) = self.usernames.get(username).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.get(id).map(|r| r.value().clone()))
    }

    async fn save(&self, user: UserRecord) -> Result<UserRecord, StoreError> {
        // The index entry is held while the record is written, so two
        // concurrent saves of one username cannot both succeed.
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(format!(
                "username {}",
                user.username
            ))),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                Ok(user)
            }
        }
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn find_by_id(&self, id: &PostId) -> Result<Option<PostRecord>, StoreError> {
        Ok(self.posts.get(id).map(|r| r.value().clone()))
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<PostRecord>, StoreError> {
        let mut posts: Vec<PostRecord> = self.posts.iter().map(|r| r.value().clone()).collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.posts.len())
    }

    async fn insert(&self, post: PostRecord) -> Result<PostRecord, StoreError> {
        match self.posts.entry(post.id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(format!("post {}", post.id))),
            Entry::Vacant(slot) => {
                slot.insert(post.clone());
                Ok(post)
            }
        }
    }

    async fn update(&self, post: PostRecord) -> Result<PostRecord, StoreError> {
        match self.posts.get_mut(&post.id) {
            Some(mut existing) => {
                *existing = post.clone();
                Ok(post)
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, id: &PostId) -> Result<Option<PostRecord>, StoreError> {
        Ok(self.posts.remove(id).map(|(_, post)| post))
    }
}
