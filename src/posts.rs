//! Post lifecycle: create, list, fetch, update, delete.
//!
//! Update and delete hold a per-post lock from the fetch through the
//! ownership check to the store mutation, so two writers on one post are
//! serialized while writers on different posts proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::auth::ensure_owner;
use crate::error::ApiError;
use crate::security::Sanitizer;
use crate::store::{PostId, PostRecord, PostStore, StoreError, UserId, UserStore};
use crate::SharedClock;

pub const TITLE_MAX: usize = 200;
pub const CONTENT_MAX: usize = 10_000;
pub const PAGE_LIMIT_MAX: u64 = 50;
pub const DEFAULT_PAGE_LIMIT: u64 = 10;

const POST_NOT_FOUND: &str = "Post not found";

/// Body of create and update requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthorView {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: PostId,
    pub title: String,
    pub content: String,
    /// `None` when the author record no longer exists.
    pub author: Option<AuthorView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_posts: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    fn new(page: u64, limit: u64, total: u64) -> Self {
        let total_pages = total.div_ceil(limit);
        Self {
            current_page: page,
            total_pages,
            total_posts: total,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<PostView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeletedPost {
    pub id: PostId,
    pub title: String,
}

/// Raw pagination query. Missing values fall back to the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    /// Resolve to `(page, limit)`, rejecting out-of-range values.
    pub fn resolve(&self) -> Result<(u64, u64), ApiError> {
        let page = parse_bounded(self.page.as_deref(), 1, 1, u64::MAX)?;
        let limit = parse_bounded(self.limit.as_deref(), DEFAULT_PAGE_LIMIT, 1, PAGE_LIMIT_MAX)?;
        Ok((page, limit))
    }
}

fn parse_bounded(raw: Option<&str>, default: u64, min: u64, max: u64) -> Result<u64, ApiError> {
    let invalid = || ApiError::validation("Invalid pagination parameters");
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => {
            let value: u64 = raw.parse().map_err(|_| invalid())?;
            if (min..=max).contains(&value) {
                Ok(value)
            } else {
                Err(invalid())
            }
        }
    }
}

/// Parse a path id, rejecting malformed ids before any store access.
pub fn parse_post_id(raw: &str) -> Result<PostId, ApiError> {
    raw.parse().map_err(|_| ApiError::validation("Invalid post ID"))
}

pub struct PostService {
    posts: Arc<dyn PostStore>,
    users: Arc<dyn UserStore>,
    sanitizer: Arc<dyn Sanitizer>,
    locks: DashMap<PostId, Arc<Mutex<()>>>,
    clock: SharedClock,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostStore>,
        users: Arc<dyn UserStore>,
        sanitizer: Arc<dyn Sanitizer>,
        clock: SharedClock,
    ) -> Self {
        Self {
            posts,
            users,
            sanitizer,
            locks: DashMap::new(),
            clock,
        }
    }

    pub async fn create(&self, author: &UserId, input: PostInput) -> Result<PostView, ApiError> {
        let (title, content) = self.validate(input)?;
        let now = self.clock.utc();
        let post = PostRecord {
            id: PostId::new(),
            title,
            content,
            author_id: *author,
            created_at: now,
            updated_at: now,
        };

        let post = self
            .posts
            .insert(post)
            .await
            .map_err(|e| ApiError::from_store(e, "creating post"))?;

        tracing::info!(post_id = %post.id, author = %author, "Post created");
        self.render(post).await
    }

    pub async fn list(&self, page: u64, limit: u64) -> Result<PostPage, ApiError> {
        let page = page.max(1);
        let limit = limit.max(1);
        let total = self
            .posts
            .count()
            .await
            .map_err(|e| ApiError::from_store(e, "fetching posts"))?;

        let offset = usize::try_from((page - 1).saturating_mul(limit)).unwrap_or(usize::MAX);
        let records = self
            .posts
            .list(offset, limit as usize)
            .await
            .map_err(|e| ApiError::from_store(e, "fetching posts"))?;

        let mut authors: HashMap<UserId, Option<AuthorView>> = HashMap::new();
        let mut posts = Vec::with_capacity(records.len());
        for record in records {
            let author = match authors.get(&record.author_id) {
                Some(author) => author.clone(),
                None => {
                    let author = self.author(&record.author_id).await?;
                    authors.insert(record.author_id, author.clone());
                    author
                }
            };
            posts.push(view(record, author));
        }

        Ok(PostPage {
            posts,
            pagination: Pagination::new(page, limit, total as u64),
        })
    }

    pub async fn get(&self, id: &PostId) -> Result<PostView, ApiError> {
        let post = self.fetch(id, "fetching post").await?;
        self.render(post).await
    }

    pub async fn update(
        &self,
        actor: &UserId,
        id: &PostId,
        input: PostInput,
    ) -> Result<PostView, ApiError> {
        let (title, content) = self.validate(input)?;

        let lease = self.lease(id);
        let result = {
            let _guard = lease.lock.lock().await;
            self.update_locked(actor, id, title, content).await
        };
        drop(lease);

        let post = result?;
        tracing::info!(post_id = %post.id, "Post updated");
        self.render(post).await
    }

    pub async fn delete(&self, actor: &UserId, id: &PostId) -> Result<DeletedPost, ApiError> {
        let lease = self.lease(id);
        let result = {
            let _guard = lease.lock.lock().await;
            self.delete_locked(actor, id).await
        };
        drop(lease);

        let removed = result?;
        tracing::info!(post_id = %removed.id, "Post deleted");
        Ok(DeletedPost {
            id: removed.id,
            title: removed.title,
        })
    }

    async fn update_locked(
        &self,
        actor: &UserId,
        id: &PostId,
        title: String,
        content: String,
    ) -> Result<PostRecord, ApiError> {
        let mut post = self.fetch(id, "updating post").await?;
        ensure_owner(&post, actor, "Access denied: You can only edit your own posts")?;

        post.title = title;
        post.content = content;
        post.updated_at = self.clock.utc();

        self.posts.update(post).await.map_err(|e| match e {
            StoreError::NotFound => ApiError::NotFound(POST_NOT_FOUND.into()),
            e => ApiError::from_store(e, "updating post"),
        })
    }

    async fn delete_locked(&self, actor: &UserId, id: &PostId) -> Result<PostRecord, ApiError> {
        let post = self.fetch(id, "deleting post").await?;
        ensure_owner(&post, actor, "Access denied: You can only delete your own posts")?;

        self.posts
            .delete(id)
            .await
            .map_err(|e| ApiError::from_store(e, "deleting post"))?
            .ok_or_else(|| ApiError::NotFound(POST_NOT_FOUND.into()))
    }

    /// Number of per-post locks currently held in the table.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    fn lease(&self, id: &PostId) -> LockLease<'_> {
        LockLease {
            locks: &self.locks,
            id: *id,
            lock: self.locks.entry(*id).or_default().clone(),
        }
    }

    async fn fetch(&self, id: &PostId, context: &'static str) -> Result<PostRecord, ApiError> {
        self.posts
            .find_by_id(id)
            .await
            .map_err(|e| ApiError::from_store(e, context))?
            .ok_or_else(|| ApiError::NotFound(POST_NOT_FOUND.into()))
    }

    async fn author(&self, id: &UserId) -> Result<Option<AuthorView>, ApiError> {
        let user = self
            .users
            .find_by_id(id)
            .await
            .map_err(|e| ApiError::from_store(e, "fetching post author"))?;
        Ok(user.map(|u| AuthorView {
            id: u.id,
            username: u.username,
        }))
    }

    async fn render(&self, post: PostRecord) -> Result<PostView, ApiError> {
        let author = self.author(&post.author_id).await?;
        Ok(view(post, author))
    }

    fn validate(&self, input: PostInput) -> Result<(String, String), ApiError> {
        let title = input
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::validation("Title is required"))?;
        if title.chars().count() > TITLE_MAX {
            return Err(ApiError::validation("Title must be less than 200 characters"));
        }

        let content = input
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::validation("Content is required"))?;
        if content.chars().count() > CONTENT_MAX {
            return Err(ApiError::validation(
                "Content must be less than 10000 characters",
            ));
        }

        Ok((title.to_string(), self.sanitizer.rich_text(content)))
    }
}

fn view(post: PostRecord, author: Option<AuthorView>) -> PostView {
    PostView {
        id: post.id,
        title: post.title,
        content: post.content,
        author,
        created_at: post.created_at,
        updated_at: post.updated_at,
    }
}

/// One request's share of a per-post lock.
///
/// Dropping it removes the table entry once no other request holds or
/// awaits the lock, including when the request is cancelled mid-wait.
struct LockLease<'a> {
    locks: &'a DashMap<PostId, Arc<Mutex<()>>>,
    id: PostId,
    lock: Arc<Mutex<()>>,
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        // The table and this lease account for two references.
        self.locks.remove_if(&self.id, |_, held| {
            Arc::ptr_eq(held, &self.lock) && Arc::strong_count(held) == 2
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::DenylistSanitizer;
    use crate::store::{MemoryStore, UserRecord};
    use crate::test_support::ManualClock;
    use std::time::Duration;

    struct Fixture {
        service: Arc<PostService>,
        store: MemoryStore,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::epoch());
        let store = MemoryStore::new();
        let service = Arc::new(PostService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(DenylistSanitizer::new().unwrap()),
            clock.clone(),
        ));
        Fixture {
            service,
            store,
            clock,
        }
    }

    async fn user(store: &MemoryStore, name: &str) -> UserId {
        let record = UserRecord {
            id: UserId::new(),
            username: name.to_string(),
            password_hash: "x".into(),
            created_at: Utc::now(),
        };
        UserStore::save(store, record).await.unwrap().id
    }

    fn input(title: &str, content: &str) -> PostInput {
        PostInput {
            title: Some(title.to_string()),
            content: Some(content.to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_trims_and_embeds_author() {
        let f = fixture();
        let alice = user(&f.store, "alice").await;

        let post = f
            .service
            .create(&alice, input("  Hello ", " Body<script>x</script> "))
            .await
            .unwrap();

        assert_eq!(post.title, "Hello");
        assert_eq!(post.content, "Body");
        assert_eq!(
            post.author,
            Some(AuthorView {
                id: alice,
                username: "alice".into()
            })
        );
    }

    #[tokio::test]
    async fn test_create_validation() {
        let f = fixture();
        let alice = user(&f.store, "alice").await;
        let cases = [
            (input("   ", "body"), "Title is required"),
            (input(&"t".repeat(201), "body"), "Title must be less than 200 characters"),
            (input("title", ""), "Content is required"),
            (input("title", &"c".repeat(10_001)), "Content must be less than 10000 characters"),
        ];
        for (request, message) in cases {
            let err = f.service.create(&alice, request).await.unwrap_err();
            assert_eq!(err, ApiError::validation(message));
        }
    }

    #[tokio::test]
    async fn test_only_author_may_update_or_delete() {
        let f = fixture();
        let alice = user(&f.store, "alice").await;
        let bob = user(&f.store, "bob").await;
        let post = f.service.create(&alice, input("t", "c")).await.unwrap();

        let err = f
            .service
            .update(&bob, &post.id, input("hijack", "c"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Forbidden("Access denied: You can only edit your own posts".into())
        );

        let err = f.service.delete(&bob, &post.id).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Forbidden("Access denied: You can only delete your own posts".into())
        );

        f.clock.advance(Duration::from_secs(30));
        let updated = f
            .service
            .update(&alice, &post.id, input("new", "body"))
            .await
            .unwrap();
        assert_eq!(updated.title, "new");
        assert!(updated.updated_at > updated.created_at);

        let deleted = f.service.delete(&alice, &post.id).await.unwrap();
        assert_eq!(deleted.title, "new");
        assert_eq!(
            f.service.get(&post.id).await.unwrap_err(),
            ApiError::NotFound("Post not found".into())
        );
        assert_eq!(f.service.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_post_is_not_found_before_ownership() {
        let f = fixture();
        let alice = user(&f.store, "alice").await;
        let err = f.service.delete(&alice, &PostId::new()).await.unwrap_err();
        assert_eq!(err, ApiError::NotFound("Post not found".into()));
    }

    #[tokio::test]
    async fn test_dangling_author_renders_null() {
        let f = fixture();
        let ghost = UserId::new();
        let post = f.service.create(&ghost, input("t", "c")).await.unwrap();
        assert!(post.author.is_none());
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let f = fixture();
        let alice = user(&f.store, "alice").await;
        for i in 0..12 {
            f.service
                .create(&alice, input(&format!("post {i}"), "c"))
                .await
                .unwrap();
            f.clock.advance(Duration::from_secs(1));
        }

        let first = f.service.list(1, 5).await.unwrap();
        assert_eq!(first.posts.len(), 5);
        assert_eq!(first.posts[0].title, "post 11");
        assert_eq!(
            first.pagination,
            Pagination {
                current_page: 1,
                total_pages: 3,
                total_posts: 12,
                has_next: true,
                has_prev: false,
            }
        );

        let last = f.service.list(3, 5).await.unwrap();
        assert_eq!(last.posts.len(), 2);
        assert_eq!(last.posts[1].title, "post 0");
        assert!(!last.pagination.has_next);
        assert!(last.pagination.has_prev);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deletes_remove_once() {
        let f = fixture();
        let alice = user(&f.store, "alice").await;
        let post = f.service.create(&alice, input("t", "c")).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = f.service.clone();
                let id = post.id;
                tokio::spawn(async move { service.delete(&alice, &id).await })
            })
            .collect();

        let mut deleted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => deleted += 1,
                Err(err) => assert_eq!(err, ApiError::NotFound("Post not found".into())),
            }
        }
        assert_eq!(deleted, 1);
        assert_eq!(f.service.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_lock_entry() {
        let f = fixture();
        let alice = user(&f.store, "alice").await;
        let post = f.service.create(&alice, input("t", "c")).await.unwrap();

        let holder = f.service.lease(&post.id);
        let guard = holder.lock.lock().await;

        let waiter = {
            let service = f.service.clone();
            let id = post.id;
            tokio::spawn(async move { service.delete(&alice, &id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.service.lock_count(), 1);

        // The waiter still references the entry, so the holder leaves it.
        drop(guard);
        drop(holder);
        assert_eq!(f.service.lock_count(), 1);

        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert_eq!(f.service.lock_count(), 0);
        assert!(f.service.get(&post.id).await.is_ok());
    }

    #[test]
    fn test_page_query_bounds() {
        let q = |page: Option<&str>, limit: Option<&str>| PageQuery {
            page: page.map(String::from),
            limit: limit.map(String::from),
        };
        assert_eq!(q(None, None).resolve().unwrap(), (1, 10));
        assert_eq!(q(Some("2"), Some("50")).resolve().unwrap(), (2, 50));
        for (page, limit) in [("0", "10"), ("1", "0"), ("1", "51"), ("x", "10"), ("-1", "5")] {
            assert_eq!(
                q(Some(page), Some(limit)).resolve().unwrap_err(),
                ApiError::validation("Invalid pagination parameters")
            );
        }
    }

    #[test]
    fn test_parse_post_id() {
        assert!(parse_post_id(&PostId::new().to_string()).is_ok());
        assert_eq!(
            parse_post_id("123").unwrap_err(),
            ApiError::validation("Invalid post ID")
        );
    }
}
