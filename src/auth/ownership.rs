//! Ownership guard for mutating resource operations.

use crate::error::ApiError;
use crate::store::{PostRecord, UserId};

/// A resource with a recorded creator.
pub trait Owned {
    fn owner(&self) -> &UserId;
}

impl Owned for PostRecord {
    fn owner(&self) -> &UserId {
        &self.author_id
    }
}

/// True when `actor` is the recorded owner of `resource`.
pub fn authorize<R: Owned + ?Sized>(resource: &R, actor: &UserId) -> bool {
    resource.owner() == actor
}

/// Like [`authorize`], but yields `Forbidden` with `message` on mismatch.
///
/// Absence of the resource is the caller's concern and is reported before
/// this runs.
pub fn ensure_owner<R: Owned + ?Sized>(
    resource: &R,
    actor: &UserId,
    message: &str,
) -> Result<(), ApiError> {
    if authorize(resource, actor) {
        Ok(())
    } else {
        tracing::warn!(owner = %resource.owner(), actor = %actor, "Ownership check failed");
        Err(ApiError::Forbidden(message.to_string()))
    }
}
