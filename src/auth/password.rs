//! Password hashing.
//!
//! bcrypt is CPU-bound and not cancellable; callers run it on the blocking
//! pool so it never stalls other requests.

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(#[from] bcrypt::BcryptError);

/// Hash and compare passwords. Comparison never uses plaintext equality.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, PasswordError>;

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError>;
}

pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordError> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        Ok(bcrypt::verify(password, hash)?)
    }
}
