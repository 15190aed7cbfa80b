//! Content-addressed image tags
//!
//! A tag is `<repository>[-<stage>]:<epoch>-<hash>` where `hash` is a prefix
//! of the SHA-256 of the fully materialized stage text. Identical text always
//! yields the identical tag within one epoch.

use sha2::{Digest, Sha256};

use crate::config::defaults;

/// Hex SHA-256 of `text`
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// ISO week of the current date, e.g. `2026-W42`
pub fn current_epoch() -> String {
    chrono::Utc::now().format("%G-W%V").to_string()
}

/// Tag naming for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagScheme {
    repository: String,
    epoch: String,
}

impl TagScheme {
    /// Create a scheme with an explicit epoch
    pub fn new(repository: &str, epoch: &str) -> Self {
        Self {
            repository: repository.to_string(),
            epoch: epoch.to_string(),
        }
    }

    /// Create a scheme for the current ISO week
    pub fn for_current_week(repository: &str) -> Self {
        Self::new(repository, &current_epoch())
    }

    /// Repository part of the tags
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Epoch part of the tags
    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    /// Tag for a stage's materialized text; `None` names the final image
    pub fn tag(&self, stage: Option<&str>, text: &str) -> String {
        let hash = content_hash(text);
        let short = &hash[..defaults::TAG_HASH_LEN];
        match stage {
            Some(stage) => format!("{}-{stage}:{}-{short}", self.repository, self.epoch),
            None => format!("{}:{}-{short}", self.repository, self.epoch),
        }
    }
}
