//! Per-bucket behaviour switches.

use serde::{Deserialize, Serialize};

use crate::identity::DEFAULT_MAX_KEY_ATTEMPTS;

/// What a bucket does with a write whose version is lower than the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionPolicy {
    /// Refuse the write with `BucketError::StaleVersion`.
    #[default]
    Reject,
    /// Apply the write and log a warning.
    LastWriterWins,
}

/// Options applied to a bucket at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketOptions {
    /// Maximum key draws per identity generation (default: 8).
    #[serde(default = "default_max_key_attempts")]
    pub max_key_attempts: u32,
    /// Policy for writes carrying a lower version (default: reject).
    #[serde(default)]
    pub version_policy: VersionPolicy,
}

fn default_max_key_attempts() -> u32 {
    DEFAULT_MAX_KEY_ATTEMPTS
}

impl Default for BucketOptions {
    fn default() -> Self {
        Self {
            max_key_attempts: default_max_key_attempts(),
            version_policy: VersionPolicy::default(),
        }
    }
}

impl BucketOptions {
    /// Set the key generation retry cap.
    pub fn with_max_key_attempts(mut self, attempts: u32) -> Self {
        self.max_key_attempts = attempts;
        self
    }

    /// Set the stale-version policy.
    pub fn with_version_policy(mut self, policy: VersionPolicy) -> Self {
        self.version_policy = policy;
        self
    }
}
