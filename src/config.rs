//! Registry configuration.

use std::fmt;
use std::time::Duration;

use crate::cipher::Algorithm;

/// Default inactivity timeout for new sessions.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default AEAD algorithm.
pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::Aes128Ccm;

/// Configuration for a [`SessionRegistry`](crate::SessionRegistry).
#[derive(Clone)]
pub struct RegistryConfig {
    /// AEAD algorithm used for payload blobs and tokens.
    pub algorithm: Algorithm,

    /// Inactivity timeout applied to every session created.
    pub ttl: Duration,

    /// Cipher key. `None` generates a fresh key at registry construction;
    /// a supplied key must match the algorithm's key length.
    pub key: Option<Vec<u8>>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            algorithm: DEFAULT_ALGORITHM,
            ttl: DEFAULT_TTL,
            key: None,
        }
    }
}

impl RegistryConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the AEAD algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the session ttl.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Supply the cipher key instead of generating one.
    pub fn with_key(mut self, key: Vec<u8>) -> Self {
        self.key = Some(key);
        self
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
