//! Error types, grouped per concern: cipher configuration and primitives,
//! storage backend I/O, and session/token operations.

use thiserror::Error;

use crate::store::StoreError;

/// Errors from the cipher engine: configuration problems are reported before
/// any primitive runs, primitive failures after.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Unknown cipher algorithm: {0:?}")]
    InvalidAlgorithm(String),

    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid iv length: expected {expected} bytes, got {got}")]
    InvalidIvLength { expected: usize, got: usize },

    #[error("No key set; call generate_key() or supply one")]
    EmptyKey,

    #[error("Random number generation failed: {0}")]
    RngFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

/// Errors from session records and the registry.
///
/// Malformed identifiers, bad token lengths, and failed tag verification all
/// collapse into [`SessionError::InvalidIdentifier`]: the caller learns that
/// the value was rejected, never why.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session identifier or token from outside was rejected.
    #[error("Invalid session identifier")]
    InvalidIdentifier,

    /// A persisted blob failed to decrypt or decode. The message is an
    /// internal diagnostic, not the raw primitive error.
    #[error("Session file corrupted: {0}")]
    Corrupted(String),

    /// Cipher misconfiguration surfaced by a session operation.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// Backend I/O failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for session and registry operations.
pub type Result<T> = std::result::Result<T, SessionError>;
