//! Authenticated encryption engine.
//!
//! One engine owns one symmetric key and one algorithm selection, shared by
//! every session of a registry. Every encryption draws a fresh random iv:
//! nonce reuse under a fixed key voids the AEAD guarantees of both the CCM
//! and GCM families, so iv freshness is per call, never per key.

use std::fmt;
use std::str::FromStr;

use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::{self, Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use ccm::consts::{U12, U16};
use ccm::Ccm;
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::Zeroizing;

use crate::error::CipherError;

type Aes192Gcm = AesGcm<Aes192, U12>;
type Aes128Ccm = Ccm<Aes128, U16, U12>;
type Aes192Ccm = Ccm<Aes192, U16, U12>;
type Aes256Ccm = Ccm<Aes256, U16, U12>;

// ============================================================================
// Algorithm
// ============================================================================

/// Closed set of supported AEAD algorithms.
///
/// All variants use a 12-byte iv and a 16-byte authentication tag; only the
/// key length varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Aes128Ccm,
    Aes128Gcm,
    Aes192Ccm,
    Aes192Gcm,
    Aes256Ccm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl Algorithm {
    /// Every supported algorithm, in canonical-name order.
    pub const ALL: [Algorithm; 7] = [
        Algorithm::Aes128Ccm,
        Algorithm::Aes128Gcm,
        Algorithm::Aes192Ccm,
        Algorithm::Aes192Gcm,
        Algorithm::Aes256Ccm,
        Algorithm::Aes256Gcm,
        Algorithm::ChaCha20Poly1305,
    ];

    /// Expected key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Algorithm::Aes128Ccm | Algorithm::Aes128Gcm => 16,
            Algorithm::Aes192Ccm | Algorithm::Aes192Gcm => 24,
            Algorithm::Aes256Ccm | Algorithm::Aes256Gcm | Algorithm::ChaCha20Poly1305 => 32,
        }
    }

    /// Iv length in bytes (12 for every supported algorithm).
    pub fn iv_len(self) -> usize {
        12
    }

    /// Authentication tag length in bytes (16 for every supported algorithm).
    pub fn tag_len(self) -> usize {
        16
    }

    /// Canonical textual name.
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Aes128Ccm => "aes-128-ccm",
            Algorithm::Aes128Gcm => "aes-128-gcm",
            Algorithm::Aes192Ccm => "aes-192-ccm",
            Algorithm::Aes192Gcm => "aes-192-gcm",
            Algorithm::Aes256Ccm => "aes-256-ccm",
            Algorithm::Aes256Gcm => "aes-256-gcm",
            Algorithm::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes-128-ccm" => Ok(Algorithm::Aes128Ccm),
            "aes-128-gcm" => Ok(Algorithm::Aes128Gcm),
            "aes-192-ccm" => Ok(Algorithm::Aes192Ccm),
            "aes-192-gcm" => Ok(Algorithm::Aes192Gcm),
            "aes-256-ccm" => Ok(Algorithm::Aes256Ccm),
            "aes-256-gcm" => Ok(Algorithm::Aes256Gcm),
            "chacha20-poly1305" => Ok(Algorithm::ChaCha20Poly1305),
            other => Err(CipherError::InvalidAlgorithm(other.to_string())),
        }
    }
}

// ============================================================================
// CipherPayload
// ============================================================================

/// Output of one encryption: the iv drawn (or supplied) for the call, and the
/// ciphertext with the trailing authentication tag.
#[derive(Debug, Clone)]
pub struct CipherPayload {
    /// Iv used for this encryption.
    pub iv: Vec<u8>,
    /// Ciphertext followed by the 16-byte tag.
    pub data: Vec<u8>,
}

impl CipherPayload {
    /// Concatenate as `iv ‖ ciphertext ‖ tag`, the persisted/wire layout.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = self.iv;
        out.extend_from_slice(&self.data);
        out
    }
}

// ============================================================================
// CipherEngine
// ============================================================================

fn random_bytes(len: usize) -> Result<Vec<u8>, CipherError> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf).map_err(|e| CipherError::RngFailed(e.to_string()))?;
    Ok(buf)
}

fn seal<C: Aead + KeyInit>(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let cipher =
        C::new_from_slice(key).map_err(|e| CipherError::EncryptionFailed(e.to_string()))?;
    cipher
        .encrypt(aead::Nonce::<C>::from_slice(iv), plaintext)
        .map_err(|e| CipherError::EncryptionFailed(e.to_string()))
}

fn open<C: Aead + KeyInit>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher =
        C::new_from_slice(key).map_err(|e| CipherError::DecryptionFailed(e.to_string()))?;
    cipher
        .decrypt(aead::Nonce::<C>::from_slice(iv), data)
        .map_err(|e| CipherError::DecryptionFailed(e.to_string()))
}

/// AEAD engine bound to one algorithm and at most one key.
///
/// The key is effectively immutable once set; concurrent encrypt/decrypt
/// calls only read it. Key material is zeroized when the engine drops.
pub struct CipherEngine {
    algorithm: Algorithm,
    key: Option<Zeroizing<Vec<u8>>>,
}

impl CipherEngine {
    /// Create an engine with no key. Encryption fails until a key is set.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            key: None,
        }
    }

    /// Create an engine with a caller-supplied key.
    ///
    /// A key of the wrong length is rejected before any cipher primitive runs.
    pub fn with_key(algorithm: Algorithm, key: Vec<u8>) -> Result<Self, CipherError> {
        let mut engine = Self::new(algorithm);
        engine.set_key(key)?;
        Ok(engine)
    }

    /// The algorithm this engine was built for.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The current key, if one is set.
    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref().map(Vec::as_slice)
    }

    /// Replace the key, validating its length first.
    pub fn set_key(&mut self, key: Vec<u8>) -> Result<(), CipherError> {
        if key.len() != self.algorithm.key_len() {
            return Err(CipherError::InvalidKeyLength {
                expected: self.algorithm.key_len(),
                got: key.len(),
            });
        }
        self.key = Some(Zeroizing::new(key));
        Ok(())
    }

    /// Overwrite the key with fresh CSPRNG bytes of the algorithm's key length.
    pub fn generate_key(&mut self) -> Result<(), CipherError> {
        self.key = Some(Zeroizing::new(random_bytes(self.algorithm.key_len())?));
        Ok(())
    }

    fn checked_key(&self) -> Result<&[u8], CipherError> {
        let key = self.key.as_deref().ok_or(CipherError::EmptyKey)?;
        if key.len() != self.algorithm.key_len() {
            return Err(CipherError::InvalidKeyLength {
                expected: self.algorithm.key_len(),
                got: key.len(),
            });
        }
        Ok(key)
    }

    fn checked_iv<'a>(&self, iv: &'a [u8]) -> Result<&'a [u8], CipherError> {
        if iv.len() != self.algorithm.iv_len() {
            return Err(CipherError::InvalidIvLength {
                expected: self.algorithm.iv_len(),
                got: iv.len(),
            });
        }
        Ok(iv)
    }

    /// Encrypt `plaintext` with no associated data.
    ///
    /// When `iv` is `None` a fresh random iv is drawn for this call; a
    /// supplied iv is validated against the algorithm's iv length.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        iv: Option<&[u8]>,
    ) -> Result<CipherPayload, CipherError> {
        let key = self.checked_key()?;
        let iv = match iv {
            Some(iv) => self.checked_iv(iv)?.to_vec(),
            None => random_bytes(self.algorithm.iv_len())?,
        };

        let data = match self.algorithm {
            Algorithm::Aes128Ccm => seal::<Aes128Ccm>(key, &iv, plaintext),
            Algorithm::Aes128Gcm => seal::<Aes128Gcm>(key, &iv, plaintext),
            Algorithm::Aes192Ccm => seal::<Aes192Ccm>(key, &iv, plaintext),
            Algorithm::Aes192Gcm => seal::<Aes192Gcm>(key, &iv, plaintext),
            Algorithm::Aes256Ccm => seal::<Aes256Ccm>(key, &iv, plaintext),
            Algorithm::Aes256Gcm => seal::<Aes256Gcm>(key, &iv, plaintext),
            Algorithm::ChaCha20Poly1305 => seal::<ChaCha20Poly1305>(key, &iv, plaintext),
        }?;

        Ok(CipherPayload { iv, data })
    }

    /// Authenticate and decrypt `data` (ciphertext ‖ tag) under `iv`.
    ///
    /// Deterministic: identical (key, iv, data) always yields the same
    /// plaintext or the same failure. Truncated input and tag mismatch are
    /// one "decryption failed" condition.
    pub fn decrypt(&self, iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = self.checked_key()?;
        let iv = self.checked_iv(iv)?;
        if data.len() < self.algorithm.tag_len() {
            return Err(CipherError::DecryptionFailed(format!(
                "input shorter than the {}-byte tag",
                self.algorithm.tag_len()
            )));
        }

        match self.algorithm {
            Algorithm::Aes128Ccm => open::<Aes128Ccm>(key, iv, data),
            Algorithm::Aes128Gcm => open::<Aes128Gcm>(key, iv, data),
            Algorithm::Aes192Ccm => open::<Aes192Ccm>(key, iv, data),
            Algorithm::Aes192Gcm => open::<Aes192Gcm>(key, iv, data),
            Algorithm::Aes256Ccm => open::<Aes256Ccm>(key, iv, data),
            Algorithm::Aes256Gcm => open::<Aes256Gcm>(key, iv, data),
            Algorithm::ChaCha20Poly1305 => open::<ChaCha20Poly1305>(key, iv, data),
        }
    }
}

impl fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherEngine")
            .field("algorithm", &self.algorithm)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(algorithm: Algorithm) -> CipherEngine {
        let mut e = CipherEngine::new(algorithm);
        e.generate_key().unwrap();
        e
    }

    #[test]
    fn key_length_table() {
        assert_eq!(Algorithm::Aes128Ccm.key_len(), 16);
        assert_eq!(Algorithm::Aes128Gcm.key_len(), 16);
        assert_eq!(Algorithm::Aes192Ccm.key_len(), 24);
        assert_eq!(Algorithm::Aes192Gcm.key_len(), 24);
        assert_eq!(Algorithm::Aes256Ccm.key_len(), 32);
        assert_eq!(Algorithm::Aes256Gcm.key_len(), 32);
        assert_eq!(Algorithm::ChaCha20Poly1305.key_len(), 32);
        for alg in Algorithm::ALL {
            assert_eq!(alg.iv_len(), 12);
            assert_eq!(alg.tag_len(), 16);
        }
    }

    #[test]
    fn parse_round_trip() {
        for alg in Algorithm::ALL {
            assert_eq!(alg.as_str().parse::<Algorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let err = "aes-512-gcm".parse::<Algorithm>().unwrap_err();
        assert!(matches!(err, CipherError::InvalidAlgorithm(_)));
    }

    #[test]
    fn encrypt_decrypt_round_trip_all_algorithms() {
        for alg in Algorithm::ALL {
            let e = engine(alg);
            let payload = e.encrypt(b"Hello, World!", None).unwrap();
            assert_eq!(payload.iv.len(), 12);
            assert_eq!(payload.data.len(), 13 + 16);
            let plain = e.decrypt(&payload.iv, &payload.data).unwrap();
            assert_eq!(plain, b"Hello, World!");
        }
    }

    #[test]
    fn fresh_iv_each_call() {
        let e = engine(Algorithm::Aes256Gcm);
        let a = e.encrypt(b"test", None).unwrap();
        let b = e.encrypt(b"test", None).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn supplied_iv_is_used() {
        let e = engine(Algorithm::Aes128Gcm);
        let iv = vec![7u8; 12];
        let payload = e.encrypt(b"pinned", Some(&iv)).unwrap();
        assert_eq!(payload.iv, iv);
        assert_eq!(e.decrypt(&iv, &payload.data).unwrap(), b"pinned");
    }

    #[test]
    fn decrypt_is_deterministic() {
        let e = engine(Algorithm::ChaCha20Poly1305);
        let payload = e.encrypt(b"same in, same out", None).unwrap();
        let first = e.decrypt(&payload.iv, &payload.data).unwrap();
        let second = e.decrypt(&payload.iv, &payload.data).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_wrong_iv_length() {
        let e = engine(Algorithm::Aes128Ccm);
        let err = e.encrypt(b"x", Some(&[0u8; 16])).unwrap_err();
        assert!(matches!(
            err,
            CipherError::InvalidIvLength {
                expected: 12,
                got: 16
            }
        ));
        let err = e.decrypt(&[0u8; 8], &[0u8; 32]).unwrap_err();
        assert!(matches!(err, CipherError::InvalidIvLength { .. }));
    }

    #[test]
    fn rejects_empty_key() {
        let e = CipherEngine::new(Algorithm::Aes256Gcm);
        assert!(matches!(
            e.encrypt(b"x", None).unwrap_err(),
            CipherError::EmptyKey
        ));
        assert!(matches!(
            e.decrypt(&[0u8; 12], &[0u8; 32]).unwrap_err(),
            CipherError::EmptyKey
        ));
    }

    #[test]
    fn rejects_wrong_key_length() {
        let err = CipherEngine::with_key(Algorithm::Aes256Gcm, vec![0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CipherError::InvalidKeyLength {
                expected: 32,
                got: 16
            }
        ));
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        for alg in Algorithm::ALL {
            let e = engine(alg);
            let mut payload = e.encrypt(b"secret", None).unwrap();
            let last = payload.data.len() - 1;
            payload.data[last] ^= 0xff;
            assert!(e.decrypt(&payload.iv, &payload.data).is_err());
        }
    }

    #[test]
    fn rejects_truncated_data() {
        let e = engine(Algorithm::Aes192Gcm);
        let err = e.decrypt(&[0u8; 12], &[0u8; 10]).unwrap_err();
        assert!(matches!(err, CipherError::DecryptionFailed(_)));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let a = engine(Algorithm::Aes192Ccm);
        let b = engine(Algorithm::Aes192Ccm);
        let payload = a.encrypt(b"secret", None).unwrap();
        assert!(b.decrypt(&payload.iv, &payload.data).is_err());
    }

    #[test]
    fn generate_key_overwrites() {
        let mut e = CipherEngine::with_key(Algorithm::Aes128Gcm, vec![1u8; 16]).unwrap();
        let before = e.key().unwrap().to_vec();
        e.generate_key().unwrap();
        assert_ne!(e.key().unwrap(), before.as_slice());
        assert_eq!(e.key().unwrap().len(), 16);
    }

    #[test]
    fn handles_empty_plaintext() {
        let e = engine(Algorithm::Aes256Ccm);
        let payload = e.encrypt(b"", None).unwrap();
        assert_eq!(payload.data.len(), 16);
        assert!(e.decrypt(&payload.iv, &payload.data).unwrap().is_empty());
    }

    #[test]
    fn payload_into_bytes_layout() {
        let e = engine(Algorithm::Aes128Gcm);
        let payload = e.encrypt(b"abc", None).unwrap();
        let iv = payload.iv.clone();
        let data = payload.data.clone();
        let bytes = payload.into_bytes();
        assert_eq!(&bytes[..12], iv.as_slice());
        assert_eq!(&bytes[12..], data.as_slice());
    }

    #[test]
    fn debug_redacts_key() {
        let e = engine(Algorithm::Aes128Gcm);
        let dbg = format!("{:?}", e);
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("key: Some(["));
    }
}
