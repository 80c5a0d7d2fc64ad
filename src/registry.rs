//! In-memory session registry.
//!
//! Allocates collision-free identifiers, owns the cipher engine shared by
//! every record, and converts identifiers to and from the opaque token that
//! is the only externally exposed representation.
//!
//! Token scheme: the 16 raw uuid bytes are AEAD-encrypted under the
//! registry's private key and hex-encoded as `iv ‖ ciphertext ‖ tag`. A
//! token minted under another key or algorithm fails authentication instead
//! of resolving to the wrong session, and external parties can neither learn
//! nor enumerate internal identifiers.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::cipher::CipherEngine;
use crate::codec::{JsonCodec, PayloadCodec};
use crate::config::RegistryConfig;
use crate::error::{CipherError, Result, SessionError};
use crate::record::SessionRecord;
use crate::store::SessionStore;

struct RegistryInner<T> {
    config: RegistryConfig,
    cipher: Arc<CipherEngine>,
    store: Arc<dyn SessionStore>,
    codec: Arc<dyn PayloadCodec<T>>,
    sessions: Mutex<HashMap<Uuid, SessionRecord<T>>>,
}

/// Directory of live sessions, scoped to one cipher key.
///
/// Cheap to clone; all clones share the same map, engine, and backend.
/// Identifier uniqueness is per registry: two registries may allocate the
/// same uuid and never observe each other.
pub struct SessionRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T> Clone for SessionRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Serialize + DeserializeOwned + 'static> SessionRegistry<T> {
    /// Build a registry with the default JSON codec.
    ///
    /// The engine key comes from the config when supplied, otherwise a fresh
    /// one is generated; either way it never leaves the registry.
    pub fn new(
        config: RegistryConfig,
        store: impl SessionStore + 'static,
    ) -> std::result::Result<Self, CipherError> {
        Self::with_codec(config, store, JsonCodec)
    }
}

impl<T: 'static> SessionRegistry<T> {
    /// Build a registry with a caller-supplied payload codec.
    pub fn with_codec(
        config: RegistryConfig,
        store: impl SessionStore + 'static,
        codec: impl PayloadCodec<T> + 'static,
    ) -> std::result::Result<Self, CipherError> {
        let cipher = match config.key.clone() {
            Some(key) => CipherEngine::with_key(config.algorithm, key)?,
            None => {
                let mut engine = CipherEngine::new(config.algorithm);
                engine.generate_key()?;
                engine
            }
        };

        Ok(Self {
            inner: Arc::new(RegistryInner {
                config,
                cipher: Arc::new(cipher),
                store: Arc::new(store),
                codec: Arc::new(codec),
                sessions: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.lock().is_empty()
    }

    /// Allocate a fresh identifier and create its session record.
    ///
    /// Candidate uuids are redrawn until one is absent from the map, so no
    /// two live records of one registry ever share an identifier. The
    /// record's destroy hook removes its map entry, whether destruction came
    /// from the timer or from a caller.
    ///
    /// Must be called within a Tokio runtime (the record arms its timer).
    pub fn create(&self) -> SessionRecord<T> {
        let mut sessions = self.inner.sessions.lock();

        let mut uuid = Uuid::new_v4();
        while sessions.contains_key(&uuid) {
            uuid = Uuid::new_v4();
        }

        let weak: Weak<RegistryInner<T>> = Arc::downgrade(&self.inner);
        let hook = Box::new(move |uuid: Uuid| {
            if let Some(inner) = weak.upgrade() {
                inner.sessions.lock().remove(&uuid);
                trace!(%uuid, "session removed from registry");
            }
        });

        let record = SessionRecord::new(
            uuid,
            self.inner.config.ttl,
            Arc::clone(&self.inner.cipher),
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.codec),
            Some(hook),
        );
        sessions.insert(uuid, record.clone());

        debug!(%uuid, ttl = ?self.inner.config.ttl, "session created");
        record
    }

    /// Encrypt a canonical uuid string into its externally exposed token.
    ///
    /// The text must be five hyphen-separated hex groups of 4/2/2/2/6 bytes;
    /// anything else is rejected as an invalid identifier.
    pub fn uuid_to_hex(&self, uuid: &str) -> Result<String> {
        let raw = parse_uuid_groups(uuid).ok_or(SessionError::InvalidIdentifier)?;
        let payload = self.inner.cipher.encrypt(&raw, None)?;
        Ok(hex::encode(payload.into_bytes()))
    }

    /// Decrypt an externally supplied token back into its identifier.
    ///
    /// Wrong length, bad hex, and failed tag verification all collapse into
    /// one invalid-identifier error; the caller never learns which check
    /// rejected the token.
    pub fn hex_to_uuid(&self, hex_token: &str) -> Result<Uuid> {
        let raw = hex::decode(hex_token).map_err(|_| SessionError::InvalidIdentifier)?;

        let algorithm = self.inner.cipher.algorithm();
        if raw.len() != algorithm.iv_len() + 16 + algorithm.tag_len() {
            return Err(SessionError::InvalidIdentifier);
        }
        let (iv, data) = raw.split_at(algorithm.iv_len());

        let plain = self
            .inner
            .cipher
            .decrypt(iv, data)
            .map_err(|_| SessionError::InvalidIdentifier)?;
        let bytes: [u8; 16] = plain
            .try_into()
            .map_err(|_| SessionError::InvalidIdentifier)?;

        Ok(Uuid::from_bytes(bytes))
    }

    /// Resolve a token to its live record.
    ///
    /// A well-formed token whose session no longer exists yields `None`; a
    /// malformed or forged token is an error.
    pub fn find_by_hex(&self, hex_token: &str) -> Result<Option<SessionRecord<T>>> {
        let uuid = self.hex_to_uuid(hex_token)?;
        Ok(self.find_by_uuid(uuid))
    }

    /// Direct map lookup by identifier.
    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<SessionRecord<T>> {
        self.inner.sessions.lock().get(&uuid).cloned()
    }
}

impl<T> std::fmt::Debug for SessionRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.inner.config)
            .field("sessions", &self.inner.sessions.lock().len())
            .finish()
    }
}

/// Parse canonical `8-4-4-4-12` uuid text into its 16 raw bytes.
fn parse_uuid_groups(uuid: &str) -> Option<[u8; 16]> {
    const GROUP_BYTES: [usize; 5] = [4, 2, 2, 2, 6];

    let mut raw = [0u8; 16];
    let mut offset = 0;
    let mut groups = 0;

    for (i, group) in uuid.split('-').enumerate() {
        let expected = *GROUP_BYTES.get(i)?;
        let bytes = hex::decode(group).ok()?;
        if bytes.len() != expected {
            return None;
        }
        raw[offset..offset + expected].copy_from_slice(&bytes);
        offset += expected;
        groups += 1;
    }

    (groups == 5).then_some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::Algorithm;
    use crate::store::MemStore;

    fn registry() -> SessionRegistry<serde_json::Value> {
        SessionRegistry::new(RegistryConfig::default(), MemStore::new()).unwrap()
    }

    #[test]
    fn parse_uuid_groups_accepts_canonical() {
        let uuid = Uuid::new_v4();
        let raw = parse_uuid_groups(&uuid.to_string()).unwrap();
        assert_eq!(raw, *uuid.as_bytes());
    }

    #[test]
    fn parse_uuid_groups_rejects_malformed() {
        for bad in [
            "",
            "not-a-uuid",
            "123e4567e89b12d3a456426614174000",
            "123e4567-e89b-12d3-a456-42661417400",
            "123e4567-e89b-12d3-a456-4266141740000",
            "123e4567-e89b-12d3-a456-426614174000-ff",
            "123e4567-e89b-12d3-a45g-426614174000",
            "123e4567-e89b-12d3a456-426614174000",
        ] {
            assert!(parse_uuid_groups(bad).is_none(), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn token_round_trip() {
        let reg = registry();
        let uuid = Uuid::new_v4();
        let token = reg.uuid_to_hex(&uuid.to_string()).unwrap();
        assert_eq!(reg.hex_to_uuid(&token).unwrap(), uuid);
    }

    #[tokio::test]
    async fn token_length_matches_layout() {
        let reg = registry();
        let token = reg.uuid_to_hex(&Uuid::new_v4().to_string()).unwrap();
        // (iv 12 + ciphertext 16 + tag 16) bytes, hex-encoded.
        assert_eq!(token.len(), (12 + 16 + 16) * 2);
    }

    #[tokio::test]
    async fn tokens_are_unlinkable() {
        let reg = registry();
        let uuid = Uuid::new_v4().to_string();
        // Fresh iv per encryption: the same uuid never yields the same token.
        assert_ne!(
            reg.uuid_to_hex(&uuid).unwrap(),
            reg.uuid_to_hex(&uuid).unwrap()
        );
    }

    #[tokio::test]
    async fn uuid_to_hex_rejects_malformed() {
        let reg = registry();
        assert!(matches!(
            reg.uuid_to_hex("definitely-not-a-uuid").unwrap_err(),
            SessionError::InvalidIdentifier
        ));
    }

    #[tokio::test]
    async fn hex_to_uuid_rejects_bad_inputs() {
        let reg = registry();
        let almost = "ab".repeat(43);
        for bad in ["", "zz", "deadbeef", almost.as_str()] {
            assert!(matches!(
                reg.hex_to_uuid(bad).unwrap_err(),
                SessionError::InvalidIdentifier
            ));
        }
    }

    #[tokio::test]
    async fn foreign_key_token_is_rejected() {
        let a = registry();
        let b = registry();
        let token = a.uuid_to_hex(&Uuid::new_v4().to_string()).unwrap();
        assert!(matches!(
            b.hex_to_uuid(&token).unwrap_err(),
            SessionError::InvalidIdentifier
        ));
    }

    #[tokio::test]
    async fn create_allocates_distinct_identifiers() {
        let reg = registry();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(reg.create().uuid()));
        }
        assert_eq!(reg.len(), 100);
    }

    #[tokio::test]
    async fn destroy_removes_registry_entry() {
        let reg = registry();
        let record = reg.create();
        let uuid = record.uuid();
        assert!(reg.find_by_uuid(uuid).is_some());

        record.destroy().await.unwrap();
        assert!(reg.find_by_uuid(uuid).is_none());
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn find_by_hex_unknown_session_is_none() {
        let reg = registry();
        let record = reg.create();
        let token = reg.uuid_to_hex(&record.uuid().to_string()).unwrap();

        record.destroy().await.unwrap();
        // Valid token, session gone: None, not an error.
        assert!(reg.find_by_hex(&token).unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_hex_resolves_live_session() {
        let reg = registry();
        let record = reg.create();
        let token = reg.uuid_to_hex(&record.uuid().to_string()).unwrap();

        let found = reg.find_by_hex(&token).unwrap().unwrap();
        assert_eq!(found.uuid(), record.uuid());
    }

    #[tokio::test]
    async fn supplied_key_round_trips_tokens_across_instances() {
        let key = vec![9u8; 32];
        let config = RegistryConfig::default()
            .with_algorithm(Algorithm::ChaCha20Poly1305)
            .with_key(key.clone());
        let a: SessionRegistry<serde_json::Value> =
            SessionRegistry::new(config.clone(), MemStore::new()).unwrap();
        let b: SessionRegistry<serde_json::Value> =
            SessionRegistry::new(config, MemStore::new()).unwrap();

        let uuid = Uuid::new_v4();
        let token = a.uuid_to_hex(&uuid.to_string()).unwrap();
        assert_eq!(b.hex_to_uuid(&token).unwrap(), uuid);
    }

    #[test]
    fn rejects_wrong_key_length_up_front() {
        let config = RegistryConfig::default()
            .with_algorithm(Algorithm::Aes256Gcm)
            .with_key(vec![0u8; 16]);
        let err = SessionRegistry::<serde_json::Value>::new(config, MemStore::new()).unwrap_err();
        assert!(matches!(err, CipherError::InvalidKeyLength { .. }));
    }
}
