//! Per-session lifecycle object.
//!
//! A record owns one identifier, one expiration timer, and one encrypted
//! blob on the backend. Expiration fires asynchronously between caller
//! operations, so every entry point re-checks the destroyed flag before
//! acting.
//!
//! Accepted race: a `save()` in flight when a concurrent `destroy()` (timer
//! or explicit) completes may or may not leave a blob behind. Destroy wins
//! either way — the identifier is gone from the registry and no token can
//! resolve to it again; a blob written after the delete is orphaned, not
//! resurrected.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::cipher::CipherEngine;
use crate::codec::PayloadCodec;
use crate::error::{Result, SessionError};
use crate::store::{SessionStore, StoreError};

/// Observer invoked at most once, when the record is destroyed.
pub(crate) type DestroyHook = Box<dyn FnOnce(Uuid) + Send + 'static>;

struct RecordInner<T> {
    uuid: Uuid,
    ttl: Duration,
    cipher: Arc<CipherEngine>,
    store: Arc<dyn SessionStore>,
    codec: Arc<dyn PayloadCodec<T>>,
    destroyed: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    on_destroy: Mutex<Option<DestroyHook>>,
}

/// Handle to one live session. Cheap to clone; all clones share state.
///
/// State machine: `ALIVE --(ttl elapses | destroy())--> DESTROYED`, terminal.
/// `rewind()` keeps the record alive and only replaces the timer.
pub struct SessionRecord<T> {
    inner: Arc<RecordInner<T>>,
}

impl<T> Clone for SessionRecord<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> SessionRecord<T> {
    /// Build a record and arm its first expiration timer.
    ///
    /// Must be called within a Tokio runtime.
    pub(crate) fn new(
        uuid: Uuid,
        ttl: Duration,
        cipher: Arc<CipherEngine>,
        store: Arc<dyn SessionStore>,
        codec: Arc<dyn PayloadCodec<T>>,
        on_destroy: Option<DestroyHook>,
    ) -> Self {
        let record = Self {
            inner: Arc::new(RecordInner {
                uuid,
                ttl,
                cipher,
                store,
                codec,
                destroyed: AtomicBool::new(false),
                timer: Mutex::new(None),
                on_destroy: Mutex::new(on_destroy),
            }),
        };
        record.arm_timer();
        record
    }

    /// This session's identifier.
    pub fn uuid(&self) -> Uuid {
        self.inner.uuid
    }

    /// Inactivity timeout applied by every (re)armed timer.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Whether the record has reached its terminal state.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Probe the backend for this session's blob.
    ///
    /// Destroyed records and absent blobs report `false`; any other backend
    /// failure propagates unchanged.
    pub async fn exists(&self) -> Result<bool> {
        if self.is_destroyed() {
            return Ok(false);
        }
        Ok(self.inner.store.exists(self.inner.uuid).await?)
    }

    /// Load and decrypt the persisted payload.
    ///
    /// Returns `None` when the record is destroyed or nothing was saved yet.
    /// Crypto and decode failures collapse into [`SessionError::Corrupted`];
    /// the raw primitive error is never surfaced.
    pub async fn load(&self) -> Result<Option<T>> {
        if self.is_destroyed() {
            return Ok(None);
        }

        let raw = match self.inner.store.read(self.inner.uuid).await {
            Ok(raw) => raw,
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let iv_len = self.inner.cipher.algorithm().iv_len();
        if raw.len() < iv_len {
            return Err(SessionError::Corrupted(format!(
                "blob of {} bytes is shorter than the {iv_len}-byte iv",
                raw.len()
            )));
        }
        let (iv, data) = raw.split_at(iv_len);

        let plain = self
            .inner
            .cipher
            .decrypt(iv, data)
            .map_err(|e| SessionError::Corrupted(e.to_string()))?;
        let value = self
            .inner
            .codec
            .decode(&plain)
            .map_err(|e| SessionError::Corrupted(e.to_string()))?;

        trace!(uuid = %self.inner.uuid, "session payload loaded");
        Ok(Some(value))
    }

    /// Encode, encrypt, and persist a payload as `iv ‖ ciphertext ‖ tag`.
    ///
    /// No-op once destroyed. Codec and crypto failures collapse into
    /// [`SessionError::Corrupted`]; backend I/O errors propagate unchanged.
    pub async fn save(&self, value: &T) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }

        let plain = self
            .inner
            .codec
            .encode(value)
            .map_err(|e| SessionError::Corrupted(e.to_string()))?;
        let payload = self
            .inner
            .cipher
            .encrypt(&plain, None)
            .map_err(|e| SessionError::Corrupted(e.to_string()))?;

        self.inner
            .store
            .write(self.inner.uuid, &payload.into_bytes())
            .await?;

        trace!(uuid = %self.inner.uuid, "session payload saved");
        Ok(())
    }

    /// Destroy the session: cancel the timer, delete the blob if present,
    /// and fire the destroy hook.
    ///
    /// Idempotent and terminal; only the first caller does any work, and the
    /// hook fires exactly once. Hook panics are logged, never propagated.
    /// A backend failure while deleting the blob is returned after the hook
    /// has run, so registry cleanup always completes.
    pub async fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
        }

        let deleted = self.inner.store.delete(self.inner.uuid).await;

        if let Some(hook) = self.inner.on_destroy.lock().take() {
            let uuid = self.inner.uuid;
            if catch_unwind(AssertUnwindSafe(|| hook(uuid))).is_err() {
                warn!(uuid = %uuid, "destroy hook panicked");
            }
        }

        debug!(uuid = %self.inner.uuid, "session destroyed");
        deleted.map_err(SessionError::from)
    }

    /// Cancel the pending expiration timer and schedule a new one for the
    /// full ttl from now.
    ///
    /// Safe to call arbitrarily often; only the most recently armed timer can
    /// fire. No-op once destroyed — rewinding never resurrects a record.
    pub fn rewind(&self) {
        if self.is_destroyed() {
            return;
        }
        trace!(uuid = %self.inner.uuid, ttl = ?self.inner.ttl, "session rewound");
        self.arm_timer();
    }

    /// Replace the expiration timer. The task holds only a weak handle, so a
    /// record dropped by every owner does not linger for its full ttl.
    ///
    /// The old handle is aborted under the timer lock before the replacement
    /// is spawned: at no point do two armed timers exist, so a stale deadline
    /// can never fire against a just-rewound record.
    fn arm_timer(&self) {
        let weak: Weak<RecordInner<T>> = Arc::downgrade(&self.inner);
        let ttl = self.inner.ttl;

        let mut timer = self.inner.timer.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                let record = SessionRecord { inner };
                debug!(uuid = %record.inner.uuid, "session ttl elapsed");
                if let Err(e) = record.destroy().await {
                    warn!(uuid = %record.inner.uuid, error = %e, "expiry cleanup failed");
                }
            }
        }));
    }
}

impl<T> std::fmt::Debug for SessionRecord<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("uuid", &self.inner.uuid)
            .field("ttl", &self.inner.ttl)
            .field("destroyed", &self.inner.destroyed.load(Ordering::SeqCst))
            .finish()
    }
}
