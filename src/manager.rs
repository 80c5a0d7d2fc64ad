//! Framework-agnostic transport adapter.
//!
//! One manager tracks the caller's current session and the token issued for
//! it. A framework binding (HTTP cookies, headers, whatever carries the
//! token) sits outside this crate: it hands the inbound token to
//! [`SessionManager::resolve`] and ships whatever [`SessionManager::token`]
//! holds back to the client.

use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::record::SessionRecord;
use crate::registry::SessionRegistry;

/// Tracks one caller's current session and its issued token.
pub struct SessionManager<T> {
    registry: SessionRegistry<T>,
    current: Option<SessionRecord<T>>,
    token: Option<String>,
}

impl<T: 'static> SessionManager<T> {
    /// A manager with no current session.
    pub fn new(registry: SessionRegistry<T>) -> Self {
        Self {
            registry,
            current: None,
            token: None,
        }
    }

    /// Attach to the session an inbound token resolves to.
    ///
    /// Malformed or forged tokens and tokens for sessions that no longer
    /// exist all leave the manager without a current session; the transport
    /// layer should drop its stored token in that case.
    pub fn resolve(registry: SessionRegistry<T>, token: &str) -> Self {
        let mut manager = Self::new(registry);
        match manager.registry.find_by_hex(token) {
            Ok(Some(record)) => {
                manager.current = Some(record);
                manager.token = Some(token.to_string());
            }
            Ok(None) => debug!("token resolved but session is gone"),
            Err(_) => debug!("rejected inbound session token"),
        }
        manager
    }

    /// The current session record, if any.
    pub fn current(&self) -> Option<&SessionRecord<T>> {
        self.current.as_ref()
    }

    /// The token the transport layer should hand to the client.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Identifier of the current session, if any.
    pub fn uuid(&self) -> Option<Uuid> {
        self.current.as_ref().map(SessionRecord::uuid)
    }

    /// Create a fresh session, destroying any prior current one first.
    ///
    /// Returns the record; the newly issued token is available via
    /// [`SessionManager::token`].
    pub async fn create(&mut self) -> Result<SessionRecord<T>> {
        if let Some(previous) = self.current.take() {
            if let Err(e) = previous.destroy().await {
                warn!(uuid = %previous.uuid(), error = %e, "failed to tear down replaced session");
            }
        }
        self.token = None;

        let record = self.registry.create();
        let token = match self.registry.uuid_to_hex(&record.uuid().to_string()) {
            Ok(token) => token,
            Err(e) => {
                // No token means no client can ever reach this session; tear
                // it down instead of leaving it to idle out its ttl.
                if let Err(cleanup) = record.destroy().await {
                    warn!(uuid = %record.uuid(), error = %cleanup, "failed to tear down tokenless session");
                }
                return Err(e);
            }
        };

        self.token = Some(token);
        self.current = Some(record.clone());
        Ok(record)
    }

    /// Tear down the current session and forget its token.
    pub async fn destroy(&mut self) -> Result<()> {
        self.token = None;
        match self.current.take() {
            Some(record) => record.destroy().await,
            None => Ok(()),
        }
    }

    /// Reset the current session's ttl.
    ///
    /// Returns the (token, ttl) pair the transport layer must re-issue so the
    /// client's expiry metadata matches the rewound timer; `None` when there
    /// is no current session.
    pub fn rewind(&self) -> Option<(&str, Duration)> {
        let record = self.current.as_ref()?;
        record.rewind();
        self.token.as_deref().map(|token| (token, record.ttl()))
    }
}

impl<T: 'static> std::fmt::Debug for SessionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("current", &self.current.as_ref().map(SessionRecord::uuid))
            .field("has_token", &self.token.is_some())
            .finish()
    }
}
