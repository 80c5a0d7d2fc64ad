//! Ephemeral, encrypted, time-bounded session store.
//!
//! Every session is named by a random 128-bit identifier, persisted as an
//! authenticated-encrypted blob, and destroyed after a configurable
//! inactivity timeout unless rewound. The identifier itself never leaves the
//! process: external parties only ever see a token — the identifier
//! encrypted under the registry's private key.
//!
//! # Example
//!
//! ```rust,ignore
//! use sealed_session::{MemStore, RegistryConfig, SessionRegistry};
//! use std::time::Duration;
//!
//! let config = RegistryConfig::new().with_ttl(Duration::from_secs(300));
//! let registry: SessionRegistry<serde_json::Value> =
//!     SessionRegistry::new(config, MemStore::new())?;
//!
//! let record = registry.create();
//! record.save(&serde_json::json!({ "user": "alice" })).await?;
//! let token = registry.uuid_to_hex(&record.uuid().to_string())?;
//! // hand `token` to the client; later:
//! let again = registry.find_by_hex(&token)?.expect("still alive");
//! again.rewind();
//! ```

pub mod cipher;
pub mod codec;
pub mod config;
pub mod error;
pub mod manager;
pub mod record;
pub mod registry;
pub mod store;

pub use cipher::{Algorithm, CipherEngine, CipherPayload};
pub use codec::{CodecError, FnCodec, JsonCodec, PayloadCodec};
pub use config::RegistryConfig;
pub use error::{CipherError, Result, SessionError};
pub use manager::SessionManager;
pub use record::SessionRecord;
pub use registry::SessionRegistry;
pub use store::{FsStore, MemStore, SessionStore, StoreError};
