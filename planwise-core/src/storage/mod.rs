//! Local persistence boundaries
//!
//! Two collaborators sit outside the stores:
//! - a **secret store** holding the session token pair, touched only by the
//!   credential store
//! - a **key-value cache** for non-secret state (timers, filter selections)
//!
//! Each has a file-backed implementation for real use and an in-memory one
//! for tests and ephemeral sessions.

mod cache;
mod secret;

pub use cache::{FileCache, KeyValueCache, MemoryCache};
pub use secret::{FileSecretStore, MemorySecretStore, SecretStore, TokenPair};
