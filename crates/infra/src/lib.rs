//! Infrastructure layer: token revocation storage.

pub mod revocation;

pub use revocation::{
    InMemoryRevocationBackend, LocalRevocationCache, RevocationBackend, RevocationError,
    RevocationStore, token_fingerprint,
};

#[cfg(feature = "redis")]
pub use revocation::RedisRevocationBackend;
