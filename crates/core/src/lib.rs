//! `warden-core`: shared building blocks for the access-control core.
//!
//! This crate contains no HTTP, storage or crypto concerns: only identifiers,
//! time, configuration and the errors they can produce.

pub mod clock;
pub mod config;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    AuthConfig, AuthConfigBuilder, ConfigError, CookieNames, Environment, RevocationConfig,
    SecretKey,
};
pub use error::CoreError;
pub use id::SubjectId;
