//! `warden-auth`: token issuance, CSRF proofs and the access policy.
//!
//! This crate is intentionally decoupled from HTTP and storage. Time is read
//! through an injected [`warden_core::Clock`].

pub mod claims;
pub mod csrf;
pub mod directory;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod token;

pub use claims::{CARRY_OVER, CarriedClaim, Claims, CarryOver, IdentityClaims, TokenType};
pub use csrf::{CsrfGuard, CsrfToken, CsrfValidationError};
pub use directory::{AccountRecord, DirectoryError, InMemoryDirectory, PrincipalDirectory};
pub use policy::{
    AccessError, AccessExplanation, Action, DecisionRule, Ownable, ResourceDescriptor,
    ResourceStatus, can_access, explain_access, require_access, require_ownership,
};
pub use principal::{AccountStatus, Identity, Principal};
pub use roles::Role;
pub use token::{Token, TokenError, TokenIssuer, TokenPair};
