use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use warden_core::SubjectId;

use crate::TokenError;

/// Kind of identity token. Fixed at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl core::fmt::Display for TokenType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim set carried inside every signed token.
///
/// Wire format: `{sub, type, iat, exp, jti?, email?, handle?}` with
/// `iat`/`exp` as Unix seconds. `jti` makes every issued token distinct, so
/// revoking one never affects a sibling minted in the same second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject / principal identifier.
    pub sub: SubjectId,

    #[serde(rename = "type")]
    pub token_type: TokenType,

    /// Issued-at, Unix seconds.
    pub iat: i64,

    /// Expiration, Unix seconds.
    pub exp: i64,

    /// Unique token id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

impl Claims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Duration {
        let left = self.exp - now.timestamp();
        Duration::seconds(left.max(0))
    }

    /// Identity portion of the claim set.
    pub fn identity(&self) -> IdentityClaims {
        IdentityClaims {
            subject: self.sub.as_str().to_string(),
            email: self.email.clone(),
            handle: self.handle.clone(),
        }
    }
}

/// Deterministically validate the time window of decoded claims.
///
/// Signature verification happens before this is called; see
/// [`crate::TokenIssuer::verify`].
pub fn validate_window(claims: &Claims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.exp <= claims.iat {
        return Err(TokenError::InvalidToken);
    }
    if claims.is_expired_at(now) {
        return Err(TokenError::ExpiredToken);
    }
    Ok(())
}

/// Identity fields supplied by a caller when minting a token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentityClaims {
    pub subject: String,
    pub email: Option<String>,
    pub handle: Option<String>,
}

impl IdentityClaims {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// Validate and normalize into (subject, email, handle).
    pub(crate) fn validated(
        &self,
    ) -> Result<(SubjectId, Option<String>, Option<String>), TokenError> {
        let subject = SubjectId::parse(&self.subject)
            .map_err(|_| TokenError::InvalidClaims("subject is empty".to_string()))?;

        let email = match self.email.as_deref().map(str::trim) {
            None => None,
            Some(email) if is_plausible_email(email) => Some(email.to_string()),
            Some(_) => return Err(TokenError::InvalidClaims("email is malformed".to_string())),
        };

        let handle = match self.handle.as_deref().map(str::trim) {
            None => None,
            Some("") => return Err(TokenError::InvalidClaims("handle is empty".to_string())),
            Some(handle) => Some(handle.to_string()),
        };

        Ok((subject, email, handle))
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Identity field that may be copied from a refresh token into the access
/// token minted from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarriedClaim {
    Subject,
    Email,
    Handle,
}

/// A versioned list of claims carried across refresh.
///
/// Adding a claim to tokens does not make it survive refresh until a new
/// version lists it here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarryOver {
    pub version: u16,
    pub fields: &'static [CarriedClaim],
}

/// Current carry-over list.
pub const CARRY_OVER: CarryOver = CarryOver {
    version: 1,
    fields: &[CarriedClaim::Subject, CarriedClaim::Email, CarriedClaim::Handle],
};

impl CarryOver {
    pub fn includes(&self, field: CarriedClaim) -> bool {
        self.fields.contains(&field)
    }

    /// Project verified claims onto the fields this version carries.
    pub fn carry(&self, from: &Claims) -> IdentityClaims {
        let mut identity = IdentityClaims::default();
        for field in self.fields {
            match field {
                CarriedClaim::Subject => identity.subject = from.sub.as_str().to_string(),
                CarriedClaim::Email => identity.email = from.email.clone(),
                CarriedClaim::Handle => identity.handle = from.handle.clone(),
            }
        }
        identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(iat: i64, exp: i64) -> Claims {
        Claims {
            sub: SubjectId::parse("u1").unwrap(),
            token_type: TokenType::Access,
            iat,
            exp,
            jti: None,
            email: Some("u1@example.com".to_string()),
            handle: Some("uno".to_string()),
        }
    }

    #[test]
    fn wire_format_uses_type_key_and_skips_absent_fields() {
        let mut c = claims(100, 200);
        c.handle = None;
        let json = serde_json::to_value(&c).unwrap();

        assert_eq!(json["sub"], "u1");
        assert_eq!(json["type"], "access");
        assert_eq!(json["iat"], 100);
        assert_eq!(json["exp"], 200);
        assert_eq!(json["email"], "u1@example.com");
        assert!(json.get("handle").is_none());
    }

    #[test]
    fn window_rejects_inverted_timestamps() {
        let now = DateTime::from_timestamp(150, 0).unwrap();
        assert_eq!(validate_window(&claims(200, 200), now), Err(TokenError::InvalidToken));
    }

    #[test]
    fn window_rejects_expired_claims() {
        let at_expiry = DateTime::from_timestamp(200, 0).unwrap();
        assert_eq!(validate_window(&claims(100, 200), at_expiry), Err(TokenError::ExpiredToken));

        let before = DateTime::from_timestamp(199, 0).unwrap();
        assert!(validate_window(&claims(100, 200), before).is_ok());
    }

    #[test]
    fn remaining_lifetime_never_goes_negative() {
        let c = claims(100, 200);
        let at = |secs| DateTime::from_timestamp(secs, 0).unwrap();
        assert_eq!(c.remaining_lifetime(at(150)), Duration::seconds(50));
        assert_eq!(c.remaining_lifetime(at(500)), Duration::zero());
    }

    #[test]
    fn identity_validation_rejects_malformed_fields() {
        assert!(IdentityClaims::new("   ").validated().is_err());
        assert!(IdentityClaims::new("u1").with_email("nope").validated().is_err());
        assert!(IdentityClaims::new("u1").with_email("a@b@c").validated().is_err());
        assert!(IdentityClaims::new("u1").with_handle("  ").validated().is_err());

        let (sub, email, handle) = IdentityClaims::new(" u1 ")
            .with_email(" u1@example.com ")
            .with_handle("uno")
            .validated()
            .unwrap();
        assert_eq!(sub.as_str(), "u1");
        assert_eq!(email.as_deref(), Some("u1@example.com"));
        assert_eq!(handle.as_deref(), Some("uno"));
    }

    #[test]
    fn carry_over_copies_only_listed_fields() {
        let source = claims(100, 200);
        assert_eq!(CARRY_OVER.version, 1);
        assert_eq!(CARRY_OVER.carry(&source), source.identity());

        let subject_only = CarryOver {
            version: 0,
            fields: &[CarriedClaim::Subject],
        };
        let carried = subject_only.carry(&source);
        assert_eq!(carried.subject, "u1");
        assert!(carried.email.is_none());
        assert!(carried.handle.is_none());
        assert!(!subject_only.includes(CarriedClaim::Email));
    }
}
