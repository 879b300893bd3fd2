//! Identity token issuance and verification (HS256-signed JWTs).
//!
//! Verification order is fixed: signature and format first, then expiry, then
//! token type. A token that fails the signature check never reaches the later
//! checks, so forged tokens cannot be used to probe type or expiry behavior.

use std::collections::HashSet;

use chrono::Duration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use warden_core::{AuthConfig, SharedClock};

use crate::claims::{CARRY_OVER, Claims, CarryOver, IdentityClaims, TokenType, validate_window};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    ExpiredToken,

    #[error("unexpected token type: expected {expected}, got {actual}")]
    InvalidTokenType { expected: TokenType, actual: TokenType },
}

/// An opaque signed token string.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Token([REDACTED])")
    }
}

/// Access and refresh tokens minted together at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: Token,
    pub refresh: Token,
}

/// Creates and verifies identity tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    unverified: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    carry_over: CarryOver,
    clock: SharedClock,
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("carry_over", &self.carry_over)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig, clock: SharedClock) -> Self {
        let secret = config.secret.as_bytes();

        // Expiry is checked against the injected clock after the signature,
        // so the library's own wall-clock exp check stays off.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let mut unverified = validation.clone();
        unverified.insecure_disable_signature_validation();
        unverified.required_spec_claims = HashSet::new();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            unverified,
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
            carry_over: CARRY_OVER,
            clock,
        }
    }

    pub fn default_ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        }
    }

    /// Mint a token of `token_type` for `identity`.
    ///
    /// `ttl` overrides the type's default lifetime. A non-positive ttl yields
    /// a token that is already expired; its `iat` is moved back so that
    /// `exp > iat` still holds.
    pub fn issue(
        &self,
        identity: &IdentityClaims,
        token_type: TokenType,
        ttl: Option<Duration>,
    ) -> Result<Token, TokenError> {
        let (sub, email, handle) = identity.validated()?;

        let now = self.clock.now().timestamp();
        let ttl = ttl.unwrap_or_else(|| self.default_ttl(token_type));
        let exp = now.saturating_add(ttl.num_seconds());
        let iat = now.min(exp.saturating_sub(1));

        let claims = Claims {
            sub,
            token_type,
            iat,
            exp,
            jti: Some(Uuid::now_v7().to_string()),
            email,
            handle,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::InvalidClaims(e.to_string()))?;

        tracing::debug!(subject = %claims.sub, token_type = %token_type, exp, "issued token");
        Ok(Token(token))
    }

    /// Mint an access/refresh pair with default lifetimes.
    pub fn issue_pair(&self, identity: &IdentityClaims) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.issue(identity, TokenType::Access, None)?,
            refresh: self.issue(identity, TokenType::Refresh, None)?,
        })
    }

    /// Verify signature, expiry and (optionally) type; return the claims.
    pub fn verify(&self, token: &str, expected: Option<TokenType>) -> Result<Claims, TokenError> {
        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(reason = ?e.kind(), "token rejected");
                TokenError::InvalidToken
            })?
            .claims;

        validate_window(&claims, self.clock.now())?;

        if let Some(expected) = expected {
            if claims.token_type != expected {
                return Err(TokenError::InvalidTokenType {
                    expected,
                    actual: claims.token_type,
                });
            }
        }

        Ok(claims)
    }

    /// Decode claims WITHOUT checking the signature.
    ///
    /// Only for early, non-authorizing decisions such as computing how long a
    /// presented token would remain valid. Never authorize on this result.
    pub fn peek_unverified(&self, token: &str) -> Result<Claims, TokenError> {
        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&[]), &self.unverified)
            .map(|data| data.claims)
            .map_err(|_| TokenError::InvalidToken)
    }

    /// Exchange a valid refresh token for a new access token.
    pub fn refresh(&self, refresh_token: &str) -> Result<Token, TokenError> {
        let claims = self.verify(refresh_token, Some(TokenType::Refresh))?;
        let identity = self.carry_over.carry(&claims);
        self.issue(&identity, TokenType::Access, None)
    }
}
