//! Moving identity tokens between server and client.
//!
//! Tokens travel primarily in cookies; `Authorization: Bearer` is accepted as
//! a fallback on the way in. Every cookie this module writes, including the
//! clearing variant, is rendered from a single [`CookiePolicy`].

use std::fmt::Write as _;
use std::time::Duration as StdDuration;

use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::Duration;
use thiserror::Error;

use warden_core::{AuthConfig, CookieNames};
use warden_infra::{RevocationError, RevocationStore};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cookie value contains characters not allowed in a header")]
    InvalidCookieValue,

    /// The token being rotated out was already revoked, possibly by a
    /// concurrent rotation of the same token.
    #[error("token was already revoked")]
    AlreadyRevoked,

    #[error(transparent)]
    Revocation(#[from] RevocationError),
}

/// Attributes shared by every cookie the service sets. Every cookie is
/// `SameSite=Strict`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub path: String,
    pub domain: Option<String>,
}

impl CookiePolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            secure: config.secure_cookies(),
            path: "/".to_string(),
            domain: config.cookie_domain.clone(),
        }
    }

    /// Render a `Set-Cookie` value. A non-positive `max_age` renders
    /// `Max-Age=0`, which instructs the client to drop the cookie.
    pub fn render(&self, name: &str, value: &str, max_age: Duration, http_only: bool) -> String {
        let mut cookie = format!("{name}={value}; Path={}", self.path);
        if let Some(domain) = &self.domain {
            let _ = write!(cookie, "; Domain={domain}");
        }
        let _ = write!(cookie, "; Max-Age={}", max_age.num_seconds().max(0));
        if http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie.push_str("; SameSite=Strict");
        cookie
    }
}

/// Where an extracted token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cookie,
    BearerHeader,
}

/// Cookie/header transport for identity and CSRF tokens.
#[derive(Debug, Clone)]
pub struct TokenTransport {
    policy: CookiePolicy,
    names: CookieNames,
    revocations: RevocationStore,
    rotation_ttl: StdDuration,
}

impl TokenTransport {
    pub fn new(config: &AuthConfig, revocations: RevocationStore) -> Self {
        Self {
            policy: CookiePolicy::from_config(config),
            names: config.cookie_names.clone(),
            revocations,
            // Covers the remaining lifetime of any refresh token we issued.
            rotation_ttl: config
                .refresh_token_ttl
                .to_std()
                .unwrap_or(StdDuration::from_secs(1)),
        }
    }

    pub fn policy(&self) -> &CookiePolicy {
        &self.policy
    }

    pub fn names(&self) -> &CookieNames {
        &self.names
    }

    /// Set an HttpOnly cookie carrying `token`.
    pub fn attach(
        &self,
        headers: &mut HeaderMap,
        token: &str,
        name: &str,
        max_age: Duration,
    ) -> Result<(), TransportError> {
        self.set_cookie(headers, name, token, max_age, true)
    }

    /// Set the CSRF cookie. Unlike identity cookies it is readable by page
    /// scripts, which echo it back in the CSRF header.
    pub fn attach_csrf(
        &self,
        headers: &mut HeaderMap,
        csrf_token: &str,
        max_age: Duration,
    ) -> Result<(), TransportError> {
        self.set_cookie(headers, &self.names.csrf, csrf_token, max_age, false)
    }

    /// Expire cookie `name` on the client.
    pub fn clear(&self, headers: &mut HeaderMap, name: &str) -> Result<(), TransportError> {
        let http_only = name != self.names.csrf;
        self.set_cookie(headers, name, "", Duration::zero(), http_only)
    }

    /// The token under cookie `name`, else a bearer token, else `None`.
    pub fn extract(&self, headers: &HeaderMap, name: &str) -> Option<String> {
        self.extract_with_source(headers, name).map(|(token, _)| token)
    }

    pub fn extract_with_source(
        &self,
        headers: &HeaderMap,
        name: &str,
    ) -> Option<(String, TokenSource)> {
        if let Some(token) = cookie_value(headers, name) {
            return Some((token.to_string(), TokenSource::Cookie));
        }
        bearer_token(headers).map(|token| (token.to_string(), TokenSource::BearerHeader))
    }

    /// Revoke `old`, then attach `new` under `name`.
    ///
    /// If revocation fails, or `old` turns out to have been revoked already,
    /// nothing is attached and an error is returned. Blocks on the
    /// revocation round trip.
    pub fn rotate(
        &self,
        headers: &mut HeaderMap,
        old: &str,
        new: &str,
        name: &str,
        max_age: Duration,
    ) -> Result<(), TransportError> {
        if !self.revocations.revoke(old, self.rotation_ttl)? {
            return Err(TransportError::AlreadyRevoked);
        }
        self.attach(headers, new, name, max_age)
    }

    fn set_cookie(
        &self,
        headers: &mut HeaderMap,
        name: &str,
        value: &str,
        max_age: Duration,
        http_only: bool,
    ) -> Result<(), TransportError> {
        let rendered = self.policy.render(name, value, max_age, http_only);
        let value =
            HeaderValue::from_str(&rendered).map_err(|_| TransportError::InvalidCookieValue)?;
        headers.append(SET_COOKIE, value);
        Ok(())
    }
}

/// Value of cookie `name` across all `Cookie` headers. Empty values are
/// treated as absent.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}
