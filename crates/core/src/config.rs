//! Access-control configuration.
//!
//! Built once at startup (usually via [`AuthConfig::from_env`]) and passed by
//! reference into the token issuer, CSRF guard, revocation store and cookie
//! transport. Nothing in the workspace reads process-wide settings on its own.

use chrono::Duration;
use thiserror::Error;

/// Minimum accepted signing secret length, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Secret used when running in development without `WARDEN_SECRET_KEY`.
pub const DEVELOPMENT_SECRET: &str = "insecure-development-secret-do-not-deploy";

/// Well-known placeholder secrets that must never sign production tokens.
const KNOWN_DEFAULT_SECRETS: &[&str] = &[
    DEVELOPMENT_SECRET,
    "your-secret-key-here-change-in-production",
    "changeme-changeme-changeme-changeme",
    "00000000000000000000000000000000",
];

pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 30 * 60;
pub const MAX_ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;
pub const MIN_REFRESH_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
pub const MAX_REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;
pub const DEFAULT_CSRF_MAX_AGE_SECS: i64 = 60 * 60;
pub const DEFAULT_REVOCATION_FALLBACK_CAPACITY: usize = 1_000;
pub const DEFAULT_REVOCATION_TIMEOUT_MS: u64 = 250;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes")]
    SecretTooShort,

    #[error("signing secret is a known default and cannot be used in production")]
    DefaultSecret,
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Deployment environment. Controls the `Secure` cookie attribute and how
/// strictly the signing secret is vetted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "production" | "prod" | "staging" => Ok(Environment::Production),
            other => Err(ConfigError::invalid(
                "WARDEN_ENV",
                format!("unknown environment '{other}'"),
            )),
        }
    }
}

/// Signing secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn is_known_default(&self) -> bool {
        KNOWN_DEFAULT_SECRETS
            .iter()
            .any(|known| known.as_bytes() == self.0.as_slice())
    }
}

impl core::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SecretKey([REDACTED; {}])", self.0.len())
    }
}

/// Cookie names used for the identity and CSRF cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieNames {
    pub access: String,
    pub refresh: String,
    pub csrf: String,
}

impl Default for CookieNames {
    fn default() -> Self {
        Self {
            access: "access_token".to_string(),
            refresh: "refresh_token".to_string(),
            csrf: "csrf_token".to_string(),
        }
    }
}

/// Settings for the revocation store and its shared backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationConfig {
    /// Maximum entries held by the in-process fallback. Zero disables it.
    pub fallback_capacity: usize,
    /// Connect/read/write timeout for the shared store round trip.
    pub timeout: std::time::Duration,
    /// Shared store location (`redis://...`). `None` means in-process only.
    pub redis_url: Option<String>,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            fallback_capacity: DEFAULT_REVOCATION_FALLBACK_CAPACITY,
            timeout: std::time::Duration::from_millis(DEFAULT_REVOCATION_TIMEOUT_MS),
            redis_url: None,
        }
    }
}

/// Fully validated access-control configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret: SecretKey,
    pub environment: Environment,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub cookie_domain: Option<String>,
    pub cookie_names: CookieNames,
    pub csrf_max_age: Duration,
    pub revocation: RevocationConfig,
    /// Listen address of the standalone server.
    pub bind_addr: String,
}

impl AuthConfig {
    pub fn builder(secret: impl Into<Vec<u8>>) -> AuthConfigBuilder {
        AuthConfigBuilder::new(SecretKey::new(secret))
    }

    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Recognized keys: `WARDEN_SECRET_KEY`, `WARDEN_ENV`,
    /// `WARDEN_ACCESS_TOKEN_TTL_SECS`, `WARDEN_REFRESH_TOKEN_TTL_SECS`,
    /// `WARDEN_COOKIE_DOMAIN`, `WARDEN_CSRF_MAX_AGE_SECS`,
    /// `WARDEN_REVOCATION_FALLBACK_CAPACITY`, `WARDEN_REVOCATION_TIMEOUT_MS`,
    /// `WARDEN_REDIS_URL`, `WARDEN_BIND_ADDR`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = match get("WARDEN_ENV") {
            Some(raw) => Environment::parse(&raw)?,
            None => Environment::default(),
        };

        let secret = match get("WARDEN_SECRET_KEY") {
            Some(secret) => secret,
            None if environment.is_development() => {
                tracing::warn!("WARDEN_SECRET_KEY not set; using insecure development secret");
                DEVELOPMENT_SECRET.to_string()
            }
            None => return Err(ConfigError::Missing("WARDEN_SECRET_KEY")),
        };

        let mut builder = AuthConfig::builder(secret.into_bytes()).environment(environment);

        if let Some(raw) = get("WARDEN_ACCESS_TOKEN_TTL_SECS") {
            let ttl = parse_seconds("WARDEN_ACCESS_TOKEN_TTL_SECS", &raw)?;
            builder = builder.access_token_ttl(ttl);
        }
        if let Some(raw) = get("WARDEN_REFRESH_TOKEN_TTL_SECS") {
            let ttl = parse_seconds("WARDEN_REFRESH_TOKEN_TTL_SECS", &raw)?;
            builder = builder.refresh_token_ttl(ttl);
        }
        if let Some(domain) = get("WARDEN_COOKIE_DOMAIN") {
            builder = builder.cookie_domain(domain.trim());
        }
        if let Some(raw) = get("WARDEN_CSRF_MAX_AGE_SECS") {
            let max_age = parse_seconds("WARDEN_CSRF_MAX_AGE_SECS", &raw)?;
            builder = builder.csrf_max_age(max_age);
        }
        if let Some(raw) = get("WARDEN_REVOCATION_FALLBACK_CAPACITY") {
            builder = builder.revocation_fallback_capacity(parse_number(
                "WARDEN_REVOCATION_FALLBACK_CAPACITY",
                &raw,
            )?);
        }
        if let Some(raw) = get("WARDEN_REVOCATION_TIMEOUT_MS") {
            let millis = parse_number("WARDEN_REVOCATION_TIMEOUT_MS", &raw)?;
            builder = builder.revocation_timeout(std::time::Duration::from_millis(millis));
        }
        if let Some(url) = get("WARDEN_REDIS_URL") {
            builder = builder.redis_url(url.trim());
        }
        if let Some(addr) = get("WARDEN_BIND_ADDR") {
            builder = builder.bind_addr(addr.trim());
        }

        builder.build()
    }

    /// Whether cookies carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        !self.environment.is_development()
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(key, e.to_string()))
}

fn parse_seconds(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    Duration::try_seconds(parse_number(key, raw)?)
        .ok_or_else(|| ConfigError::invalid(key, "duration out of range"))
}

/// Builder for [`AuthConfig`]; `build` applies every validation rule.
#[derive(Debug, Clone)]
pub struct AuthConfigBuilder {
    secret: SecretKey,
    environment: Environment,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    cookie_domain: Option<String>,
    cookie_names: CookieNames,
    csrf_max_age: Duration,
    revocation: RevocationConfig,
    bind_addr: String,
}

impl AuthConfigBuilder {
    fn new(secret: SecretKey) -> Self {
        Self {
            secret,
            environment: Environment::default(),
            access_token_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECS),
            cookie_domain: None,
            cookie_names: CookieNames::default(),
            csrf_max_age: Duration::seconds(DEFAULT_CSRF_MAX_AGE_SECS),
            revocation: RevocationConfig::default(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    pub fn refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    pub fn cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    pub fn cookie_names(mut self, names: CookieNames) -> Self {
        self.cookie_names = names;
        self
    }

    pub fn csrf_max_age(mut self, max_age: Duration) -> Self {
        self.csrf_max_age = max_age;
        self
    }

    pub fn revocation_fallback_capacity(mut self, capacity: usize) -> Self {
        self.revocation.fallback_capacity = capacity;
        self
    }

    pub fn revocation_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.revocation.timeout = timeout;
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.revocation.redis_url = Some(url.into());
        self
    }

    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn build(self) -> Result<AuthConfig, ConfigError> {
        if self.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort);
        }
        if !self.environment.is_development() && self.secret.is_known_default() {
            return Err(ConfigError::DefaultSecret);
        }

        let access = self.access_token_ttl.num_seconds();
        if !(1..=MAX_ACCESS_TOKEN_TTL_SECS).contains(&access) {
            return Err(ConfigError::invalid(
                "access_token_ttl",
                format!("must be between 1 and {MAX_ACCESS_TOKEN_TTL_SECS} seconds"),
            ));
        }

        let refresh = self.refresh_token_ttl.num_seconds();
        if !(MIN_REFRESH_TOKEN_TTL_SECS..=MAX_REFRESH_TOKEN_TTL_SECS).contains(&refresh) {
            return Err(ConfigError::invalid(
                "refresh_token_ttl",
                format!(
                    "must be between {MIN_REFRESH_TOKEN_TTL_SECS} and \
                     {MAX_REFRESH_TOKEN_TTL_SECS} seconds"
                ),
            ));
        }

        if self.csrf_max_age.num_seconds() < 1 {
            return Err(ConfigError::invalid("csrf_max_age", "must be at least 1 second"));
        }

        if self.revocation.timeout.is_zero() {
            return Err(ConfigError::invalid("revocation_timeout", "must be non-zero"));
        }

        let names = &self.cookie_names;
        for (key, name) in [
            ("cookie_names.access", &names.access),
            ("cookie_names.refresh", &names.refresh),
            ("cookie_names.csrf", &names.csrf),
        ] {
            if !is_cookie_token(name) {
                let reason = format!("'{name}' is not a valid cookie name");
                return Err(ConfigError::invalid(key, reason));
            }
        }

        Ok(AuthConfig {
            secret: self.secret,
            environment: self.environment,
            access_token_ttl: self.access_token_ttl,
            refresh_token_ttl: self.refresh_token_ttl,
            cookie_domain: self.cookie_domain.filter(|d| !d.is_empty()),
            cookie_names: self.cookie_names,
            csrf_max_age: self.csrf_max_age,
            revocation: self.revocation,
            bind_addr: self.bind_addr,
        })
    }
}

/// RFC 6265 cookie-name token check (visible ASCII minus separators).
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}
