//! Redis-backed shared revocation store (optional).
//!
//! Each entry is a plain key with an expiry; Redis drops it when the TTL
//! lapses, so no sweeper is needed. A revocation runs `SET key 1 EX ttl NX`
//! and `EXPIRE key ttl GT` in one transaction: the first reports whether the
//! key was new, the second only ever lengthens an existing entry (Redis 7+).
//! Every round trip runs with explicit connect/read/write timeouts.

use std::time::Duration;

use super::{RevocationBackend, RevocationError};

const NAMESPACE: &str = "warden:revoked";

#[derive(Debug, Clone)]
pub struct RedisRevocationBackend {
    client: redis::Client,
    timeout: Duration,
}

impl RedisRevocationBackend {
    pub fn new(redis_url: impl AsRef<str>, timeout: Duration) -> Result<Self, RevocationError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(map_redis_error)?;
        Ok(Self { client, timeout })
    }

    fn key(&self, fingerprint: &str) -> String {
        format!("{NAMESPACE}:{fingerprint}")
    }

    fn connection(&self) -> Result<redis::Connection, RevocationError> {
        let conn = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(map_redis_error)?;
        conn.set_read_timeout(Some(self.timeout))
            .map_err(map_redis_error)?;
        conn.set_write_timeout(Some(self.timeout))
            .map_err(map_redis_error)?;
        Ok(conn)
    }
}

fn map_redis_error(err: redis::RedisError) -> RevocationError {
    if err.is_timeout() {
        RevocationError::Timeout
    } else {
        RevocationError::Backend(err.to_string())
    }
}

impl RevocationBackend for RedisRevocationBackend {
    fn put(&self, key: &str, ttl: Duration) -> Result<bool, RevocationError> {
        let seconds = ttl.as_secs();
        if seconds == 0 {
            return Err(RevocationError::InvalidTtl);
        }

        let key = self.key(key);
        let mut conn = self.connection()?;
        let (created, _extended): (Option<String>, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("EX")
            .arg(seconds)
            .arg("NX")
            .cmd("EXPIRE")
            .arg(&key)
            .arg(seconds)
            .arg("GT")
            .query(&mut conn)
            .map_err(map_redis_error)?;
        Ok(created.is_some())
    }

    fn contains(&self, key: &str) -> Result<bool, RevocationError> {
        let mut conn = self.connection()?;
        redis::cmd("EXISTS")
            .arg(self.key(key))
            .query::<bool>(&mut conn)
            .map_err(map_redis_error)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let backend =
            RedisRevocationBackend::new("redis://127.0.0.1/", Duration::from_millis(50)).unwrap();
        assert_eq!(backend.key("abc"), "warden:revoked:abc");
    }

    #[test]
    fn malformed_url_is_a_backend_error() {
        let err = RedisRevocationBackend::new("not a url", Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, RevocationError::Backend(_)));
    }

    #[test]
    fn unreachable_server_is_an_error_not_a_miss() {
        // Port 1 on localhost is reserved and refuses connections.
        let backend =
            RedisRevocationBackend::new("redis://127.0.0.1:1/", Duration::from_millis(50)).unwrap();
        assert!(backend.contains("abc").is_err());
        assert!(backend.put("abc", Duration::from_secs(5)).is_err());
    }
}
