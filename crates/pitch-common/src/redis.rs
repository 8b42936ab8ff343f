/// Redis cache wrapper with graceful degradation.
///
/// Reads return `Option<T>` and writes return `bool`. On any Redis error the operation logs
/// a warning and degrades to a miss or a no-op, so callers fall through to the source of
/// truth. The service is fully functional without Redis.
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::warn;

use crate::error::CommonError;

#[derive(Clone)]
pub struct RedisCache {
    client: Option<redis::Client>,
}

impl RedisCache {
    /// Build a cache for the given URL. If the URL is `None` or invalid, the cache is
    /// permanently disabled and every operation is a no-op.
    pub fn new(url: Option<&str>) -> Self {
        let client = url.and_then(|u| {
            redis::Client::open(u)
                .inspect_err(|e| warn!(error = %e, url = u, "failed to create redis client, cache disabled"))
                .ok()
        });
        Self { client }
    }

    /// A cache that never connects.
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Test the connection by sending a PING.
    pub async fn is_available(&self) -> bool {
        let Some(Ok(mut conn)) = self.connection().await else {
            return false;
        };
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        result.is_ok()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let Some(Ok(mut conn)) = self.logged_connection().await else {
            return None;
        };
        let value: Option<String> = conn
            .get(key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis GET failed"))
            .ok()?;
        value
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> bool {
        let Some(Ok(mut conn)) = self.logged_connection().await else {
            return false;
        };
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis SETEX failed"))
            .is_ok()
    }

    /// `SET key value NX EX ttl`. Returns `true` only when this call created the key.
    pub async fn set_if_absent_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> bool {
        let Some(Ok(mut conn)) = self.logged_connection().await else {
            return false;
        };
        let reply: Result<Option<String>, _> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await;
        reply
            .inspect_err(|e| warn!(error = %e, key, "redis SET NX failed"))
            .map(|r| r.is_some())
            .unwrap_or(false)
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(Ok(mut conn)) = self.logged_connection().await else {
            return false;
        };
        conn.del::<_, ()>(key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis DEL failed"))
            .is_ok()
    }

    /// `None` when the cache is disabled.
    async fn connection(&self) -> Option<Result<MultiplexedConnection, CommonError>> {
        let client = self.client.as_ref()?;
        Some(
            client
                .get_multiplexed_async_connection()
                .await
                .map_err(CommonError::from),
        )
    }

    async fn logged_connection(&self) -> Option<Result<MultiplexedConnection, CommonError>> {
        let conn = self.connection().await?;
        Some(conn.inspect_err(|e| warn!(error = %e, "redis connection failed")))
    }
}
