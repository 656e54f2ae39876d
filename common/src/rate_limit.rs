use crate::errors::StorageError;
use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

/// Counts events per subject within a window
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SendLimiter: Send + Sync {
    /// Record an event for `subject` if it is under `max_events` in the
    /// window. Returns false when the limit is hit.
    async fn check_rate_limit(
        &self,
        subject: &str,
        max_events: u32,
        window_seconds: u32,
    ) -> Result<bool, StorageError>;

    async fn reset(&self, subject: &str) -> Result<(), StorageError>;
}

/// RateLimiter counts events per key in a sliding window kept in a Redis
/// sorted set
#[derive(Clone)]
pub struct RateLimiter {
    redis_client: redis::Client,
    prefix: String,
}

impl RateLimiter {
    pub fn new(redis_client: redis::Client, prefix: impl Into<String>) -> Self {
        Self {
            redis_client,
            prefix: prefix.into(),
        }
    }

    fn key(&self, subject: &str) -> String {
        format!("rate_limit:{}:{}", self.prefix, subject)
    }
}

#[async_trait]
impl SendLimiter for RateLimiter {
    #[tracing::instrument(skip(self))]
    async fn check_rate_limit(
        &self,
        subject: &str,
        max_events: u32,
        window_seconds: u32,
    ) -> Result<bool, StorageError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let key = self.key(subject);
        let now = chrono::Utc::now().timestamp();
        let window_start = now - window_seconds as i64;

        let _: () = conn.zrembyscore(&key, 0, window_start).await?;
        let count: u32 = conn.zcard(&key).await?;

        if count >= max_events {
            tracing::warn!(
                key = %key,
                count = count,
                max_events = max_events,
                "Rate limit exceeded"
            );
            return Ok(false);
        }

        let event_id = Uuid::new_v4().to_string();
        let _: () = conn.zadd(&key, event_id, now).await?;
        let _: () = conn.expire(&key, (window_seconds + 60) as i64).await?;

        tracing::debug!(key = %key, count = count + 1, "Rate limit check passed");
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    async fn reset(&self, subject: &str) -> Result<(), StorageError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(self.key(subject)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis instance; run with --ignored

    #[tokio::test]
    #[ignore]
    async fn test_rate_limit_allows_then_blocks() {
        let client = redis::Client::open("redis://127.0.0.1:6379").unwrap();
        let limiter = RateLimiter::new(client, "test_sms_code");
        let subject = Uuid::new_v4().to_string();

        assert!(limiter.check_rate_limit(&subject, 2, 60).await.unwrap());
        assert!(limiter.check_rate_limit(&subject, 2, 60).await.unwrap());
        assert!(!limiter.check_rate_limit(&subject, 2, 60).await.unwrap());

        limiter.reset(&subject).await.unwrap();
        assert!(limiter.check_rate_limit(&subject, 2, 60).await.unwrap());
    }

    #[test]
    fn test_keys_are_namespaced() {
        let client = redis::Client::open("redis://127.0.0.1:6379").unwrap();
        let limiter = RateLimiter::new(client, "sms_code");
        assert_eq!(limiter.key("42"), "rate_limit:sms_code:42");
    }
}
