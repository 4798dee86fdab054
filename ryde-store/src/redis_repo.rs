use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter: true while `key` has seen at most `limit` hits in the
    /// current window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// Key for `client` in the window containing `now_secs`.
pub fn rate_limit_key(client: &str, now_secs: i64, window_seconds: i64) -> String {
    let window = now_secs / window_seconds.max(1);
    format!("rate:{}:{}", client, window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_keys() {
        assert_eq!(rate_limit_key("10.0.0.1", 119, 60), "rate:10.0.0.1:1");
        assert_eq!(rate_limit_key("10.0.0.1", 120, 60), "rate:10.0.0.1:2");
        assert_eq!(rate_limit_key("10.0.0.1", 5, 0), "rate:10.0.0.1:5");
    }
}
