use async_trait::async_trait;

use evcal_core::{Error, Result, storage::StorageBackend};

/// Redis 存储实现
#[derive(Debug, Clone)]
pub struct RedisStorage {
    connection: redis::aio::MultiplexedConnection,
    prefix: String,
}

impl RedisStorage {
    /// 创建新的 Redis 存储实例
    pub async fn new(redis_url: &str, prefix: Option<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Storage(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or_else(|| "evcal".to_string()),
        })
    }

    /// 构建带前缀的键
    fn build_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl StorageBackend for RedisStorage {
    async fn set_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        use redis::AsyncCommands;

        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        conn.set::<_, _, ()>(&full_key, value)
            .await
            .map_err(|e| Error::Storage(format!("Failed to set Redis key: {}", e)))?;

        Ok(())
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        use redis::AsyncCommands;

        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        let result: redis::RedisResult<Option<Vec<u8>>> = conn.get(&full_key).await;
        match result {
            Ok(data) => Ok(data),
            Err(e) => Err(Error::Storage(format!("Failed to get Redis key: {}", e))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        use redis::AsyncCommands;

        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        conn.del::<_, ()>(&full_key)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete Redis key: {}", e)))?;

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        use redis::AsyncCommands;

        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        let exists: bool = conn.exists(&full_key).await.map_err(|e| {
            Error::Storage(format!("Failed to check Redis key existence: {}", e))
        })?;

        Ok(exists)
    }
}
