use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, Result, index::CommitmentIndex, index::PersistedIndex};

/// 键值存储后端
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn set_raw(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

#[async_trait]
pub trait Storage: StorageBackend {
    async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Send + Sync,
    {
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| Error::Storage(format!("Failed to serialize value: {}", e)))?;

        self.set_raw(key, &value_bytes).await
    }

    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        if let Some(raw) = self.get_raw(key).await? {
            let value = serde_json::from_slice::<T>(&raw).map_err(|e| {
                Error::Storage(format!("Failed to deserialize value at {}: {}", key, e))
            })?;

            Ok(Some(value))
        } else {
            Ok(None)
        }
    }
}

/// 为所有实现了 StorageBackend 的类型自动实现 Storage
impl<T: StorageBackend> Storage for T {}

/// 进程内存储，重启后数据丢失
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("Memory storage lock poisoned".to_string())
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn set_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().map_err(poisoned)?.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.inner.read().map_err(poisoned)?.contains_key(key))
    }
}

/// 按用户划分命名空间的索引存储
///
/// 每个用户三条记录：条目列表、已提交源ID、源ID到条目ID的映射。
#[derive(Debug, Clone)]
pub struct IndexStore<S: StorageBackend> {
    storage: S,
}

impl<S: StorageBackend> IndexStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn entries_key(user_id: &str) -> String {
        format!("calendar:{}:entries", user_id)
    }

    pub fn committed_key(user_id: &str) -> String {
        format!("calendar:{}:committed_source_ids", user_id)
    }

    pub fn mapping_key(user_id: &str) -> String {
        format!("calendar:{}:source_to_entry_id", user_id)
    }

    /// 读取用户索引，无记录时返回空索引
    pub async fn load(&self, user_id: &str) -> Result<CommitmentIndex> {
        let entries = self
            .storage
            .get(&Self::entries_key(user_id))
            .await?
            .unwrap_or_default();
        let committed_source_ids = self
            .storage
            .get(&Self::committed_key(user_id))
            .await?
            .unwrap_or_default();
        let source_to_entry_id = self
            .storage
            .get(&Self::mapping_key(user_id))
            .await?
            .unwrap_or_default();

        let persisted = PersistedIndex {
            entries,
            committed_source_ids,
            source_to_entry_id,
        };
        tracing::debug!(
            "Loaded calendar index for {}: {} entries",
            user_id,
            persisted.entries.len()
        );

        Ok(CommitmentIndex::from_persisted(persisted))
    }

    /// 按 `order` 依次写入三条记录
    ///
    /// 三次写入不是原子的。加载时会丢弃指向不存在条目的映射和提交记录，
    /// 所以新增条目必须最后写入，删除条目必须最先写入：
    /// 中途失败时存储里最多残留可修复的悬空映射，不会出现没有映射的新条目。
    pub async fn save(
        &self,
        user_id: &str,
        index: &CommitmentIndex,
        order: WriteOrder,
    ) -> Result<()> {
        let persisted = index.to_persisted();
        let entries_key = Self::entries_key(user_id);

        if order == WriteOrder::EntriesFirst {
            self.storage.set(&entries_key, &persisted.entries).await?;
        }
        self.storage
            .set(&Self::committed_key(user_id), &persisted.committed_source_ids)
            .await?;
        self.storage
            .set(&Self::mapping_key(user_id), &persisted.source_to_entry_id)
            .await?;
        if order == WriteOrder::EntriesLast {
            self.storage.set(&entries_key, &persisted.entries).await?;
        }

        tracing::debug!(
            "Saved calendar index for {}: {} entries",
            user_id,
            persisted.entries.len()
        );
        Ok(())
    }
}

/// [`IndexStore::save`] 的写入顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrder {
    /// 条目被删除时使用
    EntriesFirst,
    /// 条目被新增时使用
    EntriesLast,
}
