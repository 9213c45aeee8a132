use chrono::NaiveDate;

use crate::{
    CalendarEntry, Result, SourceEvent,
    config::CalendarConfig,
    conflict::Conflict,
    manager::{CommitOutcome, CommitmentManager, RemoveOutcome},
    recurrence::RecurrencePattern,
    storage::{IndexStore, StorageBackend},
};

/// 以用户ID为键的日历服务
///
/// 每次调用都从存储加载该用户的索引，执行操作后丢弃管理器。
#[derive(Debug, Clone)]
pub struct CalendarService<S: StorageBackend + Clone> {
    store: IndexStore<S>,
    config: CalendarConfig,
}

impl<S: StorageBackend + Clone> CalendarService<S> {
    pub fn new(storage: S, config: CalendarConfig) -> Self {
        Self {
            store: IndexStore::new(storage),
            config,
        }
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    pub fn store(&self) -> &IndexStore<S> {
        &self.store
    }

    /// 为用户打开一个管理器实例
    pub async fn open(&self, user_id: &str) -> Result<CommitmentManager<S>> {
        CommitmentManager::open(self.store.clone(), user_id, self.config.clone()).await
    }

    pub async fn commit(&self, user_id: &str, event: &SourceEvent) -> CommitOutcome {
        match self.open(user_id).await {
            Ok(mut manager) => manager.commit(event).await,
            Err(e) => {
                tracing::error!("加载 {} 的日历失败: {}", user_id, e);
                CommitOutcome::failed(&e)
            }
        }
    }

    pub async fn remove(&self, user_id: &str, event: &SourceEvent) -> bool {
        self.remove_on_date(user_id, event.date).await.success()
    }

    pub async fn remove_on_date(&self, user_id: &str, date: NaiveDate) -> RemoveOutcome {
        match self.open(user_id).await {
            Ok(mut manager) => manager.remove_on_date(date).await,
            Err(e) => {
                tracing::error!("加载 {} 的日历失败: {}", user_id, e);
                RemoveOutcome::failed(&e)
            }
        }
    }

    pub async fn is_committed(&self, user_id: &str, source_id: &str) -> Result<bool> {
        Ok(self.open(user_id).await?.is_committed(source_id))
    }

    pub async fn entry_for_source(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<Option<CalendarEntry>> {
        Ok(self
            .open(user_id)
            .await?
            .entry_for_source(source_id)
            .cloned())
    }

    pub async fn entries_in_range(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarEntry>> {
        let manager = self.open(user_id).await?;
        Ok(manager.entries_in_range(start, end).cloned().collect())
    }

    pub async fn all_entries(&self, user_id: &str) -> Result<Vec<CalendarEntry>> {
        let manager = self.open(user_id).await?;
        Ok(manager.index().iter().cloned().collect())
    }

    pub async fn check_conflicts(
        &self,
        user_id: &str,
        event: &SourceEvent,
    ) -> Result<Vec<Conflict>> {
        self.open(user_id).await?.check_conflicts(event)
    }

    pub async fn expand_recurrence(
        &self,
        user_id: &str,
        event: &SourceEvent,
        pattern: &RecurrencePattern,
    ) -> Result<usize> {
        // 先校验，规则非法时不必加载索引
        pattern.validate()?;
        self.open(user_id)
            .await?
            .expand_recurrence(event, pattern)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{manager::CommitStatus, storage::MemoryStorage};
    use chrono::Weekday;

    fn service() -> CalendarService<MemoryStorage> {
        CalendarService::new(MemoryStorage::new(), CalendarConfig::default())
    }

    fn event(id: &str, title: &str, date: &str, time: &str) -> SourceEvent {
        SourceEvent::parse(id, title, date, time).unwrap()
    }

    #[tokio::test]
    async fn test_operations_keyed_by_user() {
        let service = service();
        let alpha = event("a", "Alpha", "2024-07-15", "10:00");

        assert_eq!(
            service.commit("alice", &alpha).await.status,
            CommitStatus::Ok
        );
        assert!(service.is_committed("alice", "a").await.unwrap());
        assert!(!service.is_committed("bob", "a").await.unwrap());

        assert_eq!(
            service.commit("alice", &alpha).await.status,
            CommitStatus::AlreadyCommitted
        );
        assert_eq!(
            service.commit("bob", &alpha).await.status,
            CommitStatus::Ok
        );

        let beta = event("b", "Beta", "2024-07-15", "11:00");
        assert_eq!(service.check_conflicts("alice", &beta).await.unwrap().len(), 1);
        assert!(service.check_conflicts("carol", &beta).await.unwrap().is_empty());
        assert_eq!(
            service.commit("alice", &beta).await.status,
            CommitStatus::Conflict
        );

        let july = service
            .entries_in_range(
                "alice",
                NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 7, 31).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(july.len(), 2);

        assert!(service.remove("alice", &alpha).await);
        assert!(!service.is_committed("alice", "b").await.unwrap());
        assert!(service.is_committed("bob", "a").await.unwrap());
        assert!(!service.remove("alice", &alpha).await);
    }

    #[tokio::test]
    async fn test_expand_recurrence_through_service() {
        let service = service();
        let run = event("run", "Morning Run", "2024-07-15", "06:30");

        let created = service
            .expand_recurrence("alice", &run, &RecurrencePattern::weekly([Weekday::Sat]))
            .await
            .unwrap();
        assert_eq!(created, 52);
        assert_eq!(service.all_entries("alice").await.unwrap().len(), 52);

        let entry = service
            .entry_for_source("alice", "run@2024-07-20")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.title, "Morning Run (Recurring)");

        assert!(
            service
                .expand_recurrence("alice", &run, &RecurrencePattern::monthly(0))
                .await
                .is_err()
        );
    }
}
