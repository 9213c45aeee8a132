use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    CalendarEntry, Error, RecurrenceTag, Result, SourceEvent,
    config::{CalendarConfig, PersistPolicy},
    conflict::{Candidate, Conflict, find_conflicts},
    index::{CommitmentIndex, EntriesInRange},
    recurrence::RecurrencePattern,
    storage::{IndexStore, StorageBackend, WriteOrder},
};


/// 提交结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitStatus {
    Ok,
    /// 已提交，但与已有条目时间重叠（仅提示，不阻止）
    Conflict,
    /// 源活动已提交过，未做任何修改
    AlreadyCommitted,
    /// 持久化失败
    Failed,
}

impl CommitStatus {
    /// 是否生成了新条目
    pub fn is_committed(self) -> bool {
        matches!(self, Self::Ok | Self::Conflict)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub status: CommitStatus,
    /// 新生成（或已存在）的条目ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Conflict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommitOutcome {
    fn new(status: CommitStatus, entry_id: Option<String>) -> Self {
        Self {
            status,
            entry_id,
            conflicts: Vec::new(),
            error: None,
        }
    }

    pub fn failed(error: &Error) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(CommitStatus::Failed, None)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOutcome {
    pub removed: Vec<CalendarEntry>,
    pub released_source_ids: Vec<String>,
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemoveOutcome {
    pub fn failed(error: &Error) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    /// 有条目被删除且已持久化
    pub fn success(&self) -> bool {
        !self.removed.is_empty() && self.persisted
    }
}

/// 单个用户的日历提交管理器
///
/// 每个用户会话构造一个实例；所有修改先作用于内存索引，再整体写回存储。
pub struct CommitmentManager<S: StorageBackend> {
    user_id: String,
    index: CommitmentIndex,
    store: IndexStore<S>,
    config: CalendarConfig,
    offset: FixedOffset,
}

impl<S: StorageBackend> CommitmentManager<S> {
    /// 从存储加载用户索引
    pub async fn open(
        store: IndexStore<S>,
        user_id: impl Into<String>,
        config: CalendarConfig,
    ) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(Error::Config("user id must not be empty".to_string()));
        }

        config.validate()?;
        let offset = config.offset()?;
        let index = store.load(&user_id).await?;

        Ok(Self {
            user_id,
            index,
            store,
            config,
            offset,
        })
    }

    pub fn index(&self) -> &CommitmentIndex {
        &self.index
    }

    pub fn is_committed(&self, source_id: &str) -> bool {
        self.index.contains_source(source_id)
    }

    pub fn entry_for_source(&self, source_id: &str) -> Option<&CalendarEntry> {
        self.index.entry_for_source(source_id)
    }

    /// 开始日期在 `[start, end]` 内的条目，按插入顺序
    pub fn entries_in_range(&self, start: NaiveDate, end: NaiveDate) -> EntriesInRange<'_> {
        self.index.in_range(start, end)
    }

    /// 区间内有条目的日期，用于日历标记
    pub fn marked_dates(&self, start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate> {
        self.entries_in_range(start, end)
            .map(CalendarEntry::date)
            .collect()
    }

    fn interval(
        &self,
        event: &SourceEvent,
    ) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        event.interval(self.offset, self.config.event_duration())
    }

    /// 不修改索引，仅检查冲突
    pub fn check_conflicts(&self, event: &SourceEvent) -> Result<Vec<Conflict>> {
        let (start, end) = self.interval(event)?;
        Ok(find_conflicts(
            self.index.iter(),
            &Candidate {
                source_id: &event.id,
                title: &event.title,
                date: event.date,
                start,
                end,
            },
        ))
    }

    pub async fn commit(&mut self, event: &SourceEvent) -> CommitOutcome {
        self.commit_tagged(event, None).await
    }

    async fn commit_tagged(
        &mut self,
        event: &SourceEvent,
        recurrence: Option<RecurrenceTag>,
    ) -> CommitOutcome {
        if self.index.contains_source(&event.id) {
            tracing::debug!("{} 已在 {} 的日历中", event.id, self.user_id);
            let existing = self.index.entry_id_for_source(&event.id).map(str::to_string);
            return CommitOutcome::new(CommitStatus::AlreadyCommitted, existing);
        }

        let conflicts = match self.check_conflicts(event) {
            Ok(conflicts) => conflicts,
            Err(e) => {
                tracing::warn!("无法计算 {} 的时间段: {}", event.id, e);
                return CommitOutcome::failed(&e);
            }
        };
        let (start_time, end_time) = match self.interval(event) {
            Ok(interval) => interval,
            Err(e) => return CommitOutcome::failed(&e),
        };

        let entry = CalendarEntry {
            id: format!("app_{}", Uuid::new_v4().simple()),
            title: event.title.clone(),
            start_time,
            end_time,
            location: event.location.clone(),
            description: event.description.clone(),
            recurrence,
        };
        let entry_id = entry.id.clone();
        self.index.insert(event.id.clone(), entry);

        if let Err(e) = self.persist(WriteOrder::EntriesLast).await {
            tracing::warn!("保存 {} 的日历失败: {}", self.user_id, e);
            let entry_id = match self.config.persist_policy {
                PersistPolicy::BestEffort => Some(entry_id),
                PersistPolicy::Strict => {
                    self.index.undo_insert(&event.id);
                    self.write_back(WriteOrder::EntriesFirst).await;
                    None
                }
            };
            return CommitOutcome {
                conflicts,
                error: Some(e.to_string()),
                ..CommitOutcome::new(CommitStatus::Failed, entry_id)
            };
        }

        let status = if conflicts.is_empty() {
            tracing::info!("{} 添加活动 {} -> {}", self.user_id, event.id, entry_id);
            CommitStatus::Ok
        } else {
            tracing::warn!(
                "{} 添加活动 {} 与 {} 个已有条目时间冲突",
                self.user_id,
                event.id,
                conflicts.len()
            );
            CommitStatus::Conflict
        };

        CommitOutcome {
            conflicts,
            ..CommitOutcome::new(status, Some(entry_id))
        }
    }

    /// 删除与源活动同一天的全部条目
    pub async fn remove(&mut self, event: &SourceEvent) -> bool {
        self.remove_on_date(event.date).await.success()
    }

    pub async fn remove_on_date(&mut self, date: NaiveDate) -> RemoveOutcome {
        let removed = self.index.remove_on_date(date);
        if removed.is_empty() {
            tracing::debug!("{} 在 {} 没有可删除的条目", self.user_id, date);
            return RemoveOutcome {
                persisted: true,
                ..RemoveOutcome::default()
            };
        }

        let released_source_ids: Vec<String> =
            removed.released_source_ids().map(str::to_string).collect();

        if let Err(e) = self.persist(WriteOrder::EntriesFirst).await {
            tracing::warn!("保存 {} 的日历失败: {}", self.user_id, e);
            return match self.config.persist_policy {
                PersistPolicy::BestEffort => RemoveOutcome {
                    removed: removed.entries,
                    released_source_ids,
                    persisted: false,
                    error: Some(e.to_string()),
                },
                PersistPolicy::Strict => {
                    self.index.restore(removed);
                    self.write_back(WriteOrder::EntriesLast).await;
                    RemoveOutcome::failed(&e)
                }
            };
        }

        tracing::info!(
            "{} 删除 {} 的 {} 个条目",
            self.user_id,
            date,
            removed.entries.len()
        );
        RemoveOutcome {
            removed: removed.entries,
            released_source_ids,
            persisted: true,
            error: None,
        }
    }

    /// 按重复规则展开并逐个提交，返回成功生成的条目数
    ///
    /// 规则非法时在任何提交之前返回 [`Error::InvalidPattern`]；
    /// 单次提交失败会被跳过，不回滚已提交的部分。
    pub async fn expand_recurrence(
        &mut self,
        event: &SourceEvent,
        pattern: &RecurrencePattern,
    ) -> Result<usize> {
        let dates = pattern.occurrence_dates(event.date)?;

        let Some(tag) = pattern.tag() else {
            let outcome = self.commit(event).await;
            return Ok(usize::from(outcome.status.is_committed()));
        };

        let mut created = 0;
        for date in dates {
            let occurrence = event.occurrence_on(date, tag.title_marker());
            let outcome = self.commit_tagged(&occurrence, Some(tag)).await;
            match outcome.status {
                CommitStatus::Ok | CommitStatus::Conflict => created += 1,
                CommitStatus::AlreadyCommitted => {
                    tracing::debug!("跳过已提交的重复活动 {}", occurrence.id);
                }
                CommitStatus::Failed => {
                    tracing::warn!("重复活动 {} 提交失败", occurrence.id);
                }
            }
        }

        tracing::info!(
            "{} 为 {} 生成 {} 个 {:?} 重复条目",
            self.user_id,
            event.id,
            created,
            tag
        );
        Ok(created)
    }

    async fn persist(&self, order: WriteOrder) -> Result<()> {
        self.store.save(&self.user_id, &self.index, order).await
    }

    /// 回滚后把内存索引写回存储，覆盖写了一半的记录
    async fn write_back(&self, order: WriteOrder) {
        if let Err(e) = self.persist(order).await {
            tracing::warn!("回滚后写回 {} 的日历失败: {}", self.user_id, e);
        }
    }
}
