use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::CalendarEntry;

/// 持久化格式：三条平行记录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIndex {
    /// 按插入顺序排列的条目
    pub entries: Vec<CalendarEntry>,
    pub committed_source_ids: Vec<String>,
    /// `(源ID, 条目ID)`
    pub source_to_entry_id: Vec<(String, String)>,
}

/// 单个用户的提交索引
///
/// 不变式：`committed_source_ids` 中的每个源ID在 `source_to_entry_id`
/// 中都有映射，且映射到的条目存在于 `entries_by_id`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitmentIndex {
    entries_by_id: HashMap<String, CalendarEntry>,
    /// 条目ID的插入顺序
    order: Vec<String>,
    committed_source_ids: HashSet<String>,
    source_to_entry_id: HashMap<String, String>,
}

impl CommitmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries_by_id.is_empty()
    }

    pub fn contains_source(&self, source_id: &str) -> bool {
        self.committed_source_ids.contains(source_id)
    }

    pub fn get(&self, entry_id: &str) -> Option<&CalendarEntry> {
        self.entries_by_id.get(entry_id)
    }

    pub fn entry_id_for_source(&self, source_id: &str) -> Option<&str> {
        self.source_to_entry_id.get(source_id).map(String::as_str)
    }

    pub fn entry_for_source(&self, source_id: &str) -> Option<&CalendarEntry> {
        self.entry_id_for_source(source_id)
            .and_then(|entry_id| self.get(entry_id))
    }

    /// 按插入顺序遍历
    pub fn iter(&self) -> Entries<'_> {
        Entries {
            order: self.order.iter(),
            entries_by_id: &self.entries_by_id,
        }
    }

    /// 开始日期落在 `[start, end]`（含两端）内的条目
    pub fn in_range(&self, start: NaiveDate, end: NaiveDate) -> EntriesInRange<'_> {
        EntriesInRange {
            inner: self.iter(),
            start,
            end,
        }
    }

    pub fn committed_source_ids(&self) -> impl Iterator<Item = &str> {
        self.committed_source_ids.iter().map(String::as_str)
    }

    /// 插入新条目并登记源ID
    pub fn insert(&mut self, source_id: impl Into<String>, entry: CalendarEntry) {
        let source_id = source_id.into();
        let entry_id = entry.id.clone();

        if self
            .entries_by_id
            .insert(entry_id.clone(), entry)
            .is_none()
        {
            self.order.push(entry_id.clone());
        }
        self.committed_source_ids.insert(source_id.clone());
        self.source_to_entry_id.insert(source_id, entry_id);
    }

    /// 撤销一次 [`insert`](Self::insert)
    pub fn undo_insert(&mut self, source_id: &str) -> Option<CalendarEntry> {
        let entry_id = self.source_to_entry_id.remove(source_id)?;
        self.committed_source_ids.remove(source_id);
        self.order.retain(|id| *id != entry_id);
        self.entries_by_id.remove(&entry_id)
    }

    /// 删除日期为 `date` 的全部条目，并释放映射到这些条目的源ID
    pub fn remove_on_date(&mut self, date: NaiveDate) -> RemovedEntries {
        let removed_ids: HashSet<String> = self
            .entries_by_id
            .values()
            .filter(|entry| entry.date() == date)
            .map(|entry| entry.id.clone())
            .collect();

        if removed_ids.is_empty() {
            return RemovedEntries::default();
        }

        let released: Vec<(String, String)> = self
            .source_to_entry_id
            .iter()
            .filter(|(_, entry_id)| removed_ids.contains(*entry_id))
            .map(|(source_id, entry_id)| (source_id.clone(), entry_id.clone()))
            .collect();

        for (source_id, _) in &released {
            self.source_to_entry_id.remove(source_id);
            self.committed_source_ids.remove(source_id);
        }

        let mut entries = Vec::with_capacity(removed_ids.len());
        self.order.retain(|id| !removed_ids.contains(id));
        for id in removed_ids {
            if let Some(entry) = self.entries_by_id.remove(&id) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        RemovedEntries { entries, released }
    }

    /// 恢复 [`remove_on_date`](Self::remove_on_date) 删除的内容
    ///
    /// 恢复的条目追加到插入顺序末尾。
    pub fn restore(&mut self, removed: RemovedEntries) {
        for entry in removed.entries {
            let id = entry.id.clone();
            if self.entries_by_id.insert(id.clone(), entry).is_none() {
                self.order.push(id);
            }
        }
        for (source_id, entry_id) in removed.released {
            if self.entries_by_id.contains_key(&entry_id) {
                self.committed_source_ids.insert(source_id.clone());
                self.source_to_entry_id.insert(source_id, entry_id);
            }
        }
    }

    pub fn to_persisted(&self) -> PersistedIndex {
        let entries: Vec<CalendarEntry> = self.iter().cloned().collect();

        let mut committed_source_ids: Vec<String> =
            self.committed_source_ids.iter().cloned().collect();
        committed_source_ids.sort();

        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let mut source_to_entry_id: Vec<(String, String)> = self
            .source_to_entry_id
            .iter()
            .map(|(source, entry)| (source.clone(), entry.clone()))
            .collect();
        source_to_entry_id.sort_by_key(|(source, entry)| {
            (position.get(entry.as_str()).copied(), source.clone())
        });

        PersistedIndex {
            entries,
            committed_source_ids,
            source_to_entry_id,
        }
    }

    /// 从持久化记录重建索引，并修复违反不变式的记录
    pub fn from_persisted(persisted: PersistedIndex) -> Self {
        let mut index = Self::new();

        for entry in persisted.entries {
            if entry.end_time <= entry.start_time {
                tracing::warn!("Dropping calendar entry {} with empty interval", entry.id);
                continue;
            }
            let id = entry.id.clone();
            if index.entries_by_id.insert(id.clone(), entry).is_none() {
                index.order.push(id);
            }
        }

        for (source_id, entry_id) in persisted.source_to_entry_id {
            if index.entries_by_id.contains_key(&entry_id) {
                index.source_to_entry_id.insert(source_id, entry_id);
            } else {
                tracing::warn!(
                    "Dropping mapping {} -> {}: entry does not exist",
                    source_id,
                    entry_id
                );
            }
        }

        for source_id in persisted.committed_source_ids {
            if index.source_to_entry_id.contains_key(&source_id) {
                index.committed_source_ids.insert(source_id);
            } else {
                tracing::warn!("Dropping committed source id {} without entry", source_id);
            }
        }

        index
    }
}

/// [`CommitmentIndex::remove_on_date`] 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedEntries {
    pub entries: Vec<CalendarEntry>,
    /// 被释放的 `(源ID, 条目ID)`
    pub released: Vec<(String, String)>,
}

impl RemovedEntries {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn released_source_ids(&self) -> impl Iterator<Item = &str> {
        self.released.iter().map(|(source_id, _)| source_id.as_str())
    }
}

/// 按插入顺序的条目迭代器
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    order: std::slice::Iter<'a, String>,
    entries_by_id: &'a HashMap<String, CalendarEntry>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = &'a CalendarEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let entries_by_id = self.entries_by_id;
        self.order.by_ref().find_map(|id| entries_by_id.get(id))
    }
}

/// 日期区间内条目的惰性迭代器，可 `clone` 后重新遍历
#[derive(Debug, Clone)]
pub struct EntriesInRange<'a> {
    inner: Entries<'a>,
    start: NaiveDate,
    end: NaiveDate,
}

impl<'a> Iterator for EntriesInRange<'a> {
    type Item = &'a CalendarEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, end) = (self.start, self.end);
        self.inner.find(|entry| (start..=end).contains(&entry.date()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecurrenceTag;
    use chrono::{DateTime, FixedOffset, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 7, day, hour, 0, 0)
            .unwrap()
    }

    fn entry(id: &str, day: u32, hour: u32) -> CalendarEntry {
        CalendarEntry {
            id: id.to_string(),
            title: format!("Event {}", id),
            start_time: at(day, hour),
            end_time: at(day, hour + 2),
            location: Some("Clarke Quay".to_string()),
            description: None,
            recurrence: None,
        }
    }

    fn sample() -> CommitmentIndex {
        let mut index = CommitmentIndex::new();
        index.insert("src-1", entry("app_1", 15, 10));
        index.insert("src-2", entry("app_2", 15, 18));
        let mut weekly = entry("app_3", 22, 9);
        weekly.recurrence = Some(RecurrenceTag::Weekly);
        index.insert("src-3", weekly);
        index
    }

    #[test]
    fn test_insertion_order_and_lookup() {
        let index = sample();
        let ids: Vec<_> = index.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["app_1", "app_2", "app_3"]);

        assert!(index.contains_source("src-2"));
        assert_eq!(index.entry_id_for_source("src-2"), Some("app_2"));
        assert_eq!(index.entry_for_source("src-3").unwrap().id, "app_3");
        assert!(index.entry_for_source("src-9").is_none());
    }

    #[test]
    fn test_in_range_is_inclusive_and_restartable() {
        let index = sample();
        let start = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 7, 22).unwrap();

        let range = index.in_range(start, end);
        assert_eq!(range.clone().count(), 3);
        assert_eq!(range.count(), 3);

        let only_first_day = index.in_range(start, start);
        let ids: Vec<_> = only_first_day.map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["app_1", "app_2"]);
    }

    #[test]
    fn test_remove_on_date_releases_sources() {
        let mut index = sample();
        let removed = index.remove_on_date(NaiveDate::from_ymd_opt(2024, 7, 15).unwrap());

        assert_eq!(removed.entries.len(), 2);
        let mut released: Vec<_> = removed.released_source_ids().collect();
        released.sort_unstable();
        assert_eq!(released, vec!["src-1", "src-2"]);
        assert!(!index.contains_source("src-1"));
        assert!(!index.contains_source("src-2"));
        assert_eq!(index.len(), 1);

        let nothing = index.remove_on_date(NaiveDate::from_ymd_opt(2024, 7, 16).unwrap());
        assert!(nothing.is_empty());

        index.restore(removed);
        assert_eq!(index.len(), 3);
        assert!(index.contains_source("src-1"));
        assert_eq!(index.entry_id_for_source("src-2"), Some("app_2"));
    }

    #[test]
    fn test_undo_insert() {
        let mut index = sample();
        let undone = index.undo_insert("src-2").unwrap();
        assert_eq!(undone.id, "app_2");
        assert!(!index.contains_source("src-2"));
        assert!(index.get("app_2").is_none());
        assert!(index.undo_insert("src-2").is_none());
    }

    #[test]
    fn test_persisted_round_trip() {
        let index = sample();
        let json = serde_json::to_string(&index.to_persisted()).unwrap();
        let persisted: PersistedIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(persisted.entries[0].id, "app_1");

        let restored = CommitmentIndex::from_persisted(persisted);
        assert_eq!(restored, index);
        assert_eq!(restored.to_persisted(), index.to_persisted());
    }

    #[test]
    fn test_from_persisted_repairs_dangling_ids() {
        let persisted = PersistedIndex {
            entries: vec![entry("app_1", 15, 10)],
            committed_source_ids: vec!["src-1".to_string(), "src-ghost".to_string()],
            source_to_entry_id: vec![
                ("src-1".to_string(), "app_1".to_string()),
                ("src-gone".to_string(), "app_gone".to_string()),
            ],
        };

        let index = CommitmentIndex::from_persisted(persisted);
        assert!(index.contains_source("src-1"));
        assert!(!index.contains_source("src-ghost"));
        assert!(index.entry_id_for_source("src-gone").is_none());
        assert_eq!(index.committed_source_ids().count(), 1);
    }
}
