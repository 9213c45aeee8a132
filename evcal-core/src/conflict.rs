use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::CalendarEntry;

/// 时间冲突
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// 待提交的源活动ID
    pub source_id: String,
    /// 与之重叠的已有条目
    pub conflicting_entry_id: String,
    pub conflicting_title: String,
}

/// 待提交活动的时间段
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub source_id: &'a str,
    pub title: &'a str,
    pub date: NaiveDate,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl Candidate<'_> {
    /// 同一天同名的条目视为同一活动，不算冲突
    fn is_same_event(&self, entry: &CalendarEntry) -> bool {
        entry.title == self.title && entry.date() == self.date
    }
}

/// 扫描已有条目，返回与候选时间段重叠的条目
pub fn find_conflicts<'a>(
    entries: impl IntoIterator<Item = &'a CalendarEntry>,
    candidate: &Candidate<'_>,
) -> Vec<Conflict> {
    entries
        .into_iter()
        .filter(|entry| !candidate.is_same_event(entry))
        .filter(|entry| entry.overlaps(&candidate.start, &candidate.end))
        .map(|entry| Conflict {
            source_id: candidate.source_id.to_string(),
            conflicting_entry_id: entry.id.clone(),
            conflicting_title: entry.title.clone(),
        })
        .collect()
}
