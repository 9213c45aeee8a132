use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// 目录服务提供的原始活动记录
///
/// 字段均为字符串，未经校验；通过 [`SourceEvent::try_from`] 在边界处校验。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEvent {
    pub id: String,
    pub title: String,
    /// 日期 (YYYY-MM-DD)
    pub date: String,
    /// 本地时间 (HH:MM, 24小时制)
    pub time: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// 显式指定的时长（分钟），缺省时使用配置中的固定时长
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

/// 经过校验的源活动
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: Option<String>,
    pub description: Option<String>,
    pub duration: Option<Duration>,
}

impl SourceEvent {
    /// 从日期、时间字符串构建源活动
    pub fn parse(
        id: impl Into<String>,
        title: impl Into<String>,
        date: &str,
        time: &str,
    ) -> Result<Self> {
        Self::try_from(CatalogEvent {
            id: id.into(),
            title: title.into(),
            date: date.to_string(),
            time: time.to_string(),
            location: None,
            description: None,
            duration_minutes: None,
        })
    }

    /// 本地开始时间
    pub fn start_time(&self, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
        offset
            .from_local_datetime(&self.date.and_time(self.time))
            .single()
            .ok_or_else(|| {
                Error::Internal(format!(
                    "Failed to resolve local time {} {}",
                    self.date, self.time
                ))
            })
    }

    /// 半开区间 `[start, end)`
    pub fn interval(
        &self,
        offset: FixedOffset,
        default_duration: Duration,
    ) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        let start = self.start_time(offset)?;
        let duration = self.duration.unwrap_or(default_duration);
        let end = start
            .checked_add_signed(duration)
            .ok_or_else(|| Error::Internal("End time overflow".to_string()))?;
        Ok((start, end))
    }

    /// 生成重复系列中的一次派生活动
    ///
    /// 派生活动拥有独立的源ID `<id>@<date>`，因此每次出现都是单独的提交。
    pub fn occurrence_on(&self, date: NaiveDate, title_marker: &str) -> Self {
        Self {
            id: format!("{}@{}", self.id, date.format("%Y-%m-%d")),
            title: format!("{}{}", self.title, title_marker),
            date,
            ..self.clone()
        }
    }
}

impl TryFrom<CatalogEvent> for SourceEvent {
    type Error = Error;

    fn try_from(raw: CatalogEvent) -> Result<Self> {
        let id = raw.id.trim().to_string();
        if id.is_empty() {
            return Err(Error::invalid_event("id", "id must not be empty"));
        }

        let title = raw.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::invalid_event("title", "title must not be empty"));
        }

        let date = NaiveDate::parse_from_str(raw.date.trim(), "%Y-%m-%d").map_err(|e| {
            Error::invalid_event(
                "date",
                format!("'{}': {}. Expected format: YYYY-MM-DD", raw.date, e),
            )
        })?;

        let time = parse_time(raw.time.trim()).ok_or_else(|| {
            Error::invalid_event(
                "time",
                format!("'{}'. Expected format: HH:MM (24-hour)", raw.time),
            )
        })?;

        let duration = match raw.duration_minutes {
            Some(0) => {
                return Err(Error::invalid_event(
                    "duration_minutes",
                    "duration must be positive",
                ));
            }
            Some(minutes) => Some(Duration::minutes(i64::from(minutes))),
            None => None,
        };

        Ok(Self {
            id,
            title,
            date,
            time,
            location: raw.location.filter(|s| !s.trim().is_empty()),
            description: raw.description.filter(|s| !s.trim().is_empty()),
            duration,
        })
    }
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

/// 重复系列成员标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceTag {
    Weekly,
    Monthly,
}

impl RecurrenceTag {
    /// 派生活动标题后缀
    pub fn title_marker(self) -> &'static str {
        match self {
            Self::Weekly => " (Recurring)",
            Self::Monthly => " (Monthly)",
        }
    }
}

/// 用户已提交到日历的条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    /// 提交时生成的ID（不是目录活动的ID）
    pub id: String,
    pub title: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 单次添加时为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceTag>,
}

impl CalendarEntry {
    /// 条目所在的本地日期
    pub fn date(&self) -> NaiveDate {
        self.start_time.date_naive()
    }

    /// 半开区间重叠判断
    pub fn overlaps(&self, start: &DateTime<FixedOffset>, end: &DateTime<FixedOffset>) -> bool {
        self.start_time < *end && *start < self.end_time
    }
}
