use std::env;

use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// 持久化失败时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// 保留内存中的修改，仅向调用方报告失败
    #[default]
    BestEffort,
    /// 先在内存中暂存，持久化失败时回滚
    Strict,
}

impl std::str::FromStr for PersistPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "best_effort" => Ok(Self::BestEffort),
            "strict" => Ok(Self::Strict),
            other => Err(Error::Config(format!("Unknown persist policy: {}", other))),
        }
    }
}

/// 日历配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// 未显式指定时长时，条目的固定时长（小时）
    pub event_duration_hours: u32,
    /// 目录中本地时间相对UTC的偏移（分钟）
    pub utc_offset_minutes: i32,
    pub persist_policy: PersistPolicy,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            event_duration_hours: 2,
            utc_offset_minutes: 0,
            persist_policy: PersistPolicy::BestEffort,
        }
    }
}

impl CalendarConfig {
    pub const DURATION_ENV: &'static str = "EVCAL_EVENT_DURATION_HOURS";
    pub const OFFSET_ENV: &'static str = "EVCAL_UTC_OFFSET_MINUTES";
    pub const POLICY_ENV: &'static str = "EVCAL_PERSIST_POLICY";

    /// 从环境变量读取配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = non_empty(lookup(Self::DURATION_ENV)) {
            config.event_duration_hours = raw.parse().map_err(|e| {
                Error::Config(format!("{} is not a number: {}", Self::DURATION_ENV, e))
            })?;
        }

        if let Some(raw) = non_empty(lookup(Self::OFFSET_ENV)) {
            config.utc_offset_minutes = raw.parse().map_err(|e| {
                Error::Config(format!("{} is not a number: {}", Self::OFFSET_ENV, e))
            })?;
        }

        if let Some(raw) = non_empty(lookup(Self::POLICY_ENV)) {
            config.persist_policy = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_duration_hours == 0 {
            return Err(Error::Config(
                "event duration must be at least one hour".to_string(),
            ));
        }
        self.offset()?;
        Ok(())
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            Error::Config(format!(
                "UTC offset out of range: {} minutes",
                self.utc_offset_minutes
            ))
        })
    }

    pub fn event_duration(&self) -> Duration {
        Duration::hours(i64::from(self.event_duration_hours))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
