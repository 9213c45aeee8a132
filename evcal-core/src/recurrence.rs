use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::{Error, RecurrenceTag, Result};

/// 每周重复最多覆盖的周数
pub const WEEKLY_MAX_OCCURRENCES: u32 = 52;
/// 每月重复最多生成的次数
pub const MONTHLY_MAX_OCCURRENCES: u32 = 12;

const fn default_weekly_max() -> u32 {
    WEEKLY_MAX_OCCURRENCES
}

const fn default_monthly_max() -> u32 {
    MONTHLY_MAX_OCCURRENCES
}

/// 重复规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrencePattern {
    /// 单次添加
    None,
    /// 从源日期起连续 `max_occurrences` 周，每个选中的星期几每周生成一次
    ///
    /// 每个星期几从源日期当天或之后的第一次出现开始，按7天步进。
    Weekly {
        days: Vec<Weekday>,
        #[serde(default = "default_weekly_max")]
        max_occurrences: u32,
    },
    /// 从源月份起连续 `max_occurrences` 个月，每月在 `day_of_month` 生成一次
    ///
    /// 当月天数不足时顺延到下个月：4月31日落在5月1日。
    Monthly {
        day_of_month: u32,
        #[serde(default = "default_monthly_max")]
        max_occurrences: u32,
    },
}

impl RecurrencePattern {
    pub fn weekly(days: impl IntoIterator<Item = Weekday>) -> Self {
        Self::Weekly {
            days: days.into_iter().collect(),
            max_occurrences: WEEKLY_MAX_OCCURRENCES,
        }
    }

    pub fn monthly(day_of_month: u32) -> Self {
        Self::Monthly {
            day_of_month,
            max_occurrences: MONTHLY_MAX_OCCURRENCES,
        }
    }

    /// 派生条目上的标记
    pub fn tag(&self) -> Option<RecurrenceTag> {
        match self {
            Self::None => None,
            Self::Weekly { .. } => Some(RecurrenceTag::Weekly),
            Self::Monthly { .. } => Some(RecurrenceTag::Monthly),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Weekly {
                days,
                max_occurrences,
            } => {
                if days.is_empty() {
                    return Err(Error::InvalidPattern(
                        "weekly recurrence needs at least one day of the week".to_string(),
                    ));
                }
                check_cap(*max_occurrences, WEEKLY_MAX_OCCURRENCES)
            }
            Self::Monthly {
                day_of_month,
                max_occurrences,
            } => {
                if !(1..=31).contains(day_of_month) {
                    return Err(Error::InvalidPattern(format!(
                        "day of month must be within 1..=31, got {}",
                        day_of_month
                    )));
                }
                check_cap(*max_occurrences, MONTHLY_MAX_OCCURRENCES)
            }
        }
    }

    /// 展开为具体日期，校验失败时不产生任何日期
    pub fn occurrence_dates(&self, start: NaiveDate) -> Result<Vec<NaiveDate>> {
        self.validate()?;

        let dates = match self {
            Self::None => vec![start],
            Self::Weekly {
                days,
                max_occurrences,
            } => (0..u64::from(*max_occurrences) * 7)
                .filter_map(|offset| start.checked_add_days(Days::new(offset)))
                .filter(|date| days.contains(&date.weekday()))
                .collect(),
            Self::Monthly {
                day_of_month,
                max_occurrences,
            } => {
                let first = start
                    .with_day(1)
                    .ok_or_else(|| Error::Internal("Failed to resolve month start".to_string()))?;
                (0..*max_occurrences)
                    .filter_map(|i| first.checked_add_months(Months::new(i)))
                    .filter_map(|month| {
                        month.checked_add_days(Days::new(u64::from(*day_of_month - 1)))
                    })
                    .collect()
            }
        };

        Ok(dates)
    }
}

fn check_cap(max_occurrences: u32, cap: u32) -> Result<()> {
    if (1..=cap).contains(&max_occurrences) {
        Ok(())
    } else {
        Err(Error::InvalidPattern(format!(
            "max occurrences must be within 1..={}, got {}",
            cap, max_occurrences
        )))
    }
}
