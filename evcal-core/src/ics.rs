use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{CalendarEntry, RecurrenceTag};

#[cfg(test)]
mod tests;

/// ICS导出选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcsOptions {
    /// 日历名称
    pub calendar_name: Option<String>,
    /// 时区
    pub timezone: Option<String>,
    /// 是否包含活动描述
    pub include_description: bool,
    pub reminder_minutes: Option<u32>,
}

impl Default for IcsOptions {
    fn default() -> Self {
        Self {
            calendar_name: Some("My Events".to_string()),
            timezone: None,
            include_description: true,
            reminder_minutes: Some(30),
        }
    }
}

/// 将已提交的条目导出为ICS日历
pub struct IcsExporter {
    options: IcsOptions,
}

impl IcsExporter {
    pub fn new(options: IcsOptions) -> Self {
        Self { options }
    }

    /// 生成ICS日历内容
    pub fn export<'a>(&self, entries: impl IntoIterator<Item = &'a CalendarEntry>) -> String {
        let mut ics_content = String::new();

        // ICS文件头部
        ics_content.push_str("BEGIN:VCALENDAR\r\n");
        ics_content.push_str("VERSION:2.0\r\n");
        ics_content.push_str("PRODID:-//Evcal//Event Calendar//EN\r\n");
        ics_content.push_str("CALSCALE:GREGORIAN\r\n");
        ics_content.push_str("METHOD:PUBLISH\r\n");

        if let Some(ref name) = self.options.calendar_name {
            push_line(
                &mut ics_content,
                &format!("X-WR-CALNAME:{}", self.escape_text(name)),
            );
        }

        if let Some(ref timezone) = self.options.timezone {
            push_line(&mut ics_content, &format!("X-WR-TIMEZONE:{}", timezone));
        }

        let dtstamp = format_utc(&Utc::now());
        for entry in entries {
            self.add_entry_event(&mut ics_content, entry, &dtstamp);
        }

        // ICS文件尾部
        ics_content.push_str("END:VCALENDAR\r\n");

        ics_content
    }

    /// 添加单个条目
    fn add_entry_event(&self, ics_content: &mut String, entry: &CalendarEntry, dtstamp: &str) {
        ics_content.push_str("BEGIN:VEVENT\r\n");
        push_line(ics_content, &format!("UID:{}@evcal", entry.id));
        ics_content.push_str(&format!("DTSTAMP:{}\r\n", dtstamp));
        ics_content.push_str(&format!("DTSTART:{}\r\n", format_utc(&entry.start_time)));
        ics_content.push_str(&format!("DTEND:{}\r\n", format_utc(&entry.end_time)));
        push_line(
            ics_content,
            &format!("SUMMARY:{}", self.escape_text(&entry.title)),
        );

        if let Some(ref location) = entry.location {
            push_line(
                ics_content,
                &format!("LOCATION:{}", self.escape_text(location)),
            );
        }

        if self.options.include_description {
            if let Some(ref description) = entry.description {
                push_line(
                    ics_content,
                    &format!("DESCRIPTION:{}", self.escape_text(description)),
                );
            }
        }

        if let Some(tag) = entry.recurrence {
            let value = match tag {
                RecurrenceTag::Weekly => "WEEKLY",
                RecurrenceTag::Monthly => "MONTHLY",
            };
            ics_content.push_str(&format!("X-EVCAL-RECURRENCE:{}\r\n", value));
        }

        // 添加提醒
        if let Some(reminder_minutes) = self.options.reminder_minutes {
            ics_content.push_str("BEGIN:VALARM\r\n");
            ics_content.push_str("ACTION:DISPLAY\r\n");
            push_line(
                ics_content,
                &format!("DESCRIPTION:{}", self.escape_text(&entry.title)),
            );
            ics_content.push_str(&format!("TRIGGER:-PT{}M\r\n", reminder_minutes));
            ics_content.push_str("END:VALARM\r\n");
        }

        ics_content.push_str("END:VEVENT\r\n");
    }

    /// 转义ICS文本内容
    fn escape_text(&self, text: &str) -> String {
        text.replace('\\', "\\\\")
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace(',', "\\,")
            .replace(';', "\\;")
    }
}

impl Default for IcsExporter {
    fn default() -> Self {
        Self::new(IcsOptions::default())
    }
}

/// 内容行的最大字节数，不含行尾 CRLF
const MAX_LINE_OCTETS: usize = 75;

/// 写入一个内容行，超过 [`MAX_LINE_OCTETS`] 时在字符边界折行，续行以空格开头
fn push_line(ics_content: &mut String, line: &str) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            ics_content.push_str("\r\n ");
            width = 1;
        }
        ics_content.push(ch);
        width += len;
    }
    ics_content.push_str("\r\n");
}

fn format_utc<Tz: TimeZone>(time: &DateTime<Tz>) -> String {
    time.with_timezone(&Utc)
        .format("%Y%m%dT%H%M%SZ")
        .to_string()
}
