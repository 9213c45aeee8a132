use std::fs;

use anyhow::Result;
use chrono::{Datelike, Local, Months, NaiveDate, Weekday};
use evcal_core::{catalog::EventCatalog, prelude::*};

use crate::storage::FileStorage;

pub type Service = CalendarService<FileStorage>;

/// 读取目录文件并查找活动
fn load_event(catalog_path: &str, event_id: &str) -> Result<SourceEvent> {
    let content = fs::read_to_string(catalog_path)
        .map_err(|e| anyhow::anyhow!("读取目录文件 {} 失败: {}", catalog_path, e))?;
    let catalog = EventCatalog::from_json(&content)?;

    if let Some(event) = catalog.get(event_id) {
        return Ok(event.clone());
    }

    match catalog.rejected().iter().find(|r| r.id == event_id) {
        Some(rejected) => Err(anyhow::anyhow!(
            "活动 {} 的记录无效: {}",
            event_id,
            rejected.error
        )),
        None => Err(anyhow::anyhow!("目录中没有活动: {}", event_id)),
    }
}

fn print_entry(entry: &CalendarEntry) {
    println!(
        "  {} {}-{}  {}",
        entry.date(),
        entry.start_time.format("%H:%M"),
        entry.end_time.format("%H:%M"),
        entry.title
    );
    if let Some(ref location) = entry.location {
        println!("    地点: {}", location);
    }
}

/// 当前月份的第一天和最后一天
fn current_month() -> (NaiveDate, NaiveDate) {
    let today = Local::now().date_naive();
    let first = today.with_day(1).unwrap_or(today);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(today);
    (first, last)
}

/// 添加活动命令
pub async fn add_command(
    service: &Service,
    user: &str,
    catalog_path: &str,
    event_id: &str,
) -> Result<()> {
    let event = load_event(catalog_path, event_id)?;
    tracing::info!("添加活动: 用户={}, 活动={}", user, event.id);

    let outcome = service.commit(user, &event).await;
    match outcome.status {
        CommitStatus::Ok => {
            println!("✓ 已添加到日历: {} ({} {})", event.title, event.date, event.time);
        }
        CommitStatus::Conflict => {
            println!("✓ 已添加到日历: {}", event.title);
            println!("⚠ 与以下活动时间冲突:");
            for conflict in &outcome.conflicts {
                println!("  - {}", conflict.conflicting_title);
            }
        }
        CommitStatus::AlreadyCommitted => {
            println!("活动已在日历中: {}", event.title);
        }
        CommitStatus::Failed => {
            return Err(anyhow::anyhow!(
                "添加活动失败: {}",
                outcome.error.unwrap_or_default()
            ));
        }
    }

    Ok(())
}

/// 删除某天的全部条目
pub async fn remove_command(service: &Service, user: &str, date: NaiveDate) -> Result<()> {
    let outcome = service.remove_on_date(user, date).await;

    if let Some(error) = outcome.error {
        return Err(anyhow::anyhow!("删除失败: {}", error));
    }

    if outcome.removed.is_empty() {
        println!("{} 没有日历条目", date);
    } else {
        println!("✓ 已删除 {} 的 {} 个条目", date, outcome.removed.len());
        for entry in &outcome.removed {
            print_entry(entry);
        }
    }

    Ok(())
}

/// 查询活动是否已添加
pub async fn status_command(service: &Service, user: &str, event_id: &str) -> Result<()> {
    match service.entry_for_source(user, event_id).await? {
        Some(entry) => {
            println!("活动 {} 已在日历中:", event_id);
            print_entry(&entry);
        }
        None => println!("活动 {} 未添加", event_id),
    }

    Ok(())
}

/// 列出日期区间内的条目
pub async fn list_command(
    service: &Service,
    user: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let (month_start, month_end) = current_month();
    let from = from.unwrap_or(month_start);
    let to = to.unwrap_or(month_end);

    let mut entries = service.entries_in_range(user, from, to).await?;
    entries.sort_by(|a, b| a.start_time.cmp(&b.start_time));

    println!("{} 至 {} 的日历条目:", from, to);
    if entries.is_empty() {
        println!("  暂无条目");
    } else {
        for entry in &entries {
            print_entry(entry);
        }
    }

    Ok(())
}

/// 重复活动命令参数
pub struct RecurParams {
    pub catalog: String,
    pub event_id: String,
    pub weekly: Vec<Weekday>,
    pub monthly: Option<u32>,
}

impl RecurParams {
    fn pattern(&self) -> RecurrencePattern {
        match (self.weekly.is_empty(), self.monthly) {
            (_, Some(day)) => RecurrencePattern::monthly(day),
            (false, None) => RecurrencePattern::weekly(self.weekly.iter().copied()),
            (true, None) => RecurrencePattern::None,
        }
    }
}

/// 生成重复活动命令
pub async fn recur_command(service: &Service, user: &str, params: RecurParams) -> Result<()> {
    let event = load_event(&params.catalog, &params.event_id)?;
    let pattern = params.pattern();
    tracing::info!("生成重复活动: 用户={}, 活动={}, 规则={:?}", user, event.id, pattern);

    let created = service.expand_recurrence(user, &event, &pattern).await?;
    println!("✓ 已添加 {} 个重复活动", created);

    Ok(())
}

/// 冲突检查命令
pub async fn conflicts_command(
    service: &Service,
    user: &str,
    catalog_path: &str,
    event_id: &str,
) -> Result<()> {
    let event = load_event(catalog_path, event_id)?;
    let conflicts = service.check_conflicts(user, &event).await?;

    if conflicts.is_empty() {
        println!("✓ {} 没有时间冲突", event.title);
    } else {
        println!("⚠ {} 与 {} 个条目冲突:", event.title, conflicts.len());
        for conflict in conflicts {
            println!("  - {} ({})", conflict.conflicting_title, conflict.conflicting_entry_id);
        }
    }

    Ok(())
}

/// 导出命令参数
pub struct ExportParams {
    pub output: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub calendar_name: Option<String>,
    pub reminder_minutes: u32,
}

/// 导出ICS命令
pub async fn export_command(service: &Service, user: &str, params: ExportParams) -> Result<()> {
    let entries = match (params.from, params.to) {
        (None, None) => service.all_entries(user).await?,
        (from, to) => {
            let from = from.unwrap_or(NaiveDate::MIN);
            let to = to.unwrap_or(NaiveDate::MAX);
            service.entries_in_range(user, from, to).await?
        }
    };

    let options = IcsOptions {
        calendar_name: params
            .calendar_name
            .or_else(|| Some(format!("{}的活动日历", user))),
        reminder_minutes: Some(params.reminder_minutes),
        ..Default::default()
    };
    let ics_content = IcsExporter::new(options).export(&entries);

    let output_file = params
        .output
        .unwrap_or_else(|| format!("evcal-{}.ics", user));
    fs::write(&output_file, ics_content)?;
    println!("✓ 已导出 {} 个条目到: {}", entries.len(), output_file);

    Ok(())
}

/// 列出目录活动及添加状态
pub async fn events_command(service: &Service, user: &str, catalog_path: &str) -> Result<()> {
    let content = fs::read_to_string(catalog_path)?;
    let catalog = EventCatalog::from_json(&content)?;
    let manager = service.open(user).await?;

    println!("目录活动 ({} 个):", catalog.len());
    for event in catalog.events() {
        let mark = if manager.is_committed(&event.id) { "✓" } else { " " };
        println!(
            "  [{}] {} {} {} {}",
            mark,
            event.id,
            event.date,
            event.time.format("%H:%M"),
            event.title
        );
    }

    for rejected in catalog.rejected() {
        println!("  跳过无效记录 #{} ({}): {}", rejected.position, rejected.id, rejected.error);
    }

    Ok(())
}
