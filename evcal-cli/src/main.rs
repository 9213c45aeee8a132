mod commands;
mod storage;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{NaiveDate, Weekday};
use clap::{Parser, Subcommand};
use evcal_core::prelude::{CalendarConfig, CalendarService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::storage::FileStorage;

#[derive(Parser)]
#[command(name = "evcal")]
#[command(about = "活动日历管理工具")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 用户ID，所有日历数据按用户隔离
    #[arg(short, long, global = true, default_value = "local")]
    user: String,

    /// 数据目录（默认使用系统数据目录）
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// 启用详细日志
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 将目录中的活动添加到日历
    Add {
        /// 活动目录JSON文件
        #[arg(short, long)]
        catalog: String,

        /// 活动ID
        #[arg(short, long)]
        event: String,
    },

    /// 删除某天的全部日历条目
    Remove {
        /// 日期（格式：YYYY-MM-DD）
        #[arg(short, long)]
        date: NaiveDate,
    },

    /// 查询活动是否已添加
    Status {
        /// 活动ID
        #[arg(short, long)]
        event: String,
    },

    /// 列出日历条目（默认当前月份）
    List {
        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// 按重复规则添加活动
    Recur {
        #[arg(short, long)]
        catalog: String,

        #[arg(short, long)]
        event: String,

        /// 每周重复的星期（如 mon,wed）
        #[arg(long, value_delimiter = ',', conflicts_with = "monthly")]
        weekly: Vec<Weekday>,

        /// 每月重复的日期（1-31）
        #[arg(long)]
        monthly: Option<u32>,
    },

    /// 检查活动与日历的时间冲突
    Conflicts {
        #[arg(short, long)]
        catalog: String,

        #[arg(short, long)]
        event: String,
    },

    /// 导出ICS日历文件
    Export {
        /// 输出文件路径
        #[arg(short, long)]
        output: Option<String>,

        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,

        /// 日历名称
        #[arg(long)]
        calendar_name: Option<String>,

        /// 提醒时间（分钟）
        #[arg(long, default_value = "30")]
        reminder_minutes: u32,
    },

    /// 列出目录中的活动及添加状态
    Events {
        #[arg(short, long)]
        catalog: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志级别
    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("evcal_cli={},evcal_core={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let storage = match cli.data_dir {
        Some(dir) => FileStorage::new(dir)?,
        None => FileStorage::with_default_dir("evcal")?,
    };
    tracing::debug!("数据目录: {}", storage.data_dir().display());

    let config = CalendarConfig::from_env()?;
    let service = CalendarService::new(storage, config);
    let user = cli.user.as_str();

    match cli.command {
        Commands::Add { catalog, event } => {
            commands::add_command(&service, user, &catalog, &event).await
        }

        Commands::Remove { date } => commands::remove_command(&service, user, date).await,

        Commands::Status { event } => commands::status_command(&service, user, &event).await,

        Commands::List { from, to } => commands::list_command(&service, user, from, to).await,

        Commands::Recur {
            catalog,
            event,
            weekly,
            monthly,
        } => {
            commands::recur_command(
                &service,
                user,
                commands::RecurParams {
                    catalog,
                    event_id: event,
                    weekly,
                    monthly,
                },
            )
            .await
        }

        Commands::Conflicts { catalog, event } => {
            commands::conflicts_command(&service, user, &catalog, &event).await
        }

        Commands::Export {
            output,
            from,
            to,
            calendar_name,
            reminder_minutes,
        } => {
            commands::export_command(
                &service,
                user,
                commands::ExportParams {
                    output,
                    from,
                    to,
                    calendar_name,
                    reminder_minutes,
                },
            )
            .await
        }

        Commands::Events { catalog } => commands::events_command(&service, user, &catalog).await,
    }
}
