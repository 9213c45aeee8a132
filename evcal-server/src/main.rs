mod handlers;
mod server;
mod storage;

use std::env;

use anyhow::Result;
use evcal_core::prelude::{CalendarConfig, CalendarService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::storage::RedisStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evcal_server=info,evcal_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 获取Redis URL
    let redis_url = env::var("REDIS_URL")
        .map_err(|_| anyhow::anyhow!("REDIS_URL environment variable is required"))?;

    let config = CalendarConfig::from_env()?;
    tracing::info!("日历配置: {:?}", config);

    let storage = match RedisStorage::new(&redis_url, None).await {
        Ok(storage) => storage,
        Err(e) => {
            tracing::error!("Failed to connect to Redis: {}", e);
            return Err(e.into());
        }
    };

    let app = handlers::create_app(CalendarService::new(storage, config));

    // 启动服务器
    server::start_server(app).await
}
