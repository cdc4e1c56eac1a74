//! Needle - 每日成果督促机器人
//!
//! 入口：初始化日志、校验密钥、加载配置，连接 Discord 与 Groq，运行到收到关闭信号。
//!
//! 环境变量:
//! - DISCORD_BOT_TOKEN: Discord Bot Token（必需）
//! - GROQ_API_KEY: Groq API Key（必需）
//! - NEEDLE_CONFIG: 额外的 TOML 配置文件（可选）
//! - NEEDLE__*: 覆盖配置项，如 NEEDLE__SCHEDULE__TEST_MODE=true

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use needle::config::{load_config, AppConfig, Secrets};
use needle::core::{run_with_graceful_shutdown, NeedleApp, ShutdownManager, ShutdownReason};
use needle::integrations::DiscordClient;
use needle::llm::create_groq_client;

/// 收到关闭信号后等待各任务收尾的时长
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    needle::observability::init();

    // 缺少任一密钥即退出，不启动任何循环
    let secrets = Secrets::from_env().context("Missing required secrets")?;

    let config_path = std::env::var("NEEDLE_CONFIG").ok().map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let chat = Arc::new(DiscordClient::new(
        secrets.discord_token.clone(),
        cfg.discord.api_base.clone(),
    ));
    let llm = Arc::new(
        create_groq_client(&secrets.groq_api_key, &cfg.llm.model, Some(&cfg.llm.base_url))
            .with_timeout(cfg.llm.timeout_secs),
    );

    tracing::info!("Using LLM model {}", llm.model());

    let app = NeedleApp::new(cfg, chat, llm);
    let shutdown = Arc::new(ShutdownManager::new());
    let mut reasons = shutdown.subscribe();
    let token = shutdown.token();

    let outcome = run_with_graceful_shutdown(
        Arc::clone(&shutdown),
        app.run(token),
        SHUTDOWN_GRACE,
    )
    .await;

    let result = match outcome {
        Some(Ok(())) => {
            if !shutdown.is_shutdown() {
                shutdown.shutdown(ShutdownReason::ConnectionClosed);
            }
            Ok(())
        }
        Some(Err(e)) => {
            shutdown.shutdown(ShutdownReason::FatalError(e.to_string()));
            Err(e).context("Needle run failed")
        }
        None => Ok(()),
    };

    if let Ok(reason) = reasons.try_recv() {
        tracing::info!("Needle stopped: {:?}", reason);
    }
    result
}
