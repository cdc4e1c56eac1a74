//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NEEDLE__*` 覆盖（双下划线表示嵌套，如 `NEEDLE__SCHEDULE__DAILY_TIME=21:30`）。
//! 密钥（Discord Token、Groq API Key）只从进程环境读取，不进配置文件。

use std::path::PathBuf;

use chrono::{NaiveTime, Weekday};
use serde::Deserialize;

use crate::core::NeedleError;

/// Discord Bot Token 的环境变量名
pub const DISCORD_TOKEN_ENV: &str = "DISCORD_BOT_TOKEN";
/// Groq API Key 的环境变量名
pub const GROQ_KEY_ENV: &str = "GROQ_API_KEY";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub discord: DiscordSection,
    pub llm: LlmSection,
    pub schedule: ScheduleSection,
    pub gate: GateSection,
    pub prompts: PromptsSection,
}

/// [app] 段：数据目录与成果日志文件名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub data_dir: PathBuf,
    pub wins_file: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            wins_file: "wins.csv".to_string(),
        }
    }
}

impl AppSection {
    /// 成果日志完整路径：data_dir/wins_file
    pub fn wins_path(&self) -> PathBuf {
        self.data_dir.join(&self.wins_file)
    }
}

/// [discord] 段：接收人、REST 基地址、确认表情
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordSection {
    /// 唯一接收人（私信对象）的用户 ID
    pub recipient_id: u64,
    pub api_base: String,
    /// 成果记录成功后加在原消息上的表情
    pub reaction: String,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self {
            recipient_id: 289145869314293760,
            api_base: "https://discord.com/api/v10".to_string(),
            reaction: "✅".to_string(),
        }
    }
}

/// [llm] 段：OpenAI 兼容端点、模型、采样温度与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    /// 校验用低温度，倾向稳定的二分类结果
    pub validator_temperature: f32,
    pub reflection_temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: crate::llm::GROQ_BASE_URL.to_string(),
            model: crate::llm::GROQ_DEFAULT_MODEL.to_string(),
            validator_temperature: 0.3,
            reflection_temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

/// [schedule] 段：每日提醒、每周复盘时间，以及测试模式的短间隔
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    /// 每日提醒时刻（本地时间，HH:MM）
    pub daily_time: String,
    /// 每周复盘日（Mon..Sun）
    pub weekly_day: String,
    pub weekly_time: String,
    /// 测试模式：不按日历计算，固定短间隔触发
    pub test_mode: bool,
    pub test_daily_interval_secs: u64,
    pub test_weekly_interval_secs: u64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            daily_time: "21:00".to_string(),
            weekly_day: "Sun".to_string(),
            weekly_time: "20:00".to_string(),
            test_mode: false,
            test_daily_interval_secs: 15,
            test_weekly_interval_secs: 30,
        }
    }
}

impl ScheduleSection {
    pub fn daily_time(&self) -> Result<NaiveTime, NeedleError> {
        parse_time_of_day(&self.daily_time)
    }

    pub fn weekly_time(&self) -> Result<NaiveTime, NeedleError> {
        parse_time_of_day(&self.weekly_time)
    }

    pub fn weekly_day(&self) -> Result<Weekday, NeedleError> {
        self.weekly_day.trim().parse::<Weekday>().map_err(|_| {
            NeedleError::Schedule(format!("invalid weekday: {:?}", self.weekly_day))
        })
    }
}

/// [gate] 段：提醒闸门的可选过期时间
///
/// 默认不过期：用户一直没有有效回复时，闸门会保持打开直到下一次提醒。
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GateSection {
    pub expire_after_hours: Option<u64>,
}

/// [prompts] 段：可覆盖内置 system 指令的目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsSection {
    pub dir: PathBuf,
}

impl Default for PromptsSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("config/prompts"),
        }
    }
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime, NeedleError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| NeedleError::Schedule(format!("invalid time of day: {:?}", s)))
}

/// 从 config 目录加载配置，环境变量 NEEDLE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NEEDLE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NEEDLE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 启动所需的两个密钥
#[derive(Clone)]
pub struct Secrets {
    pub discord_token: String,
    pub groq_api_key: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("discord_token", &"<redacted>")
            .field("groq_api_key", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    /// 从进程环境读取密钥
    pub fn from_env() -> Result<Self, NeedleError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 通过任意查找函数读取密钥；缺失或为空即为致命配置错误
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NeedleError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup(DISCORD_TOKEN_ENV).filter(|v| !v.trim().is_empty());
        let groq_api_key = lookup(GROQ_KEY_ENV).filter(|v| !v.trim().is_empty());

        tracing::info!("{} present: {}", DISCORD_TOKEN_ENV, discord_token.is_some());
        tracing::info!("{} present: {}", GROQ_KEY_ENV, groq_api_key.is_some());

        match (discord_token, groq_api_key) {
            (Some(discord_token), Some(groq_api_key)) => Ok(Self {
                discord_token,
                groq_api_key,
            }),
            _ => Err(NeedleError::Config(format!(
                "Set {} and {} environment variables",
                DISCORD_TOKEN_ENV, GROQ_KEY_ENV
            ))),
        }
    }
}
