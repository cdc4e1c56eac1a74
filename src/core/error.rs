//! 错误类型
//!
//! 启动期配置错误致命；LLM / 聊天平台 / 存储错误在各自循环或单条消息处理内部消化。

use thiserror::Error;

use crate::llm::LlmError;

/// 运行过程中可能出现的错误（配置、LLM、聊天平台、存储、调度）
#[derive(Error, Debug)]
pub enum NeedleError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Chat platform error: {0}")]
    Chat(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Schedule error: {0}")]
    Schedule(String),
}

impl From<config::ConfigError> for NeedleError {
    fn from(e: config::ConfigError) -> Self {
        NeedleError::Config(e.to_string())
    }
}
