//! Needle - 每日成果督促机器人
//!
//! 模块划分：
//! - **coach**: 成果校验（产出型 vs 投入型）与每周复盘，各一次 LLM 调用
//! - **config**: 应用配置加载（TOML + 环境变量）与启动密钥
//! - **core**: 提醒闸门、每日提醒 / 每周复盘调度循环、入站消息路由、优雅关闭
//! - **integrations**: 聊天平台抽象与 Discord 实现
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Groq / Mock）
//! - **memory**: 对话消息类型与成果日志（wins.csv）
//! - **observability**: 日志初始化

pub mod coach;
pub mod config;
pub mod core;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;
