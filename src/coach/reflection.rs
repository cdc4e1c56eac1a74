//! 每周复盘（Reflection Generator）
//!
//! 取最近 7 天（含第 7 天当天）的成果，拼成一段 prompt 交给 LLM 总结模式与下周优先级。
//! 失败不重试，由调度循环跳过本周期。

use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, WinRecord};

/// 复盘窗口天数
pub const WINDOW_DAYS: i64 = 7;

/// 窗口内没有成果时的占位文本
pub const EMPTY_WINDOW_PLACEHOLDER: &str = "(no wins recorded this week)";

pub const DEFAULT_REFLECTION_PROMPT: &str = "You analyze weekly progress logs for a CS student building AI infra, doing LeetCode prep, and managing coursework. Be brutally honest about patterns, momentum, and priorities. KEEP RESPONSE UNDER 300 WORDS.";

/// 保留 date >= today - 7 天 的记录，顺序不变
pub fn trailing_window(records: &[WinRecord], today: NaiveDate) -> Vec<WinRecord> {
    let since = today - Duration::days(WINDOW_DAYS);
    records.iter().filter(|r| r.date >= since).cloned().collect()
}

/// 用户消息正文
pub fn build_user_prompt(wins: &[WinRecord]) -> String {
    let wins_text = if wins.is_empty() {
        EMPTY_WINDOW_PLACEHOLDER.to_string()
    } else {
        wins.iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Here are this week's wins:\n{}\n\nWhat patterns do you see? What should I prioritize next week?",
        wins_text
    )
}

pub struct ReflectionGenerator {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    temperature: f32,
}

impl ReflectionGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            temperature,
        }
    }

    pub fn with_default_prompt(llm: Arc<dyn LlmClient>, temperature: f32) -> Self {
        Self::new(llm, DEFAULT_REFLECTION_PROMPT, temperature)
    }

    /// 总结给定成果；返回 LLM 原文
    pub async fn summarize(&self, wins: &[WinRecord]) -> Result<String, LlmError> {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(build_user_prompt(wins)),
        ];
        let reply = self.llm.complete(&messages, self.temperature).await?;
        if reply.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(reply)
    }
}
