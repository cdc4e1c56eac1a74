//! 成果校验（Win Validator）
//!
//! 一次低温度 LLM 分类调用，区分「产出型」成果（解决了问题、交付了代码、实现了概念）
//! 与「投入型」非成果（花了几小时、在做某事）。回复以 VALID 开头即通过，
//! 以 INVALID 开头则其后为原因；调用失败或无内容时为 Failed，由用户重发。

use std::sync::Arc;

use crate::llm::LlmClient;
use crate::memory::Message;

/// 通过标记
pub const ACCEPT_TOKEN: &str = "VALID";
/// 拒绝标记（后接原因）
pub const REJECT_TOKEN: &str = "INVALID";

pub const DEFAULT_VALIDATOR_PROMPT: &str = "You validate daily wins. Output-based wins are specific completions (problems solved, code shipped, concepts implemented). Input-based non-wins are vague time spent (studied X hours, worked on Y). Respond with 'VALID' or 'INVALID: [reason]'.";

const FAILED_REPLY: &str = "Validation failed. Please try again.";
const FOLLOW_UP: &str = "What specifically did you complete?";

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Valid,
    Invalid(String),
    /// 调用失败、无内容或无法识别的回复
    Failed,
}

impl Outcome {
    /// 需要回复给用户的文本；Valid 用表情确认，不回文本
    pub fn user_reply(&self) -> Option<String> {
        match self {
            Outcome::Valid => None,
            Outcome::Invalid(reason) => Some(format!(
                "⚠️ {}: {}\n{}",
                REJECT_TOKEN, reason, FOLLOW_UP
            )),
            Outcome::Failed => Some(FAILED_REPLY.to_string()),
        }
    }
}

/// 解析分类器回复
pub fn parse_reply(reply: &str) -> Outcome {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Outcome::Failed;
    }

    if starts_with_token(trimmed, REJECT_TOKEN) {
        let reason = trimmed[REJECT_TOKEN.len()..]
            .trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace())
            .trim();
        let reason = if reason.is_empty() {
            "no reason given".to_string()
        } else {
            reason.to_string()
        };
        return Outcome::Invalid(reason);
    }

    if starts_with_token(trimmed, ACCEPT_TOKEN) {
        return Outcome::Valid;
    }

    tracing::warn!("Unrecognized validator reply: {:?}", trimmed);
    Outcome::Failed
}

/// 以 token 开头（忽略大小写），且其后是结尾、空白或标点
fn starts_with_token(s: &str, token: &str) -> bool {
    let Some(head) = s.get(..token.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(token) {
        return false;
    }
    s[token.len()..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric() && c != '_')
}

/// 校验器：持有 LLM、system 指令与采样温度
pub struct WinValidator {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    temperature: f32,
}

impl WinValidator {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            temperature,
        }
    }

    /// 使用内置 system 指令
    pub fn with_default_prompt(llm: Arc<dyn LlmClient>, temperature: f32) -> Self {
        Self::new(llm, DEFAULT_VALIDATOR_PROMPT, temperature)
    }

    /// 校验一条成果文本；不做内部重试
    pub async fn validate(&self, text: &str) -> Outcome {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(format!("Win: {}", text)),
        ];

        let outcome = match self.llm.complete(&messages, self.temperature).await {
            Ok(reply) => parse_reply(&reply),
            Err(e) => {
                tracing::warn!("Win validation request failed: {}", e);
                Outcome::Failed
            }
        };
        tracing::info!("Win validation outcome: {:?}", outcome);
        outcome
    }
}
