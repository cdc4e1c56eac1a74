//! LLM 客户端抽象
//!
//! 校验与复盘都只需要单轮 chat completion：system 指令 + 用户消息 + 采样温度，返回生成文本。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 网络 / 鉴权 / 服务端错误
    #[error("request failed: {0}")]
    Request(String),

    /// 返回成功但没有内容
    #[error("empty response")]
    EmptyResponse,
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 单次完成；temperature 控制采样随机性
    async fn complete(&self, messages: &[Message], temperature: f32) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
