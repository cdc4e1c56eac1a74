//! Groq API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.groq.com/openai/v1
//! - 默认模型: llama-3.1-8b-instant

use crate::llm::OpenAiClient;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// 创建 Groq 客户端；base_url 为空时使用官方端点
pub fn create_groq_client(api_key: &str, model: &str, base_url: Option<&str>) -> OpenAiClient {
    let base_url = base_url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(GROQ_BASE_URL);
    tracing::info!("Using Groq-compatible LLM ({}) at {}", model, base_url);
    OpenAiClient::new(Some(base_url), model, api_key)
}
