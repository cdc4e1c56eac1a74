//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预设回复；队列耗尽后返回默认回复。记录每次请求，便于断言 prompt 内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub temperature: f32,
}

/// Mock 客户端：脚本化回复
#[derive(Debug)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Result<String, LlmError>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::always(Ok("VALID".to_string()))
    }
}

impl MockLlmClient {
    /// 每次都返回同一结果
    pub fn always(reply: Result<String, LlmError>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 依次返回给定回复，用完后回退到 "VALID"
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::default();
        {
            let mut queue = mock.replies.lock().unwrap_or_else(|e| e.into_inner());
            queue.extend(replies.into_iter().map(|r| Ok(r.into())));
        }
        mock
    }

    /// 追加一个结果（可为错误）
    pub fn push(&self, reply: Result<String, LlmError>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], temperature: f32) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                messages: messages.to_vec(),
                temperature,
            });

        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}
