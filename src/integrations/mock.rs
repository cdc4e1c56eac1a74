//! Mock 聊天平台（用于测试，无需网络）
//!
//! 记录发出的消息与表情；listen 把 inject 进来的事件原样转发。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::integrations::{ChatEvent, ChatPlatform};

/// 发出的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel_id: String,
    pub text: String,
}

/// 加上的一个表情
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub channel_id: String,
    pub message_id: String,
    pub emoji: String,
}

#[derive(Debug)]
pub struct MockChat {
    sent: Mutex<Vec<SentMessage>>,
    reactions: Mutex<Vec<Reaction>>,
    inject_tx: mpsc::UnboundedSender<ChatEvent>,
    inject_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ChatEvent>>,
    fail_sends: AtomicBool,
}

impl Default for MockChat {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChat {
    pub fn new() -> Self {
        let (inject_tx, inject_rx) = mpsc::unbounded_channel();
        Self {
            sent: Mutex::new(Vec::new()),
            reactions: Mutex::new(Vec::new()),
            inject_tx,
            inject_rx: tokio::sync::Mutex::new(inject_rx),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// 私信频道 ID 的约定格式
    pub fn dm_channel(user_id: u64) -> String {
        format!("dm-{}", user_id)
    }

    /// 注入一条事件，listen 会转发给订阅方
    pub fn inject(&self, event: ChatEvent) {
        let _ = self.inject_tx.send(event);
    }

    /// 之后的 send 全部失败
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn reactions(&self) -> Vec<Reaction> {
        self.reactions.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ChatPlatform for MockChat {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open_dm(&self, user_id: u64) -> anyhow::Result<String> {
        Ok(Self::dm_channel(user_id))
    }

    async fn send(&self, channel_id: &str, text: &str) -> anyhow::Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("mock send failure");
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                channel_id: channel_id.to_string(),
                text: text.to_string(),
            });
        Ok(())
    }

    async fn react(&self, channel_id: &str, message_id: &str, emoji: &str) -> anyhow::Result<()> {
        self.reactions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Reaction {
                channel_id: channel_id.to_string(),
                message_id: message_id.to_string(),
                emoji: emoji.to_string(),
            });
        Ok(())
    }

    async fn listen(
        &self,
        tx: mpsc::Sender<ChatEvent>,
        token: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut inbox = self.inject_rx.lock().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                event = inbox.recv() => {
                    let Some(event) = event else { return Ok(()) };
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
