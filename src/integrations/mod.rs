//! 外部集成：聊天平台抽象与 Discord 实现
//!
//! 平台需要提供：向固定用户私信、入站消息事件流（区分私信与作者）、给某条消息加表情确认。

pub mod discord;
pub mod mock;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use discord::DiscordClient;
pub use mock::MockChat;

/// 一条入站消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    /// 是否私信（不在任何服务器频道内）
    pub is_direct: bool,
}

/// 监听到的平台事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// 连接就绪，附带机器人自身用户 ID
    Ready { self_id: String },
    Message(InboundMessage),
}

/// 聊天平台 trait
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    fn name(&self) -> &str;

    /// 打开（或取回）与某用户的私信频道，返回频道 ID
    async fn open_dm(&self, user_id: u64) -> anyhow::Result<String>;

    /// 发送文本；超长时由实现自行分段
    async fn send(&self, channel_id: &str, text: &str) -> anyhow::Result<()>;

    /// 给消息加表情
    async fn react(&self, channel_id: &str, message_id: &str, emoji: &str) -> anyhow::Result<()>;

    /// 持续监听事件直到 token 取消或连接无法恢复
    async fn listen(
        &self,
        tx: mpsc::Sender<ChatEvent>,
        token: CancellationToken,
    ) -> anyhow::Result<()>;
}

/// 按字符数分段（不切断 UTF-8 字符）
pub fn split_message(body: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if body.chars().count() <= max_len {
        return vec![body.to_string()];
    }
    body.chars()
        .collect::<Vec<_>>()
        .chunks(max_len)
        .map(|c| c.iter().collect())
        .collect()
}
