//! 入站消息路由（Inbound Message Router）
//!
//! 只有「闸门打开时到达的私信」才会送去校验；校验通过则写入成果日志、加表情确认并关闭闸门。
//! 所有事件在同一个分发任务里顺序处理，检查闸门与关闭闸门之间不会被另一条消息插入。

use std::sync::Arc;

use chrono::Local;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::coach::{Outcome, WinValidator};
use crate::core::ReminderGate;
use crate::integrations::{ChatEvent, ChatPlatform, InboundMessage};
use crate::memory::{WinRecord, WinStore};

/// 单条消息的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteResult {
    /// 机器人自己发的
    IgnoredSelf,
    /// 非私信
    IgnoredNotDirect,
    /// 闸门关闭时的私信
    IgnoredGateClosed,
    /// 校验调用失败，已请用户重发
    Failed,
    /// 不是产出型成果，已回复原因
    Rejected(String),
    /// 已记录
    Logged,
}

pub struct InboundRouter {
    chat: Arc<dyn ChatPlatform>,
    validator: WinValidator,
    store: Arc<WinStore>,
    gate: Arc<ReminderGate>,
    reaction: String,
}

impl InboundRouter {
    pub fn new(
        chat: Arc<dyn ChatPlatform>,
        validator: WinValidator,
        store: Arc<WinStore>,
        gate: Arc<ReminderGate>,
        reaction: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            validator,
            store,
            gate,
            reaction: reaction.into(),
        }
    }

    /// 处理一条入站消息；self_id 为机器人自身 ID（就绪前可能未知）
    pub async fn handle(
        &self,
        msg: &InboundMessage,
        self_id: Option<&str>,
    ) -> anyhow::Result<RouteResult> {
        if self_id == Some(msg.author_id.as_str()) {
            return Ok(RouteResult::IgnoredSelf);
        }
        if !msg.is_direct {
            return Ok(RouteResult::IgnoredNotDirect);
        }
        let Some(armed_at) = self.gate.armed_since(Local::now()) else {
            tracing::debug!("Ignoring DM {} while gate is closed", msg.id);
            return Ok(RouteResult::IgnoredGateClosed);
        };

        let outcome = self.validator.validate(&msg.content).await;
        if let Some(reply) = outcome.user_reply() {
            self.chat.send(&msg.channel_id, &reply).await?;
        }

        match outcome {
            Outcome::Valid => {
                let record = WinRecord::new(Local::now().date_naive(), msg.content.clone());
                self.store.append(&record)?;
                if !self.gate.disarm_if(armed_at) {
                    tracing::info!("Gate re-armed by a newer reminder during validation, leaving it open");
                }
                if let Err(e) = self.chat.react(&msg.channel_id, &msg.id, &self.reaction).await {
                    tracing::warn!("Failed to add confirmation reaction: {:#}", e);
                }
                Ok(RouteResult::Logged)
            }
            Outcome::Invalid(reason) => Ok(RouteResult::Rejected(reason)),
            Outcome::Failed => Ok(RouteResult::Failed),
        }
    }
}

/// 事件分发循环：READY 记录自身 ID 并广播就绪；消息逐条交给路由
///
/// 单条消息出错只记日志，循环继续。
pub async fn run_dispatcher(
    mut rx: mpsc::Receiver<ChatEvent>,
    router: InboundRouter,
    ready_tx: watch::Sender<Option<String>>,
    token: CancellationToken,
) {
    let mut self_id: Option<String> = None;
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = rx.recv() => match event {
                Some(e) => e,
                None => break,
            },
        };

        match event {
            ChatEvent::Ready { self_id: id } => {
                tracing::info!("Logged in as {}", id);
                self_id = Some(id.clone());
                let _ = ready_tx.send(Some(id));
            }
            ChatEvent::Message(msg) => match router.handle(&msg, self_id.as_deref()).await {
                Ok(result) => tracing::debug!("Message {} routed: {:?}", msg.id, result),
                Err(e) => tracing::error!("Failed to handle message {}: {:#}", msg.id, e),
            },
        }
    }
    tracing::info!("Message dispatcher stopped");
}
