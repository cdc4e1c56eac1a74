//! Discord 集成
//!
//! REST（reqwest）负责打开私信、发消息、加表情；Gateway（WebSocket）负责接收 READY 与 MESSAGE_CREATE 事件。
//! 连接断开（Reconnect / Invalid Session / Close）后短暂退避并重连，直到收到关闭信号。

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::core::NeedleError;
use crate::integrations::{split_message, ChatEvent, ChatPlatform, InboundMessage};

/// 单条消息长度上限
pub const MAX_MESSAGE_LEN: usize = 2000;

/// GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
pub const GATEWAY_INTENTS: u64 = (1 << 9) | (1 << 12) | (1 << 15);

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Discord Bot 客户端
pub struct DiscordClient {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl DiscordClient {
    pub fn new(bot_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// 以 api_base 为前缀拼接路径段（逐段百分号编码，表情等非 ASCII 安全）
    fn endpoint(&self, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.api_base).context("parse Discord API base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Discord API base URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(resp: reqwest::Response, what: &str) -> anyhow::Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let err = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
        Err(NeedleError::Chat(format!("Discord {what} failed ({status}): {err}")).into())
    }

    async fn gateway_url(&self) -> String {
        let url = match self.endpoint(&["gateway", "bot"]) {
            Ok(u) => u,
            Err(_) => return DEFAULT_GATEWAY_URL.to_string(),
        };
        let resp = self
            .client
            .get(url)
            .header("Authorization", self.auth_header())
            .send()
            .await;
        let body: Option<Value> = match resp {
            Ok(r) => r.json().await.ok(),
            Err(e) => {
                tracing::warn!("Discord: fetching gateway URL failed: {}", e);
                None
            }
        };
        body.as_ref()
            .and_then(|b| b.get("url"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_GATEWAY_URL)
            .to_string()
    }

    /// 一次完整的 Gateway 会话：Hello → Identify → 心跳 + 事件循环
    async fn run_session(
        &self,
        tx: &mpsc::Sender<ChatEvent>,
        token: &CancellationToken,
    ) -> anyhow::Result<SessionEnd> {
        let gw_url = self.gateway_url().await;
        let ws_url = format!("{gw_url}/?v=10&encoding=json");
        tracing::info!("Discord: connecting to gateway...");

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .context("connect to Discord gateway WebSocket")?;
        let (mut write, mut read) = ws_stream.split();

        // Hello (op 10)
        let hello = read
            .next()
            .await
            .ok_or_else(|| anyhow::anyhow!("gateway closed before Hello"))?
            .context("read Discord gateway hello message")?;
        let hello: Value = serde_json::from_str(&hello.to_string())
            .context("parse Discord gateway hello event")?;
        let heartbeat_ms = hello
            .get("d")
            .and_then(|d| d.get("heartbeat_interval"))
            .and_then(Value::as_u64)
            .unwrap_or(41250);

        write
            .send(WsMessage::Text(identify_payload(&self.bot_token).to_string()))
            .await
            .context("send Discord gateway identify")?;
        tracing::info!("Discord: identified, heartbeat every {}ms", heartbeat_ms);

        let mut sequence: Option<i64> = None;
        let mut heartbeat = tokio::time::interval(Duration::from_millis(heartbeat_ms));
        // 第一次 tick 立即返回，跳过
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = heartbeat.tick() => {
                    let hb = json!({"op": 1, "d": sequence});
                    if write.send(WsMessage::Text(hb.to_string())).await.is_err() {
                        return Ok(SessionEnd::Reconnect);
                    }
                }
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(WsMessage::Text(t))) => t,
                        Some(Ok(WsMessage::Close(frame))) => {
                            tracing::warn!("Discord: gateway closed: {:?}", frame);
                            return Ok(SessionEnd::Reconnect);
                        }
                        None => return Ok(SessionEnd::Reconnect),
                        Some(Err(e)) => {
                            tracing::warn!("Discord: gateway read error: {}", e);
                            return Ok(SessionEnd::Reconnect);
                        }
                        _ => continue,
                    };

                    let event: Value = match serde_json::from_str(&text) {
                        Ok(e) => e,
                        Err(_) => continue,
                    };
                    if let Some(s) = event.get("s").and_then(Value::as_i64) {
                        sequence = Some(s);
                    }

                    match event.get("op").and_then(Value::as_u64).unwrap_or(0) {
                        // 服务端要求立即心跳
                        1 => {
                            let hb = json!({"op": 1, "d": sequence});
                            if write.send(WsMessage::Text(hb.to_string())).await.is_err() {
                                return Ok(SessionEnd::Reconnect);
                            }
                            continue;
                        }
                        7 => {
                            tracing::warn!("Discord: received Reconnect (op 7)");
                            return Ok(SessionEnd::Reconnect);
                        }
                        9 => {
                            tracing::warn!("Discord: received Invalid Session (op 9)");
                            return Ok(SessionEnd::Reconnect);
                        }
                        _ => {}
                    }

                    if let Some(chat_event) = parse_dispatch(&event) {
                        if tx.send(chat_event).await.is_err() {
                            return Ok(SessionEnd::Shutdown);
                        }
                    }
                }
            }
        }
    }
}

/// 会话结束原因
enum SessionEnd {
    Reconnect,
    Shutdown,
}

fn identify_payload(bot_token: &str) -> Value {
    json!({
        "op": 2,
        "d": {
            "token": bot_token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "needle",
                "device": "needle"
            }
        }
    })
}

/// 解析 op 0 分发事件：READY → Ready，MESSAGE_CREATE → Message，其余忽略
pub fn parse_dispatch(event: &Value) -> Option<ChatEvent> {
    let d = event.get("d")?;
    match event.get("t").and_then(Value::as_str)? {
        "READY" => {
            let self_id = d.get("user")?.get("id")?.as_str()?.to_string();
            Some(ChatEvent::Ready { self_id })
        }
        "MESSAGE_CREATE" => parse_message_create(d).map(ChatEvent::Message),
        _ => None,
    }
}

/// MESSAGE_CREATE 的 d 字段；没有 guild_id 即私信
pub fn parse_message_create(d: &Value) -> Option<InboundMessage> {
    let id = d.get("id")?.as_str()?.to_string();
    let channel_id = d.get("channel_id")?.as_str()?.to_string();
    let author_id = d.get("author")?.get("id")?.as_str()?.to_string();
    let content = d
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let is_direct = d.get("guild_id").map(Value::is_null).unwrap_or(true);
    Some(InboundMessage {
        id,
        channel_id,
        author_id,
        content,
        is_direct,
    })
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    fn name(&self) -> &str {
        "discord"
    }

    async fn open_dm(&self, user_id: u64) -> anyhow::Result<String> {
        let url = self.endpoint(&["users", "@me", "channels"])?;
        let resp = self
            .client
            .post(url)
            .header("Authorization", self.auth_header())
            .json(&json!({ "recipient_id": user_id.to_string() }))
            .send()
            .await
            .context("open Discord DM channel")?;
        let body: Value = Self::check(resp, "open DM")
            .await?
            .json()
            .await
            .context("parse Discord DM channel response")?;
        let channel_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("No channel id in Discord DM response"))?;
        Ok(channel_id.to_string())
    }

    async fn send(&self, channel_id: &str, text: &str) -> anyhow::Result<()> {
        let url = self.endpoint(&["channels", channel_id, "messages"])?;
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let resp = self
                .client
                .post(url.clone())
                .header("Authorization", self.auth_header())
                .json(&json!({ "content": chunk }))
                .send()
                .await
                .context("send Discord message request")?;
            Self::check(resp, "send message").await?;
        }
        Ok(())
    }

    async fn react(&self, channel_id: &str, message_id: &str, emoji: &str) -> anyhow::Result<()> {
        let url = self.endpoint(&[
            "channels",
            channel_id,
            "messages",
            message_id,
            "reactions",
            emoji,
            "@me",
        ])?;
        let resp = self
            .client
            .put(url)
            .header("Authorization", self.auth_header())
            .header("Content-Length", "0")
            .send()
            .await
            .context("add Discord reaction")?;
        Self::check(resp, "add reaction").await?;
        Ok(())
    }

    async fn listen(
        &self,
        tx: mpsc::Sender<ChatEvent>,
        token: CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            match self.run_session(&tx, &token).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Reconnect) => {
                    tracing::info!("Discord: reconnecting in {}s", RECONNECT_BACKOFF.as_secs());
                }
                Err(e) => {
                    tracing::error!("Discord: gateway session failed: {:#}", e);
                }
            }
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
            }
        }
    }
}
