//! 端到端流程测试：Mock 聊天平台 + Mock LLM + 临时目录中的 wins.csv

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use needle::config::AppConfig;
use needle::core::NeedleApp;
use needle::integrations::{ChatEvent, InboundMessage, MockChat};
use needle::llm::{LlmError, MockLlmClient};
use needle::memory::{WinRecord, WinStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const RECIPIENT: u64 = 42;
const BOT_ID: &str = "bot-1";

fn test_config(dir: &TempDir, daily_secs: u64, weekly_secs: u64) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.app.data_dir = dir.path().to_path_buf();
    cfg.discord.recipient_id = RECIPIENT;
    cfg.prompts.dir = dir.path().join("prompts");
    cfg.schedule.test_mode = true;
    cfg.schedule.test_daily_interval_secs = daily_secs;
    cfg.schedule.test_weekly_interval_secs = weekly_secs;
    cfg
}

fn dm(id: &str, author: &str, content: &str) -> ChatEvent {
    ChatEvent::Message(InboundMessage {
        id: id.to_string(),
        channel_id: MockChat::dm_channel(RECIPIENT),
        author_id: author.to_string(),
        content: content.to_string(),
        is_direct: true,
    })
}

async fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

#[tokio::test]
async fn test_reminder_arms_gate_then_win_is_logged() {
    let dir = TempDir::new().unwrap();
    let chat = Arc::new(MockChat::new());
    let llm = Arc::new(MockLlmClient::always(Ok("VALID".to_string())));
    llm.push(Ok("INVALID: effort, not output".to_string()));

    let app = NeedleApp::new(test_config(&dir, 1, 3600), chat.clone(), llm.clone());
    let gate = app.gate();
    let store = app.store();
    let token = CancellationToken::new();
    let handle = tokio::spawn(app.run(token.clone()));

    chat.inject(ChatEvent::Ready {
        self_id: BOT_ID.to_string(),
    });
    // 提醒之前的私信：闸门关闭，忽略
    chat.inject(dm("m0", "user-1", "Too early"));

    assert!(wait_until(|| gate.armed_since(Local::now()).is_some(), Duration::from_secs(5)).await);
    assert_eq!(chat.sent()[0].text, "What moved the needle today?");
    assert_eq!(chat.sent()[0].channel_id, MockChat::dm_channel(RECIPIENT));
    assert_eq!(llm.call_count(), 0);

    chat.inject(dm("m1", BOT_ID, "echo of my own message"));
    chat.inject(dm("m2", "user-1", "Worked on the deck"));
    chat.inject(dm("m3", "user-1", "Shipped the onboarding email"));

    assert!(wait_until(|| !chat.reactions().is_empty(), Duration::from_secs(5)).await);

    token.cancel();
    handle.await.unwrap().unwrap();

    // 自己的消息不调用 LLM；m2 被拒，m3 通过
    assert_eq!(llm.call_count(), 2);
    assert_eq!(llm.calls()[1].messages[1].content, "Win: Shipped the onboarding email");

    let sent = chat.sent();
    assert!(sent
        .iter()
        .any(|m| m.text.starts_with("⚠️ INVALID: effort, not output")));

    let reactions = chat.reactions();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0].message_id, "m3");
    assert_eq!(reactions[0].emoji, "✅");

    let wins = store.read_all().unwrap();
    assert_eq!(wins.len(), 1);
    assert_eq!(wins[0].text, "Shipped the onboarding email");
    assert_eq!(wins[0].date, Local::now().date_naive());

    let raw = std::fs::read_to_string(dir.path().join("wins.csv")).unwrap();
    assert!(raw.starts_with("date,win\n"));
}

#[tokio::test]
async fn test_llm_outage_keeps_gate_armed() {
    let dir = TempDir::new().unwrap();
    let chat = Arc::new(MockChat::new());
    let llm = Arc::new(MockLlmClient::always(Err(LlmError::Request(
        "service unavailable".to_string(),
    ))));

    let app = NeedleApp::new(test_config(&dir, 1, 3600), chat.clone(), llm.clone());
    let gate = app.gate();
    let store = app.store();
    let token = CancellationToken::new();
    let handle = tokio::spawn(app.run(token.clone()));

    chat.inject(ChatEvent::Ready {
        self_id: BOT_ID.to_string(),
    });
    assert!(wait_until(|| gate.armed_since(Local::now()).is_some(), Duration::from_secs(5)).await);

    chat.inject(dm("m1", "user-1", "Closed two deals"));
    assert!(
        wait_until(
            || chat
                .sent()
                .iter()
                .any(|m| m.text == "Validation failed. Please try again."),
            Duration::from_secs(5)
        )
        .await
    );

    token.cancel();
    handle.await.unwrap().unwrap();

    assert!(gate.armed_since(Local::now()).is_some());
    assert!(chat.reactions().is_empty());
    assert!(store.read_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_weekly_reflection_covers_recent_wins() {
    let dir = TempDir::new().unwrap();
    let today = Local::now().date_naive();
    let seeded = WinStore::new(dir.path().join("wins.csv"));
    seeded
        .append(&WinRecord::new(today - chrono::Duration::days(30), "Old launch"))
        .unwrap();
    seeded
        .append(&WinRecord::new(today - chrono::Duration::days(1), "Signed the lease"))
        .unwrap();

    let chat = Arc::new(MockChat::new());
    let llm = Arc::new(MockLlmClient::always(Ok("Strong finish to the week.".to_string())));

    let app = NeedleApp::new(test_config(&dir, 3600, 1), chat.clone(), llm.clone());
    let token = CancellationToken::new();
    let handle = tokio::spawn(app.run(token.clone()));

    chat.inject(ChatEvent::Ready {
        self_id: BOT_ID.to_string(),
    });
    assert!(wait_until(|| !chat.sent().is_empty(), Duration::from_secs(5)).await);

    token.cancel();
    handle.await.unwrap().unwrap();

    let first = &chat.sent()[0];
    assert_eq!(first.text, "**Weekly Reflection:**\nStrong finish to the week.");
    assert_eq!(first.channel_id, MockChat::dm_channel(RECIPIENT));

    let prompt = &llm.calls()[0].messages[1].content;
    assert!(prompt.contains("Signed the lease"));
    assert!(!prompt.contains("Old launch"));
}

#[tokio::test]
async fn test_no_loops_before_ready() {
    let dir = TempDir::new().unwrap();
    let chat = Arc::new(MockChat::new());
    let llm = Arc::new(MockLlmClient::default());

    let app = NeedleApp::new(test_config(&dir, 1, 1), chat.clone(), llm.clone());
    let token = CancellationToken::new();
    let handle = tokio::spawn(app.run(token.clone()));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    token.cancel();
    handle.await.unwrap().unwrap();

    assert!(chat.sent().is_empty());
    assert_eq!(llm.call_count(), 0);
}
