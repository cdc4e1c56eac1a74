//! 每日提醒循环（Reminder Scheduler）
//!
//! 睡到下一个每日时刻 → 私信提醒 → 打开闸门 → 再睡到明天。
//! 发送失败不单独处理：错误向上返回，整个循环结束。

use std::sync::Arc;

use chrono::Local;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::schedule::{next_fire, sleep_or_cancel, Cadence, SchedulerPhase};
use crate::core::ReminderGate;
use crate::integrations::ChatPlatform;

/// 每日提醒文本
pub const REMINDER_TEXT: &str = "What moved the needle today?";

pub struct ReminderScheduler {
    chat: Arc<dyn ChatPlatform>,
    gate: Arc<ReminderGate>,
    cadence: Cadence,
    recipient_id: u64,
    phase: watch::Sender<SchedulerPhase>,
}

impl ReminderScheduler {
    pub fn new(
        chat: Arc<dyn ChatPlatform>,
        gate: Arc<ReminderGate>,
        cadence: Cadence,
        recipient_id: u64,
    ) -> Self {
        let (phase, _) = watch::channel(SchedulerPhase::Idle);
        Self {
            chat,
            gate,
            cadence,
            recipient_id,
            phase,
        }
    }

    /// 订阅阶段变化
    pub fn subscribe(&self) -> watch::Receiver<SchedulerPhase> {
        self.phase.subscribe()
    }

    /// 向私信频道发送提醒并打开闸门
    pub async fn fire(&self, channel_id: &str) -> anyhow::Result<()> {
        self.chat.send(channel_id, REMINDER_TEXT).await?;
        self.gate.arm(Local::now());
        tracing::info!("Daily reminder sent, gate armed");
        Ok(())
    }

    /// 运行直到关闭信号；发送失败时返回错误
    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let channel_id = self.chat.open_dm(self.recipient_id).await?;
        let mut last_fired = None;

        loop {
            let now = Local::now().naive_local();
            let (wait, target) = next_fire(&self.cadence, now, last_fired);
            self.phase.send_replace(SchedulerPhase::Sleeping);
            tracing::info!(
                "Next daily reminder in {}s ({:?})",
                wait.as_secs(),
                self.cadence
            );

            if !sleep_or_cancel(wait, &token).await {
                tracing::info!("Reminder loop cancelled");
                return Ok(());
            }

            self.phase.send_replace(SchedulerPhase::Fired);
            self.fire(&channel_id).await?;
            last_fired = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::MockChat;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fire_sends_and_arms() {
        let chat = Arc::new(MockChat::new());
        let gate = Arc::new(ReminderGate::default());
        let scheduler = ReminderScheduler::new(
            chat.clone(),
            gate.clone(),
            Cadence::Interval(Duration::from_secs(60)),
            7,
        );

        scheduler.fire("dm-7").await.unwrap();
        assert!(gate.armed_since(Local::now()).is_some());
        assert_eq!(chat.sent()[0].text, REMINDER_TEXT);
        assert_eq!(chat.sent()[0].channel_id, "dm-7");
    }

    #[tokio::test]
    async fn test_run_fires_repeatedly_until_cancelled() {
        let chat = Arc::new(MockChat::new());
        let gate = Arc::new(ReminderGate::default());
        let scheduler = ReminderScheduler::new(
            chat.clone(),
            gate.clone(),
            Cadence::Interval(Duration::from_millis(10)),
            7,
        );
        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        let sent = chat.sent();
        assert!(sent.len() >= 2, "expected repeated reminders, got {}", sent.len());
        assert!(sent.iter().all(|m| m.channel_id == MockChat::dm_channel(7)));
        assert!(gate.armed_since(Local::now()).is_some());
    }

    #[tokio::test]
    async fn test_send_failure_ends_loop() {
        let chat = Arc::new(MockChat::new());
        chat.set_fail_sends(true);
        let gate = Arc::new(ReminderGate::default());
        let scheduler = ReminderScheduler::new(
            chat.clone(),
            gate.clone(),
            Cadence::Interval(Duration::from_millis(5)),
            7,
        );
        let mut phase = scheduler.subscribe();

        let result = scheduler.run(CancellationToken::new()).await;
        assert!(result.is_err());
        assert!(gate.armed_since(Local::now()).is_none());
        assert_eq!(*phase.borrow_and_update(), SchedulerPhase::Fired);
    }

    #[tokio::test]
    async fn test_cancel_while_sleeping() {
        let chat = Arc::new(MockChat::new());
        let scheduler = ReminderScheduler::new(
            chat.clone(),
            Arc::new(ReminderGate::default()),
            Cadence::Interval(Duration::from_secs(3600)),
            7,
        );
        let phase = scheduler.subscribe();
        let token = CancellationToken::new();
        token.cancel();
        scheduler.run(token).await.unwrap();
        assert!(chat.sent().is_empty());
        assert_eq!(*phase.borrow(), SchedulerPhase::Sleeping);
    }
}
