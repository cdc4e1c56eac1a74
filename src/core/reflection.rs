//! 每周复盘循环（Reflection Scheduler）
//!
//! 睡到下一个每周时刻 → 读全部成果 → 取最近 7 天 → LLM 总结 → 加标题私信发送。
//! 读日志或总结失败时本周期不发复盘，循环继续；发送失败与每日提醒一致，结束循环。

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::coach::{trailing_window, ReflectionGenerator};
use crate::core::schedule::{next_fire, sleep_or_cancel, Cadence, SchedulerPhase};
use crate::integrations::ChatPlatform;
use crate::memory::WinStore;

/// 复盘消息标题
pub const REFLECTION_BANNER: &str = "**Weekly Reflection:**";

pub struct ReflectionScheduler {
    chat: Arc<dyn ChatPlatform>,
    store: Arc<WinStore>,
    generator: ReflectionGenerator,
    cadence: Cadence,
    recipient_id: u64,
    phase: watch::Sender<SchedulerPhase>,
}

impl ReflectionScheduler {
    pub fn new(
        chat: Arc<dyn ChatPlatform>,
        store: Arc<WinStore>,
        generator: ReflectionGenerator,
        cadence: Cadence,
        recipient_id: u64,
    ) -> Self {
        let (phase, _) = watch::channel(SchedulerPhase::Idle);
        Self {
            chat,
            store,
            generator,
            cadence,
            recipient_id,
            phase,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerPhase> {
        self.phase.subscribe()
    }

    /// 生成 today 的复盘正文；None 表示本周期跳过
    pub async fn compose(&self, today: NaiveDate) -> Option<String> {
        let all = match self.store.read_all() {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Weekly reflection skipped, reading wins failed: {}", e);
                return None;
            }
        };
        let recent = trailing_window(&all, today);
        tracing::info!("Weekly reflection over {} of {} wins", recent.len(), all.len());

        match self.generator.summarize(&recent).await {
            Ok(text) => Some(format!("{}\n{}", REFLECTION_BANNER, text)),
            Err(e) => {
                tracing::error!("Weekly reflection skipped, summarization failed: {}", e);
                None
            }
        }
    }

    /// 执行一次复盘并发送
    pub async fn fire(&self, channel_id: &str) -> anyhow::Result<()> {
        if let Some(message) = self.compose(Local::now().date_naive()).await {
            self.chat.send(channel_id, &message).await?;
            tracing::info!("Weekly reflection sent");
        }
        Ok(())
    }

    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let channel_id = self.chat.open_dm(self.recipient_id).await?;
        let mut last_fired = None;

        loop {
            let now = Local::now().naive_local();
            let (wait, target) = next_fire(&self.cadence, now, last_fired);
            self.phase.send_replace(SchedulerPhase::Sleeping);
            tracing::info!("Next weekly reflection in {}s ({:?})", wait.as_secs(), self.cadence);

            if !sleep_or_cancel(wait, &token).await {
                tracing::info!("Reflection loop cancelled");
                return Ok(());
            }

            self.phase.send_replace(SchedulerPhase::Fired);
            self.fire(&channel_id).await?;
            last_fired = target;
        }
    }
}
