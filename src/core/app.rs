//! 应用编排：主控循环
//!
//! 负责：由配置构建校验器 / 复盘器 / 两个调度循环，建立事件通道，
//! 并在后台任务中运行平台监听、消息分发、每日提醒、每周复盘四个任务。
//! 两个调度循环在平台就绪（拿到机器人自身 ID）之后才开始。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::coach::reflection::DEFAULT_REFLECTION_PROMPT;
use crate::coach::validator::DEFAULT_VALIDATOR_PROMPT;
use crate::coach::{load_prompt, ReflectionGenerator, WinValidator};
use crate::config::AppConfig;
use crate::core::schedule::{Cadence, SchedulerPhase};
use crate::core::{run_dispatcher, InboundRouter, ReflectionScheduler, ReminderGate, ReminderScheduler};
use crate::integrations::ChatPlatform;
use crate::llm::LlmClient;
use crate::memory::WinStore;

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct NeedleApp {
    config: AppConfig,
    chat: Arc<dyn ChatPlatform>,
    llm: Arc<dyn LlmClient>,
    store: Arc<WinStore>,
    gate: Arc<ReminderGate>,
}

impl NeedleApp {
    pub fn new(config: AppConfig, chat: Arc<dyn ChatPlatform>, llm: Arc<dyn LlmClient>) -> Self {
        let store = Arc::new(WinStore::new(config.app.wins_path()));
        let gate = Arc::new(ReminderGate::with_expiry_hours(config.gate.expire_after_hours));
        Self {
            config,
            chat,
            llm,
            store,
            gate,
        }
    }

    pub fn store(&self) -> Arc<WinStore> {
        Arc::clone(&self.store)
    }

    pub fn gate(&self) -> Arc<ReminderGate> {
        Arc::clone(&self.gate)
    }

    /// 运行到平台监听结束或 token 取消
    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let daily = Cadence::daily_from_config(&self.config.schedule)?;
        let weekly = Cadence::weekly_from_config(&self.config.schedule)?;
        let recipient_id = self.config.discord.recipient_id;
        let prompts_dir = self.config.prompts.dir.clone();

        tracing::info!(
            "Starting on {} for recipient {}, wins at {}",
            self.chat.name(),
            recipient_id,
            self.store.path().display()
        );
        if self.config.schedule.test_mode {
            tracing::warn!("Test mode enabled: reminders and reflections fire on short intervals");
        }

        let validator = WinValidator::new(
            Arc::clone(&self.llm),
            load_prompt(&prompts_dir, "validator.txt", DEFAULT_VALIDATOR_PROMPT),
            self.config.llm.validator_temperature,
        );
        let generator = ReflectionGenerator::new(
            Arc::clone(&self.llm),
            load_prompt(&prompts_dir, "reflection.txt", DEFAULT_REFLECTION_PROMPT),
            self.config.llm.reflection_temperature,
        );

        let tasks = token.child_token();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = watch::channel::<Option<String>>(None);

        let router = InboundRouter::new(
            Arc::clone(&self.chat),
            validator,
            Arc::clone(&self.store),
            Arc::clone(&self.gate),
            self.config.discord.reaction.clone(),
        );
        let dispatcher = tokio::spawn(run_dispatcher(event_rx, router, ready_tx, tasks.clone()));

        let reminder = ReminderScheduler::new(
            Arc::clone(&self.chat),
            Arc::clone(&self.gate),
            daily,
            recipient_id,
        );
        log_phases("reminder", reminder.subscribe());
        let reminder = spawn_after_ready("reminder", ready_rx.clone(), tasks.clone(), |t| {
            reminder.run(t)
        });

        let reflection = ReflectionScheduler::new(
            Arc::clone(&self.chat),
            Arc::clone(&self.store),
            generator,
            weekly,
            recipient_id,
        );
        log_phases("reflection", reflection.subscribe());
        let reflection = spawn_after_ready("reflection", ready_rx, tasks.clone(), |t| {
            reflection.run(t)
        });

        let listener = {
            let chat = Arc::clone(&self.chat);
            let t = tasks.clone();
            tokio::spawn(async move { chat.listen(event_tx, t).await })
        };

        match listener.await {
            Ok(Ok(())) => tracing::info!("Chat listener stopped"),
            Ok(Err(e)) => tracing::error!("Chat listener failed: {:#}", e),
            Err(e) => tracing::error!("Chat listener task panicked: {}", e),
        }

        tasks.cancel();
        for (name, handle) in [("reminder", reminder), ("reflection", reflection)] {
            if let Err(e) = handle.await {
                tracing::error!("{} task panicked: {}", name, e);
            }
        }
        if let Err(e) = dispatcher.await {
            tracing::error!("Dispatcher task panicked: {}", e);
        }

        let (prompt, completion, total) = self.llm.token_usage();
        tracing::info!(
            "LLM token usage: prompt={}, completion={}, total={}",
            prompt,
            completion,
            total
        );
        Ok(())
    }
}

/// 等到平台就绪后再运行调度循环；循环出错只记日志，不影响其他任务
fn spawn_after_ready<F, Fut>(
    name: &'static str,
    mut ready_rx: watch::Receiver<Option<String>>,
    token: CancellationToken,
    run: F,
) -> JoinHandle<()>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let ready = tokio::select! {
            _ = token.cancelled() => false,
            r = ready_rx.wait_for(|id| id.is_some()) => r.is_ok(),
        };
        if !ready {
            tracing::info!("{} loop not started: shutting down before ready", name);
            return;
        }
        tracing::info!("{} loop started", name);
        match run(token).await {
            Ok(()) => tracing::info!("{} loop stopped", name),
            Err(e) => tracing::error!("{} loop terminated: {:#}", name, e),
        }
    })
}

/// 记录调度循环的阶段变化；循环结束（发送端释放）后退出
fn log_phases(name: &'static str, mut phase_rx: watch::Receiver<SchedulerPhase>) {
    tokio::spawn(async move {
        while phase_rx.changed().await.is_ok() {
            let phase = *phase_rx.borrow_and_update();
            tracing::debug!("{} loop phase: {:?}", name, phase);
        }
    });
}
