//! 提醒闸门（Reminder Gate）
//!
//! 每日提醒发出后打开，收到一条有效成果并写入日志后关闭；只有闸门打开时的私信才会被当作成果汇报。
//! 提醒循环与消息分发在不同任务中运行：校验一条回复要等 LLM，期间新的提醒可能重新打开闸门。
//! 因此路由在检查时记下打开时刻，记录成果后用 `disarm_if` 只关闭它看到的那一次打开。

use std::sync::Mutex;

use chrono::{DateTime, Duration, Local};

/// 闸门状态：记录打开时刻，可选过期时长
#[derive(Debug, Default)]
pub struct ReminderGate {
    armed_at: Mutex<Option<DateTime<Local>>>,
    /// None 表示永不过期：直到有效回复或下一次提醒覆盖
    expire_after: Option<Duration>,
}

impl ReminderGate {
    pub fn new(expire_after: Option<Duration>) -> Self {
        Self {
            armed_at: Mutex::new(None),
            expire_after,
        }
    }

    /// 按小时配置过期时长（对应 [gate].expire_after_hours）
    pub fn with_expiry_hours(hours: Option<u64>) -> Self {
        Self::new(hours.map(|h| Duration::hours(h as i64)))
    }

    /// 打开闸门；已打开时刷新打开时刻
    pub fn arm(&self, now: DateTime<Local>) {
        let mut armed_at = self.armed_at.lock().unwrap_or_else(|e| e.into_inner());
        *armed_at = Some(now);
        tracing::debug!("Reminder gate armed at {}", now);
    }

    /// 仅当闸门仍是 seen 那一次打开时才关闭；返回是否关闭
    pub fn disarm_if(&self, seen: DateTime<Local>) -> bool {
        let mut armed_at = self.armed_at.lock().unwrap_or_else(|e| e.into_inner());
        if *armed_at == Some(seen) {
            *armed_at = None;
            tracing::debug!("Reminder gate disarmed");
            true
        } else {
            false
        }
    }

    /// 在 now 时刻闸门若打开，返回打开时刻；已过期则顺带关闭
    pub fn armed_since(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let mut armed_at = self.armed_at.lock().unwrap_or_else(|e| e.into_inner());
        let at = (*armed_at)?;
        match self.expire_after {
            Some(ttl) if now - at >= ttl => {
                tracing::info!("Reminder gate expired (armed at {}, ttl {}h)", at, ttl.num_hours());
                *armed_at = None;
                None
            }
            _ => Some(at),
        }
    }
}
