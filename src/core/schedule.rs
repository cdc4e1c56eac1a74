//! 触发时刻计算与可取消等待
//!
//! 与墙上时钟对齐：按本地时间（无时区换算）计算下一次每日 / 每周触发时刻；
//! 测试模式下改用固定短间隔。

use std::time::Duration as StdDuration;

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};
use tokio_util::sync::CancellationToken;

use crate::config::ScheduleSection;
use crate::core::NeedleError;

/// 调度循环所处阶段：Idle → Sleeping → Fired → Sleeping → …
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Sleeping,
    Fired,
}

/// 每天固定时刻
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyAt {
    pub time: NaiveTime,
}

impl DailyAt {
    pub fn new(time: NaiveTime) -> Self {
        Self { time }
    }

    /// 今天的目标时刻；已过则顺延到明天同一时刻
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let target = now.date().and_time(self.time);
        if now > target {
            target + Duration::days(1)
        } else {
            target
        }
    }
}

/// 每周固定星期几的固定时刻
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyAt {
    pub weekday: Weekday,
    pub time: NaiveTime,
}

impl WeeklyAt {
    pub fn new(weekday: Weekday, time: NaiveTime) -> Self {
        Self { weekday, time }
    }

    /// 今天 + 距目标星期几的天数；当天已过则顺延一周
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.weekday().num_days_from_monday() as i64;
        let wanted = self.weekday.num_days_from_monday() as i64;
        let days_until = (wanted - today).rem_euclid(7);
        let target = now.date().and_time(self.time) + Duration::days(days_until);
        if now > target {
            target + Duration::days(7)
        } else {
            target
        }
    }
}

/// 调度节奏：日历对齐或固定间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily(DailyAt),
    Weekly(WeeklyAt),
    /// 测试模式：每次固定等待
    Interval(StdDuration),
}

impl Cadence {
    /// 每日提醒节奏（测试模式下为短间隔）
    pub fn daily_from_config(cfg: &ScheduleSection) -> Result<Self, NeedleError> {
        if cfg.test_mode {
            return Ok(Cadence::Interval(StdDuration::from_secs(cfg.test_daily_interval_secs)));
        }
        Ok(Cadence::Daily(DailyAt::new(cfg.daily_time()?)))
    }

    /// 每周复盘节奏（测试模式下为短间隔）
    pub fn weekly_from_config(cfg: &ScheduleSection) -> Result<Self, NeedleError> {
        if cfg.test_mode {
            return Ok(Cadence::Interval(StdDuration::from_secs(cfg.test_weekly_interval_secs)));
        }
        Ok(Cadence::Weekly(WeeklyAt::new(cfg.weekly_day()?, cfg.weekly_time()?)))
    }
}

/// 下一次触发：返回等待时长与目标时刻（固定间隔没有目标时刻）
///
/// last_fired 是上一次触发的目标时刻。下一目标从 max(now, last_fired + 1s) 算起：
/// 睡眠走单调时钟，醒来时墙上时钟可能还差几毫秒才到刚触发的目标，不能再次选中它。
pub fn next_fire(
    cadence: &Cadence,
    now: NaiveDateTime,
    last_fired: Option<NaiveDateTime>,
) -> (StdDuration, Option<NaiveDateTime>) {
    let from = match last_fired {
        Some(last) => now.max(last + Duration::seconds(1)),
        None => now,
    };
    let target = match cadence {
        Cadence::Daily(daily) => daily.next_after(from),
        Cadence::Weekly(weekly) => weekly.next_after(from),
        Cadence::Interval(interval) => return (*interval, None),
    };
    ((target - now).to_std().unwrap_or(StdDuration::ZERO), Some(target))
}

/// 等待 wait 时长；返回 false 表示被关闭信号打断
pub async fn sleep_or_cancel(wait: StdDuration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(wait) => true,
        _ = token.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn nine_pm() -> DailyAt {
        DailyAt::new(NaiveTime::from_hms_opt(21, 0, 0).unwrap())
    }

    fn sunday_8pm() -> WeeklyAt {
        WeeklyAt::new(Weekday::Sun, NaiveTime::from_hms_opt(20, 0, 0).unwrap())
    }

    #[test]
    fn test_daily_before_target_is_today() {
        assert_eq!(nine_pm().next_after(dt(2024, 3, 6, 9, 30)), dt(2024, 3, 6, 21, 0));
    }

    #[test]
    fn test_daily_past_target_rolls_to_tomorrow() {
        let next = nine_pm().next_after(dt(2024, 3, 6, 21, 1));
        assert_eq!(next, dt(2024, 3, 7, 21, 0));
        assert_eq!(next - dt(2024, 3, 6, 21, 0), Duration::hours(24));
    }

    #[test]
    fn test_daily_exactly_at_target_fires_now() {
        assert_eq!(nine_pm().next_after(dt(2024, 3, 6, 21, 0)), dt(2024, 3, 6, 21, 0));
    }

    #[test]
    fn test_daily_rolls_over_month_end() {
        assert_eq!(nine_pm().next_after(dt(2024, 2, 29, 23, 0)), dt(2024, 3, 1, 21, 0));
    }

    #[test]
    fn test_weekly_midweek_targets_coming_sunday() {
        // 2024-03-06 是周三
        assert_eq!(sunday_8pm().next_after(dt(2024, 3, 6, 12, 0)), dt(2024, 3, 10, 20, 0));
    }

    #[test]
    fn test_weekly_on_target_day_before_time() {
        assert_eq!(sunday_8pm().next_after(dt(2024, 3, 10, 8, 0)), dt(2024, 3, 10, 20, 0));
    }

    #[test]
    fn test_weekly_on_target_day_past_time_rolls_one_week() {
        let next = sunday_8pm().next_after(dt(2024, 3, 10, 20, 30));
        assert_eq!(next, dt(2024, 3, 17, 20, 0));
        assert_eq!(next - dt(2024, 3, 10, 20, 0), Duration::days(7));
    }

    #[test]
    fn test_weekly_monday_target() {
        let monday = WeeklyAt::new(Weekday::Mon, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        // 周日 → 次日周一
        assert_eq!(monday.next_after(dt(2024, 3, 10, 22, 0)), dt(2024, 3, 11, 9, 0));
    }

    #[test]
    fn test_cadence_wait() {
        let cadence = Cadence::Daily(nine_pm());
        assert_eq!(
            next_fire(&cadence, dt(2024, 3, 6, 20, 30), None).0,
            StdDuration::from_secs(30 * 60)
        );
    }

    #[test]
    fn test_cadence_from_config() {
        let mut cfg = ScheduleSection::default();
        assert_eq!(Cadence::daily_from_config(&cfg).unwrap(), Cadence::Daily(nine_pm()));
        assert_eq!(Cadence::weekly_from_config(&cfg).unwrap(), Cadence::Weekly(sunday_8pm()));

        cfg.test_mode = true;
        assert_eq!(
            Cadence::daily_from_config(&cfg).unwrap(),
            Cadence::Interval(StdDuration::from_secs(15))
        );
        assert_eq!(
            Cadence::weekly_from_config(&cfg).unwrap(),
            Cadence::Interval(StdDuration::from_secs(30))
        );
    }

    #[test]
    fn test_next_fire_skips_current_target() {
        let cadence = Cadence::Daily(nine_pm());
        let target = dt(2024, 3, 6, 21, 0);
        assert_eq!(next_fire(&cadence, target, None), (StdDuration::ZERO, Some(target)));
        assert_eq!(
            next_fire(&cadence, target, Some(target)),
            (StdDuration::from_secs(24 * 3600), Some(dt(2024, 3, 7, 21, 0)))
        );
        assert_eq!(
            next_fire(&cadence, dt(2024, 3, 6, 21, 1), Some(target)).0,
            StdDuration::from_secs(24 * 3600 - 60)
        );
    }

    #[test]
    fn test_next_fire_with_wall_clock_behind_target() {
        let cadence = Cadence::Daily(nine_pm());
        let target = dt(2024, 3, 6, 21, 0);
        let early = target - Duration::milliseconds(5);

        let (wait, next) = next_fire(&cadence, early, Some(target));
        assert_eq!(next, Some(dt(2024, 3, 7, 21, 0)));
        assert_eq!(wait, StdDuration::from_secs(24 * 3600) + StdDuration::from_millis(5));

        let weekly = Cadence::Weekly(sunday_8pm());
        let sunday = dt(2024, 3, 10, 20, 0);
        let (_, next) = next_fire(&weekly, sunday - Duration::milliseconds(5), Some(sunday));
        assert_eq!(next, Some(dt(2024, 3, 17, 20, 0)));
    }

    #[test]
    fn test_next_fire_interval_has_no_target() {
        let cadence = Cadence::Interval(StdDuration::from_secs(15));
        assert_eq!(
            next_fire(&cadence, dt(2024, 3, 6, 21, 0), None),
            (StdDuration::from_secs(15), None)
        );
    }

    #[tokio::test]
    async fn test_sleep_or_cancel() {
        let token = CancellationToken::new();
        assert!(sleep_or_cancel(StdDuration::from_millis(1), &token).await);
        token.cancel();
        assert!(!sleep_or_cancel(StdDuration::from_secs(3600), &token).await);
    }
}
