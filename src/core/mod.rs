//! 核心编排层：错误、关闭信号、提醒闸门、调度、路由、主控循环

pub mod app;
pub mod error;
pub mod gate;
pub mod reflection;
pub mod reminder;
pub mod router;
pub mod schedule;
pub mod shutdown;

pub use app::NeedleApp;
pub use error::NeedleError;
pub use gate::ReminderGate;
pub use reflection::ReflectionScheduler;
pub use reminder::ReminderScheduler;
pub use router::{run_dispatcher, InboundRouter, RouteResult};
pub use schedule::{Cadence, DailyAt, SchedulerPhase, WeeklyAt};
pub use shutdown::{run_with_graceful_shutdown, ShutdownManager, ShutdownReason};
