//! Scheduler for workflow time triggers.
//!
//! This crate provides:
//!
//! - **Schedules**: Reading a time trigger's interval and tracking when it last fired
//! - **Dispatcher**: Periodic discovery of active time triggers and dispatch of the due ones

pub mod dispatch;
pub mod error;
pub mod schedule;

pub use dispatch::{TriggerDispatch, TriggerDispatcher};
pub use error::{ScheduleError, SchedulerError};
pub use schedule::{FiringHistory, TimeTriggerSchedule, TriggerReference};
