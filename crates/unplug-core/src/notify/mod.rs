//! Reminder delivery: message selection, budget, dispatch collaborators and
//! the scheduler that ties them together.

mod budget;
mod dispatch;
mod message;
mod scheduler;

pub use budget::{NotificationBudget, SkipReason};
pub use dispatch::{
    HapticFeedback, HapticPolicy, HapticTier, NoHaptics, Notification, NotificationDispatcher,
    NullDispatcher,
};
pub use message::{
    charge_advisory_message, completion_message, select_message, tone_for, ReminderMessage,
    ReminderMode, Tone,
};
pub use scheduler::{NotificationScheduler, SchedulerDiagnostics};
