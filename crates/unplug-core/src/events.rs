use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::AppActivityState;
use crate::battery::OptimizationTier;
use crate::notify::{HapticTier, SkipReason, Tone};
use crate::timer::SessionRecord;

/// Why a live session ended without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// Explicit `stop()`.
    Cancelled,
    /// A new `start()` replaced the session.
    Superseded,
}

/// Every state change in the core produces an Event.
/// The UI subscribes to them; the CLI prints them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        session_id: String,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// Published whenever the whole-second remaining value changes.
    TimerTick {
        session_id: String,
        remaining_secs: u64,
        progress: f64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        session_id: String,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        session_id: String,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerStopped {
        session_id: String,
        reason: StopReason,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerCompleted {
        record: SessionRecord,
        at: DateTime<Utc>,
    },
    ActivityChanged {
        previous: AppActivityState,
        current: AppActivityState,
        at: DateTime<Utc>,
    },
    /// Entered `Active` from any other state.
    ActivityResumed {
        at: DateTime<Utc>,
    },
    TierChanged {
        previous: OptimizationTier,
        current: OptimizationTier,
        level_percent: f32,
        at: DateTime<Utc>,
    },
    NotificationSent {
        session_id: String,
        /// Reminders sent in this session, including this one.
        count: u32,
        tone: Tone,
        haptic: Option<HapticTier>,
        at: DateTime<Utc>,
    },
    ReminderSkipped {
        session_id: String,
        reason: SkipReason,
        at: DateTime<Utc>,
    },
    DispatchFailed {
        session_id: Option<String>,
        error: String,
        at: DateTime<Utc>,
    },
    /// One-time "please charge" advisory on entering the critical tier.
    ChargeAdvisory {
        level_percent: f32,
        delivered: bool,
        at: DateTime<Utc>,
    },
    BackgroundSync {
        session_id: String,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Stable snake_case name, used for logging and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TimerStarted { .. } => "timer_started",
            Event::TimerTick { .. } => "timer_tick",
            Event::TimerPaused { .. } => "timer_paused",
            Event::TimerResumed { .. } => "timer_resumed",
            Event::TimerStopped { .. } => "timer_stopped",
            Event::TimerCompleted { .. } => "timer_completed",
            Event::ActivityChanged { .. } => "activity_changed",
            Event::ActivityResumed { .. } => "activity_resumed",
            Event::TierChanged { .. } => "tier_changed",
            Event::NotificationSent { .. } => "notification_sent",
            Event::ReminderSkipped { .. } => "reminder_skipped",
            Event::DispatchFailed { .. } => "dispatch_failed",
            Event::ChargeAdvisory { .. } => "charge_advisory",
            Event::BackgroundSync { .. } => "background_sync",
        }
    }
}
