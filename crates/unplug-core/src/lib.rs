//! # Unplug Core Library
//!
//! Session scheduling core for a focus timer that nags you off your phone.
//! A countdown runs while you are away; if the device comes back to the
//! foreground unlocked during a session, a budgeted reminder loop starts and
//! escalates until you put it down again.
//!
//! The core is platform-neutral. Platform signals (foreground, lock, battery)
//! come in through plain method calls and traits; notifications, haptics and
//! persistence go out through traits. A CLI binary drives it from a terminal.
//!
//! ## Architecture
//!
//! - **Timer Engine**: a wall-clock-based state machine; the caller
//!   re-evaluates it on a cadence and it corrects for any drift
//! - **Activity Monitor**: folds foreground/lock signals into one state
//! - **Notification Scheduler**: reminder loop, admission control and budget
//! - **Battery Controller**: tiered, hysteretic widening of cadences
//! - **Callback Queue**: cancellable scheduled work, run by an external driver
//!
//! ## Key Components
//!
//! - [`FocusController`]: composition root that wires everything together
//! - [`TimerEngine`]: countdown state machine
//! - [`NotificationScheduler`]: reminder loop and budget
//! - [`BatteryAdaptiveController`]: optimization tiers
//! - [`Config`]: TOML configuration

pub mod activity;
pub mod battery;
pub mod callbacks;
pub mod clock;
pub mod controller;
pub mod error;
pub mod events;
pub mod notify;
pub mod stats;
pub mod storage;
pub mod timer;

pub use activity::{ActivityChange, ActivityMonitor, AppActivityState};
pub use battery::{
    BatteryAdaptiveController, BatteryReading, BatterySample, BatteryTelemetry, ChargingState,
    MainsPower, OptimizationTier, TierChange,
};
pub use callbacks::{Callback, CallbackHandle, CallbackQueue};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{Collaborators, FocusController, Snapshot};
pub use error::{
    ConfigError, CoreError, DispatchError, PersistenceError, Result, TelemetryError,
};
pub use events::{Event, StopReason};
pub use notify::{
    HapticFeedback, HapticPolicy, HapticTier, Notification, NotificationBudget,
    NotificationDispatcher, NotificationScheduler, ReminderMode, SchedulerDiagnostics, SkipReason,
    Tone,
};
pub use stats::{SessionStatsStore, StatsTotals};
pub use storage::{Config, KeyValueStore, MemoryStore, SqliteStore};
pub use timer::{SessionRecord, SessionState, TimerEngine, TimerSession};
