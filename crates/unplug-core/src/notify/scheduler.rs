//! Reminder loop and admission control.
//!
//! The scheduler is the only writer of the [`NotificationBudget`]. Every
//! reminder attempt runs one synchronous read-decide-write sequence: check
//! spacing, budget, activity and session state, dispatch, then commit
//! `sent_count` / `last_sent_at` before returning to the driver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::budget::{NotificationBudget, SkipReason};
use super::dispatch::{HapticFeedback, HapticTier, Notification, NotificationDispatcher};
use super::message::{
    charge_advisory_message, completion_message, select_message, ReminderMessage, ReminderMode,
};
use crate::activity::AppActivityState;
use crate::battery::widen;
use crate::callbacks::{Callback, CallbackHandle, CallbackQueue};
use crate::clock::to_datetime;
use crate::events::Event;
use crate::storage::NotificationsConfig;
use crate::timer::{SessionRecord, TimerEngine};

/// Cumulative counters since the scheduler was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerDiagnostics {
    pub sent: u32,
    pub failed: u32,
    pub skipped_by_reason: BTreeMap<String, u32>,
}

impl SchedulerDiagnostics {
    pub fn skipped(&self, reason: SkipReason) -> u32 {
        self.skipped_by_reason
            .get(reason.as_str())
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
struct ReminderLoop {
    loop_id: u64,
    session_id: String,
    handle: CallbackHandle,
}

pub struct NotificationScheduler {
    config: NotificationsConfig,
    budget: NotificationBudget,
    /// Battery-tier widening; always >= 1.
    multiplier: f64,
    active: Option<ReminderLoop>,
    next_loop_id: u64,
    diagnostics: SchedulerDiagnostics,
    dispatcher: Box<dyn NotificationDispatcher>,
    haptics: Box<dyn HapticFeedback>,
}

impl std::fmt::Debug for NotificationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationScheduler")
            .field("budget", &self.budget)
            .field("multiplier", &self.multiplier)
            .field("active", &self.active)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl NotificationScheduler {
    pub fn new(
        config: NotificationsConfig,
        dispatcher: Box<dyn NotificationDispatcher>,
        haptics: Box<dyn HapticFeedback>,
    ) -> Self {
        Self {
            budget: NotificationBudget::new(config.min_interval_secs, config.max_notifications),
            config,
            multiplier: 1.0,
            active: None,
            next_loop_id: 0,
            diagnostics: SchedulerDiagnostics::default(),
            dispatcher,
            haptics,
        }
    }

    pub fn budget(&self) -> &NotificationBudget {
        &self.budget
    }

    pub fn diagnostics(&self) -> &SchedulerDiagnostics {
        &self.diagnostics
    }

    pub fn config(&self) -> &NotificationsConfig {
        &self.config
    }

    pub fn is_loop_active(&self) -> bool {
        self.active.is_some()
    }

    /// Generation of the running loop, if any.
    pub fn loop_id(&self) -> Option<u64> {
        self.active.as_ref().map(|l| l.loop_id)
    }

    pub fn interval_multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Loop period after battery widening.
    pub fn period_ms(&self) -> u64 {
        widen(self.config.notification_frequency_secs, self.multiplier).saturating_mul(1000)
    }

    /// Minimum spacing after battery widening.
    pub fn floor_ms(&self) -> u64 {
        widen(self.config.min_interval_secs, self.multiplier).saturating_mul(1000)
    }

    /// Fresh budget for a new session.
    pub fn reset_for_session(&mut self) {
        self.budget.reset();
    }

    /// Start the reminder loop for `session_id`, replacing any running loop.
    /// The first attempt is due at `now_ms`.
    pub fn start_loop(
        &mut self,
        queue: &mut CallbackQueue<Callback>,
        session_id: &str,
        now_ms: u64,
    ) {
        self.arm(queue, session_id, now_ms);
    }

    pub fn stop_loop(&mut self, queue: &mut CallbackQueue<Callback>) {
        if let Some(active) = self.active.take() {
            queue.cancel(active.handle);
            debug!(loop_id = active.loop_id, "reminder loop stopped");
        }
    }

    /// Take new settings. A running loop is restarted if its cadence moved.
    pub fn apply_config(
        &mut self,
        config: NotificationsConfig,
        queue: &mut CallbackQueue<Callback>,
        now_ms: u64,
    ) {
        let old_period = self.period_ms();
        self.budget.min_interval_secs = config.min_interval_secs;
        self.budget.max_notifications = config.max_notifications;
        self.config = config;
        if self.period_ms() != old_period {
            self.restart(queue, now_ms);
        }
    }

    /// Battery widening. Values below 1 are treated as 1.
    pub fn set_interval_multiplier(
        &mut self,
        multiplier: f64,
        queue: &mut CallbackQueue<Callback>,
        now_ms: u64,
    ) {
        let multiplier = multiplier.max(1.0);
        if (multiplier - self.multiplier).abs() < f64::EPSILON {
            return;
        }
        self.multiplier = multiplier;
        self.restart(queue, now_ms);
    }

    /// Handle a `ReminderFire` callback.
    pub fn on_fire(
        &mut self,
        session_id: &str,
        loop_id: u64,
        now_ms: u64,
        activity: AppActivityState,
        engine: &mut TimerEngine,
    ) -> Vec<Event> {
        let is_live = self
            .active
            .as_ref()
            .is_some_and(|l| l.loop_id == loop_id && l.session_id == session_id)
            && engine.is_current(session_id);
        if !is_live {
            debug!(session_id, loop_id, "orphaned reminder fire dropped");
            return Vec::new();
        }

        if let Err(reason) = self.admit(now_ms, activity, engine) {
            *self
                .diagnostics
                .skipped_by_reason
                .entry(reason.as_str().to_string())
                .or_insert(0) += 1;
            debug!(session_id, reason = reason.as_str(), "reminder skipped");
            return vec![Event::ReminderSkipped {
                session_id: session_id.to_string(),
                reason,
                at: to_datetime(now_ms),
            }];
        }

        let mode = ReminderMode::from_aggressive(self.config.aggressive_mode);
        let message = select_message(mode, engine.progress(), self.budget.sent_count);
        let notification = self.notification(&message, self.budget.sent_count + 1);

        if let Err(e) = self.dispatcher.dispatch(&notification) {
            self.budget.record_failed();
            self.diagnostics.failed += 1;
            warn!(session_id, error = %e, "reminder dispatch failed");
            return vec![Event::DispatchFailed {
                session_id: Some(session_id.to_string()),
                error: e.to_string(),
                at: to_datetime(now_ms),
            }];
        }

        self.budget.record_sent(now_ms);
        self.diagnostics.sent += 1;
        let count = engine
            .record_notification(session_id)
            .unwrap_or(self.budget.sent_count);

        let haptic = if self.config.haptic_enabled {
            let tier: HapticTier = self.config.haptic.tier_for(self.budget.sent_count);
            self.haptics.pulse(tier);
            Some(tier)
        } else {
            None
        };

        info!(session_id, count, tone = ?message.tone, "reminder sent");
        vec![Event::NotificationSent {
            session_id: session_id.to_string(),
            count,
            tone: message.tone,
            haptic,
            at: to_datetime(now_ms),
        }]
    }

    /// Final "session complete" message. Not budgeted, not gated on activity.
    /// Returns an event only if delivery failed.
    pub fn send_completion(&mut self, record: &SessionRecord, now_ms: u64) -> Option<Event> {
        let message = completion_message(record.duration_secs, record.notifications_sent);
        let notification = self.notification(&message, 0);
        match self.dispatcher.dispatch(&notification) {
            Ok(()) => None,
            Err(e) => {
                self.diagnostics.failed += 1;
                warn!(session_id = %record.session_id, error = %e, "completion dispatch failed");
                Some(Event::DispatchFailed {
                    session_id: Some(record.session_id.clone()),
                    error: e.to_string(),
                    at: to_datetime(now_ms),
                })
            }
        }
    }

    /// Fire-and-forget "please charge" advisory, outside the budget.
    pub fn send_charge_advisory(&mut self, level_percent: f32, now_ms: u64) -> Event {
        let message = charge_advisory_message(level_percent);
        let notification = self.notification(&message, 0);
        let delivered = match self.dispatcher.dispatch(&notification) {
            Ok(()) => true,
            Err(e) => {
                self.diagnostics.failed += 1;
                warn!(error = %e, "charge advisory dispatch failed");
                false
            }
        };
        Event::ChargeAdvisory {
            level_percent,
            delivered,
            at: to_datetime(now_ms),
        }
    }

    fn admit(
        &self,
        now_ms: u64,
        activity: AppActivityState,
        engine: &TimerEngine,
    ) -> Result<(), SkipReason> {
        self.budget.check(now_ms, self.floor_ms())?;
        if !activity.is_active() {
            return Err(SkipReason::NotActive);
        }
        if !engine.is_running() {
            return Err(SkipReason::NotRunning);
        }
        Ok(())
    }

    fn notification(&self, message: &ReminderMessage, badge_count: u32) -> Notification {
        Notification {
            title: message.title.clone(),
            body: message.body.clone(),
            play_sound: self.config.sound_enabled,
            badge_count,
        }
    }

    /// Re-arm a running loop on the new cadence, keeping its session. The
    /// first fire is one new period after the last send, or now if that has
    /// already passed.
    fn restart(&mut self, queue: &mut CallbackQueue<Callback>, now_ms: u64) {
        let Some(session_id) = self.active.as_ref().map(|l| l.session_id.clone()) else {
            return;
        };
        let first_due = self
            .budget
            .last_sent_at_ms
            .map(|last| last.saturating_add(self.period_ms()).max(now_ms))
            .unwrap_or(now_ms);
        self.arm(queue, &session_id, first_due);
    }

    fn arm(&mut self, queue: &mut CallbackQueue<Callback>, session_id: &str, first_due_ms: u64) {
        self.stop_loop(queue);
        let loop_id = self.next_loop_id;
        self.next_loop_id += 1;
        let period_ms = self.period_ms();
        let handle = queue.schedule_every(
            first_due_ms,
            period_ms,
            Callback::ReminderFire {
                session_id: session_id.to_string(),
                loop_id,
            },
        );
        debug!(session_id, loop_id, period_ms, "reminder loop armed");
        self.active = Some(ReminderLoop {
            loop_id,
            session_id: session_id.to_string(),
            handle,
        });
    }
}
