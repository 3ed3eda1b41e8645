//! Composition root for the scheduling core.
//!
//! [`FocusController`] owns every component and the callback queue, routes
//! platform inputs to them and fans their events out to subscribers. It is
//! created by the host application and driven through [`FocusController::poll`]
//! by whatever event loop the host runs; nothing here sleeps or spawns.
//!
//! ## Callback cascade
//!
//! Session callbacks (tick, reminder fire, background sync) carry the session
//! id they were armed for. Stopping or completing a session cancels all of
//! them; a fire that still slips through is recognised by its id and
//! dropped.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::activity::{ActivityChange, ActivityMonitor, AppActivityState};
use crate::battery::{
    BatteryAdaptiveController, BatteryReading, BatteryTelemetry, MainsPower, OptimizationTier,
    TierChange,
};
use crate::callbacks::{Callback, CallbackHandle, CallbackQueue};
use crate::clock::{to_datetime, Clock, SystemClock};
use crate::error::{ConfigError, Result};
use crate::events::Event;
use crate::notify::{
    HapticFeedback, NoHaptics, NotificationBudget, NotificationDispatcher, NotificationScheduler,
    NullDispatcher, SchedulerDiagnostics,
};
use crate::stats::SessionStatsStore;
use crate::storage::{Config, KeyValueStore, MemoryStore};
use crate::timer::{SessionState, TimerEngine};

type Subscriber = Box<dyn FnMut(&Event)>;

/// Platform adapters handed to the controller at construction.
pub struct Collaborators {
    pub clock: Box<dyn Clock>,
    pub dispatcher: Box<dyn NotificationDispatcher>,
    pub haptics: Box<dyn HapticFeedback>,
    pub telemetry: Box<dyn BatteryTelemetry>,
    pub store: Box<dyn KeyValueStore>,
}

impl Collaborators {
    /// System clock, no delivery, mains power, volatile storage.
    pub fn headless() -> Self {
        Self {
            clock: Box::new(SystemClock),
            dispatcher: Box::new(NullDispatcher),
            haptics: Box::new(NoHaptics),
            telemetry: Box::new(MainsPower),
            store: Box::new(MemoryStore::new()),
        }
    }
}

/// Point-in-time view for UI polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub session_id: Option<String>,
    pub state: SessionState,
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub progress: f64,
    pub notification_count: u32,
    pub phone_use_secs: u64,
    pub activity: AppActivityState,
    pub tier: OptimizationTier,
    pub battery_level: Option<f32>,
    pub drain_rate_per_min: Option<f64>,
    pub minutes_to_critical: Option<f64>,
    pub budget: NotificationBudget,
    pub reminder_loop_active: bool,
    pub diagnostics: SchedulerDiagnostics,
}

pub struct FocusController {
    config: Config,
    clock: Box<dyn Clock>,
    activity: ActivityMonitor,
    engine: TimerEngine,
    scheduler: NotificationScheduler,
    battery: BatteryAdaptiveController,
    stats: SessionStatsStore,
    queue: CallbackQueue<Callback>,
    tick_handle: Option<CallbackHandle>,
    sync_handle: Option<CallbackHandle>,
    battery_handle: Option<CallbackHandle>,
    subscribers: Vec<Subscriber>,
    initialized: bool,
}

impl std::fmt::Debug for FocusController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusController")
            .field("activity", &self.activity)
            .field("engine", &self.engine)
            .field("scheduler", &self.scheduler)
            .field("battery", &self.battery)
            .field("pending_callbacks", &self.queue.len())
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl FocusController {
    /// Build the controller. The device is assumed unlocked and in the
    /// foreground until told otherwise.
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            clock,
            dispatcher,
            haptics,
            telemetry,
            store,
        } = collaborators;
        Self {
            scheduler: NotificationScheduler::new(
                config.notifications.clone(),
                dispatcher,
                haptics,
            ),
            battery: BatteryAdaptiveController::new(config.battery.clone(), telemetry),
            stats: SessionStatsStore::new(store),
            config,
            clock,
            activity: ActivityMonitor::default(),
            engine: TimerEngine::new(),
            queue: CallbackQueue::new(),
            tick_handle: None,
            sync_handle: None,
            battery_handle: None,
            subscribers: Vec::new(),
            initialized: false,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start battery sampling. Takes one sample immediately. Idempotent.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        let now = self.clock.now_ms();
        self.initialized = true;
        self.arm_battery_sampling(now);
        info!("focus controller initialized");
        self.sample_battery(now);
    }

    /// Stop any live session and cancel every pending callback.
    pub fn dispose(&mut self) {
        let now = self.clock.now_ms();
        if let Some(event) = self.engine.stop(now) {
            self.publish(event);
        }
        self.scheduler.stop_loop(&mut self.queue);
        self.queue.clear();
        self.tick_handle = None;
        self.sync_handle = None;
        self.battery_handle = None;
        self.initialized = false;
        info!("focus controller disposed");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn activity(&self) -> AppActivityState {
        self.activity.current()
    }

    pub fn engine(&self) -> &TimerEngine {
        &self.engine
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.scheduler
    }

    pub fn battery(&self) -> &BatteryAdaptiveController {
        &self.battery
    }

    pub fn stats(&self) -> &SessionStatsStore {
        &self.stats
    }

    pub fn diagnostics(&self) -> &SchedulerDiagnostics {
        self.scheduler.diagnostics()
    }

    /// Epoch milliseconds of the earliest pending callback, for drivers
    /// that sleep until the next deadline.
    pub fn next_due(&self) -> Option<u64> {
        self.queue.next_due()
    }

    pub fn pending_callbacks(&self) -> usize {
        self.queue.len()
    }

    pub fn snapshot(&self) -> Snapshot {
        let now = self.clock.now_ms();
        let session = self.engine.session();
        let remaining_secs = session
            .map(|s| match s.state {
                SessionState::Running => s.remaining_secs_at(now),
                _ => s.remaining_secs,
            })
            .unwrap_or(0);
        let duration_secs = session.map(|s| s.duration_secs).unwrap_or(0);
        let progress = if duration_secs == 0 {
            0.0
        } else {
            1.0 - remaining_secs as f64 / duration_secs as f64
        };
        Snapshot {
            session_id: self.engine.session_id().map(str::to_string),
            state: self.engine.state(),
            duration_secs,
            remaining_secs,
            progress,
            notification_count: self.engine.notification_count(),
            phone_use_secs: session.map(|s| s.phone_use_ms_at(now) / 1000).unwrap_or(0),
            activity: self.activity.current(),
            tier: self.battery.tier(),
            battery_level: self.battery.latest().map(|s| s.level_percent),
            drain_rate_per_min: self.battery.drain_rate_per_min(),
            minutes_to_critical: self.battery.minutes_to_critical(),
            budget: self.scheduler.budget().clone(),
            reminder_loop_active: self.scheduler.is_loop_active(),
            diagnostics: self.scheduler.diagnostics().clone(),
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Receive every published event, synchronously, in publication order.
    pub fn subscribe<F>(&mut self, subscriber: F)
    where
        F: FnMut(&Event) + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Observe raw activity changes (before the controller reacts to them).
    pub fn on_activity_change<F>(&mut self, observer: F)
    where
        F: FnMut(&ActivityChange) + 'static,
    {
        self.activity.on_activity_change(observer);
    }

    // ── Timer commands ───────────────────────────────────────────────

    /// Start a session of `duration_secs`, replacing any live one.
    ///
    /// # Errors
    /// `InvalidDuration` if `duration_secs <= 0`; nothing changes in that case.
    pub fn start(&mut self, duration_secs: i64) -> Result<()> {
        let now = self.clock.now_ms();
        let events = self.engine.start(duration_secs, now)?;
        self.cancel_session_callbacks();
        self.scheduler.reset_for_session();

        if let Some(session_id) = self.engine.session_id().map(str::to_string) {
            self.arm_tick(&session_id, now);
            self.arm_background_sync(&session_id, now);
        }
        for event in events {
            self.publish(event);
        }
        Ok(())
    }

    pub fn pause(&mut self) -> bool {
        let now = self.clock.now_ms();
        match self.engine.pause(now) {
            Some(event) => {
                self.publish(event);
                true
            }
            None => false,
        }
    }

    pub fn resume(&mut self) -> bool {
        let now = self.clock.now_ms();
        match self.engine.resume(now) {
            Some(event) => {
                self.publish(event);
                true
            }
            None => false,
        }
    }

    /// Cancel the live session. No completion record is written.
    pub fn stop(&mut self) -> bool {
        let now = self.clock.now_ms();
        match self.engine.stop(now) {
            Some(event) => {
                self.cancel_session_callbacks();
                self.publish(event);
                true
            }
            None => false,
        }
    }

    // ── Platform inputs ──────────────────────────────────────────────

    pub fn set_foregrounded(&mut self, foregrounded: bool) {
        let locked = self.activity.is_locked();
        self.update_activity(foregrounded, locked);
    }

    pub fn set_locked(&mut self, locked: bool) {
        let foregrounded = self.activity.is_foregrounded();
        self.update_activity(foregrounded, locked);
    }

    /// Apply both platform signals. The change is fully applied before any
    /// reminder attempt it triggers runs.
    pub fn update_activity(&mut self, foregrounded: bool, locked: bool) {
        let now = self.clock.now_ms();
        if let Some(change) = self.activity.update(foregrounded, locked) {
            self.on_activity_changed(change, now);
            self.run_due(now);
        }
    }

    /// Feed a battery reading pushed by the platform (outside the sampling
    /// cadence).
    pub fn report_battery(&mut self, reading: BatteryReading) {
        let now = self.clock.now_ms();
        if let Some(change) = self.battery.ingest(reading, now) {
            self.on_tier_changed(change, now);
        }
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Replace the configuration. Running loops pick up new cadences
    /// immediately.
    ///
    /// # Errors
    /// The configuration is rejected unchanged if it fails validation.
    pub fn apply_config(&mut self, config: Config) -> std::result::Result<(), ConfigError> {
        config.validate()?;
        let now = self.clock.now_ms();
        let previous = std::mem::replace(&mut self.config, config);

        self.scheduler
            .apply_config(self.config.notifications.clone(), &mut self.queue, now);

        if previous.battery != self.config.battery {
            self.battery.set_config(self.config.battery.clone());
            if self.initialized {
                self.arm_battery_sampling(now);
            }
        }

        let session_id = self.engine.session_id().map(str::to_string);
        if let Some(session_id) = session_id {
            if previous.timer.tick_interval_ms != self.config.timer.tick_interval_ms {
                self.arm_tick(&session_id, now);
            }
            if previous.timer.background_sync_secs != self.config.timer.background_sync_secs
                || previous.notifications.background_mode_enabled
                    != self.config.notifications.background_mode_enabled
            {
                self.arm_background_sync(&session_id, now);
            }
        }
        info!("configuration applied");
        Ok(())
    }

    pub fn set_notification_frequency(
        &mut self,
        frequency_secs: u64,
    ) -> std::result::Result<(), ConfigError> {
        let mut config = self.config.clone();
        config.notifications.notification_frequency_secs = frequency_secs;
        self.apply_config(config)
    }

    // ── Driving ──────────────────────────────────────────────────────

    /// Run every callback due at the current time. Returns how many ran.
    pub fn poll(&mut self) -> usize {
        let now = self.clock.now_ms();
        self.run_due(now)
    }

    fn run_due(&mut self, now: u64) -> usize {
        let mut ran = 0;
        while let Some(fired) = self.queue.pop_due(now) {
            ran += 1;
            self.run_callback(fired.payload, now);
        }
        ran
    }

    fn run_callback(&mut self, callback: Callback, now: u64) {
        match callback {
            Callback::Tick { session_id } => {
                if !self.engine.is_current(&session_id) {
                    debug!(%session_id, "stale tick dropped");
                    return;
                }
                self.evaluate(now);
            }
            Callback::ReminderFire {
                session_id,
                loop_id,
            } => {
                // The countdown may have run out between ticks.
                self.evaluate(now);
                if !self.engine.is_current(&session_id) {
                    debug!(%session_id, "reminder fire after session end dropped");
                    return;
                }
                let activity = self.activity.current();
                let events =
                    self.scheduler
                        .on_fire(&session_id, loop_id, now, activity, &mut self.engine);
                for event in events {
                    self.publish(event);
                }
            }
            Callback::BackgroundSync { session_id } => {
                if !self.engine.is_current(&session_id) || !self.engine.is_running() {
                    debug!(%session_id, "background sync skipped");
                    return;
                }
                self.evaluate(now);
                if self.engine.is_current(&session_id) {
                    let remaining_secs = self.engine.remaining_secs();
                    self.publish(Event::BackgroundSync {
                        session_id,
                        remaining_secs,
                        at: to_datetime(now),
                    });
                }
            }
            Callback::BatterySample => self.sample_battery(now),
        }
    }

    /// Re-evaluate the countdown and handle completion.
    fn evaluate(&mut self, now: u64) {
        let Some(event) = self.engine.tick(now) else {
            return;
        };
        let completed = match &event {
            Event::TimerCompleted { record, .. } => Some(record.clone()),
            _ => None,
        };
        let Some(record) = completed else {
            self.publish(event);
            return;
        };

        self.cancel_session_callbacks();
        self.publish(event);
        if let Err(e) = self.stats.record(&record) {
            warn!(session_id = %record.session_id, error = %e, "failed to persist session stats");
        }
        if let Some(failed) = self.scheduler.send_completion(&record, now) {
            self.publish(failed);
        }
    }

    fn on_activity_changed(&mut self, change: ActivityChange, now: u64) {
        self.engine.note_activity(change.current, now);
        self.publish(Event::ActivityChanged {
            previous: change.previous,
            current: change.current,
            at: to_datetime(now),
        });

        if change.resumed {
            self.publish(Event::ActivityResumed {
                at: to_datetime(now),
            });
            if self.engine.is_running() {
                if let Some(session_id) = self.engine.session_id().map(str::to_string) {
                    self.scheduler
                        .start_loop(&mut self.queue, &session_id, now);
                }
            }
        } else if change.previous.is_active() {
            self.scheduler.stop_loop(&mut self.queue);
        }
    }

    fn sample_battery(&mut self, now: u64) {
        if let Some(change) = self.battery.sample(now) {
            self.on_tier_changed(change, now);
        }
    }

    fn on_tier_changed(&mut self, change: TierChange, now: u64) {
        self.publish(Event::TierChanged {
            previous: change.previous,
            current: change.current,
            level_percent: change.level_percent,
            at: to_datetime(now),
        });

        let multiplier = self.battery.interval_multiplier();
        self.scheduler
            .set_interval_multiplier(multiplier, &mut self.queue, now);
        if let Some(session_id) = self.engine.session_id().map(str::to_string) {
            self.arm_background_sync(&session_id, now);
        }

        if change.advisory_due {
            let event = self.scheduler.send_charge_advisory(change.level_percent, now);
            self.publish(event);
        }
    }

    // ── Callback bookkeeping ─────────────────────────────────────────

    fn arm_tick(&mut self, session_id: &str, now: u64) {
        if let Some(handle) = self.tick_handle.take() {
            self.queue.cancel(handle);
        }
        let period = self.config.timer.tick_interval_ms.max(1);
        self.tick_handle = Some(self.queue.schedule_every(
            now.saturating_add(period),
            period,
            Callback::Tick {
                session_id: session_id.to_string(),
            },
        ));
    }

    fn arm_background_sync(&mut self, session_id: &str, now: u64) {
        if let Some(handle) = self.sync_handle.take() {
            self.queue.cancel(handle);
        }
        if !self.config.notifications.background_mode_enabled {
            return;
        }
        let period = self
            .battery
            .widen_secs(self.config.timer.background_sync_secs)
            .saturating_mul(1000)
            .max(1);
        self.sync_handle = Some(self.queue.schedule_every(
            now.saturating_add(period),
            period,
            Callback::BackgroundSync {
                session_id: session_id.to_string(),
            },
        ));
    }

    fn arm_battery_sampling(&mut self, now: u64) {
        if let Some(handle) = self.battery_handle.take() {
            self.queue.cancel(handle);
        }
        let period = self.battery.sample_interval_ms().max(1);
        self.battery_handle = Some(self.queue.schedule_every(
            now.saturating_add(period),
            period,
            Callback::BatterySample,
        ));
    }

    fn cancel_session_callbacks(&mut self) {
        self.scheduler.stop_loop(&mut self.queue);
        let cancelled = self.queue.cancel_where(|c| c.session_id().is_some());
        self.tick_handle = None;
        self.sync_handle = None;
        if cancelled > 0 {
            debug!(cancelled, "session callbacks cancelled");
        }
    }

    fn publish(&mut self, event: Event) {
        debug!(kind = event.kind(), "event");
        for subscriber in self.subscribers.iter_mut() {
            subscriber(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::CoreError;

    const T0: u64 = 1_700_000_000_000;

    fn controller() -> (FocusController, ManualClock, Rc<RefCell<Vec<Event>>>) {
        let clock = ManualClock::new(T0);
        let mut collaborators = Collaborators::headless();
        collaborators.clock = Box::new(clock.clone());
        let mut controller = FocusController::new(Config::default(), collaborators);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        controller.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        (controller, clock, events)
    }

    fn kinds(events: &Rc<RefCell<Vec<Event>>>) -> Vec<&'static str> {
        events.borrow().iter().map(Event::kind).collect()
    }

    #[test]
    fn start_rejects_invalid_duration_without_side_effects() {
        let (mut c, _clock, events) = controller();
        assert!(matches!(c.start(0), Err(CoreError::InvalidDuration(0))));
        assert!(events.borrow().is_empty());
        assert_eq!(c.pending_callbacks(), 0);
    }

    #[test]
    fn start_arms_tick_and_background_sync() {
        let (mut c, _clock, events) = controller();
        c.start(60).unwrap();
        assert_eq!(kinds(&events), vec!["timer_started"]);
        assert_eq!(c.pending_callbacks(), 2);
        assert_eq!(c.next_due(), Some(T0 + 100));
    }

    #[test]
    fn background_sync_respects_config() {
        let (mut c, _clock, _events) = controller();
        let mut config = Config::default();
        config.notifications.background_mode_enabled = false;
        c.apply_config(config).unwrap();
        c.start(60).unwrap();
        assert_eq!(c.pending_callbacks(), 1);
    }

    #[test]
    fn completion_cascades_cancellation() {
        let (mut c, clock, events) = controller();
        c.start(2).unwrap();
        clock.advance(2_500);
        c.poll();
        assert!(kinds(&events).contains(&"timer_completed"));
        assert_eq!(c.engine().state(), SessionState::Idle);
        assert_eq!(c.pending_callbacks(), 0);
        assert_eq!(c.stats().totals().unwrap().sessions_completed, 1);
    }

    #[test]
    fn stop_writes_no_record() {
        let (mut c, clock, _events) = controller();
        c.start(60).unwrap();
        clock.advance(5_000);
        c.poll();
        assert!(c.stop());
        assert!(!c.stop());
        assert_eq!(c.pending_callbacks(), 0);
        assert!(c.stats().history().unwrap().is_empty());
    }

    #[test]
    fn background_sync_publishes_remaining() {
        let (mut c, clock, events) = controller();
        c.start(600).unwrap();
        clock.advance(60_000);
        c.poll();
        let synced = events
            .borrow()
            .iter()
            .find_map(|e| match e {
                Event::BackgroundSync { remaining_secs, .. } => Some(*remaining_secs),
                _ => None,
            });
        assert_eq!(synced, Some(540));
    }

    #[test]
    fn loop_starts_only_on_resume_edge() {
        let (mut c, _clock, _events) = controller();
        c.start(600).unwrap();
        assert!(!c.scheduler().is_loop_active());

        c.set_locked(true);
        assert!(!c.scheduler().is_loop_active());
        c.set_locked(false);
        assert!(c.scheduler().is_loop_active());
        // The immediate attempt already ran.
        assert_eq!(c.engine().notification_count(), 1);

        c.set_foregrounded(false);
        assert!(!c.scheduler().is_loop_active());
    }

    #[test]
    fn dispose_clears_everything() {
        let (mut c, _clock, events) = controller();
        c.init();
        c.start(60).unwrap();
        c.dispose();
        assert_eq!(c.pending_callbacks(), 0);
        assert!(!c.is_initialized());
        assert!(kinds(&events).contains(&"timer_stopped"));
    }

    #[test]
    fn init_is_idempotent_and_samples() {
        let (mut c, _clock, _events) = controller();
        c.init();
        c.init();
        assert_eq!(c.pending_callbacks(), 1);
        assert_eq!(c.battery().samples().len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected_unchanged() {
        let (mut c, _clock, _events) = controller();
        assert!(c.set_notification_frequency(0).is_err());
        assert_eq!(c.config(), &Config::default());
    }

    #[test]
    fn snapshot_reflects_state() {
        let (mut c, clock, _events) = controller();
        c.start(100).unwrap();
        clock.advance(25_000);
        let snap = c.snapshot();
        assert_eq!(snap.state, SessionState::Running);
        assert_eq!(snap.remaining_secs, 75);
        assert!((snap.progress - 0.25).abs() < 1e-9);
        assert_eq!(snap.phone_use_secs, 25);
        assert_eq!(snap.tier, OptimizationTier::Normal);
    }
}
