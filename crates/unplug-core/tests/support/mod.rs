//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use unplug_core::{
    BatteryReading, BatteryTelemetry, Collaborators, Config, DispatchError, Event,
    FocusController, HapticFeedback, HapticTier, KeyValueStore, ManualClock, MemoryStore,
    Notification, NotificationDispatcher, PersistenceError, TelemetryError,
};

pub const T0: u64 = 1_700_000_000_000;

/// Records everything dispatched; can be switched to fail.
#[derive(Clone, Default)]
pub struct Outbox {
    pub sent: Rc<RefCell<Vec<Notification>>>,
    pub fail: Rc<RefCell<bool>>,
}

impl Outbox {
    pub fn count(&self) -> usize {
        self.sent.borrow().len()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail.borrow_mut() = failing;
    }
}

impl NotificationDispatcher for Outbox {
    fn dispatch(&mut self, notification: &Notification) -> Result<(), DispatchError> {
        if *self.fail.borrow() {
            return Err(DispatchError::Unavailable("channel down".into()));
        }
        self.sent.borrow_mut().push(notification.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct Pulses(pub Rc<RefCell<Vec<HapticTier>>>);

impl HapticFeedback for Pulses {
    fn pulse(&mut self, tier: HapticTier) {
        self.0.borrow_mut().push(tier);
    }
}

/// Battery whose next reading is set by the test.
#[derive(Clone)]
pub struct Battery(pub Rc<RefCell<BatteryReading>>);

impl Default for Battery {
    fn default() -> Self {
        Self(Rc::new(RefCell::new(BatteryReading::discharging(80.0))))
    }
}

impl Battery {
    pub fn set_level(&self, level: f32) {
        self.0.borrow_mut().level_percent = level;
    }
}

impl BatteryTelemetry for Battery {
    fn read(&mut self) -> Result<BatteryReading, TelemetryError> {
        Ok(*self.0.borrow())
    }
}

/// Store that refuses every write.
#[derive(Default)]
pub struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<serde_json::Value>, PersistenceError> {
        Ok(None)
    }

    fn set(&mut self, _key: &str, _value: serde_json::Value) -> Result<(), PersistenceError> {
        Err(PersistenceError::Locked)
    }
}

pub struct Harness {
    pub controller: FocusController,
    pub clock: ManualClock,
    pub outbox: Outbox,
    pub pulses: Pulses,
    pub battery: Battery,
    pub events: Rc<RefCell<Vec<Event>>>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Box::new(MemoryStore::new()))
    }

    pub fn with_store(config: Config, store: Box<dyn KeyValueStore>) -> Self {
        let clock = ManualClock::new(T0);
        let outbox = Outbox::default();
        let pulses = Pulses::default();
        let battery = Battery::default();
        let mut controller = FocusController::new(
            config,
            Collaborators {
                clock: Box::new(clock.clone()),
                dispatcher: Box::new(outbox.clone()),
                haptics: Box::new(pulses.clone()),
                telemetry: Box::new(battery.clone()),
                store,
            },
        );
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        controller.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        Self {
            controller,
            clock,
            outbox,
            pulses,
            battery,
            events,
        }
    }

    /// Advance in `step_ms` increments up to `total_ms`, polling each time.
    pub fn run_for(&mut self, total_ms: u64, step_ms: u64) {
        let mut elapsed = 0;
        while elapsed < total_ms {
            let step = step_ms.min(total_ms - elapsed);
            self.clock.advance(step);
            self.controller.poll();
            elapsed += step;
        }
    }

    pub fn now(&self) -> u64 {
        use unplug_core::Clock;
        self.clock.now_ms()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events.borrow().iter().filter(|e| e.kind() == kind).count()
    }

    /// Background then foreground: the resume edge that starts reminders.
    pub fn bounce_to_active(&mut self) {
        self.controller.set_foregrounded(false);
        self.controller.set_foregrounded(true);
    }
}

pub fn config(frequency_secs: u64, min_interval_secs: u64, max: u32) -> Config {
    let mut config = Config::default();
    config.notifications.notification_frequency_secs = frequency_secs;
    config.notifications.min_interval_secs = min_interval_secs;
    config.notifications.max_notifications = max;
    config
}
