//! Device activity tracking.
//!
//! The monitor folds two platform signals, "app is foregrounded" and
//! "device is locked", into a single [`AppActivityState`]. It only publishes
//! state; reacting to it is the job of the timer and the reminder loop.
//!
//! ## Derivation
//!
//! ```text
//! foregrounded | locked | state
//! -------------+--------+-----------------
//! true         | false  | Active
//! true         | true   | Locked
//! false        | false  | Background
//! false        | true   | BackgroundLocked
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppActivityState {
    /// Unlocked and in the foreground: the user is on their phone.
    Active,
    Locked,
    Background,
    BackgroundLocked,
}

impl AppActivityState {
    pub fn derive(foregrounded: bool, locked: bool) -> Self {
        match (foregrounded, locked) {
            (true, false) => AppActivityState::Active,
            (true, true) => AppActivityState::Locked,
            (false, false) => AppActivityState::Background,
            (false, true) => AppActivityState::BackgroundLocked,
        }
    }

    pub fn is_active(self) -> bool {
        self == AppActivityState::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppActivityState::Active => "active",
            AppActivityState::Locked => "locked",
            AppActivityState::Background => "background",
            AppActivityState::BackgroundLocked => "background_locked",
        }
    }
}

/// A published change of the derived state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityChange {
    pub previous: AppActivityState,
    pub current: AppActivityState,
    /// Set when the change enters `Active` from any other state. The reminder
    /// loop restarts only on this edge.
    pub resumed: bool,
}

type Observer = Box<dyn FnMut(&ActivityChange)>;

pub struct ActivityMonitor {
    foregrounded: bool,
    locked: bool,
    state: AppActivityState,
    observers: Vec<Observer>,
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl std::fmt::Debug for ActivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityMonitor")
            .field("foregrounded", &self.foregrounded)
            .field("locked", &self.locked)
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ActivityMonitor {
    /// Create a monitor seeded with the platform's initial signals.
    pub fn new(foregrounded: bool, locked: bool) -> Self {
        Self {
            foregrounded,
            locked,
            state: AppActivityState::derive(foregrounded, locked),
            observers: Vec::new(),
        }
    }

    /// Latest derived state.
    pub fn current(&self) -> AppActivityState {
        self.state
    }

    pub fn is_foregrounded(&self) -> bool {
        self.foregrounded
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Register a callback invoked synchronously on every derived change.
    pub fn on_activity_change<F>(&mut self, observer: F)
    where
        F: FnMut(&ActivityChange) + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn set_foregrounded(&mut self, foregrounded: bool) -> Option<ActivityChange> {
        self.update(foregrounded, self.locked)
    }

    pub fn set_locked(&mut self, locked: bool) -> Option<ActivityChange> {
        self.update(self.foregrounded, locked)
    }

    /// Apply both raw signals at once. Returns the change if the derived
    /// state moved; repeated observations of the same state return `None`.
    pub fn update(&mut self, foregrounded: bool, locked: bool) -> Option<ActivityChange> {
        self.foregrounded = foregrounded;
        self.locked = locked;

        let next = AppActivityState::derive(foregrounded, locked);
        if next == self.state {
            return None;
        }

        let change = ActivityChange {
            previous: self.state,
            current: next,
            resumed: next.is_active(),
        };
        self.state = next;
        debug!(
            from = change.previous.as_str(),
            to = change.current.as_str(),
            resumed = change.resumed,
            "activity state changed"
        );

        for observer in self.observers.iter_mut() {
            observer(&change);
        }
        Some(change)
    }
}
