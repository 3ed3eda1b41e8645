//! Outbound collaborators: notification delivery and haptics.

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// What the core asks the platform to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub play_sound: bool,
    pub badge_count: u32,
}

/// Delivers notifications. Must return promptly; an adapter around a slow
/// channel should time out and report `DispatchError::Unavailable`.
pub trait NotificationDispatcher {
    fn dispatch(&mut self, notification: &Notification) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HapticTier {
    Light,
    Medium,
    Heavy,
}

/// Fire-and-forget vibration. Failures are the adapter's problem.
pub trait HapticFeedback {
    fn pulse(&mut self, tier: HapticTier);
}

/// Maps the session's sent count onto a haptic tier.
///
/// Sends `1..=medium_after` pulse light, up to `heavy_after` pulse medium,
/// everything later pulses heavy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HapticPolicy {
    #[serde(default = "default_medium_after")]
    pub medium_after: u32,
    #[serde(default = "default_heavy_after")]
    pub heavy_after: u32,
}

fn default_medium_after() -> u32 {
    3
}
fn default_heavy_after() -> u32 {
    6
}

impl Default for HapticPolicy {
    fn default() -> Self {
        Self {
            medium_after: default_medium_after(),
            heavy_after: default_heavy_after(),
        }
    }
}

impl HapticPolicy {
    /// `sent_count` is the count including the reminder being pulsed for.
    pub fn tier_for(&self, sent_count: u32) -> HapticTier {
        if sent_count > self.heavy_after {
            HapticTier::Heavy
        } else if sent_count > self.medium_after {
            HapticTier::Medium
        } else {
            HapticTier::Light
        }
    }
}

/// Dispatcher that drops everything. Useful for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDispatcher;

impl NotificationDispatcher for NullDispatcher {
    fn dispatch(&mut self, _notification: &Notification) -> Result<(), DispatchError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHaptics;

impl HapticFeedback for NoHaptics {
    fn pulse(&mut self, _tier: HapticTier) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_escalates() {
        let policy = HapticPolicy::default();
        assert_eq!(policy.tier_for(1), HapticTier::Light);
        assert_eq!(policy.tier_for(3), HapticTier::Light);
        assert_eq!(policy.tier_for(4), HapticTier::Medium);
        assert_eq!(policy.tier_for(6), HapticTier::Medium);
        assert_eq!(policy.tier_for(7), HapticTier::Heavy);
    }

    #[test]
    fn custom_thresholds() {
        let policy = HapticPolicy {
            medium_after: 0,
            heavy_after: 1,
        };
        assert_eq!(policy.tier_for(1), HapticTier::Medium);
        assert_eq!(policy.tier_for(2), HapticTier::Heavy);
    }

    #[test]
    fn notification_serializes_camel_case() {
        let n = Notification {
            title: "t".into(),
            body: "b".into(),
            play_sound: true,
            badge_count: 2,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["playSound"], true);
        assert_eq!(json["badgeCount"], 2);
    }
}
