use serde::{Deserialize, Serialize};

/// Why an admission check turned a reminder attempt down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Less than the minimum spacing since the last successful send.
    TooSoon,
    BudgetExhausted,
    /// Device is not unlocked and foregrounded.
    NotActive,
    /// Session is paused, idle or finished.
    NotRunning,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::TooSoon => "too_soon",
            SkipReason::BudgetExhausted => "budget_exhausted",
            SkipReason::NotActive => "not_active",
            SkipReason::NotRunning => "not_running",
        }
    }
}

/// Spacing and count limits on reminders for one session.
///
/// Owned and written only by the notification scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationBudget {
    pub min_interval_secs: u64,
    pub max_notifications: u32,
    pub sent_count: u32,
    /// Epoch milliseconds of the last successful dispatch.
    pub last_sent_at_ms: Option<u64>,
    /// Dispatches the collaborator rejected; these never consume budget.
    pub failed_count: u32,
}

impl NotificationBudget {
    pub fn new(min_interval_secs: u64, max_notifications: u32) -> Self {
        Self {
            min_interval_secs,
            max_notifications,
            sent_count: 0,
            last_sent_at_ms: None,
            failed_count: 0,
        }
    }

    /// Clear counters for a fresh session, keeping the limits.
    pub fn reset(&mut self) {
        self.sent_count = 0;
        self.last_sent_at_ms = None;
        self.failed_count = 0;
    }

    pub fn remaining(&self) -> u32 {
        self.max_notifications.saturating_sub(self.sent_count)
    }

    pub fn is_exhausted(&self) -> bool {
        self.sent_count >= self.max_notifications
    }

    /// Spacing and count part of the admission check. `floor_ms` is the
    /// effective minimum spacing (the configured one, possibly widened).
    pub fn check(&self, now_ms: u64, floor_ms: u64) -> Result<(), SkipReason> {
        if let Some(last) = self.last_sent_at_ms {
            if now_ms.saturating_sub(last) < floor_ms {
                return Err(SkipReason::TooSoon);
            }
        }
        if self.is_exhausted() {
            return Err(SkipReason::BudgetExhausted);
        }
        Ok(())
    }

    pub fn record_sent(&mut self, now_ms: u64) {
        self.sent_count += 1;
        self.last_sent_at_ms = Some(now_ms);
    }

    pub fn record_failed(&mut self) {
        self.failed_count += 1;
    }
}
