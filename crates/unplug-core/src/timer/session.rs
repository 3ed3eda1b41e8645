use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    /// Transient: set on the final evaluation, just before the engine clears
    /// the session back to `Idle`.
    Completed,
}

/// The single live countdown. Owned and written only by [`super::TimerEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerSession {
    pub session_id: String,
    pub duration_secs: u64,
    /// Whole seconds left, rounded up, as of the last evaluation.
    pub remaining_secs: u64,
    /// Epoch milliseconds when the session was started.
    pub started_at_ms: u64,
    /// Total milliseconds spent paused in finished pause spans.
    pub paused_accum_ms: u64,
    /// Start of the current pause span, if paused.
    #[serde(default)]
    pub paused_at_ms: Option<u64>,
    pub state: SessionState,
    pub notification_count: u32,
    /// Milliseconds the device spent `Active` while the session was running.
    #[serde(default)]
    pub phone_use_ms: u64,
    /// Start of the current `Active` span, if one is open.
    #[serde(default)]
    pub active_since_ms: Option<u64>,
}

impl TimerSession {
    pub fn new(session_id: String, duration_secs: u64, now_ms: u64) -> Self {
        Self {
            session_id,
            duration_secs,
            remaining_secs: duration_secs,
            started_at_ms: now_ms,
            paused_accum_ms: 0,
            paused_at_ms: None,
            state: SessionState::Running,
            notification_count: 0,
            phone_use_ms: 0,
            active_since_ms: None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_secs.saturating_mul(1000)
    }

    /// Counted (non-paused) milliseconds since start.
    ///
    /// While paused the clock is frozen at the pause instant, so the value
    /// does not move until `resume()` folds the span into `paused_accum_ms`.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        let effective_now = self.paused_at_ms.unwrap_or(now_ms);
        effective_now
            .saturating_sub(self.started_at_ms)
            .saturating_sub(self.paused_accum_ms)
    }

    pub fn remaining_ms_at(&self, now_ms: u64) -> u64 {
        self.duration_ms().saturating_sub(self.elapsed_ms(now_ms))
    }

    /// `ceil(max(0, duration_ms - elapsed_ms) / 1000)`.
    pub fn remaining_secs_at(&self, now_ms: u64) -> u64 {
        self.remaining_ms_at(now_ms).div_ceil(1000)
    }

    /// 0.0 .. 1.0 based on the last evaluated whole-second remaining value.
    pub fn progress(&self) -> f64 {
        if self.duration_secs == 0 {
            return 0.0;
        }
        1.0 - (self.remaining_secs as f64 / self.duration_secs as f64)
    }

    pub fn phone_use_ms_at(&self, now_ms: u64) -> u64 {
        match self.active_since_ms {
            Some(since) => self.phone_use_ms + now_ms.saturating_sub(since),
            None => self.phone_use_ms,
        }
    }

    pub(crate) fn open_active_span(&mut self, now_ms: u64) {
        if self.active_since_ms.is_none() {
            self.active_since_ms = Some(now_ms);
        }
    }

    pub(crate) fn close_active_span(&mut self, now_ms: u64) {
        if let Some(since) = self.active_since_ms.take() {
            self.phone_use_ms += now_ms.saturating_sub(since);
        }
    }
}

/// Terminal record of a completed session, handed to the stats store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub duration_secs: u64,
    pub notifications_sent: u32,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub phone_use_secs: u64,
}
