//! Countdown engine.
//!
//! The engine is a wall-clock-based state machine. It owns no timer of its
//! own: the caller re-evaluates it with `tick(now_ms)` on whatever cadence it
//! likes. Remaining time is always recomputed from `started_at` and the
//! accumulated pause spans, so a process that was suspended for minutes
//! reports the correct value on its very first evaluation afterwards.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused -> Completed -> Idle
//!            \__________\_____ stop() ____-> Idle
//! ```
//!
//! Commands issued in the wrong state return `None` instead of failing; UI
//! state races are expected.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::session::{SessionRecord, SessionState, TimerSession};
use crate::activity::AppActivityState;
use crate::clock::to_datetime;
use crate::error::{CoreError, Result};
use crate::events::{Event, StopReason};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerEngine {
    session: Option<TimerSession>,
    /// Last activity state reported by the monitor; drives phone-use spans.
    activity: AppActivityState,
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerEngine {
    pub fn new() -> Self {
        Self {
            session: None,
            activity: AppActivityState::Active,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session(&self) -> Option<&TimerSession> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    /// `Idle` when no session is live.
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// True when `session_id` names the live session.
    pub fn is_current(&self, session_id: &str) -> bool {
        self.session_id() == Some(session_id)
    }

    pub fn remaining_secs(&self) -> u64 {
        self.session.as_ref().map(|s| s.remaining_secs).unwrap_or(0)
    }

    pub fn progress(&self) -> f64 {
        self.session.as_ref().map(|s| s.progress()).unwrap_or(0.0)
    }

    pub fn notification_count(&self) -> u32 {
        self.session
            .as_ref()
            .map(|s| s.notification_count)
            .unwrap_or(0)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a new session, discarding any live one.
    ///
    /// Returns the events in publication order: a `TimerStopped` with reason
    /// `Superseded` if a session was replaced, then `TimerStarted`.
    pub fn start(&mut self, duration_secs: i64, now_ms: u64) -> Result<Vec<Event>> {
        if duration_secs <= 0 {
            return Err(CoreError::InvalidDuration(duration_secs));
        }

        let mut events = Vec::with_capacity(2);
        if let Some(prev) = self.stop_with(StopReason::Superseded, now_ms) {
            events.push(prev);
        }

        let mut session =
            TimerSession::new(Uuid::new_v4().to_string(), duration_secs as u64, now_ms);
        if self.activity.is_active() {
            session.open_active_span(now_ms);
        }
        info!(
            session_id = %session.session_id,
            duration_secs = session.duration_secs,
            "session started"
        );
        events.push(Event::TimerStarted {
            session_id: session.session_id.clone(),
            duration_secs: session.duration_secs,
            at: to_datetime(now_ms),
        });
        self.session = Some(session);
        Ok(events)
    }

    pub fn pause(&mut self, now_ms: u64) -> Option<Event> {
        if self.state() != SessionState::Running {
            debug!(state = ?self.state(), "pause ignored");
            return None;
        }
        let session = self.session.as_mut()?;

        session.remaining_secs = session.remaining_secs_at(now_ms);
        session.paused_at_ms = Some(now_ms);
        session.close_active_span(now_ms);
        session.state = SessionState::Paused;
        Some(Event::TimerPaused {
            session_id: session.session_id.clone(),
            remaining_secs: session.remaining_secs,
            at: to_datetime(now_ms),
        })
    }

    pub fn resume(&mut self, now_ms: u64) -> Option<Event> {
        if self.state() != SessionState::Paused {
            debug!(state = ?self.state(), "resume ignored");
            return None;
        }
        let activity = self.activity;
        let session = self.session.as_mut()?;

        if let Some(paused_at) = session.paused_at_ms.take() {
            session.paused_accum_ms += now_ms.saturating_sub(paused_at);
        }
        if activity.is_active() {
            session.open_active_span(now_ms);
        }
        session.state = SessionState::Running;
        session.remaining_secs = session.remaining_secs_at(now_ms);
        Some(Event::TimerResumed {
            session_id: session.session_id.clone(),
            remaining_secs: session.remaining_secs,
            at: to_datetime(now_ms),
        })
    }

    /// Cancel the live session. No record is produced.
    pub fn stop(&mut self, now_ms: u64) -> Option<Event> {
        let event = self.stop_with(StopReason::Cancelled, now_ms);
        if event.is_none() {
            debug!("stop ignored: no live session");
        }
        event
    }

    /// Re-evaluate the countdown from the wall clock.
    ///
    /// Returns `TimerTick` when the whole-second value changed, or
    /// `TimerCompleted` (with the session's record) when it reached zero. In
    /// the latter case the engine is already back to `Idle` on return.
    pub fn tick(&mut self, now_ms: u64) -> Option<Event> {
        let session = self.session.as_mut()?;
        if session.state != SessionState::Running {
            return None;
        }

        let remaining = session.remaining_secs_at(now_ms);
        if remaining == 0 {
            session.remaining_secs = 0;
            session.close_active_span(now_ms);
            session.state = SessionState::Completed;

            let record = SessionRecord {
                session_id: session.session_id.clone(),
                duration_secs: session.duration_secs,
                notifications_sent: session.notification_count,
                completed_at: to_datetime(now_ms),
                success: true,
                phone_use_secs: session.phone_use_ms / 1000,
            };
            info!(
                session_id = %record.session_id,
                notifications_sent = record.notifications_sent,
                phone_use_secs = record.phone_use_secs,
                "session completed"
            );
            self.session = None;
            return Some(Event::TimerCompleted {
                record,
                at: to_datetime(now_ms),
            });
        }

        if remaining == session.remaining_secs {
            return None;
        }
        session.remaining_secs = remaining;
        Some(Event::TimerTick {
            session_id: session.session_id.clone(),
            remaining_secs: remaining,
            progress: session.progress(),
            at: to_datetime(now_ms),
        })
    }

    /// Account phone-use spans against the live session.
    pub fn note_activity(&mut self, state: AppActivityState, now_ms: u64) {
        self.activity = state;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state != SessionState::Running {
            return;
        }
        if state.is_active() {
            session.open_active_span(now_ms);
        } else {
            session.close_active_span(now_ms);
        }
    }

    /// Count a delivered reminder against the session named by `session_id`.
    /// Returns the new count, or `None` if that session is no longer live.
    pub fn record_notification(&mut self, session_id: &str) -> Option<u32> {
        let session = self.session.as_mut()?;
        if session.session_id != session_id {
            return None;
        }
        session.notification_count += 1;
        Some(session.notification_count)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn stop_with(&mut self, reason: StopReason, now_ms: u64) -> Option<Event> {
        let session = self.session.take()?;
        let remaining_secs = match session.state {
            SessionState::Running => session.remaining_secs_at(now_ms),
            _ => session.remaining_secs,
        };
        info!(session_id = %session.session_id, ?reason, remaining_secs, "session stopped");
        Some(Event::TimerStopped {
            session_id: session.session_id,
            reason,
            remaining_secs,
            at: to_datetime(now_ms),
        })
    }
}
