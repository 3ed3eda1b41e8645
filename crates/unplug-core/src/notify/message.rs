//! Reminder copy selection.
//!
//! A pure mapping from `(mode, progress, count)` to a message. Tone escalates
//! as the session's reminder count grows; aggressive mode starts one step
//! further up the ladder.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderMode {
    Gentle,
    Aggressive,
}

impl ReminderMode {
    pub fn from_aggressive(aggressive: bool) -> Self {
        if aggressive {
            ReminderMode::Aggressive
        } else {
            ReminderMode::Gentle
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Gentle,
    Firm,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderMessage {
    pub title: String,
    pub body: String,
    pub tone: Tone,
}

const GENTLE: [&str; 3] = [
    "Your phone can wait. Your focus can't.",
    "Quick check-in: is this unlock on purpose?",
    "Put it down and pick your task back up.",
];

const FIRM: [&str; 3] = [
    "You're still on your phone. Lock it and get back to it.",
    "This is the session you asked for. Phone down.",
    "Every unlock resets your focus. Put it away.",
];

const URGENT: [&str; 3] = [
    "Stop scrolling. Lock your phone now.",
    "You keep coming back. Close it and walk away.",
    "Seriously: phone down, right now.",
];

/// Tone for the `count`-th reminder (0-based) of a session.
pub fn tone_for(mode: ReminderMode, count: u32) -> Tone {
    let step = match count {
        0 => 0,
        1..=2 => 1,
        _ => 2,
    } + match mode {
        ReminderMode::Gentle => 0,
        ReminderMode::Aggressive => 1,
    };
    match step {
        0 => Tone::Gentle,
        1 => Tone::Firm,
        _ => Tone::Urgent,
    }
}

/// Pick the reminder for the `count`-th send (0-based) at `progress`
/// (0.0 .. 1.0 through the session).
pub fn select_message(mode: ReminderMode, progress: f64, count: u32) -> ReminderMessage {
    let tone = tone_for(mode, count);
    let lines = match tone {
        Tone::Gentle => &GENTLE,
        Tone::Firm => &FIRM,
        Tone::Urgent => &URGENT,
    };
    let line = lines[count as usize % lines.len()];

    let pct = (progress.clamp(0.0, 1.0) * 100.0).round() as u32;
    let title = match tone {
        Tone::Gentle => "Still focusing?".to_string(),
        Tone::Firm => "Phone down".to_string(),
        Tone::Urgent => "Lock your phone".to_string(),
    };
    let body = if pct >= 50 {
        format!("{line} You're {pct}% through, don't lose it now.")
    } else {
        format!("{line} {pct}% of your session done.")
    };

    ReminderMessage { title, body, tone }
}

/// Final message sent when a session completes.
pub fn completion_message(duration_secs: u64, notifications_sent: u32) -> ReminderMessage {
    let minutes = duration_secs.div_ceil(60);
    let body = match notifications_sent {
        0 => format!("{minutes} min without touching your phone. Nice work."),
        1 => format!("{minutes} min done with just one reminder."),
        n => format!("{minutes} min done. You needed {n} reminders this time."),
    };
    ReminderMessage {
        title: "Session complete".to_string(),
        body,
        tone: Tone::Gentle,
    }
}

/// One-time advisory on entering the critical battery tier.
pub fn charge_advisory_message(level_percent: f32) -> ReminderMessage {
    ReminderMessage {
        title: "Battery low".to_string(),
        body: format!(
            "Battery at {:.0}%. Plug in so your session isn't cut short.",
            level_percent
        ),
        tone: Tone::Firm,
    }
}
