//! Battery-adaptive scheduling.
//!
//! The controller samples battery telemetry on a fixed cadence, keeps a
//! bounded rolling window, and classifies each sample into an
//! [`OptimizationTier`]. Tiers only ever *lengthen* scheduling intervals;
//! they never touch the countdown.
//!
//! ## Tier transitions
//!
//! ```text
//! Normal --(< saving_below)--> Saving --(< critical_below)--> Critical
//! Normal <-(> saving_recover_above)-- Saving <-(> critical_recover_above)-- Critical
//! ```
//!
//! The recovery thresholds sit above the entry thresholds so a level hovering
//! around a boundary cannot flap the tier (and with it the reminder cadence).
//! The OS low-power signal holds the tier at `Saving` or worse.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::TelemetryError;
use crate::storage::BatteryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationTier {
    Normal,
    Saving,
    Critical,
}

impl OptimizationTier {
    pub fn as_str(self) -> &'static str {
        match self {
            OptimizationTier::Normal => "normal",
            OptimizationTier::Saving => "saving",
            OptimizationTier::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargingState {
    Charging,
    Discharging,
    Full,
    Unknown,
}

impl ChargingState {
    pub fn is_charging(self) -> bool {
        matches!(self, ChargingState::Charging | ChargingState::Full)
    }
}

/// One telemetry reading as returned by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub level_percent: f32,
    pub charging: ChargingState,
    #[serde(default)]
    pub low_power_mode: bool,
}

impl BatteryReading {
    pub fn discharging(level_percent: f32) -> Self {
        Self {
            level_percent,
            charging: ChargingState::Discharging,
            low_power_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySample {
    pub timestamp_ms: u64,
    pub level_percent: f32,
    pub charging: ChargingState,
}

/// Platform battery source.
pub trait BatteryTelemetry {
    fn read(&mut self) -> Result<BatteryReading, TelemetryError>;
}

/// Telemetry for hosts without a battery: always full and on mains.
#[derive(Debug, Default, Clone, Copy)]
pub struct MainsPower;

impl BatteryTelemetry for MainsPower {
    fn read(&mut self) -> Result<BatteryReading, TelemetryError> {
        Ok(BatteryReading {
            level_percent: 100.0,
            charging: ChargingState::Full,
            low_power_mode: false,
        })
    }
}

/// Published when a sample moves the tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierChange {
    pub previous: OptimizationTier,
    pub current: OptimizationTier,
    pub level_percent: f32,
    /// Entered `Critical` on battery power and no advisory has been sent
    /// since the tier was last left.
    pub advisory_due: bool,
}

/// Next tier given the current one. Pure; thresholds come from config.
pub fn classify(
    current: OptimizationTier,
    level_percent: f32,
    low_power_mode: bool,
    config: &BatteryConfig,
) -> OptimizationTier {
    let by_level = match current {
        OptimizationTier::Normal => {
            if level_percent < config.critical_below {
                OptimizationTier::Critical
            } else if level_percent < config.saving_below {
                OptimizationTier::Saving
            } else {
                OptimizationTier::Normal
            }
        }
        OptimizationTier::Saving => {
            if level_percent < config.critical_below {
                OptimizationTier::Critical
            } else if level_percent > config.saving_recover_above {
                OptimizationTier::Normal
            } else {
                OptimizationTier::Saving
            }
        }
        OptimizationTier::Critical => {
            if level_percent > config.saving_recover_above {
                OptimizationTier::Normal
            } else if level_percent > config.critical_recover_above {
                OptimizationTier::Saving
            } else {
                OptimizationTier::Critical
            }
        }
    };

    if low_power_mode && by_level == OptimizationTier::Normal {
        OptimizationTier::Saving
    } else {
        by_level
    }
}

/// Least-squares slope of level over time, in percent per minute.
///
/// Only the trailing run of discharging samples is used, so plugging in
/// mid-window does not skew the estimate.
pub fn drain_rate_per_min(samples: &VecDeque<BatterySample>) -> Option<f64> {
    let run: Vec<&BatterySample> = {
        let mut run: Vec<&BatterySample> = samples
            .iter()
            .rev()
            .take_while(|s| !s.charging.is_charging())
            .collect();
        run.reverse();
        run
    };
    if run.len() < 2 {
        return None;
    }

    let t0 = run[0].timestamp_ms as f64;
    let n = run.len() as f64;
    let xs: Vec<f64> = run
        .iter()
        .map(|s| (s.timestamp_ms as f64 - t0) / 60_000.0)
        .collect();
    let ys: Vec<f64> = run.iter().map(|s| s.level_percent as f64).collect();

    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (mut num, mut den) = (0.0, 0.0);
    for (x, y) in xs.iter().zip(&ys) {
        num += (x - mean_x) * (y - mean_y);
        den += (x - mean_x) * (x - mean_x);
    }
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

pub struct BatteryAdaptiveController {
    config: BatteryConfig,
    telemetry: Box<dyn BatteryTelemetry>,
    window: VecDeque<BatterySample>,
    tier: OptimizationTier,
    advisory_sent: bool,
    telemetry_failures: u32,
}

impl std::fmt::Debug for BatteryAdaptiveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatteryAdaptiveController")
            .field("tier", &self.tier)
            .field("samples", &self.window.len())
            .field("advisory_sent", &self.advisory_sent)
            .finish_non_exhaustive()
    }
}

impl BatteryAdaptiveController {
    pub fn new(config: BatteryConfig, telemetry: Box<dyn BatteryTelemetry>) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window_size),
            config,
            telemetry,
            tier: OptimizationTier::Normal,
            advisory_sent: false,
            telemetry_failures: 0,
        }
    }

    pub fn tier(&self) -> OptimizationTier {
        self.tier
    }

    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    pub fn samples(&self) -> &VecDeque<BatterySample> {
        &self.window
    }

    pub fn latest(&self) -> Option<&BatterySample> {
        self.window.back()
    }

    pub fn telemetry_failures(&self) -> u32 {
        self.telemetry_failures
    }

    pub fn sample_interval_ms(&self) -> u64 {
        self.config.sample_interval_secs.saturating_mul(1000)
    }

    /// Replace thresholds and cadence. The window is trimmed to the new size;
    /// the current tier is kept until the next sample.
    pub fn set_config(&mut self, config: BatteryConfig) {
        self.config = config;
        while self.window.len() > self.config.window_size {
            self.window.pop_front();
        }
    }

    /// Read telemetry and ingest it. Read failures are logged and skipped.
    pub fn sample(&mut self, now_ms: u64) -> Option<TierChange> {
        match self.telemetry.read() {
            Ok(reading) => self.ingest(reading, now_ms),
            Err(e) => {
                self.telemetry_failures += 1;
                warn!(error = %e, "battery telemetry read failed");
                None
            }
        }
    }

    /// Fold one reading into the window and reclassify.
    pub fn ingest(&mut self, reading: BatteryReading, now_ms: u64) -> Option<TierChange> {
        if !(0.0..=100.0).contains(&reading.level_percent) {
            self.telemetry_failures += 1;
            warn!(
                error = %TelemetryError::OutOfRange(reading.level_percent.to_string()),
                "battery reading discarded"
            );
            return None;
        }

        if self.window.len() >= self.config.window_size {
            self.window.pop_front();
        }
        self.window.push_back(BatterySample {
            timestamp_ms: now_ms,
            level_percent: reading.level_percent,
            charging: reading.charging,
        });

        let next = classify(
            self.tier,
            reading.level_percent,
            reading.low_power_mode,
            &self.config,
        );
        if next == self.tier {
            return None;
        }

        let previous = self.tier;
        self.tier = next;
        if previous == OptimizationTier::Critical {
            self.advisory_sent = false;
        }
        let advisory_due = next == OptimizationTier::Critical
            && !self.advisory_sent
            && !reading.charging.is_charging();
        if advisory_due {
            self.advisory_sent = true;
        }

        info!(
            from = previous.as_str(),
            to = next.as_str(),
            level = reading.level_percent,
            "optimization tier changed"
        );
        Some(TierChange {
            previous,
            current: next,
            level_percent: reading.level_percent,
            advisory_due,
        })
    }

    pub fn drain_rate_per_min(&self) -> Option<f64> {
        drain_rate_per_min(&self.window)
    }

    /// Predicted minutes until the level drops below the critical threshold.
    /// Diagnostic only. `None` while charging or without a falling trend.
    pub fn minutes_to_critical(&self) -> Option<f64> {
        let latest = self.window.back()?;
        let slope = self.drain_rate_per_min()?;
        if slope >= 0.0 {
            return None;
        }
        let headroom = (latest.level_percent - self.config.critical_below) as f64;
        Some((headroom / -slope).max(0.0))
    }

    pub fn interval_multiplier(&self) -> f64 {
        match self.tier {
            OptimizationTier::Normal => 1.0,
            OptimizationTier::Saving => self.config.saving_multiplier.max(1.0),
            OptimizationTier::Critical => self.config.critical_multiplier.max(1.0),
        }
    }

    /// Lengthen `base_secs` for the current tier. Never shortens.
    pub fn widen_secs(&self, base_secs: u64) -> u64 {
        widen(base_secs, self.interval_multiplier())
    }
}

pub(crate) fn widen(base_secs: u64, multiplier: f64) -> u64 {
    let widened = (base_secs as f64 * multiplier.max(1.0)).ceil() as u64;
    widened.max(base_secs)
}
