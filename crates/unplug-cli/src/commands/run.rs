//! Foreground session driver.
//!
//! Runs the controller on a current-thread tokio runtime. A fixed interval
//! polls due callbacks; stdin lines stand in for the platform signals:
//!
//! ```text
//! lock | unlock | fg | bg | pause | resume | stop
//! battery <pct> [charging|low-power]
//! freq <secs> | status
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use unplug_core::{
    BatteryReading, BatteryTelemetry, ChargingState, Collaborators, Config, DispatchError, Event,
    FocusController, HapticFeedback, HapticTier, KeyValueStore, MemoryStore, Notification,
    NotificationDispatcher, SqliteStore, StopReason, SystemClock, TelemetryError,
};

#[derive(Args)]
pub struct RunArgs {
    /// Session length in minutes
    #[arg(long, default_value_t = 25)]
    minutes: i64,
    /// Session length in seconds (overrides --minutes)
    #[arg(long)]
    seconds: Option<i64>,
    /// Print every event as a JSON line
    #[arg(long)]
    json: bool,
}

/// Prints reminders to the terminal.
struct TerminalDispatcher;

impl NotificationDispatcher for TerminalDispatcher {
    fn dispatch(&mut self, notification: &Notification) -> Result<(), DispatchError> {
        let bell = if notification.play_sound { "\x07" } else { "" };
        println!("{bell}>> {}: {}", notification.title, notification.body);
        Ok(())
    }
}

struct TerminalHaptics;

impl HapticFeedback for TerminalHaptics {
    fn pulse(&mut self, tier: HapticTier) {
        tracing::debug!(?tier, "haptic pulse");
    }
}

/// Battery state typed in on stdin. Starts full on mains.
#[derive(Clone)]
struct TypedBattery(Rc<RefCell<BatteryReading>>);

impl Default for TypedBattery {
    fn default() -> Self {
        Self(Rc::new(RefCell::new(BatteryReading {
            level_percent: 100.0,
            charging: ChargingState::Full,
            low_power_mode: false,
        })))
    }
}

impl BatteryTelemetry for TypedBattery {
    fn read(&mut self) -> Result<BatteryReading, TelemetryError> {
        Ok(*self.0.borrow())
    }
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;
    runtime.block_on(drive(args))
}

async fn drive(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let duration_secs = args.seconds.unwrap_or(args.minutes.saturating_mul(60));
    let config = Config::load()?;
    let tick_ms = config.timer.tick_interval_ms.max(10);

    let store: Box<dyn KeyValueStore> = match SqliteStore::open() {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!(error = %e, "stats store unavailable, sessions will not be saved");
            Box::new(MemoryStore::new())
        }
    };
    let battery = TypedBattery::default();
    let mut controller = FocusController::new(
        config,
        Collaborators {
            clock: Box::new(SystemClock),
            dispatcher: Box::new(TerminalDispatcher),
            haptics: Box::new(TerminalHaptics),
            telemetry: Box::new(battery.clone()),
            store,
        },
    );

    let finished = Rc::new(Cell::new(false));
    let done = finished.clone();
    let json = args.json;
    controller.subscribe(move |event| {
        print_event(event, json);
        if matches!(
            event,
            Event::TimerCompleted { .. }
                | Event::TimerStopped {
                    reason: StopReason::Cancelled,
                    ..
                }
        ) {
            done.set(true);
        }
    });

    controller.init();
    controller.start(duration_secs)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !finished.get() {
        tokio::select! {
            _ = ticker.tick() => {
                controller.poll();
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => handle_line(&mut controller, &battery, line.trim()),
                None => stdin_open = false,
            },
        }
    }

    controller.dispose();
    info!("session finished");
    Ok(())
}

fn handle_line(controller: &mut FocusController, battery: &TypedBattery, line: &str) {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("lock") => controller.set_locked(true),
        Some("unlock") => controller.set_locked(false),
        Some("fg") => controller.set_foregrounded(true),
        Some("bg") => controller.set_foregrounded(false),
        Some("pause") => {
            controller.pause();
        }
        Some("resume") => {
            controller.resume();
        }
        Some("stop") => {
            controller.stop();
        }
        Some("battery") => match words.next().map(str::parse::<f32>) {
            Some(Ok(level)) => {
                let mut reading = BatteryReading::discharging(level);
                for flag in words {
                    match flag {
                        "charging" => reading.charging = ChargingState::Charging,
                        "low-power" => reading.low_power_mode = true,
                        other => eprintln!("unknown battery flag: {other}"),
                    }
                }
                *battery.0.borrow_mut() = reading;
                controller.report_battery(reading);
            }
            _ => eprintln!("usage: battery <pct> [charging|low-power]"),
        },
        Some("freq") => match words.next().map(str::parse::<u64>) {
            Some(Ok(secs)) => {
                if let Err(e) = controller.set_notification_frequency(secs) {
                    eprintln!("error: {e}");
                }
            }
            _ => eprintln!("usage: freq <secs>"),
        },
        Some("status") => match serde_json::to_string_pretty(&controller.snapshot()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("error: {e}"),
        },
        Some(other) => eprintln!("unknown command: {other}"),
        None => {}
    }
}

fn print_event(event: &Event, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }

    match event {
        Event::TimerStarted { duration_secs, .. } => {
            println!("session started: {}", format_secs(*duration_secs));
        }
        Event::TimerTick { remaining_secs, .. } => {
            if remaining_secs % 60 == 0 || *remaining_secs <= 5 {
                println!("{} left", format_secs(*remaining_secs));
            }
        }
        Event::TimerPaused { remaining_secs, .. } => {
            println!("paused with {} left", format_secs(*remaining_secs));
        }
        Event::TimerResumed { remaining_secs, .. } => {
            println!("resumed with {} left", format_secs(*remaining_secs));
        }
        Event::TimerStopped { .. } => println!("session stopped"),
        Event::TimerCompleted { record, .. } => {
            println!(
                "session complete: {} reminders, {} on the phone",
                record.notifications_sent,
                format_secs(record.phone_use_secs)
            );
        }
        Event::ActivityChanged { current, .. } => println!("device is {}", current.as_str()),
        Event::TierChanged {
            current,
            level_percent,
            ..
        } => println!("battery {level_percent:.0}%: {} mode", current.as_str()),
        Event::DispatchFailed { error, .. } => eprintln!("delivery failed: {error}"),
        _ => {}
    }
}

fn format_secs(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
