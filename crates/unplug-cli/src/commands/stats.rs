use clap::Subcommand;
use unplug_core::{SessionStatsStore, SqliteStore};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Most recent completed sessions, oldest first
    History {
        /// Number of sessions to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// All-time totals
    Totals,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let stats = SessionStatsStore::new(Box::new(SqliteStore::open()?));

    match action {
        StatsAction::History { limit } => {
            let history = stats.history()?;
            let skip = history.len().saturating_sub(limit);
            let recent = &history[skip..];
            println!("{}", serde_json::to_string_pretty(recent)?);
        }
        StatsAction::Totals => {
            let totals = stats.totals()?;
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
    }
    Ok(())
}
