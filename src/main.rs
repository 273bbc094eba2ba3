use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ovulation_tracker::{crypto, cycles, forecast, snapshot, EntryStore, Journal, PredictorConfig};

#[derive(Parser)]
#[command(
    name = "ovulation-tracker",
    version,
    about = "Ovulation prediction from a fertility journal"
)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", env = "OVULATION_TRACKER_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the ovulation prediction as JSON
    Predict {
        #[command(flatten)]
        source: JournalSource,
        /// Date to predict for (YYYY-MM-DD)
        #[arg(long)]
        today: NaiveDate,
        /// JSON file overriding predictor thresholds
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print cycle statistics as JSON
    Stats {
        #[command(flatten)]
        source: JournalSource,
        #[arg(long)]
        today: NaiveDate,
    },
}

#[derive(clap::Args)]
struct JournalSource {
    /// Journal file, plain JSON or sealed
    #[arg(long)]
    journal: PathBuf,
    /// Environment variable holding the passphrase for a sealed journal
    #[arg(long)]
    passphrase_env: Option<String>,
}

fn load_journal(source: &JournalSource) -> Result<Journal> {
    let bytes = fs::read(&source.journal)
        .with_context(|| format!("reading {}", source.journal.display()))?;

    if crypto::is_sealed(&bytes) {
        let var = source
            .passphrase_env
            .as_deref()
            .context("journal is sealed; pass --passphrase-env")?;
        let passphrase = zeroize::Zeroizing::new(
            std::env::var(var).with_context(|| format!("environment variable {var} is not set"))?,
        );
        return snapshot::open(&passphrase, &bytes).context("opening sealed journal");
    }

    let json = std::str::from_utf8(&bytes).context("journal is not UTF-8")?;
    snapshot::from_json(json).context("parsing journal")
}

fn load_config(path: &Path) -> Result<PredictorConfig> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
}

/// `RUST_LOG` wins when set and valid; otherwise `--log-level` applies to this crate.
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ovulation_tracker={level}")))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&cli.log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Predict {
            source,
            today,
            config,
        } => {
            let mut journal = load_journal(&source)?;
            if let Some(path) = config {
                journal.settings.predictor = load_config(&path)?;
            }
            debug!(entries = journal.len(), %today, "predicting");
            let prediction = forecast(&journal, today);
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        Commands::Stats { source, today } => {
            let journal = load_journal(&source)?;
            let gap = journal.settings.predictor.period_gap_days;
            let cycles = cycles::rebuild_cycles(journal.entries(), today, gap);
            let stats = cycles::cycle_stats(&cycles, journal.entries());
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
