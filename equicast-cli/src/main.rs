//! Equicast CLI — run the prediction pipeline and manage its data.
//!
//! Commands:
//! - `run`: assemble, train and/or predict, per `--mode`
//! - `fetch`: warm the bar cache for the configured tickers
//! - `cache status`: list cached tickers with their date ranges
//! - `cache clear`: delete cached bars, optionally per ticker or kind
//! - `config show`: print the effective configuration as TOML or JSON

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use equicast_core::data::BarCache;
use equicast_core::domain::DataKind;
use equicast_runner::{
    build_adapter, run_pipeline, warm_cache, ConfigOverrides, Mode, PipelineConfig,
    PipelineSummary,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "equicast",
    about = "Equicast CLI: next-day stock direction prediction"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command that reads the configuration.
#[derive(Args)]
struct ConfigArgs {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated bare tickers (e.g. TATAMOTORS,INFY).
    #[arg(long, value_delimiter = ',')]
    tickers: Option<Vec<String>>,

    /// Training start date (YYYY-MM-DD).
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Training end date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Bar granularity: daily or intraday.
    #[arg(long)]
    data_kind: Option<DataKind>,

    /// Tickers processed concurrently.
    #[arg(long)]
    max_workers: Option<usize>,

    /// Seconds to sleep after every provider request.
    #[arg(long)]
    api_delay: Option<f64>,

    /// Read `{dir}/{SYMBOL}.csv` instead of calling Yahoo Finance.
    #[arg(long)]
    csv_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            tickers: self.tickers.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            kind: self.data_kind,
            max_workers: self.max_workers,
            api_delay_secs: self.api_delay,
            csv_dir: self.csv_dir.clone(),
            ..ConfigOverrides::default()
        }
    }

    fn load(&self) -> Result<PipelineConfig> {
        self.load_with(self.overrides())
    }

    fn load_with(&self, overrides: ConfigOverrides) -> Result<PipelineConfig> {
        PipelineConfig::load(self.config.as_deref(), &overrides).context("invalid configuration")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline.
    Run {
        /// train_and_predict, train_only or predict_only.
        #[arg(long, default_value = "train_and_predict")]
        mode: Mode,

        #[command(flatten)]
        config: ConfigArgs,

        /// Predict from this date instead of today (YYYY-MM-DD).
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Train from the persisted dataset instead of rebuilding it.
        #[arg(long, default_value_t = false)]
        reuse_dataset: bool,

        /// Replace predictions already recorded for the target date.
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Fetch bars for the configured tickers into the cache.
    Fetch {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached tickers, kinds, date ranges and sizes.
    Status {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Delete cached bars.
    Clear {
        /// Only this ticker.
        #[arg(long)]
        ticker: Option<String>,

        /// Only this kind (daily or intraday).
        #[arg(long)]
        kind: Option<DataKind>,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (defaults, file, flags).
    Show {
        #[command(flatten)]
        config: ConfigArgs,

        /// JSON instead of TOML.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            mode,
            config,
            as_of,
            reuse_dataset,
            overwrite,
        } => {
            let overrides = ConfigOverrides {
                as_of,
                reuse_dataset,
                overwrite,
                ..config.overrides()
            };
            run_cmd(mode, config.load_with(overrides)?)
        }
        Commands::Fetch { config } => run_fetch(config.load()?),
        Commands::Cache { action } => match action {
            CacheAction::Status { config } => run_cache_status(&config.load()?),
            CacheAction::Clear {
                ticker,
                kind,
                config,
            } => run_cache_clear(&config.load()?, ticker, kind),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { config, json } => {
                let cfg = config.load()?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&cfg)?);
                } else {
                    print!("{}", cfg.to_toml()?);
                    println!("# config hash: {}", cfg.config_hash());
                }
                Ok(())
            }
        },
    }
}

fn run_cmd(mode: Mode, config: PipelineConfig) -> Result<()> {
    let summary = run_pipeline(mode, &config)?;
    print_summary(&summary);
    Ok(())
}

fn run_fetch(config: PipelineConfig) -> Result<()> {
    let adapter = build_adapter(&config).context("failed to set up data provider")?;
    let cache = BarCache::new(config.paths.cache_dir.clone());
    let results = warm_cache(&config, &adapter, &cache)?;

    println!("{:<16} {:<20} {:>8}  Status", "Ticker", "Symbol", "Bars");
    println!("{}", "-".repeat(60));
    for r in &results {
        let status = r.error.as_deref().unwrap_or("ok");
        println!(
            "{:<16} {:<20} {:>8}  {status}",
            r.ticker,
            r.symbol.as_deref().unwrap_or("-"),
            r.bars
        );
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if failed == results.len() {
        eprintln!("No ticker could be fetched.");
        std::process::exit(1);
    }
    Ok(())
}

fn run_cache_status(config: &PipelineConfig) -> Result<()> {
    let cache = BarCache::new(config.paths.cache_dir.clone());
    let mut entries = cache.status()?;
    if entries.is_empty() {
        println!("Cache is empty: {}", cache.cache_dir().display());
        return Ok(());
    }
    entries.sort_by(|a, b| (&a.ticker, a.kind.as_str()).cmp(&(&b.ticker, b.kind.as_str())));

    let total: u64 = entries.iter().map(|e| e.bytes).sum();
    println!("Cache: {}", cache.cache_dir().display());
    println!("Entries: {}", entries.len());
    println!("Total size: {}", format_size(total));
    println!();
    println!(
        "{:<14} {:<9} {:<16} {:<35} {:>7} {:>10}",
        "Ticker", "Kind", "Symbol", "Range", "Bars", "Size"
    );
    println!("{}", "-".repeat(96));
    for e in &entries {
        let (symbol, range, bars) = match &e.meta {
            Some(m) => (
                m.symbol.clone(),
                format!("{} to {}", m.start, m.end),
                m.bar_count.to_string(),
            ),
            None => ("?".into(), "(no meta)".into(), "-".into()),
        };
        println!(
            "{:<14} {:<9} {:<16} {:<35} {:>7} {:>10}",
            e.ticker,
            e.kind.as_str(),
            symbol,
            range,
            bars,
            format_size(e.bytes)
        );
    }
    Ok(())
}

fn run_cache_clear(
    config: &PipelineConfig,
    ticker: Option<String>,
    kind: Option<DataKind>,
) -> Result<()> {
    let cache = BarCache::new(config.paths.cache_dir.clone());
    let ticker = ticker.map(|t| t.trim().to_uppercase());
    let removed = cache.clear(ticker.as_deref(), kind)?;
    println!("Removed {removed} cached file(s) from {}", cache.cache_dir().display());
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn print_summary(summary: &PipelineSummary) {
    println!();
    println!("=== Equicast Run ===");
    println!("Mode:           {}", summary.mode);
    println!("Elapsed:        {:.1}s", summary.elapsed.as_secs_f64());

    if let Some(report) = &summary.assembly {
        println!();
        println!("--- Dataset ---");
        println!("Rows:           {}", report.rows);
        println!("Tickers:        {} ok, {} failed", report.succeeded.len(), report.failed.len());
        for f in &report.failed {
            println!("  skipped {:<12} {}", f.ticker, f.reason);
        }
    } else if let Some(rows) = summary.training_rows {
        println!();
        println!("--- Dataset ---");
        println!("Rows:           {rows} (reused)");
    }

    if let Some(eval) = &summary.evaluation {
        println!();
        println!("--- Evaluation ---");
        println!("Train / Test:   {} / {}", eval.n_train, eval.n_test);
        println!("Accuracy:       {:.4}", eval.accuracy);
        match eval.roc_auc {
            Some(auc) => println!("ROC AUC:        {auc:.4}"),
            None => println!("ROC AUC:        n/a (single class in test split)"),
        }
        println!();
        print!("{}", eval.report);
    }
    if let Some(path) = &summary.model_path {
        println!("Model saved to: {}", path.display());
    }

    if let Some(p) = &summary.predictions {
        println!();
        println!("--- Predictions for {} ---", p.prediction_for_date);
        for r in &p.written {
            println!(
                "{:<14} {:<10} p(up)={:.4}",
                r.ticker,
                r.predicted_movement.as_str(),
                r.probability_up
            );
        }
        for (ticker, reason) in &p.skipped {
            println!("{ticker:<14} skipped: {reason}");
        }
        if !p.written.is_empty() {
            println!("Saved to: {}", p.ledger_path.display());
        }
    }
    println!();
}
