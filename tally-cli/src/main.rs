use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use tally_core::{
    by_month, find_by_id, sort_newest_first, spending_by_category, summarize_by_billing_cycle, Category, Record,
    RECORD_TIME_FORMAT,
};
use tally_finance::{
    ledger, lock, CategoryCache, ChatCompletionsService, Classifier, IngestReport, JsonFileCache, NoCache,
    Pipeline, ServiceConfig,
};

mod auth;
mod config;
mod progress;
mod state;

use config::Config;
use progress::Progress;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TALLY_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "tally", version = VERSION, about = "Import WeChat Pay and Alipay bills into one categorized ledger")]
struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors and hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse, classify, and merge one or more bill exports into the ledger
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Add a single transaction by hand
    Add {
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        counterparty: String,
        #[arg(long, default_value = "")]
        item: String,
        /// Defaults to now
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "支出")]
        direction: String,
        #[arg(long, default_value = "")]
        payment_method: String,
        #[arg(long, default_value = "")]
        note: String,
    },

    /// Print ledger records, newest first
    List {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Print spending per category and 7/30-day totals instead of records
        #[arg(long)]
        summary: bool,
    },

    /// Write the ledger as CSV
    Export {
        out: PathBuf,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },

    /// Correct the category of one transaction
    SetType { id: String, label: String },

    /// Commit a staging file left behind by an interrupted import
    Recover,

    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write ~/.tally/config.toml with defaults
    Init,
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Store the categorization service API key in ~/.tally/auth.json
    PasteApiKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    match cli.command {
        Command::Import { files } => {
            let cfg = config::load_config()?;
            import(&cfg, &files, !cli.quiet).await?;
        }

        Command::Add {
            amount,
            counterparty,
            item,
            time,
            id,
            direction,
            payment_method,
            note,
        } => {
            let cfg = config::load_config()?;
            let time = time.unwrap_or_else(|| chrono::Local::now().format(RECORD_TIME_FORMAT).to_string());
            let record = Record {
                time,
                counterparty,
                item,
                direction,
                amount,
                payment_method,
                note,
                id,
                ..Record::default()
            };
            let report = build_pipeline(&cfg)?.add_manual(record).await?;
            print_report(&report);
        }

        Command::List {
            year,
            month,
            limit,
            summary,
        } => {
            let cfg = config::load_config()?;
            let records = select(&cfg, month_filter(year, month)?)?;
            if summary {
                for line in summary_lines(&records) {
                    println!("{line}");
                }
            } else {
                for r in records.iter().take(limit) {
                    println!("{}", format_row(r));
                }
                if records.len() > limit {
                    println!("… {} more (use --limit)", records.len() - limit);
                }
            }
        }

        Command::Export { out, year, month } => {
            let cfg = config::load_config()?;
            let records = select(&cfg, month_filter(year, month)?)?;
            ledger::export_csv(&records, &out)?;
            println!("Exported {} records to {}", records.len(), out.display());
        }

        Command::SetType { id, label } => {
            let category: Category = label.parse().map_err(|e: String| {
                let labels: Vec<&str> = Category::LABELS.iter().map(|c| c.label()).collect();
                anyhow::anyhow!("{e}; expected one of: {}", labels.join(", "))
            })?;
            let cfg = config::load_config()?;
            let pipeline = cfg.pipeline()?;
            let _lock = lock::acquire(&pipeline.ledger_path, pipeline.lock_timeout).await?;
            let records = ledger::load(&pipeline.ledger_path)?;
            let Some(previous) = find_by_id(&records, &id).map(|r| r.kind.clone()) else {
                bail!("no transaction with id {id} in {}", pipeline.ledger_path.display());
            };
            ledger::set_type(&pipeline.ledger_path, &id, category.label())?;
            println!("{id}: {previous} → {category}");
        }

        Command::Recover => {
            let cfg = config::load_config()?;
            match build_pipeline(&cfg)?.recover().await? {
                Some(report) => println!(
                    "Recovered {} staged records; ledger now holds {}",
                    report.staged, report.ledger_size
                ),
                None => println!("Nothing to recover."),
            }
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                let cfg = config::load_config()?;
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
        },

        Command::Auth { command } => match command {
            AuthCommand::PasteApiKey => auth::paste_api_key()?,
        },
    }

    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let default = if quiet {
        "error"
    } else if verbose {
        "tally_finance=debug,tally_ingest=debug,warn"
    } else {
        "tally_finance=info,tally_ingest=info,warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn build_pipeline(cfg: &Config) -> Result<Pipeline<ChatCompletionsService>> {
    let service = ChatCompletionsService::new(ServiceConfig {
        base_url: cfg.classifier.base_url.clone(),
        model: cfg.classifier.model.clone(),
        temperature: cfg.classifier.temperature,
        api_key: auth::api_key()?,
        http_timeout: cfg.classifier().request_timeout,
    })?;

    let cache: Arc<dyn CategoryCache> = if cfg.classifier.cache {
        Arc::new(JsonFileCache::open(cfg.cache_path()?)?)
    } else {
        Arc::new(NoCache)
    };

    let classifier = Classifier::new(service, cfg.classifier()).with_cache(cache);
    Ok(Pipeline::new(cfg.pipeline()?, classifier))
}

async fn import(cfg: &Config, files: &[PathBuf], show_progress: bool) -> Result<()> {
    let pipeline = build_pipeline(cfg)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; waiting for in-flight requests");
            on_interrupt.cancel();
        }
    });

    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let bar = Progress::fraction(&format!("classifying {name}"), show_progress);
        let result = pipeline.ingest_with(file, |done| bar.set_fraction(done), &cancel).await;
        bar.finish();

        let report = result.with_context(|| format!("importing {}", file.display()))?;
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &IngestReport) {
    if let Some(recovered) = &report.recovered {
        println!("Recovered {} records from an interrupted import", recovered.staged);
    }
    let c = &report.classification;
    println!(
        "{} ({}): {} records, {} categorized, {} from cache, {} unknown",
        report.source.display(),
        report.profile,
        report.parsed,
        c.classified,
        c.cached,
        c.unknown
    );
    let m = &report.commit.merge;
    println!(
        "Ledger: {} records ({} new, {} updated, {} kept)",
        report.commit.ledger_size, m.inserted, m.replaced, m.retained
    );
}

fn month_filter(year: Option<i32>, month: Option<u32>) -> Result<Option<(i32, u32)>> {
    match (year, month) {
        (None, None) => Ok(None),
        (Some(y), Some(m)) if (1..=12).contains(&m) => Ok(Some((y, m))),
        (Some(_), Some(m)) => bail!("month must be 1-12, got {m}"),
        _ => bail!("--year and --month go together"),
    }
}

fn select(cfg: &Config, month: Option<(i32, u32)>) -> Result<Vec<Record>> {
    let all = ledger::load(cfg.pipeline()?.ledger_path)?;
    let mut records = match month {
        Some((y, m)) => by_month(&all, y, m).into_iter().cloned().collect(),
        None => all,
    };
    sort_newest_first(&mut records);
    Ok(records)
}

fn summary_lines(records: &[Record]) -> Vec<String> {
    let mut lines: Vec<String> = spending_by_category(records)
        .into_iter()
        .map(|(label, spend)| format!("{label:<24} {:>12.2} {:>6.2}%", spend.amount, spend.share))
        .collect();

    if let Some(cycle) = summarize_by_billing_cycle(records) {
        lines.push(String::new());
        lines.push(format!("from {}", cycle.start));
        for (window, sums) in [("7 days", &cycle.week), ("30 days", &cycle.month)] {
            for (direction, total) in sums {
                lines.push(format!("{window:<8} {direction:<15} {total:>12.2}"));
            }
        }
    }
    lines
}

fn format_row(r: &Record) -> String {
    format!(
        "{:<19}  {:>10.2}  {:<4}  {:<22}  {} {}",
        r.time,
        r.amount,
        r.direction,
        r.kind,
        r.counterparty,
        r.item
    )
    .trim_end()
    .to_string()
}
