use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod bands;
mod config;
mod db;
mod error;
mod insights;
mod lifespan;
mod models;
mod normalize;
mod pipeline;
mod report;
mod reposts;
mod scoring;
mod stats;
mod store;
mod trends;

use crate::config::EngineConfig;
use crate::pipeline::RunReport;

#[derive(Parser)]
#[command(name = "board-intel")]
#[command(about = "Job board repost, lifespan and efficiency intelligence", long_about = None)]
struct Cli {
    /// Path to a board-intel.toml configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import posting observations and lifecycle events from CSV files
    #[command(group(
        ArgGroup::new("inputs")
            .args(["observations", "events"])
            .required(true)
            .multiple(true)
    ))]
    Import {
        #[arg(long)]
        observations: Option<PathBuf>,
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Analyse every board and store today's scores, snapshots and alerts
    Run {
        /// Evaluate as of the end of this day instead of now
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Also write the full run as JSON
        #[arg(long)]
        json: Option<PathBuf>,
        #[arg(long)]
        no_persist: bool,
    },
    /// Rank boards by efficiency score without storing anything
    Score {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show score trends from stored snapshots
    Trends {
        #[arg(long)]
        board: Option<String>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

/// Sets the returned receiver to `true` on Ctrl-C.
fn cancel_on_interrupt() -> watch::Receiver<bool> {
    let (sender, receiver) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing boards already in progress");
            let _ = sender.send(true);
        }
    });
    receiver
}

async fn analyse(pool: &PgPool, config: &EngineConfig, now: DateTime<Utc>) -> anyhow::Result<RunReport> {
    let source = Arc::new(db::PgStore::new(pool.clone()));
    pipeline::run(source, Arc::new(config.clone()), now, cancel_on_interrupt())
        .await
        .context("board analysis failed")
}

fn end_of_day(day: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
    Ok(day
        .and_hms_opt(23, 59, 59)
        .context("invalid --as-of date")?
        .and_utc())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.run.workers.max(1) as u32 + 1)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&pool, Utc::now()).await?;
            println!("Seed data inserted ({inserted} new postings).");
        }
        Commands::Import {
            observations,
            events,
        } => {
            let summary = db::import(&pool, observations.as_deref(), events.as_deref())
                .await
                .context("import failed")?;
            println!(
                "Inserted {} postings and {} events ({} events skipped for unknown postings).",
                summary.postings, summary.events, summary.skipped_events
            );
        }
        Commands::Run {
            as_of,
            json,
            no_persist,
        } => {
            let now = match as_of {
                Some(day) => end_of_day(day)?,
                None => Utc::now(),
            };
            let report = analyse(&pool, &config, now).await?;

            if let Some(path) = json {
                let body = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, body)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Run written to {}.", path.display());
            }

            let mut failures = report.failures.clone();
            if config.run.persist && !no_persist {
                let summary = db::persist_run(&pool, &report).await;
                println!(
                    "Stored {} scores, {} snapshots and {} anomaly alerts for {}.",
                    summary.scores, summary.snapshots, summary.anomalies, report.as_of
                );
                failures.extend(summary.failures);
            } else {
                info!("persistence disabled, nothing stored");
            }

            println!(
                "Analysed {} boards: {} scored, {} failed{}.",
                report.boards.len(),
                report.scored_boards(),
                failures.len(),
                if report.cancelled { ", run cancelled" } else { "" }
            );
            for failure in &failures {
                println!("- {} failed at {}: {}", failure.board_name, failure.stage, failure.error);
            }
        }
        Commands::Score { limit } => {
            let report = analyse(&pool, &config, Utc::now()).await?;
            let top = scoring::top_performers(&report.rankings, limit);

            if top.is_empty() {
                println!("No boards could be scored.");
            } else {
                println!("Top boards by efficiency score:");
                for score in top {
                    println!(
                        "{}. {} score {} ({}) repost rate {:.1}%",
                        score.rank.unwrap_or_default(),
                        score.board_name,
                        score.overall_score.unwrap_or_default(),
                        score.grade.map(|g| g.label()).unwrap_or("-"),
                        score.repost_rate
                    );
                }
            }
            for score in report.rankings.iter().filter(|s| !s.is_scored()) {
                let reason = score.suppression.as_ref().map(|r| r.describe()).unwrap_or_default();
                println!("- {} not scored: {}", score.board_name, reason);
            }
        }
        Commands::Trends { board } => {
            let boards = match board {
                Some(name) => vec![db::find_board(&pool, &name)
                    .await?
                    .with_context(|| format!("no board named '{name}'"))?],
                None => store::HistorySource::boards(&db::PgStore::new(pool.clone())).await?,
            };
            let as_of = Utc::now().date_naive();

            for board in boards {
                let snapshots = db::fetch_snapshots(&pool, board.id).await?;
                let trend = trends::board_trend(board.id, &snapshots, as_of, config.trends.window_days);
                let weekly = trends::weekly_comparison(board.id, &snapshots, as_of, &config.trends);
                match (trend.earliest_score, trend.latest_score) {
                    (Some(earliest), Some(latest)) => println!(
                        "{}: {} {:?} {:.0} -> {:.0} ({:+.2}%), week over week {} for {} weeks",
                        board.name,
                        trend.direction.arrow(),
                        trend.strength,
                        earliest,
                        latest,
                        trend.score_change_percent,
                        weekly.direction.arrow(),
                        weekly.trend_duration
                    ),
                    _ => println!(
                        "{}: not enough scored snapshots in the last {} days",
                        board.name, trend.window_days
                    ),
                }
            }
        }
        Commands::Report { out } => {
            let report = analyse(&pool, &config, Utc::now()).await?;
            std::fs::write(&out, report::build_report(&report))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
