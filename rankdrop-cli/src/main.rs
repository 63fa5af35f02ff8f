//! CLI for the rankdrop leaderboard engine.
//!
//! Provides commands for inspecting, querying, resetting, and benchmarking
//! rankdrop data directories.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::SecondsFormat;
use clap::{Parser, Subcommand, ValueEnum};
use rankdrop::entry::{RankedEntry, ScoreArchive};
use rankdrop::persist::{LEADERBOARDS_FILE, SCORES_FILE};
use rankdrop::{EngineConfig, Leaderboard, Rankdrop, ScoreStrategy, SortOrder};

/// rankdrop: Leaderboard ranking engine CLI.
#[derive(Parser)]
#[command(name = "rankdrop", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Display leaderboards, entry counts, archives, and disk usage.
    Info {
        /// Path to the data directory.
        data_dir: PathBuf,
    },

    /// Print the top of a leaderboard.
    Top {
        /// Path to the data directory.
        data_dir: PathBuf,

        /// Leaderboard slug.
        slug: String,

        /// Number of rows.
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Print the window of rows around one player.
    Player {
        /// Path to the data directory.
        data_dir: PathBuf,

        /// Leaderboard slug.
        slug: String,

        /// Player alias.
        alias: String,

        /// Rows to include on each side of the player.
        #[arg(long, default_value = "5")]
        radius: usize,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// List archive snapshots, or the rows of one snapshot when a label is given.
    Archives {
        /// Path to the data directory.
        data_dir: PathBuf,

        /// Restrict to one leaderboard.
        #[arg(long)]
        slug: Option<String>,

        /// Snapshot label (requires --slug).
        #[arg(long, requires = "slug")]
        label: Option<String>,

        /// Maximum rows when printing a snapshot.
        #[arg(long, default_value = "100")]
        limit: usize,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Reset a leaderboard now.
    Reset {
        /// Path to the data directory.
        data_dir: PathBuf,

        /// Leaderboard slug.
        slug: String,

        /// Clear without archiving.
        #[arg(long)]
        no_archive: bool,

        /// Archive label (defaults to a timestamped label).
        #[arg(long)]
        label: Option<String>,
    },

    /// Run a submission microbenchmark against an in-memory engine.
    Bench {
        /// Number of submissions.
        #[arg(long, default_value = "1000000")]
        submissions: u64,

        /// Number of distinct players.
        #[arg(long, default_value = "10000")]
        players: u32,

        /// Score strategy of the benchmark leaderboard.
        #[arg(long, default_value = "best-only")]
        strategy: StrategyArg,
    },
}

/// Output format for query results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// Pretty-printed JSON.
    Json,
}

/// Score strategy selector for `bench`.
#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Keep each player's best score.
    BestOnly,
    /// Sum each player's submissions.
    Cumulative,
    /// Keep every submission.
    MultipleEntries,
}

impl From<StrategyArg> for ScoreStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::BestOnly => Self::BestOnly,
            StrategyArg::Cumulative => Self::Cumulative,
            StrategyArg::MultipleEntries => Self::MultipleEntries,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { data_dir } => cmd_info(&data_dir),
        Commands::Top {
            data_dir,
            slug,
            limit,
            format,
        } => cmd_top(&data_dir, &slug, limit, &format),
        Commands::Player {
            data_dir,
            slug,
            alias,
            radius,
            format,
        } => cmd_player(&data_dir, &slug, &alias, radius, &format),
        Commands::Archives {
            data_dir,
            slug,
            label,
            limit,
            format,
        } => cmd_archives(&data_dir, slug.as_deref(), label.as_deref(), limit, &format),
        Commands::Reset {
            data_dir,
            slug,
            no_archive,
            label,
        } => cmd_reset(&data_dir, &slug, !no_archive, label.as_deref()),
        Commands::Bench {
            submissions,
            players,
            strategy,
        } => cmd_bench(submissions, players, strategy.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Opens an existing data directory; refuses to create a new one.
fn open_existing(data_dir: &Path) -> Result<Rankdrop, Box<dyn std::error::Error>> {
    if !data_dir.join(LEADERBOARDS_FILE).exists() && !data_dir.join(SCORES_FILE).exists() {
        return Err(format!("No rankdrop data found at '{}'", data_dir.display()).into());
    }
    Ok(Rankdrop::open(data_dir, EngineConfig::default())?)
}

/// Implements `rankdrop info <data_dir>`.
fn cmd_info(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let rankdrop = open_existing(data_dir)?;

    println!("Data directory: {}", data_dir.display());
    println!();

    let leaderboards = rankdrop.leaderboards()?;
    println!("Leaderboards: {}", leaderboards.len());
    println!();

    for leaderboard in &leaderboards {
        let name = if leaderboard.display_name.is_empty() {
            leaderboard.slug.as_str()
        } else {
            leaderboard.display_name.as_str()
        };
        println!("  {} (\"{name}\")", leaderboard.slug);
        println!(
            "    Order: {:?}, strategy: {:?}",
            leaderboard.sort_order, leaderboard.score_strategy
        );
        if leaderboard.min_score.is_some() || leaderboard.max_score.is_some() {
            println!(
                "    Range: {} .. {}",
                leaderboard.min_score.map_or_else(|| "-inf".to_string(), |v| v.to_string()),
                leaderboard.max_score.map_or_else(|| "+inf".to_string(), |v| v.to_string()),
            );
        }
        println!(
            "    Reset: {}{}",
            leaderboard.reset_frequency,
            if leaderboard.archive_on_reset { " (archived)" } else { "" }
        );
        if let Some(next) = leaderboard.next_reset_at {
            println!("    Next reset: {}", next.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        println!("    Entries: {}", rankdrop.entry_count(&leaderboard.slug)?);
        println!();
    }

    let summaries = rankdrop.archive().archive_summaries(None)?;
    println!("Archive snapshots: {}", summaries.len());

    let total_size = dir_size(data_dir)?;
    println!("Total disk usage: {} ({total_size} bytes)", format_bytes(total_size));

    Ok(())
}

/// Implements `rankdrop top <data_dir> <slug>`.
fn cmd_top(data_dir: &Path, slug: &str, limit: usize, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let rankdrop = open_existing(data_dir)?;
    let rows = rankdrop.query().top_n(slug, limit)?;
    print_ranked(slug, &rows, format)
}

/// Implements `rankdrop player <data_dir> <slug> <alias>`.
fn cmd_player(
    data_dir: &Path,
    slug: &str,
    alias: &str,
    radius: usize,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let rankdrop = open_existing(data_dir)?;
    let window = rankdrop.query().player_window(slug, alias, radius)?;
    print_ranked(slug, &window.entries, format)
}

/// Implements `rankdrop archives <data_dir>`.
fn cmd_archives(
    data_dir: &Path,
    slug: Option<&str>,
    label: Option<&str>,
    limit: usize,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let rankdrop = open_existing(data_dir)?;

    if let (Some(slug), Some(label)) = (slug, label) {
        let rows = rankdrop.archive().archived_scores(slug, label, limit)?;
        return print_archived(slug, label, &rows, format);
    }

    let summaries = rankdrop.archive().archive_summaries(slug)?;
    match format {
        OutputFormat::Csv => {
            println!("leaderboard,label,archived_at,entries");
            for summary in &summaries {
                println!(
                    "{},{},{},{}",
                    summary.leaderboard_slug,
                    summary.reset_label,
                    summary.archived_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                    summary.entry_count
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
    }
    Ok(())
}

/// Implements `rankdrop reset <data_dir> <slug>`.
fn cmd_reset(data_dir: &Path, slug: &str, archive: bool, label: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let rankdrop = open_existing(data_dir)?;
    let summary = rankdrop.archive().reset(slug, archive, label)?;
    rankdrop.flush()?;

    println!("Reset '{slug}': {} entries cleared", summary.cleared);
    if let Some(label) = &summary.archive_label {
        println!("  Archived as: {label}");
    }
    if let Some(next) = summary.next_reset_at {
        println!("  Next reset: {}", next.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    Ok(())
}

/// Implements `rankdrop bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(submissions: u64, players: u32, strategy: ScoreStrategy) -> Result<(), Box<dyn std::error::Error>> {
    if players == 0 {
        return Err("--players must be greater than zero".into());
    }

    println!("rankdrop submission benchmark");
    println!("  Submissions: {submissions}");
    println!("  Players: {players}");
    println!("  Strategy: {strategy:?}");
    println!();

    let rankdrop = Rankdrop::in_memory(EngineConfig::default())?;
    rankdrop.create_leaderboard(Leaderboard::new("bench", SortOrder::Desc, strategy))?;

    let aliases: Vec<String> = (0..players).map(|i| format!("player_{i}")).collect();

    println!("Submitting {submissions} scores across {players} players...");

    let start = Instant::now();
    for n in 0..submissions {
        let alias = &aliases[(n % u64::from(players)) as usize];
        rankdrop.engine().submit("bench", alias, (n % 100_000) as f64, None)?;
    }
    let write_elapsed = start.elapsed();

    let start = Instant::now();
    let window_reads = u64::from(players).min(10_000);
    for alias in aliases.iter().take(window_reads as usize) {
        rankdrop.query().player_window("bench", alias, 5)?;
    }
    let read_elapsed = start.elapsed();

    let ns_per_submit = write_elapsed.as_nanos() as f64 / submissions.max(1) as f64;
    let submits_per_sec = submissions as f64 / write_elapsed.as_secs_f64();
    let ns_per_window = read_elapsed.as_nanos() as f64 / window_reads as f64;

    println!();
    println!("Results:");
    println!("  Rows stored: {}", rankdrop.entry_count("bench")?);
    println!("  Submit elapsed: {write_elapsed:.3?}");
    println!("  Avg submit latency: {ns_per_submit:.1} ns");
    println!("  Submit throughput: {submits_per_sec:.0} submissions/sec");
    println!("  Avg player window latency: {ns_per_window:.1} ns ({window_reads} reads)");
    println!();

    Ok(())
}

fn print_ranked(slug: &str, rows: &[RankedEntry], format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Csv => {
            println!("# leaderboard={slug}, rows={}", rows.len());
            println!("rank,player,score,submitted_at");
            for row in rows {
                println!(
                    "{},{},{},{}",
                    row.rank,
                    row.entry.player_alias,
                    row.entry.score_value,
                    row.entry.submitted_at.to_rfc3339_opts(SecondsFormat::Millis, true)
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "leaderboard": slug,
                "count": rows.len(),
                "entries": rows,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_archived(
    slug: &str,
    label: &str,
    rows: &[ScoreArchive],
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Csv => {
            println!("# leaderboard={slug}, label={label}, rows={}", rows.len());
            println!("position,player,score,submitted_at");
            for (i, row) in rows.iter().enumerate() {
                println!(
                    "{},{},{},{}",
                    i + 1,
                    row.player_alias,
                    row.score_value,
                    row.submitted_at.to_rfc3339_opts(SecondsFormat::Millis, true)
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "leaderboard": slug,
                "label": label,
                "count": rows.len(),
                "entries": rows,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Recursively calculates directory size.
fn dir_size(path: &Path) -> Result<u64, Box<dyn std::error::Error>> {
    let mut total = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                total += dir_size(&path)?;
            } else {
                total += entry.metadata()?.len();
            }
        }
    }
    Ok(total)
}
