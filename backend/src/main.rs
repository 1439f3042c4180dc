//! pg-advisor CLI
//!
//! Thin driver around the analysis core: reads SQL and EXPLAIN JSON from
//! files (or stdin), runs the pipeline, prints findings and
//! recommendations. Fetching EXPLAIN output from a live database is the
//! operator's job, e.g.
//! `psql -Atc "EXPLAIN (FORMAT JSON, ANALYZE, BUFFERS) ..." > plan.json`.

use std::ffi::OsStr;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pg_advisor::config::Config;
use pg_advisor::services::sql_analyzer::{AnalysisReport, PlanComparison, SqlAnalyzer, SqlQuery};

#[derive(Parser)]
#[command(name = "pg-advisor", version, about = "PostgreSQL query performance advisor")]
struct Cli {
    /// Path to config.toml (defaults to conf/config.toml, then built-ins)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a query, optionally together with its EXPLAIN JSON output
    Analyze {
        /// SQL file to analyze, or '-' for stdin
        sql: PathBuf,
        /// EXPLAIN (FORMAT JSON) output for the same query
        #[arg(long)]
        explain: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Compare two EXPLAIN JSON documents (before/after a rewrite)
    Compare {
        /// EXPLAIN JSON of the original query
        old: PathBuf,
        /// EXPLAIN JSON of the rewritten query
        new: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    init_tracing(&config);

    let analyzer = SqlAnalyzer::builder()
        .with_thresholds(config.analyzer.thresholds())
        .build();

    match cli.command {
        Command::Analyze { sql, explain, format } => {
            let sql_text = read_input(&sql)?;
            let explain_text = explain
                .as_deref()
                .map(|p| {
                    fs::read_to_string(p)
                        .with_context(|| format!("failed to read {}", p.display()))
                })
                .transpose()?;

            let query = SqlQuery::new(sql_text);
            let report = match analyzer.analyze(&query, explain_text.as_deref()) {
                Ok(report) => report,
                Err(err) if err.is_parse_error() => {
                    // Malformed plan: fall back to static-only analysis.
                    tracing::warn!(%err, "EXPLAIN input unusable, falling back to static analysis");
                    analyzer.analyze(&query, None)?
                }
                Err(err) => return Err(err.into()),
            };

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => print_report(&report),
            }
        }
        Command::Compare { old, new, format } => {
            let old_text = fs::read_to_string(&old)
                .with_context(|| format!("failed to read {}", old.display()))?;
            let new_text = fs::read_to_string(&new)
                .with_context(|| format!("failed to read {}", new.display()))?;

            match analyzer.compare_plans(&old_text, &new_text) {
                Some(comparison) => match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&comparison)?)
                    }
                    OutputFormat::Text => print_comparison(&comparison),
                },
                None => {
                    println!("nothing to compare: one of the plans is missing or unparseable");
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if let Some(file) = &config.logging.file {
        let path = PathBuf::from(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path.file_name().unwrap_or_else(|| OsStr::new("pg-advisor.log"));
        let appender = tracing_appender::rolling::never(dir, name);
        // guard is leaked intentionally: logging must outlive main's scope
        let (writer, guard) = tracing_appender::non_blocking(appender);
        Box::leak(Box::new(guard));
        builder.with_writer(writer).with_ansi(false).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
}

fn read_input(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

fn print_report(report: &AnalysisReport) {
    if report.recommendations.is_empty() {
        println!("no issues found");
        return;
    }

    println!(
        "{} static finding(s), {} plan finding(s)\n",
        report.static_findings.len(),
        report.plan_findings.len()
    );
    for rec in &report.recommendations {
        println!("[{:?}] ({:?}) {}", rec.severity, rec.category, rec.message);
        println!("    -> {}", rec.suggestion);
    }
}

fn print_comparison(cmp: &PlanComparison) {
    let rows = [
        ("total cost", &cmp.cost),
        ("estimated rows", &cmp.rows),
        ("mean row width", &cmp.width),
        ("seq scans", &cmp.seq_scan_count),
        ("plan nodes", &cmp.node_count),
    ];
    for (label, m) in rows {
        let delta = m
            .percent_delta
            .map(|d| format!("{d:+.1}%"))
            .unwrap_or_else(|| "n/a".to_string());
        println!("{label:>15}: {:>12.1} -> {:>12.1}  ({delta})", m.old, m.new);
    }
    println!("{:>15}: {}", "old join types", cmp.old_join_types);
    println!("{:>15}: {}", "new join types", cmp.new_join_types);
}
