//! dbcheck CLI - Row-level comparison of two database snapshots.

use clap::{Parser, Subcommand};
use dbcheck::{CheckError, Comparator, Config, UuidComparisonMode};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code when `--fail-on-diff` is set and the sources differ.
const EXIT_DIFFERENCES: u8 = 4;

/// Exit code when one or more tables failed.
const EXIT_TABLE_FAILURES: u8 = 2;

#[derive(Parser)]
#[command(name = "dbcheck")]
#[command(about = "Compare two database snapshots row by row")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare every common table of the two sources
    Compare {
        /// Override source (side A) database path
        #[arg(long)]
        source: Option<String>,

        /// Override target (side B) database path
        #[arg(long)]
        target: Option<String>,

        /// Override identifier handling: exclude, include_with_tracking, include_normal
        #[arg(long)]
        uuid_mode: Option<String>,

        /// Override number of workers
        #[arg(long)]
        workers: Option<usize>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Additional columns to exclude from comparison
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        exclude_columns: Vec<String>,

        /// Override cap on recorded differences per table
        #[arg(long)]
        max_differences: Option<usize>,

        /// Exit with code 4 if any difference or failure is found
        #[arg(long)]
        fail_on_diff: bool,
    },

    /// Show how each column would be classified, without comparing rows
    Classify,

    /// Load and validate the configuration only
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, CheckError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Compare {
            source,
            target,
            uuid_mode,
            workers,
            batch_size,
            exclude_columns,
            max_differences,
            fail_on_diff,
        } => {
            // Apply overrides
            if let Some(path) = source {
                config.source.path = path;
            }
            if let Some(path) = target {
                config.target.path = path;
            }
            if let Some(mode) = uuid_mode {
                config.comparison.uuid_comparison_mode = mode.parse::<UuidComparisonMode>()?;
            }
            if let Some(w) = workers {
                config.comparison.max_workers = w;
            }
            if let Some(b) = batch_size {
                config.comparison.batch_size = b;
            }
            if let Some(m) = max_differences {
                config.comparison.max_differences_per_table = m;
            }
            config.comparison.excluded_columns.extend(exclude_columns);

            let comparator = Comparator::from_config(&config)?;
            let cancel_token = setup_signal_handler();
            let summary = comparator.run(cancel_token).await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                print!("{}", summary.to_text());
            }

            if summary.cancelled {
                warn!("Run was cancelled; results are partial");
                return Err(CheckError::Cancelled);
            }
            if fail_on_diff && summary.has_differences() {
                return Ok(EXIT_DIFFERENCES);
            }
            if !summary.failures.is_empty() {
                return Ok(EXIT_TABLE_FAILURES);
            }
        }

        Commands::Classify => {
            let comparator = Comparator::from_config(&config)?;
            let classifications = comparator.classify_tables().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&classifications)?);
            } else {
                for c in &classifications {
                    println!("{}:", c.table);
                    for col in &c.columns {
                        let mut line = format!("  {:<30} {}", col.name, col.category);
                        if let Some(by) = &col.user_excluded {
                            line.push_str(&format!(" (user-excluded: {})", by));
                        }
                        println!("{}", line);
                    }
                    println!("  {}", c.exclusion_summary());
                }
            }
        }

        Commands::CheckConfig => {
            let compiled = config.comparison.compile()?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Configuration is valid");
                println!("  Source: {} ({})", config.source.path, config.source.r#type);
                println!("  Target: {} ({})", config.target.path, config.target.r#type);
                println!(
                    "  Identifier mode: {}",
                    compiled.options.uuid_comparison_mode
                );
                println!("  Normalization rules: {}", compiled.rules.len());
                println!("  Workers: {}", compiled.options.effective_workers());
            }
        }
    }

    Ok(0)
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout carries only the report.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to setup {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Finishing in-flight tables...", name);
            token.cancel();
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to setup Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Finishing in-flight tables...");
        token.cancel();
    });

    cancel_token
}
