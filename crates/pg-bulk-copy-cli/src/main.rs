//! pg-bulk-copy CLI - Bulk loading into PostgreSQL over binary COPY.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use pg_bulk_copy::transfer::resolve_schema;
use pg_bulk_copy::{
    BulkCopy, BulkCopyError, Config, Connection, EncoderRegistry, PgConnection, QuerySource,
    TargetConfig,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "pg-bulk-copy")]
#[command(about = "Bulk load query results into PostgreSQL over binary COPY")]
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
    /// Copy the rows of the source query into the destination table
    Copy {
        /// Override destination table
        #[arg(long)]
        table: Option<String>,

        /// Override source query
        #[arg(long)]
        query: Option<String>,

        /// Override import timeout in seconds (0 disables it)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show destination columns and the encoder chosen for each
    Describe {
        /// Override destination table
        #[arg(long)]
        table: Option<String>,
    },

    /// Test database connections
    HealthCheck,
}

#[derive(Serialize)]
struct CopyReport {
    table: String,
    rows: u64,
    duration_seconds: f64,
    rows_per_second: u64,
}

#[derive(Serialize)]
struct ColumnReport {
    name: String,
    wire_type: String,
    host_type: String,
    encoder: Option<String>,
    tier: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct EndpointHealth {
    endpoint: String,
    connected: bool,
    latency_ms: u64,
    error: Option<String>,
}

#[derive(Serialize)]
struct HealthReport {
    target: EndpointHealth,
    source: Option<EndpointHealth>,
    healthy: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), BulkCopyError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Copy {
            table,
            query,
            timeout,
        } => {
            if let Some(table) = table {
                config.copy.destination_table = table;
            }
            if let Some(secs) = timeout {
                config.copy.timeout_secs = secs;
            }
            let query = query
                .or_else(|| config.source_query().map(String::from))
                .filter(|q| !q.trim().is_empty())
                .ok_or_else(|| {
                    BulkCopyError::Config(
                        "a source query is required (source.query or --query)".to_string(),
                    )
                })?;

            let cancel_token = setup_signal_handler()?;
            let report = copy(&config, &query, &cancel_token).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nCopy completed!");
                println!("  Table: {}", report.table);
                println!("  Rows: {}", report.rows);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!("  Throughput: {} rows/sec", report.rows_per_second);
            }
        }

        Commands::Describe { table } => {
            let table = table.unwrap_or_else(|| config.copy.destination_table.clone());
            let columns = describe(&config.target, &table).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&columns)?);
            } else {
                println!("Columns of {}:", table);
                for c in &columns {
                    match (&c.encoder, &c.tier, &c.error) {
                        (Some(encoder), Some(tier), _) => println!(
                            "  {:<24} {:<14} {:<24} {} ({})",
                            c.name, c.wire_type, c.host_type, encoder, tier
                        ),
                        (_, _, error) => println!(
                            "  {:<24} {:<14} {:<24} unsupported: {}",
                            c.name,
                            c.wire_type,
                            c.host_type,
                            error.as_deref().unwrap_or("no encoder")
                        ),
                    }
                }
            }
        }

        Commands::HealthCheck => {
            let target = check(&config.target).await;
            let source = match &config.source {
                Some(_) => Some(check(&config.source_connection()).await),
                None => None,
            };
            let healthy = target.connected && source.as_ref().map_or(true, |s| s.connected);
            let result = HealthReport {
                target,
                source,
                healthy,
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                print_health("Target", &result.target);
                if let Some(ref source) = result.source {
                    print_health("Source", source);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(BulkCopyError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

async fn copy(
    config: &Config,
    query: &str,
    cancel: &CancellationToken,
) -> Result<CopyReport, BulkCopyError> {
    let start = Instant::now();

    let mut source_conn = PgConnection::new(config.source_connection());
    source_conn.open().await?;
    let client = source_conn
        .client()
        .ok_or_else(|| BulkCopyError::connection("no client after open", "source"))?;
    let mut source = QuerySource::new(client, query).await?;

    let mut target_conn =
        PgConnection::new(config.target.clone()).with_flush_bytes(config.copy.batch_flush_bytes);
    let result = BulkCopy::from_config(&mut target_conn, &config.copy)
        .write_to_server(&mut source, Some(cancel))
        .await;

    drop(source);
    close_logged(&mut source_conn, "source").await;
    let rows = result?;

    let duration = start.elapsed().as_secs_f64();
    Ok(CopyReport {
        table: config.copy.destination_table.clone(),
        rows,
        duration_seconds: duration,
        rows_per_second: if duration > 0.0 {
            (rows as f64 / duration) as u64
        } else {
            rows
        },
    })
}

async fn describe(target: &TargetConfig, table: &str) -> Result<Vec<ColumnReport>, BulkCopyError> {
    let mut conn = PgConnection::new(target.clone());
    conn.open().await?;
    let columns = resolve_schema(&mut conn, table).await;
    conn.close().await?;

    let registry = EncoderRegistry::global();
    Ok(columns?
        .into_iter()
        .map(|c| {
            let resolved = registry.resolve(c.wire_type, c.host_type, c.host_type);
            ColumnReport {
                wire_type: c.wire_type.to_string(),
                host_type: c.host_type.to_string(),
                encoder: resolved.as_ref().ok().map(|r| r.name().to_string()),
                tier: resolved.as_ref().ok().map(|r| r.tier.to_string()),
                error: resolved.err().map(|e| e.to_string()),
                name: c.name,
            }
        })
        .collect())
}

async fn check(config: &TargetConfig) -> EndpointHealth {
    let start = Instant::now();
    let mut conn = PgConnection::new(config.clone());
    let result = match conn.open().await {
        Ok(()) => conn.ping().await,
        Err(e) => Err(e),
    };
    let latency_ms = start.elapsed().as_millis() as u64;
    if conn.is_open() {
        close_logged(&mut conn, &config.endpoint()).await;
    }
    EndpointHealth {
        endpoint: config.endpoint(),
        connected: result.is_ok(),
        latency_ms,
        error: result.err().map(|e| e.to_string()),
    }
}

/// Close a connection whose outcome no longer matters, logging a failure.
async fn close_logged(conn: &mut dyn Connection, label: &str) {
    if let Err(e) = conn.close().await {
        warn!("Failed to close connection to {}: {}", label, e);
    }
}

fn print_health(label: &str, health: &EndpointHealth) {
    println!(
        "  {} ({}): {} ({}ms)",
        label,
        health.endpoint,
        if health.connected { "OK" } else { "FAILED" },
        health.latency_ms
    );
    if let Some(ref err) = health.error {
        println!("    Error: {}", err);
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, BulkCopyError> {
    let cancel_token = CancellationToken::new();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Aborting copy; no rows will be committed...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

/// Cancel the returned token on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, BulkCopyError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Aborting copy; no rows will be committed...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
