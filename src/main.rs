/*!
 * Stratus CLI
 */

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use stratus::{
    config::{
        JobRequest, LogLevel, StorageSettings, DEFAULT_MAX_CONCURRENT,
        DEFAULT_MAX_PART_CONCURRENCY, DEFAULT_MAX_RETRY, DEFAULT_PART_SIZE_BYTES,
        DEFAULT_RETRY_DELAY_SECS,
    },
    core::run_job,
    error::{CopyError, CopyResult, EXIT_SUCCESS},
    logging::{self, LogSettings},
    server::{self, AppState, DEFAULT_LISTEN},
    storage::{S3StoreFactory, StoreFactory},
};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(version, about = "Bulk copy between S3-compatible buckets (AWS S3, Alibaba OSS, GCS)", long_about = None)]
struct Cli {
    /// Provider settings file (TOML); environment variables are used otherwise
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long = "log-level", value_enum, default_value = "info", global = true)]
    log_level: LogLevelArg,

    /// Write JSON logs to this file instead of stdout
    #[arg(long = "log-file", value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Shorthand for --log-level debug
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every object under SOURCE to TARGET
    Copy(CopyArgs),

    /// Run a JSON job document
    Run {
        /// Path to the job document
        #[arg(long, value_name = "FILE")]
        job: PathBuf,
    },

    /// Accept jobs over HTTP on POST /invoke
    Serve {
        /// Address to listen on
        #[arg(long, default_value = DEFAULT_LISTEN)]
        listen: SocketAddr,
    },
}

#[derive(Args)]
struct CopyArgs {
    /// Source locator, scheme://bucket/prefix
    source: String,

    /// Destination locator, scheme://bucket/prefix
    target: String,

    /// Objects copied concurrently
    #[arg(default_value_t = DEFAULT_MAX_CONCURRENT)]
    max_concurrent: usize,

    /// Attempts per object
    #[arg(default_value_t = DEFAULT_MAX_RETRY)]
    max_retry: u32,

    /// Always write a _SUCCESS marker at the destination
    #[arg(default_value = "false", value_parser = BoolishValueParser::new())]
    add_success_file: bool,

    /// Only copy keys listed in the Delta Lake symlink manifest
    #[arg(default_value = "false", value_parser = BoolishValueParser::new())]
    is_delta_lake: bool,

    /// Multipart part size and threshold in bytes
    #[arg(long = "part-size", default_value_t = DEFAULT_PART_SIZE_BYTES)]
    part_size: u64,

    /// Delay between attempts in seconds
    #[arg(long = "retry-delay-secs", default_value_t = DEFAULT_RETRY_DELAY_SECS)]
    retry_delay_secs: u64,

    /// Cap on concurrent part uploads per object
    #[arg(long = "max-part-concurrency", default_value_t = DEFAULT_MAX_PART_CONCURRENCY)]
    max_part_concurrency: usize,

    /// Double the retry delay after every failed attempt
    #[arg(long = "exponential-backoff")]
    exponential_backoff: bool,
}

impl From<CopyArgs> for JobRequest {
    fn from(args: CopyArgs) -> Self {
        JobRequest {
            source: args.source,
            target: args.target,
            max_concurrent: args.max_concurrent,
            max_retry: args.max_retry,
            add_success_file: args.add_success_file,
            is_delta_lake: args.is_delta_lake,
            part_size_bytes: args.part_size,
            retry_delay_secs: args.retry_delay_secs,
            max_part_concurrency: args.max_part_concurrency,
            exponential_backoff: args.exponential_backoff,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> CopyResult<()> {
    let cli = Cli::parse();

    let log_settings = LogSettings {
        level: cli.log_level.into(),
        file: cli.log_file.clone(),
        verbose: cli.verbose,
    };
    if let Err(e) = logging::init_logging(&log_settings) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let settings = match cli.config {
        Some(ref path) => StorageSettings::from_file(path)?,
        None => StorageSettings::from_env(),
    };
    let factory: Arc<dyn StoreFactory> = Arc::new(S3StoreFactory::new(settings));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CopyError::Config(format!("Failed to start runtime: {}", e)))?;

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                on_signal.cancel();
            }
        });

        match cli.command {
            Commands::Copy(args) => {
                let request = JobRequest::from(args);
                copy(factory.as_ref(), &request, cancel).await
            }
            Commands::Run { job } => {
                let request = JobRequest::from_file(&job)?;
                copy(factory.as_ref(), &request, cancel).await
            }
            Commands::Serve { listen } => server::serve(listen, AppState::new(factory, cancel))
                .await
                .map_err(|e| CopyError::Config(format!("Failed to serve on {}: {}", listen, e))),
        }
    })
}

async fn copy(
    factory: &dyn StoreFactory,
    request: &JobRequest,
    cancel: CancellationToken,
) -> CopyResult<()> {
    let report = run_job(factory, request, cancel).await?;
    println!("{}", report);
    Ok(())
}
