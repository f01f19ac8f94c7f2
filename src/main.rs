use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{self, EnvFilter};

use tweetpull::api::HttpTimelineClient;
use tweetpull::batch::BatchRunner;
use tweetpull::config::Config;
use tweetpull::credentials::CredentialStore;
use tweetpull::error::{InputError, TweetPullError};
use tweetpull::fetcher::{FetchLimits, PostFetcher};
use tweetpull::input::{read_usernames, DateRange};
use tweetpull::output::OutputWriter;
use tweetpull::quota::QuotaCounter;
use tweetpull::storage::FileStore;

#[derive(Parser)]
#[command(name = "tweetpull")]
#[command(about = "Fetches posts for a list of users within a date range")]
#[command(version)]
struct Cli {
    /// Path to configuration file (can also be set via TWEETPULL_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable verbose logging (equivalent to --log-level debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Fetch posts for every username in a CSV file and save them per user
    Fetch {
        /// CSV file with one username in the first column of each row
        #[arg(long)]
        csv: PathBuf,

        /// First day of the range (YYYY-MM-DD, inclusive)
        #[arg(long)]
        start: NaiveDate,

        /// Last day of the range (YYYY-MM-DD, inclusive)
        #[arg(long)]
        end: NaiveDate,

        /// Bearer token; falls back to config, TWEETPULL_BEARER_TOKEN, then the saved token
        #[arg(long)]
        bearer_token: Option<String>,

        /// Directory for the <username>_tweets.txt files
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Save the bearer token for later runs
    SaveToken { token: String },
    /// Show the number of posts fetched this month
    Quota,
    /// Reset the monthly counter to zero
    ResetQuota,
}

impl Cli {
    /// Get config path from CLI arg or TWEETPULL_CONFIG environment variable
    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var("TWEETPULL_CONFIG").ok().map(PathBuf::from))
    }
}

/// Initialize structured logging, to the configured file or stderr
fn init_logging(config: &Config, cli: &Cli) -> Result<(), TweetPullError> {
    let log_level = if cli.verbose {
        "debug"
    } else if let Some(ref level) = cli.log_level {
        level.as_str()
    } else {
        config.log_level()
    };

    let _level = match log_level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => {
            return Err(TweetPullError::InvalidData(format!(
                "Invalid log level: {log_level}. Valid levels are: error, warn, info, debug, trace"
            )));
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| TweetPullError::InvalidData(format!("Failed to create log filter: {e}")))?;

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .init();
        }
    }

    debug!("Logging initialized with level: {}", log_level);
    Ok(())
}

/// Log an error at the level its category deserves
fn handle_error(error: &TweetPullError) {
    match error {
        TweetPullError::Config(_) => {
            error!("Configuration error: {}", error);
            error!("Please check your configuration file and environment variables");
        }
        TweetPullError::Input(_) => {
            error!("{}", error);
        }
        TweetPullError::Storage(_) | TweetPullError::Io(_) => {
            error!("Local storage error: {}", error);
        }
        TweetPullError::Api(_) => {
            warn!("Network error: {}", error);
        }
        TweetPullError::InvalidData(_) => {
            error!("Application error: {}", error);
            debug!("Error details: {:?}", error);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), TweetPullError> {
    let cli = Cli::parse();

    let config = match Config::load(cli.config_path()) {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().with_writer(std::io::stderr).init();
            let error = TweetPullError::Config(e);
            handle_error(&error);
            return Err(error);
        }
    };

    if let Err(e) = init_logging(&config, &cli) {
        eprintln!("Failed to initialize logging: {e}");
        return Err(e);
    }

    info!("Starting tweetpull v{}", env!("CARGO_PKG_VERSION"));
    debug!("Configuration file path: {:?}", cli.config_path());
    debug!("API base URL: {}", config.api.base_url);

    let result = match cli.command {
        Command::Fetch {
            csv,
            start,
            end,
            bearer_token,
            output_dir,
            no_progress,
        } => {
            run_fetch(
                config,
                FetchArgs {
                    csv,
                    start,
                    end,
                    bearer_token,
                    output_dir,
                    show_progress: !no_progress,
                },
            )
            .await
        }
        Command::SaveToken { token } => save_token(&config, &token),
        Command::Quota => show_quota(&config),
        Command::ResetQuota => reset_quota(&config),
    };

    if let Err(ref e) = result {
        handle_error(e);
    }
    result
}

struct FetchArgs {
    csv: PathBuf,
    start: NaiveDate,
    end: NaiveDate,
    bearer_token: Option<String>,
    output_dir: Option<PathBuf>,
    show_progress: bool,
}

/// Validate local inputs, then run the batch; nothing hits the network before all checks pass
async fn run_fetch(config: Config, args: FetchArgs) -> Result<(), TweetPullError> {
    let bearer_token = resolve_bearer_token(&config, args.bearer_token)?;
    let range = DateRange::from_days(args.start, args.end)?;
    let usernames = read_usernames(&args.csv)?;

    let client = HttpTimelineClient::new(
        &config.api,
        bearer_token,
        config.timeout(),
        config.fetch.default_retry_after_secs,
    )?;
    let quota = QuotaCounter::load(
        FileStore::new(&config.storage.quota_file),
        config.storage.quota_baseline,
        config.fetch.monthly_limit,
    )?;
    let output = OutputWriter::new(
        args.output_dir
            .unwrap_or_else(|| config.storage.output_dir.clone()),
    );

    info!(
        "Fetching {} users from {} to {} into {}",
        usernames.len(),
        range.start,
        range.end,
        output.output_dir().display()
    );

    let fetcher = PostFetcher::new(client, quota, output, FetchLimits::from(&config.fetch));
    let mut runner = BatchRunner::new(fetcher, config.fetch.user_pause())
        .with_progress(args.show_progress && std::io::stderr().is_terminal());

    let report = runner.run(&usernames, &range).await;
    for outcome in &report.outcomes {
        println!("{outcome}");
    }
    println!("{}", report.summary());

    Ok(())
}

fn resolve_bearer_token(
    config: &Config,
    cli_token: Option<String>,
) -> Result<String, TweetPullError> {
    let explicit = cli_token
        .or_else(|| config.api.bearer_token.clone())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if let Some(token) = explicit {
        return Ok(token);
    }

    let stored = CredentialStore::new(FileStore::new(&config.storage.credentials_file)).load()?;
    stored.ok_or_else(|| InputError::MissingCredential.into())
}

fn save_token(config: &Config, token: &str) -> Result<(), TweetPullError> {
    if token.trim().is_empty() {
        return Err(InputError::MissingCredential.into());
    }
    CredentialStore::new(FileStore::new(&config.storage.credentials_file)).save(token)?;
    info!(
        "Bearer token saved to {}",
        config.storage.credentials_file.display()
    );
    println!("Keys saved successfully!");
    Ok(())
}

fn show_quota(config: &Config) -> Result<(), TweetPullError> {
    let quota = QuotaCounter::load(
        FileStore::new(&config.storage.quota_file),
        config.storage.quota_baseline,
        config.fetch.monthly_limit,
    )?;
    println!(
        "Tweets fetched this month: {} (limit {})",
        quota.current(),
        quota.monthly_limit()
    );
    Ok(())
}

fn reset_quota(config: &Config) -> Result<(), TweetPullError> {
    let mut quota = QuotaCounter::load(
        FileStore::new(&config.storage.quota_file),
        config.storage.quota_baseline,
        config.fetch.monthly_limit,
    )?;
    quota.reset()?;
    println!("Tweets fetched count reset to 0.");
    Ok(())
}
