//! Headless daemon and control CLI for usage-sync.
//!
//! Control commands only write the credentials and preference files; a
//! running `usage-sync run` picks the changes up on its next control poll.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use usage_sync::credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, SessionCredentials, mask_key,
    validate_session_key,
};
use usage_sync::notify::TracingNotifier;
use usage_sync::store::{JsonFileStore, PreferencesUpdate, StateStore};
use usage_sync::sync::{CycleJournal, CycleResult};
use usage_sync::usage::{ClaudeUsageClient, UsageMetric};
use usage_sync::{SyncConfig, UsageService, app_dirs, service::HISTORY_FILE};

/// Background sync for Claude usage metering.
#[derive(Parser)]
#[command(name = "usage-sync", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync daemon until Ctrl+C.
    Run,
    /// Fetch once and print the result.
    SyncOnce,
    /// Show cached usage and preferences.
    Status,
    /// Show recent sync cycles.
    History {
        /// Number of entries to show.
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Set the refresh interval in seconds (5-300).
    SetInterval { seconds: u32 },
    /// Enable or disable session-reset notifications.
    NotifyReset { state: Toggle },
    /// Enable or disable usage-milestone notifications.
    NotifyMilestones { state: Toggle },
    /// Store a session key and organization.
    Login {
        #[arg(long)]
        session_key: String,
        /// Organization UUID. Looked up when the key sees exactly one.
        #[arg(long)]
        org_id: Option<String>,
    },
    /// Forget stored credentials.
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(matches!(cli.command, Command::Run));

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(SyncConfig::default_config_path);
    let config = SyncConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?
        .validate();

    let credentials = FileCredentialStore::default_location();
    let store = JsonFileStore::new(config.state_dir());

    match cli.command {
        Command::Run => {
            let service = UsageService::from_config(&config, Arc::new(TracingNotifier))?;
            run(&config, &service).await
        }
        Command::SyncOnce => {
            let service = UsageService::from_config(&config, Arc::new(TracingNotifier))?;
            sync_once(&service).await
        }
        Command::Status => status(&credentials, &store),
        Command::History { limit } => history(&config, limit),
        Command::SetInterval { seconds } => {
            let prefs = store.save_preferences(&PreferencesUpdate::refresh_interval(seconds))?;
            println!("Refresh interval: {}s", prefs.refresh_interval_seconds);
            Ok(())
        }
        Command::NotifyReset { state } => {
            let prefs =
                store.save_preferences(&PreferencesUpdate::notify_on_reset(state.enabled()))?;
            println!("Session reset notifications: {}", on_off(prefs.notify_on_reset));
            Ok(())
        }
        Command::NotifyMilestones { state } => {
            let prefs = store.save_preferences(&PreferencesUpdate::notify_on_usage_thresholds(
                state.enabled(),
            ))?;
            println!(
                "Usage milestone notifications: {}",
                on_off(prefs.notify_on_usage_thresholds)
            );
            Ok(())
        }
        Command::Login {
            session_key,
            org_id,
        } => login(&config, &credentials, session_key, org_id).await,
        Command::Logout => {
            credentials.clear()?;
            println!("Logged out.");
            Ok(())
        }
    }
}

/// Stderr logging for every command; `run` also writes a daily log file.
fn init_logging(to_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("usage_sync=info"));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if to_file {
        let appender = tracing_appender::rolling::daily(app_dirs::logs_dir(), "usage-sync.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .init();
    guard
}

async fn run(config: &SyncConfig, service: &UsageService) -> anyhow::Result<()> {
    if !service.ensure_running() {
        info!("waiting for `usage-sync login`");
    }
    info!(
        "usage-sync v{} running (chain: {}, fallback: {})",
        env!("CARGO_PKG_VERSION"),
        service.chain_state(),
        service.fallback_state()
    );

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down..."),
            Err(e) => warn!("cannot listen for Ctrl+C, shutting down: {e}"),
        }
        on_signal.cancel();
    });

    service
        .supervise(config.control_poll_interval(), shutdown)
        .await;
    service.shutdown();
    Ok(())
}

async fn sync_once(service: &UsageService) -> anyhow::Result<()> {
    let outcome = service.sync_now().await;
    match &outcome.result {
        CycleResult::Success {
            snapshot,
            notifications,
        } => {
            for (label, metric) in snapshot.labeled_metrics() {
                println!("{}", format_metric(label, metric));
            }
            for notification in notifications {
                println!("Notified: {}", notification.title());
            }
            Ok(())
        }
        CycleResult::Failure(err) => {
            anyhow::bail!("{} ({err})", err.user_message())
        }
    }
}

fn status(credentials: &dyn CredentialStore, store: &dyn StateStore) -> anyhow::Result<()> {
    match credentials.load() {
        Some(creds) => println!(
            "Session key: {} (organization {})",
            mask_key(&creds.session_key),
            creds.org_id
        ),
        None => println!("Session key: not configured"),
    }

    let prefs = store.load_preferences()?;
    println!("Refresh interval: {}s", prefs.refresh_interval_seconds);
    println!("Session reset notifications: {}", on_off(prefs.notify_on_reset));
    println!(
        "Usage milestone notifications: {}",
        on_off(prefs.notify_on_usage_thresholds)
    );
    if let Some(threshold) = prefs.last_notified_threshold {
        println!("Last milestone announced: {threshold}%");
    }

    match store.load_cached_usage()? {
        Some(snapshot) => {
            println!(
                "\nLast fetched: {}",
                snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            for (label, metric) in snapshot.labeled_metrics() {
                println!("{}", format_metric(label, metric));
            }
        }
        None => println!("\nNo usage fetched yet."),
    }
    Ok(())
}

fn history(config: &SyncConfig, limit: usize) -> anyhow::Result<()> {
    let records = CycleJournal::read(&config.state_dir().join(HISTORY_FILE))?;
    if records.is_empty() {
        println!("No sync cycles recorded.");
        return Ok(());
    }
    let skip = records.len().saturating_sub(limit);
    for record in records.iter().skip(skip) {
        println!(
            "{} #{:<5} {:<18} {}",
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            record.attempt,
            record.trigger.to_string(),
            record.summary
        );
    }
    Ok(())
}

async fn login(
    config: &SyncConfig,
    credentials: &dyn CredentialStore,
    session_key: String,
    org_id: Option<String>,
) -> anyhow::Result<()> {
    let session_key = session_key.trim().to_owned();
    validate_session_key(&session_key)?;

    let org_id = match org_id {
        Some(org_id) => org_id,
        None => {
            let client = ClaudeUsageClient::new(
                &config.api,
                Arc::new(MemoryCredentialStore::default()),
            )?;
            let orgs = client
                .fetch_organizations(&session_key)
                .await
                .map_err(|e| anyhow::anyhow!("{} ({e})", e.user_message()))?;
            match orgs.as_slice() {
                [] => anyhow::bail!("no organizations visible to this session key"),
                [only] => only.uuid.clone(),
                many => {
                    println!("Several organizations are available; pass one with --org-id:");
                    for org in many {
                        println!("  {}  {}", org.uuid, org.name);
                    }
                    anyhow::bail!("organization not selected");
                }
            }
        }
    };

    let creds = SessionCredentials::new(session_key, org_id);
    credentials.save(&creds)?;
    println!(
        "Saved {} for organization {}.",
        mask_key(&creds.session_key),
        creds.org_id
    );
    Ok(())
}

fn format_metric(label: &str, metric: &UsageMetric) -> String {
    let resets = metric
        .time_until_reset(chrono::Utc::now())
        .map(|d| {
            let minutes = d.num_minutes();
            format!(", resets in {}h {:02}m", minutes / 60, minutes % 60)
        })
        .unwrap_or_default();
    format!(
        "{label:<20} {:>5.1}% [{}]{resets}",
        metric.utilization,
        metric.status()
    )
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
