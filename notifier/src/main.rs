use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use calendar_notifier::calendar::client::CalendarClient;
use calendar_notifier::host::{BrowserOpener, CalendarLauncher, DesktopNotifier};
use calendar_notifier::scheduler::log_outcome;
use calendar_notifier::{
    ActiveEndpoint, EventNotifier, NotifierConfig, PollingScheduler, ServerLocator,
};

#[derive(Parser)]
#[command(name = "calendar-notifier")]
#[command(about = "Desktop reminders for upcoming calendar events")]
#[command(
    long_about = "Finds a reachable calendar server, polls it for events and shows a desktop\n\
    notification when an event is 15, 30 or 60 minutes away.\n\n\
    Configuration is read from NOTIFIER_* environment variables or a .env file."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll on a timer and show reminders until interrupted (default)
    Run,
    /// Run a single poll cycle right now and exit
    Once,
    /// Probe the configured servers and print the first reachable one
    Discover,
    /// Open the calendar web app in the default browser
    Open,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calendar_notifier=info,shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenv::dotenv().ok();
    let config = NotifierConfig::from_env()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Once => once(config).await,
        Commands::Discover => discover(config).await,
        Commands::Open => open_calendar(config).await,
    }
}

fn build_notifier(config: NotifierConfig) -> Result<EventNotifier> {
    let fallback = config.default_server_url().map(str::to_string);
    let icon = config.icon.clone();

    let endpoint = ActiveEndpoint::default();
    let launcher = CalendarLauncher::new(endpoint.clone(), fallback, Arc::new(BrowserOpener));
    let host = Arc::new(DesktopNotifier::new(icon).with_launcher(launcher));

    let notifier = EventNotifier::new(config, host)?.with_endpoint(endpoint);
    Ok(notifier)
}

async fn run(config: NotifierConfig) -> Result<()> {
    tracing::info!("Starting calendar notifier");
    tracing::info!("Candidate servers: {:?}", config.server_urls);

    let notifier = build_notifier(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = tokio::spawn(PollingScheduler::new(notifier).run(shutdown_rx));

    // Wait for shutdown signal
    tracing::info!("Calendar notifier running. Press Ctrl+C to stop.");
    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        tracing::error!("Scheduler task error: {:?}", e);
    }

    tracing::info!("Calendar notifier stopped");
    Ok(())
}

async fn once(config: NotifierConfig) -> Result<()> {
    let mut notifier = build_notifier(config)?;
    let outcome = notifier.run_cycle(Utc::now()).await;
    log_outcome(&outcome);
    println!("{:?}", outcome);
    Ok(())
}

async fn discover(config: NotifierConfig) -> Result<()> {
    let client = CalendarClient::new(config.fetch_timeout)?;
    let locator = ServerLocator::new(client, config.probe_timeout);

    match locator.discover(&config.server_urls).await {
        Some(base) => println!("{}", base),
        None => anyhow::bail!("none of {:?} is reachable", config.server_urls),
    }
    Ok(())
}

async fn open_calendar(config: NotifierConfig) -> Result<()> {
    let client = CalendarClient::new(config.fetch_timeout)?;
    let locator = ServerLocator::new(client, config.probe_timeout);

    let endpoint = ActiveEndpoint::default();
    if let Some(base) = locator.discover(&config.server_urls).await {
        endpoint.set(base);
    }

    let launcher = CalendarLauncher::new(
        endpoint,
        config.default_server_url().map(str::to_string),
        Arc::new(BrowserOpener),
    );
    launcher.open_calendar().await?;
    Ok(())
}
