use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use infoeste::browser::{ChromeDriver, SessionManager};
use infoeste::config::AppConfig;
use infoeste::dom::ListingSnapshot;
use infoeste::{export, extract, server, validate, Event, EventsService};

#[derive(Parser)]
#[command(name = "infoeste", about = "Infoeste schedule scraper and API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the events API (default)
    Serve,
    /// Scrape once and write the events to a JSON file
    Snapshot {
        /// Output path
        #[arg(short, long, default_value = "data/events.json")]
        output: PathBuf,
    },
    /// Check the live page structure and print the report
    Health,
    /// Extract events from a saved copy of the listing page
    Parse {
        /// HTML file to read
        file: PathBuf,
    },
    /// Print totals for a snapshot written by `snapshot`
    Summary {
        /// JSON file to read
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(AppConfig::from_env()?).await,
        Commands::Snapshot { output } => snapshot(AppConfig::from_env()?, output).await,
        Commands::Health => health(AppConfig::from_env()?).await,
        Commands::Parse { file } => parse(file),
        Commands::Summary { file } => summary(file),
    }
}

fn build_service(config: &AppConfig) -> Arc<EventsService<ChromeDriver>> {
    let session = SessionManager::new(ChromeDriver, config.browser_config());
    let service = EventsService::new(Arc::new(session), config.page_contract(), config.cache_ttl)
        .with_validation(config.validate_before_extract);
    Arc::new(service)
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let service = build_service(&config);

    // Warm up in the background; requests retry start-up if this fails
    let warm_up = service.clone();
    tokio::spawn(async move {
        info!("Starting browser");
        match warm_up.session().ensure_ready().await {
            Ok(_) => info!("Browser ready"),
            Err(e) => warn!(
                error = %e,
                "Browser warm-up failed; requests will retry start-up"
            ),
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        %addr,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        url = %config.url,
        "Server listening"
    );

    let result = axum::serve(listener, server::create_router(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Shutting down");
    service.shutdown().await;
    result.context("server error")
}

async fn snapshot(config: AppConfig, output: PathBuf) -> anyhow::Result<()> {
    let service = build_service(&config);
    let start = Instant::now();

    let result = service.get_events().await;
    service.shutdown().await;
    let events = result.context("scraping events")?;

    export::write_snapshot(&output, &events)?;
    println!(
        "Wrote {} to {} in {:.1}s",
        totals(&events),
        output.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn summary(file: PathBuf) -> anyhow::Result<()> {
    let events = export::read_snapshot(&file)
        .with_context(|| format!("reading {}", file.display()))?;

    for event in &events {
        println!(
            "{}: {} courses, {} seats left",
            event.title,
            event.courses.len(),
            event.vacancies_left()
        );
    }
    println!("Total: {}", totals(&events));
    Ok(())
}

fn totals(events: &[Event]) -> String {
    let courses: usize = events.iter().map(|e| e.courses.len()).sum();
    let seats_left: i64 = events.iter().map(|e| e.vacancies_left()).sum();
    format!(
        "{} events ({} courses, {} seats left)",
        events.len(),
        courses,
        seats_left
    )
}

async fn health(config: AppConfig) -> anyhow::Result<()> {
    let service = build_service(&config);

    let result = service.check_health().await;
    service.shutdown().await;
    let report = result.context("running structure check")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_valid {
        anyhow::bail!("page structure has {} violation(s)", report.errors.len());
    }
    Ok(())
}

fn parse(file: PathBuf) -> anyhow::Result<()> {
    let html = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;

    let listing = ListingSnapshot::from_html(&html);
    let report = validate::validate(listing.as_ref());
    for violation in &report.errors {
        warn!("{violation}");
    }

    let events = listing
        .as_ref()
        .map(extract::extract_events)
        .unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
