//! Flatland earthquake feed (flatland-quakes) - Main entry point
//!
//! Polls a live earthquake feed and drives three independent renderer views
//! (globe, northern and southern flat maps) from one clustered batch. Each
//! view logs a summary of what it would draw.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use flatland_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use flatland_common::events::EventBus;
use flatland_common::time::format_age;
use flatland_quakes::cities::{CityLookup, CityTable};
use flatland_quakes::config::QuakeConfig;
use flatland_quakes::feed::UsgsFeed;
use flatland_quakes::geo::{GeoPoint, MEAN_EARTH_RADIUS_KM};
use flatland_quakes::orchestrator::{FeedOrchestrator, FetchOutcome};
use flatland_quakes::view::QuakeView;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for flatland-quakes
#[derive(Parser, Debug)]
#[command(name = "flatland-quakes")]
#[command(about = "Live earthquake feed for the Flatland globe and map views")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FLATLAND_CONFIG")]
    config: Option<PathBuf>,

    /// Override the fetch interval (seconds)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Override the feed URL
    #[arg(long, env = "FLATLAND_FEED_URL")]
    feed_url: Option<String>,

    /// JSON file with the city table used for population coloring
    #[arg(long, env = "FLATLAND_CITIES")]
    cities: Option<PathBuf>,

    /// Fetch once, print the views and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let mut config = QuakeConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    if let Some(interval) = args.interval {
        config.feed.interval_secs = interval.max(1);
    }
    if let Some(url) = args.feed_url {
        config.feed.url = url;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("flatland_quakes={0},flatland_common={0}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config_path {
        Some(path) => info!(path = %path.display(), "Using configuration file"),
        None => info!("Using built-in configuration defaults"),
    }
    info!(url = %config.feed.url, interval_secs = config.feed.interval_secs, "Starting Flatland earthquake feed");

    let cities: Arc<dyn CityLookup> = match &args.cities {
        Some(path) => Arc::new(CityTable::from_json_file(path).context("Failed to load city table")?),
        None => Arc::new(CityTable::default()),
    };

    let feed = UsgsFeed::new(config.feed.url.clone(), config.fetch_timeout(), config.request_spacing())
        .context("Failed to create feed client")?;
    let orchestrator = FeedOrchestrator::new(
        Arc::new(feed),
        config.orchestrator_settings()?,
        EventBus::new(100),
    );

    for view in build_views(&config, cities) {
        let view = Arc::new(view);
        orchestrator
            .subscribe(view.name().to_string(), move |batch| {
                log_view(&view, &batch);
                Ok(())
            })
            .await;
    }

    if args.once {
        match orchestrator.fetch_now().await {
            FetchOutcome::Failed(kind) => anyhow::bail!("Feed fetch failed: {}", kind),
            outcome => info!(?outcome, "Single fetch complete"),
        }
        orchestrator.shutdown().await;
        return Ok(());
    }

    orchestrator.start().await;
    shutdown_signal().await;
    orchestrator.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Globe plus one flat map per hemisphere
fn build_views(config: &QuakeConfig, cities: Arc<dyn CityLookup>) -> Vec<QuakeView> {
    let criteria = config.filter_criteria();
    let classifier = config.classifier(cities);

    if criteria.region_center.is_some() {
        warn!("Region filter applies to the globe view only; flat maps use their hemisphere");
    }

    // Quarter great circle: everything within one hemisphere of the pole
    let hemisphere_km = std::f64::consts::FRAC_PI_2 * MEAN_EARTH_RADIUS_KM;

    vec![
        QuakeView::new("globe", criteria.clone(), classifier.clone()),
        QuakeView::new(
            "flat-north",
            criteria.clone().with_region(GeoPoint::new(90.0, 0.0), hemisphere_km),
            classifier.clone(),
        ),
        QuakeView::new(
            "flat-south",
            criteria.with_region(GeoPoint::new(-90.0, 0.0), hemisphere_km),
            classifier,
        ),
    ]
}

fn log_view(view: &QuakeView, batch: &[flatland_quakes::SeismicEvent]) {
    let now = flatland_common::time::now();
    let drawn = view.render_at(batch, now);
    let recent = drawn.iter().filter(|c| c.result.recent).count();

    info!(view = view.name(), visible = drawn.len(), recent, "View refreshed");
    if let Some(top) = drawn
        .iter()
        .max_by(|a, b| a.event.effective_magnitude().total_cmp(&b.event.effective_magnitude()))
    {
        info!(
            view = view.name(),
            id = %top.event.id,
            magnitude = top.event.effective_magnitude(),
            members = top.event.member_count(),
            age = %format_age(top.event.age_seconds(now) as i64),
            place = %top.event.place,
            "Largest visible event"
        );
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
