use clap::{Parser, Subcommand};
use portalytics::aggregation::{AttributeAggregator, FrequencyTable, KNOWN_ATTRIBUTES};
use portalytics::directory::sort_portals_by_title;
use portalytics::quality::QualityInspector;
use portalytics::{
    BucketKey, ClickAttributionEngine, HttpPortalDirectory, PortalDirectory, PortalyticsConfig,
    QueryClient,
};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "portalytics")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Seconds between two refresh cycles.
    #[arg(long, env = "PORTALYTICS_INTERVAL_SECS", default_value = "300")]
    interval_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the analytics log on a fixed interval (default)
    Run,
    /// Run a single refresh cycle and print the per-portal summary
    Once,
    /// Print the value distribution of the known material attributes
    Attributes {
        /// Number of terms shown before the "(other)" bucket
        #[arg(long, default_value = "10")]
        top: usize,
        /// Restrict to materials inside this collection
        #[arg(long)]
        collection: Option<String>,
    },
    /// Print the metadata quality report of every portal
    Quality {
        /// Only report on this portal id
        #[arg(long)]
        portal: Option<String>,
        /// List collections holding at most this many materials
        #[arg(long, default_value = "0")]
        threshold: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match PortalyticsConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    portalytics::init_tracing();
    tracing::info!(
        backend = %config.backend_url,
        max_connection_retries = %config.max_connection_retries,
        lookback_days = config.lookback_days,
        page_size = config.page_size,
        "Configuration loaded"
    );

    let outcome = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_loop(&config, Duration::from_secs(cli.interval_secs.max(1))).await,
        Command::Once => run_once(&config).await,
        Command::Attributes { top, collection } => {
            print_attributes(&config, top, collection.as_deref()).await
        }
        Command::Quality { portal, threshold } => {
            print_quality(&config, portal.as_deref(), threshold).await
        }
    };

    if let Err(e) = outcome {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

/// The scheduler: one refresh per tick, never two at once. A failed cycle
/// keeps the last good aggregate and retries the same window next tick.
async fn run_loop(config: &PortalyticsConfig, interval: Duration) -> portalytics::Result<()> {
    let mut engine = ClickAttributionEngine::from_config(config)?;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.poll().await {
                    Ok(_) => print_summary(&engine),
                    Err(e) => tracing::error!(
                        "Refresh failed, keeping previous aggregate (checkpoint {}): {}",
                        engine.checkpoint(),
                        e
                    ),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

async fn run_once(config: &PortalyticsConfig) -> portalytics::Result<()> {
    let mut engine = ClickAttributionEngine::from_config(config)?;
    engine.poll().await?;
    print_summary(&engine);
    Ok(())
}

fn print_summary(engine: &ClickAttributionEngine) {
    let mut portals = engine.portals().to_vec();
    sort_portals_by_title(&mut portals);

    println!("== {} clicked resources, checkpoint {}", engine.len(), engine.checkpoint());
    for portal in &portals {
        let records = engine.bucket_records(&BucketKey::portal(&portal.id));
        if records.is_empty() {
            continue;
        }
        let clicks: u64 = records.iter().map(|r| r.click_count).sum();
        println!("{:<32} {:>5} resources {:>6} clicks", portal.title, records.len(), clicks);
    }
    let unattributed = engine.bucket_records(&BucketKey::Unattributed);
    if !unattributed.is_empty() {
        println!("{:<32} {:>5} resources", "(no portal)", unattributed.len());
    }
    for record in engine.records_by_last_click().into_iter().take(10) {
        let row = record.summary();
        println!(
            "  {}  {:<40}  {}",
            row.local_timestamp.unwrap_or(row.timestamp),
            if row.title.is_empty() { &row.id } else { &row.title },
            row.search_strings
        );
    }
    let top_terms: Vec<String> = engine
        .top_terms(10)
        .into_iter()
        .map(|(term, count)| format!("{} ({})", term, count))
        .collect();
    if !top_terms.is_empty() {
        println!("top searches: {}", top_terms.join(", "));
    }
}

async fn print_attributes(
    config: &PortalyticsConfig,
    top: usize,
    collection: Option<&str>,
) -> portalytics::Result<()> {
    let client = QueryClient::from_config(config);
    let aggregator = AttributeAggregator::for_materials(client, &config.workspace_target, collection);

    for (label, field) in KNOWN_ATTRIBUTES {
        let buckets = aggregator.distribution(field, top).await?;
        println!("== {} ({})", label, field);
        println!("{}", FrequencyTable::from_buckets(&buckets));
    }
    Ok(())
}

async fn print_quality(
    config: &PortalyticsConfig,
    only: Option<&str>,
    threshold: u64,
) -> portalytics::Result<()> {
    let mut portals = HttpPortalDirectory::from_config(config).list_portals().await?;
    sort_portals_by_title(&mut portals);
    if let Some(id) = only {
        portals.retain(|p| p.id == id);
    }
    let inspector = QualityInspector::new(QueryClient::from_config(config), &config.workspace_target)
        .with_max_items(config.page_size);

    for portal in &portals {
        let report = inspector.report(&portal.id).await?;
        println!(
            "== {} ({}): {} materials, score {}",
            portal.title, portal.id, report.resources_total, report.quality_score
        );
        let licenses = &report.licenses;
        println!(
            "licenses: oer {} cc {} copyright {} missing {}",
            licenses.oer, licenses.cc, licenses.copyright, licenses.missing
        );
        for bucket in &licenses.unclassified {
            println!("  unknown license {:?}: {}", bucket.key, bucket.doc_count);
        }
        for (label, set) in &report.materials_missing {
            println!("materials without {:<20} {:>6}", label, set.total);
        }
        for (label, set) in &report.collections_missing {
            println!("collections without {:<18} {:>6}", label, set.total);
        }
        for collection in inspector.collections_below_threshold(&portal.id, threshold).await? {
            println!(
                "  {:<40} {:>4} materials  {}",
                collection.label(),
                collection.doc_count,
                collection.edit_url()
            );
        }
    }
    Ok(())
}
