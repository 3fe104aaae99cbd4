//! Waymark command-line tool
//!
//! Composes listing queries from shortcode attributes or search-form
//! parameters and optionally executes them.
//!
//! Usage:
//!   waymark compose --mode search --params 'q=pizza&in_cat=12&sort=price-asc'
//!   waymark run --params 'category=cafes&featured_only=yes'

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use waymark_kernel::config::{Config, ListingSettings};
use waymark_kernel::db::create_pool;
use waymark_kernel::listing::{
    CacheDecision, CompositionPlan, CompoundQuery, ListingQueryBuilder, ListingRequest,
    ListingService, QueryComposer, RequestParams,
};
use waymark_kernel::store::{PgListingStore, PgRatingProvider};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the composed query, its cache decision and SQL.
    Compose(QueryArgs),
    /// Execute the composed query against DATABASE_URL.
    Run(QueryArgs),
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Listing archive or search result page.
    #[arg(long, value_enum, default_value = "browse")]
    mode: Mode,

    /// Listing settings TOML file (overrides LISTING_SETTINGS).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Shortcode attributes (browse) or search-form query string.
    #[arg(long, default_value = "")]
    params: String,

    /// Request query string that may override shortcode attributes.
    #[arg(long, default_value = "")]
    request: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Browse,
    Search,
}

impl QueryArgs {
    fn listing_request(&self) -> ListingRequest {
        let params = RequestParams::from_query_string(&self.params);
        match self.mode {
            Mode::Browse => {
                let request = RequestParams::from_query_string(&self.request);
                ListingRequest::from_shortcode(&params, &request)
            }
            Mode::Search => ListingRequest::from_search(&params),
        }
    }
}

/// Output of `waymark compose`.
#[derive(Serialize)]
struct CompositionReport<'a> {
    plan: &'a CompositionPlan,
    query: &'a CompoundQuery,
    cache: CacheDecision,
    sql: String,
    count_sql: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("failed to load configuration")?;

    match cli.command {
        Command::Compose(args) => {
            if let Some(path) = &args.settings {
                config.listings = ListingSettings::from_file(path)?;
            }
            compose(&config.listings, &args)
        }
        Command::Run(args) => {
            if let Some(path) = &args.settings {
                config.listings = ListingSettings::from_file(path)?;
            }
            run(config, &args).await
        }
    }
}

fn compose(settings: &ListingSettings, args: &QueryArgs) -> Result<()> {
    let request = args.listing_request();
    let composer = QueryComposer::new(settings);
    let plan = composer.plan(&request);
    if plan.needs_scan() {
        warn!("rating scan requires a database; composing without scan results");
    }

    let composed = composer.compose(&request, None);
    let builder = ListingQueryBuilder::new(&composed.query);
    let report = CompositionReport {
        plan: &plan,
        query: &composed.query,
        cache: composed.cache,
        sql: builder.build(),
        count_sql: builder.build_count(),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialize composition")?
    );
    Ok(())
}

async fn run(config: Config, args: &QueryArgs) -> Result<()> {
    let pool = create_pool(&config).await?;
    info!(
        max_connections = config.database_max_connections,
        "database connected"
    );

    let store = Arc::new(PgListingStore::new(pool.clone(), &config.listings.post_type));
    let ratings = Arc::new(PgRatingProvider::new(pool));
    let service = ListingService::new(store, ratings, config.listings);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let request = args.listing_request();
    let page = service
        .search(&request, &cancel)
        .await
        .context("listing query failed")?;

    info!(
        total = page.total,
        page = page.page,
        total_pages = page.total_pages,
        "listing query complete"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&page).context("failed to serialize listing page")?
    );
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
