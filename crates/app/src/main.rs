use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use restaurant_search_core::{
    nearby_intent, FetchOutcome, FixedLocation, GeoPoint, HttpSearchTransport,
    HttpTransportConfig, JsonRecordDecoder, RequestBuilder, RestaurantCoordinator,
    SearchCoordinator, SearchIntent, SearchSettings,
};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "restaurant-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Search service base URL
    #[arg(long, env = "SEARCH_ENDPOINT", default_value = "https://localhost:7700")]
    endpoint: String,

    /// Index holding restaurant records
    #[arg(long, env = "SEARCH_INDEX", default_value = "restaurants")]
    index: String,

    /// Application id sent with each request
    #[arg(long, env = "SEARCH_APP_ID", default_value = "")]
    app_id: String,

    /// Search-only API key
    #[arg(long, env = "SEARCH_API_KEY", default_value = "")]
    api_key: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Run a search and keep loading pages like an infinite-scroll list.
    Search {
        #[command(flatten)]
        intent: IntentArgs,
        /// Stop after this many pages even if the server reports more.
        #[arg(long, default_value = "3")]
        max_pages: u32,
    },
    /// Print the request parameters an intent encodes to, without sending it.
    Params {
        #[command(flatten)]
        intent: IntentArgs,
    },
}

#[derive(Args)]
struct IntentArgs {
    /// Free-text query
    #[arg(long, default_value = "")]
    query: String,
    /// District code filter (repeatable)
    #[arg(long = "district")]
    districts: Vec<String>,
    /// Category keyword filter (repeatable)
    #[arg(long = "keyword")]
    keywords: Vec<String>,
    /// Latitude of the search center
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,
    /// Longitude of the search center
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,
    /// Radius around the center in meters
    #[arg(long, default_value = "1000")]
    radius: u32,
    /// Records per page
    #[arg(long, default_value = "20")]
    page_size: u32,
}

impl IntentArgs {
    async fn into_intent(self) -> anyhow::Result<SearchIntent> {
        let intent = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => {
                let provider = FixedLocation(GeoPoint::new(lat, lng));
                nearby_intent(&provider, self.query, self.radius)
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?
            }
            _ => SearchIntent::fresh(self.query),
        };

        Ok(intent
            .with_districts(self.districts)
            .with_keywords(self.keywords)
            .with_page_size(self.page_size))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "restaurant-search boot"
    );

    match cli.command {
        Command::Params { intent } => {
            let intent = intent.into_intent().await?;
            let descriptor = RequestBuilder::default().build(&intent);
            println!("{}", descriptor.to_query_params());
        }
        Command::Search { intent, max_pages } => {
            let mut config = HttpTransportConfig::new(&cli.endpoint, &cli.index, &cli.app_id, &cli.api_key);
            config.timeout = Duration::from_secs(cli.timeout_secs);
            let transport = HttpSearchTransport::new(config)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let intent = intent.into_intent().await?;
            let settings = SearchSettings {
                default_page_size: intent.page_size().unwrap_or(20),
                ..SearchSettings::default()
            };
            let coordinator: RestaurantCoordinator<_> =
                SearchCoordinator::with_settings(transport, JsonRecordDecoder::default(), settings);

            let _metadata = coordinator.subscribe_metadata(|update| {
                info!(
                    total_hits = update.total_hits,
                    total_pages = update.total_pages,
                    "result totals updated"
                );
            });
            let mut pages = coordinator.hub().page_receiver();

            let mut outcome = coordinator.dispatch(intent).await;
            let mut loaded_pages = 0u32;

            loop {
                match outcome {
                    FetchOutcome::Applied => {}
                    FetchOutcome::Failed(failure) => {
                        warn!(retryable = failure.is_retryable(), "search failed");
                        anyhow::bail!(failure.to_string());
                    }
                    FetchOutcome::Superseded => break,
                }

                loop {
                    match pages.try_recv() {
                        Ok(page) => {
                            println!(
                                "page {} ({} records, next={:?}, fetched_at={})",
                                page.page_index,
                                page.len(),
                                page.next_page_index,
                                page.fetched_at.to_rfc3339()
                            );
                            for restaurant in &page.records {
                                let district = restaurant.district.as_deref().unwrap_or("-");
                                println!("  [{}] {} ({district})", restaurant.object_id, restaurant.name);
                            }
                        }
                        Err(TryRecvError::Lagged(skipped)) => {
                            warn!(skipped, "page output fell behind");
                        }
                        Err(_) => break,
                    }
                }

                loaded_pages += 1;
                if loaded_pages >= max_pages {
                    break;
                }

                match coordinator.load_next_page() {
                    Some(handle) => outcome = handle.await?,
                    None => break,
                }
            }

            let state = coordinator.current_state();
            println!(
                "{} of {} restaurants loaded across {} page(s)",
                state.len(),
                state.total_hits,
                loaded_pages
            );
        }
    }

    Ok(())
}
