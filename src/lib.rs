pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod predict;
pub mod scrapers;

pub use config::Config;
pub use error::{ExtractError, FetchError, IngestionError, ScoringError};
pub use ingest::{CacheState, OddsCache};
pub use models::{
    Match, OddsRecord, OutcomeProbabilities, PredictionResult, RawMatchRecord, Snapshot,
    SnapshotEntry,
};
pub use predict::{ScoringEngine, StrengthModel};
pub use scrapers::extractor::{OddsExtractor, SelectorSet};
pub use scrapers::fetcher::{HttpFetcher, PageFetcher, WebDriverFetcher};

use std::sync::Arc;

/// Wire a cache to the configured fetcher: headless browser through
/// chromedriver by default, plain HTTP when `USE_BROWSER=0` (cloud
/// environments without a browser).
pub fn build_cache(config: &Config) -> OddsCache {
    let fetcher: Arc<dyn PageFetcher> = if config.use_browser {
        Arc::new(WebDriverFetcher::new(
            &config.webdriver_url,
            &config.bookmaker_url,
            config.fetch_timeout,
        ))
    } else {
        Arc::new(HttpFetcher::new(
            &config.bookmaker_url,
            config.fetch_timeout,
        ))
    };

    OddsCache::new(fetcher, OddsExtractor::new(), config.fetch_retries)
}
