use thiserror::Error;

/// Failures while rendering the bookmaker page. Transient by nature;
/// the ingestion orchestrator owns the retry policy.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("odds table did not render within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("navigation to {url} failed: {detail}")]
    Navigation { url: String, detail: String },

    #[error("browser session failed: {0}")]
    BrowserCrash(String),
}

/// Failures while pulling fixture blocks out of rendered markup.
/// Structural drift is not transient: retrying an unchanged broken
/// selector wastes a browser session, so these are never retried.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no fixtures found on a page expected to be non-empty")]
    NoMatchesFound,

    #[error("page structure no longer matches selector set {selector_version}")]
    StructureChanged { selector_version: &'static str },
}

/// Failures from the prediction scoring engine. Isolated from odds
/// serving; a broken model never blocks `/odds`.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("prediction model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("teams outside model vocabulary: {home} vs {away}")]
    UnknownTeams { home: String, away: String },
}

/// Aggregate ingestion failures, surfaced to callers only when no
/// usable snapshot exists at all.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("upstream unavailable after {attempts} attempts: {source}")]
    UpstreamUnavailable {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("extraction failed: {source}")]
    Extraction {
        #[source]
        source: ExtractError,
    },

    #[error("no snapshot has ever been captured")]
    NeverPopulated {
        #[source]
        source: Box<IngestionError>,
    },
}
