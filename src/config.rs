use std::time::Duration;

const DEFAULT_BOOKMAKER_URL: &str = "https://www.ke.sportpesa.com/en/sports-betting/football-1/";
const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Runtime configuration, read once from the environment at startup.
/// `dotenv::dotenv().ok()` is called by the binaries before this.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bookmaker page to scrape
    pub bookmaker_url: String,
    /// chromedriver endpoint for the WebDriver fetcher
    pub webdriver_url: String,
    /// Drive a headless browser; plain HTTP fetch when false (cloud environments)
    pub use_browser: bool,
    /// Deadline for the odds table to render
    pub fetch_timeout: Duration,
    /// Snapshot age beyond which a request triggers a refresh
    pub snapshot_max_age: Duration,
    /// Fetch attempts per refresh before giving up
    pub fetch_retries: u32,
    /// Optional JSON team-strength artifact; compiled-in table when unset
    pub model_path: Option<String>,
    /// Web server port
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bookmaker_url: env_or("BOOKMAKER_URL", DEFAULT_BOOKMAKER_URL),
            webdriver_url: env_or("WEBDRIVER_URL", DEFAULT_WEBDRIVER_URL),
            use_browser: std::env::var("USE_BROWSER").map_or(true, |v| v != "0" && v != "false"),
            fetch_timeout: Duration::from_secs(parsed_env("FETCH_TIMEOUT_SECS", 30)),
            snapshot_max_age: Duration::from_secs(parsed_env("SNAPSHOT_MAX_AGE_SECS", 180)),
            fetch_retries: parsed_env("FETCH_RETRIES", 3),
            model_path: std::env::var("MODEL_PATH").ok(),
            port: parsed_env("PORT", 3000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bookmaker_url: DEFAULT_BOOKMAKER_URL.to_string(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            use_browser: true,
            fetch_timeout: Duration::from_secs(30),
            snapshot_max_age: Duration::from_secs(180),
            fetch_retries: 3,
            model_path: None,
            port: 3000,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
