use crate::error::FetchError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

/// CSS selector whose presence means the odds table has rendered
const ODDS_TABLE_SELECTOR: &str = "div.event-team";

/// How often to re-check the wait condition while the page renders
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Renders the bookmaker page and returns its markup. Implementations own
/// their session resource for the duration of one call; retries belong to
/// the ingestion orchestrator, not here.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self) -> Result<String, FetchError>;
}

/// Every WebDriver response wraps its payload in a `value` field
#[derive(Debug, Deserialize)]
struct WdResponse<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WdSession {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct WdError {
    error: String,
    message: String,
}

/// Drives a headless Chrome session through a chromedriver endpoint using
/// the W3C WebDriver JSON protocol. The odds page is script-rendered, so a
/// plain GET returns an empty shell; the browser runs the page's JavaScript
/// and this fetcher polls for the odds table instead of sleeping a fixed
/// interval.
pub struct WebDriverFetcher {
    client: reqwest::Client,
    webdriver_url: String,
    target_url: String,
    timeout: Duration,
}

impl WebDriverFetcher {
    pub fn new(webdriver_url: &str, target_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap(),
            webdriver_url: webdriver_url.trim_end_matches('/').to_string(),
            target_url: target_url.to_string(),
            timeout,
        }
    }

    async fn create_session(&self) -> Result<String, FetchError> {
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "goog:chromeOptions": {
                        "args": ["--headless=new", "--no-sandbox", "--disable-dev-shm-usage"]
                    }
                }
            }
        });

        let resp = self
            .client
            .post(format!("{}/session", self.webdriver_url))
            .json(&capabilities)
            .send()
            .await
            .map_err(|e| FetchError::BrowserCrash(format!("cannot reach chromedriver: {e}")))?;

        if !resp.status().is_success() {
            return Err(FetchError::BrowserCrash(wd_error_detail(resp).await));
        }

        let session: WdResponse<WdSession> = resp
            .json()
            .await
            .map_err(|e| FetchError::BrowserCrash(format!("bad session response: {e}")))?;
        Ok(session.value.session_id)
    }

    async fn navigate(&self, session_id: &str) -> Result<(), FetchError> {
        let resp = self
            .client
            .post(format!("{}/session/{}/url", self.webdriver_url, session_id))
            .json(&json!({ "url": self.target_url }))
            .send()
            .await
            .map_err(|e| FetchError::Navigation {
                url: self.target_url.clone(),
                detail: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::Navigation {
                url: self.target_url.clone(),
                detail: wd_error_detail(resp).await,
            });
        }
        Ok(())
    }

    /// The site lazy-loads fixtures below the fold; scrolling to the bottom
    /// kicks off those loads before the wait starts
    async fn scroll_to_bottom(&self, session_id: &str) -> Result<(), FetchError> {
        let resp = self
            .client
            .post(format!(
                "{}/session/{}/execute/sync",
                self.webdriver_url, session_id
            ))
            .json(&json!({
                "script": "window.scrollTo(0, document.body.scrollHeight);",
                "args": []
            }))
            .send()
            .await
            .map_err(|e| FetchError::BrowserCrash(format!("scroll script failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(FetchError::BrowserCrash(wd_error_detail(resp).await));
        }
        Ok(())
    }

    /// Explicit wait condition: poll for the odds-table nodes until the
    /// deadline. The site delays rendering by a randomized interval, so a
    /// fixed sleep is either wasteful or flaky.
    async fn wait_for_odds_table(&self, session_id: &str) -> Result<(), FetchError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let resp = self
                .client
                .post(format!(
                    "{}/session/{}/elements",
                    self.webdriver_url, session_id
                ))
                .json(&json!({ "using": "css selector", "value": ODDS_TABLE_SELECTOR }))
                .send()
                .await
                .map_err(|e| FetchError::BrowserCrash(format!("element query failed: {e}")))?;

            if resp.status().is_success() {
                let found: WdResponse<Vec<serde_json::Value>> = resp
                    .json()
                    .await
                    .map_err(|e| FetchError::BrowserCrash(format!("bad elements response: {e}")))?;
                if !found.value.is_empty() {
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(FetchError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn page_source(&self, session_id: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(format!(
                "{}/session/{}/source",
                self.webdriver_url, session_id
            ))
            .send()
            .await
            .map_err(|e| FetchError::BrowserCrash(format!("source request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(FetchError::BrowserCrash(wd_error_detail(resp).await));
        }

        let source: WdResponse<String> = resp
            .json()
            .await
            .map_err(|e| FetchError::BrowserCrash(format!("bad source response: {e}")))?;
        Ok(source.value)
    }

    async fn delete_session(&self, session_id: &str) {
        // Releasing the session must not mask the fetch outcome; a failed
        // delete just means chromedriver will reap it on its own timeout.
        if let Err(e) = self
            .client
            .delete(format!("{}/session/{}", self.webdriver_url, session_id))
            .send()
            .await
        {
            tracing::warn!("failed to close browser session {}: {}", session_id, e);
        }
    }

    async fn fetch_in_session(&self, session_id: &str) -> Result<String, FetchError> {
        self.navigate(session_id).await?;
        self.scroll_to_bottom(session_id).await?;
        self.wait_for_odds_table(session_id).await?;
        self.page_source(session_id).await
    }
}

#[async_trait]
impl PageFetcher for WebDriverFetcher {
    async fn fetch_page(&self) -> Result<String, FetchError> {
        let session_id = self.create_session().await?;
        // Session is released on every exit path, including failure
        let result = self.fetch_in_session(&session_id).await;
        self.delete_session(&session_id).await;
        result
    }
}

async fn wd_error_detail(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<WdResponse<WdError>>().await {
        Ok(body) => format!("{}: {}", body.value.error, body.value.message),
        Err(_) => format!("webdriver returned {status}"),
    }
}

/// Plain HTTP fetch with a browser user-agent. Used in cloud environments
/// with no browser available and for debugging selector changes; the odds
/// table may be missing from the unrendered markup, which the extractor's
/// drift check will report.
pub struct HttpFetcher {
    client: reqwest::Client,
    target_url: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(target_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(timeout)
                .build()
                .unwrap(),
            target_url: target_url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(&self.target_url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    FetchError::Navigation {
                        url: self.target_url.clone(),
                        detail: e.to_string(),
                    }
                }
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::Navigation {
                url: self.target_url.clone(),
                detail: format!("status {}", resp.status()),
            });
        }

        resp.text().await.map_err(|e| FetchError::Navigation {
            url: self.target_url.clone(),
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const RENDERED_PAGE: &str = "<html><body><div class=\"event-team\">Arsenal</div></body></html>";

    /// Records the order of WebDriver calls the fetcher makes
    #[derive(Clone, Default)]
    struct DriverLog(Arc<Mutex<Vec<&'static str>>>);

    impl DriverLog {
        fn push(&self, call: &'static str) {
            self.0.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    /// Minimal chromedriver stand-in speaking just enough of the protocol
    /// for one fetch. `has_fixtures` controls whether the element poll ever
    /// finds the odds table.
    async fn start_mock_chromedriver(log: DriverLog, has_fixtures: bool) -> String {
        let app = Router::new()
            .route(
                "/session",
                post(|State(log): State<DriverLog>| async move {
                    log.push("create");
                    Json(json!({"value": {"sessionId": "mock-1", "capabilities": {}}}))
                }),
            )
            .route(
                "/session/:id/url",
                post(|State(log): State<DriverLog>| async move {
                    log.push("navigate");
                    Json(json!({"value": null}))
                }),
            )
            .route(
                "/session/:id/execute/sync",
                post(|State(log): State<DriverLog>| async move {
                    log.push("scroll");
                    Json(json!({"value": null}))
                }),
            )
            .route(
                "/session/:id/elements",
                post(move |State(log): State<DriverLog>| async move {
                    log.push("elements");
                    let found: Vec<serde_json::Value> = if has_fixtures {
                        vec![json!({"element-6066-11e4-a52e-4f735466cecf": "node-1"})]
                    } else {
                        Vec::new()
                    };
                    Json(json!({"value": found}))
                }),
            )
            .route(
                "/session/:id/source",
                get(|State(log): State<DriverLog>| async move {
                    log.push("source");
                    Json(json!({"value": RENDERED_PAGE}))
                }),
            )
            .route(
                "/session/:id",
                delete(|State(log): State<DriverLog>| async move {
                    log.push("delete");
                    Json(json!({"value": null}))
                }),
            )
            .with_state(log);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetch_scrolls_before_waiting_and_releases_the_session() {
        let log = DriverLog::default();
        let base = start_mock_chromedriver(log.clone(), true).await;
        let fetcher = WebDriverFetcher::new(
            &base,
            "https://bookmaker.example/football",
            Duration::from_secs(5),
        );

        let html = fetcher.fetch_page().await.unwrap();
        assert_eq!(html, RENDERED_PAGE);

        // Scroll must land between navigation and the element wait, or
        // below-the-fold fixtures never start loading
        assert_eq!(
            log.calls(),
            vec!["create", "navigate", "scroll", "elements", "source", "delete"]
        );
    }

    #[tokio::test]
    async fn session_is_released_when_the_wait_times_out() {
        let log = DriverLog::default();
        let base = start_mock_chromedriver(log.clone(), false).await;
        let fetcher = WebDriverFetcher::new(
            &base,
            "https://bookmaker.example/football",
            Duration::from_millis(300),
        );

        let err = fetcher.fetch_page().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));

        let calls = log.calls();
        assert_eq!(calls.last(), Some(&"delete"));
        assert!(calls.contains(&"scroll"));
    }
}
