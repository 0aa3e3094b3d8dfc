use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use easybets::{
    build_cache, Config, Match, OddsCache, OddsRecord, PredictionResult, ScoringEngine,
    SnapshotEntry,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
struct AppState {
    cache: Arc<OddsCache>,
    /// None when the model artifact failed to load; odds endpoints keep
    /// working regardless
    engine: Option<&'static ScoringEngine>,
    max_age: Duration,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

#[derive(Serialize)]
struct OddsResponse {
    captured_at: DateTime<Utc>,
    rejected: usize,
    entries: Vec<SnapshotEntry>,
}

/// One snapshot entry with its prediction, or the reason scoring failed
/// for that match alone
#[derive(Serialize)]
struct PredictionEntry {
    #[serde(rename = "match")]
    fixture: Match,
    odds: OddsRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<PredictionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction_error: Option<String>,
}

#[derive(Serialize)]
struct PredictionsResponse {
    captured_at: DateTime<Utc>,
    model_version: Option<String>,
    entries: Vec<PredictionEntry>,
}

async fn health() -> Json<serde_json::Value> {
    // Liveness only; never triggers a scrape
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_odds(State(state): State<AppState>) -> Result<Json<OddsResponse>, ApiError> {
    let snapshot = state.cache.get_snapshot(state.max_age).await.map_err(|e| {
        tracing::error!("odds unavailable: {}", e);
        api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;

    Ok(Json(OddsResponse {
        captured_at: snapshot.captured_at,
        rejected: snapshot.rejected,
        entries: snapshot.entries.clone(),
    }))
}

async fn get_match_odds(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<SnapshotEntry>, ApiError> {
    let snapshot = state.cache.get_snapshot(state.max_age).await.map_err(|e| {
        tracing::error!("odds unavailable: {}", e);
        api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;

    snapshot
        .find_entry(&match_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Match not found"))
}

async fn get_predictions(
    State(state): State<AppState>,
) -> Result<Json<PredictionsResponse>, ApiError> {
    let snapshot = state.cache.get_snapshot(state.max_age).await.map_err(|e| {
        tracing::error!("odds unavailable: {}", e);
        api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;

    let entries = snapshot
        .entries
        .iter()
        .map(|entry| {
            // Scoring failures stay on their own match; one bad fixture or
            // a missing model never fails the whole response
            let scored = match state.engine {
                Some(engine) => engine
                    .score(&entry.fixture, Some(&entry.odds))
                    .map_err(|e| e.to_string()),
                None => Err("prediction model unavailable".to_string()),
            };
            let (prediction, prediction_error) = match scored {
                Ok(p) => (Some(p), None),
                Err(e) => (None, Some(e)),
            };
            PredictionEntry {
                fixture: entry.fixture.clone(),
                odds: entry.odds.clone(),
                prediction,
                prediction_error,
            }
        })
        .collect();

    Ok(Json(PredictionsResponse {
        captured_at: snapshot.captured_at,
        model_version: state
            .engine
            .map(|engine| engine.model_version().to_string()),
        entries,
    }))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/odds", get(get_odds))
        .route("/odds/:match_id", get(get_match_odds))
        .route("/predictions", get(get_predictions))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // The mobile client calls from another origin
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let cache = Arc::new(build_cache(&config));

    // Model load happens once at startup; a broken artifact degrades
    // predictions without taking the odds endpoints down
    let engine = match ScoringEngine::global(config.model_path.as_deref()) {
        Ok(engine) => Some(engine),
        Err(e) => {
            tracing::warn!("prediction model unavailable, serving odds only: {}", e);
            None
        }
    };

    let state = AppState {
        cache,
        engine,
        max_age: config.snapshot_max_age,
    };
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("easybets API listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
