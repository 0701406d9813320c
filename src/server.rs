//! HTTP boundary for the pipeline.
//!
//! | Route | Method | Body / query | Reply |
//! |-------|--------|--------------|-------|
//! | `/api/articles` | GET | `?limit&months` | `RawArticle[]` |
//! | `/health` | GET | | `ok` |
//! | `/api/tools/fetch_articles` | POST | `{limit, months}` or `{query, monthsBack, limitPerSource, sources}` | `{articles: RawArticle[]}` |
//! | `/api/tools/clean_articles` | POST | `{articles: RawArticle[]}` | `{articles: NormalizedArticle[]}` |
//!
//! Failures come back as `{"error": "..."}` with a 4xx/5xx status.

use crate::api::{ChatClient, RetryAsk};
use crate::config::{Config, ServerConfig};
use crate::error::{Error, Result};
use crate::models::{NormalizedArticle, Publication, RawArticle};
use crate::normalize::Normalizer;
use crate::pipeline::Pipeline;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, instrument};

const MAX_LIMIT: i64 = 300;
const MAX_MONTHS: i64 = 36;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    /// `None` when no text-generation key is configured.
    normalizer: Option<Arc<Normalizer<RetryAsk<ChatClient>>>>,
    default_sources: Vec<Publication>,
}

impl AppState {
    pub fn new(config: &Config, direct_only: bool) -> Result<Self> {
        let pipeline = Pipeline::from_config(config, direct_only)?;
        let normalizer = match ChatClient::new(&config.llm) {
            Ok(client) => Some(Arc::new(Normalizer::new(
                RetryAsk::new(client, config.llm.retry_policy()),
                config.batch,
            ))),
            Err(e) => {
                info!(reason = %e, "Clean tool disabled");
                None
            }
        };
        Ok(Self {
            pipeline: Arc::new(pipeline),
            normalizer,
            default_sources: config.sources.clone(),
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/articles", get(list_articles))
        .route("/api/tools/fetch_articles", post(fetch_articles_tool))
        .route("/api/tools/clean_articles", post(clean_articles_tool))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web server.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Starting server");
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Query values are read leniently: anything unparsable means "use the default".
#[derive(Debug, Deserialize)]
struct ArticlesParams {
    limit: Option<String>,
    months: Option<String>,
}

fn clamp_param(raw: Option<&str>, default: i64, max: i64) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
        .clamp(1, max)
}

#[instrument(level = "info", skip(state))]
async fn list_articles(
    State(state): State<AppState>,
    Query(params): Query<ArticlesParams>,
) -> Json<Vec<RawArticle>> {
    let limit = clamp_param(params.limit.as_deref(), 100, MAX_LIMIT);
    let months = clamp_param(params.months.as_deref(), 12, MAX_MONTHS);
    Json(state.pipeline.run(limit as usize, months as u32).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchArticlesArgs {
    limit: Option<i64>,
    months: Option<i64>,
    query: Option<String>,
    months_back: Option<i64>,
    limit_per_source: Option<i64>,
    sources: Option<Vec<String>>,
}

impl FetchArticlesArgs {
    fn is_per_source(&self) -> bool {
        self.months_back.is_some() || self.limit_per_source.is_some() || self.sources.is_some()
    }
}

fn in_range(name: &str, value: Option<i64>, default: i64, max: i64) -> std::result::Result<i64, ApiError> {
    match value {
        None => Ok(default),
        Some(n) if (1..=max).contains(&n) => Ok(n),
        Some(n) => Err(ApiError::bad_request(format!("{name} must be between 1 and {max}, got {n}"))),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ArticlesEnvelope<T> {
    articles: Vec<T>,
}

#[instrument(level = "info", skip(state))]
async fn fetch_articles_tool(
    State(state): State<AppState>,
    Json(args): Json<FetchArticlesArgs>,
) -> std::result::Result<Json<ArticlesEnvelope<RawArticle>>, ApiError> {
    let articles = if args.is_per_source() {
        let months = in_range("monthsBack", args.months_back, 3, MAX_MONTHS)?;
        let per_source = in_range("limitPerSource", args.limit_per_source, 8, MAX_LIMIT)?;
        let sources = match &args.sources {
            Some(names) => names
                .iter()
                .map(|n| n.parse::<Publication>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)?,
            None => vec![Publication::Lenny, Publication::Tldr],
        };
        if let Some(query) = &args.query {
            info!(%query, "Fetch requested with query");
        }
        state
            .pipeline
            .run_sources(&sources, per_source as usize, months as u32)
            .await
    } else {
        let limit = in_range("limit", args.limit, 20, MAX_LIMIT)?;
        let months = in_range("months", args.months, 12, MAX_MONTHS)?;
        info!(sources = ?state.default_sources, "Fetch requested");
        state.pipeline.run(limit as usize, months as u32).await
    };
    Ok(Json(ArticlesEnvelope { articles }))
}

#[instrument(level = "info", skip_all)]
async fn clean_articles_tool(
    State(state): State<AppState>,
    Json(body): Json<ArticlesEnvelope<RawArticle>>,
) -> std::result::Result<Json<ArticlesEnvelope<NormalizedArticle>>, ApiError> {
    let normalizer = state
        .normalizer
        .as_ref()
        .ok_or_else(|| Error::Config("text-generation API key is not set".to_string()))?;
    let articles = normalizer.clean(&body.articles).await;
    Ok(Json(ArticlesEnvelope { articles }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchConfig, LlmConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn spawn(state: AppState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(upstream: &MockServer) -> Config {
        let mut config = Config {
            fetch: FetchConfig {
                max_attempts: 1,
                ..FetchConfig::default()
            },
            ..Config::default()
        };
        config
            .archive_roots
            .insert(Publication::TechCrunch, format!("{}/", upstream.uri()));
        config
    }

    #[test]
    fn test_clamp_param() {
        assert_eq!(clamp_param(None, 100, MAX_LIMIT), 100);
        assert_eq!(clamp_param(Some("abc"), 100, MAX_LIMIT), 100);
        assert_eq!(clamp_param(Some("0"), 100, MAX_LIMIT), 100);
        assert_eq!(clamp_param(Some("5000"), 100, MAX_LIMIT), 300);
        assert_eq!(clamp_param(Some(" 7 "), 12, MAX_MONTHS), 7);
        assert_eq!(clamp_param(Some("99"), 12, MAX_MONTHS), 36);
    }

    #[test]
    fn test_in_range() {
        assert_eq!(in_range("limit", None, 20, MAX_LIMIT).unwrap(), 20);
        assert_eq!(in_range("limit", Some(300), 20, MAX_LIMIT).unwrap(), 300);
        let err = in_range("limit", Some(301), 20, MAX_LIMIT).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let upstream = MockServer::start().await;
        let base = spawn(AppState::new(&config(&upstream), true).unwrap()).await;

        let resp = reqwest::get(format!("{base}/health")).await.unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_articles_route_returns_json_array() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body><a href=\"/about\">x</a></body></html>"))
            .mount(&upstream)
            .await;
        let base = spawn(AppState::new(&config(&upstream), true).unwrap()).await;

        let resp = reqwest::get(format!("{base}/api/articles?limit=abc&months=2")).await.unwrap();

        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body, serde_json::json!([]));
        // One index page per month, nothing matched so no pagination.
        assert_eq!(upstream.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_tool_rejects_out_of_range_input() {
        let upstream = MockServer::start().await;
        let base = spawn(AppState::new(&config(&upstream), true).unwrap()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/tools/fetch_articles"))
            .json(&serde_json::json!({"limit": 301}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("limit"));

        let resp = client
            .post(format!("{base}/api/tools/fetch_articles"))
            .json(&serde_json::json!({"sources": ["Daily Planet"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert!(upstream.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clean_tool_unavailable_without_key() {
        let upstream = MockServer::start().await;
        let base = spawn(AppState::new(&config(&upstream), true).unwrap()).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/tools/clean_articles"))
            .json(&serde_json::json!({"articles": []}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 503);
    }

    #[tokio::test]
    async fn test_clean_tool_returns_normalized_articles() {
        let upstream = MockServer::start().await;
        let item = serde_json::json!([{
            "id": "https://techcrunch.com/2025/05/06/a/",
            "source": "TechCrunch",
            "url": "https://techcrunch.com/2025/05/06/a/",
            "publishedDate": "2025-05-06T12:00:00.000Z",
            "author": "",
            "title": "A",
            "text": "Body",
            "summary": "Short."
        }]);
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": item.to_string()}}]
            })))
            .expect(1)
            .mount(&upstream)
            .await;

        let mut cfg = config(&upstream);
        cfg.llm = LlmConfig {
            base_url: format!("{}/v1", upstream.uri()),
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        let base = spawn(AppState::new(&cfg, true).unwrap()).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/tools/clean_articles"))
            .json(&serde_json::json!({"articles": [{
                "url": "https://techcrunch.com/2025/05/06/a/",
                "publication": "TechCrunch",
                "title": "A",
                "subtitle": null,
                "date": "2025-05-06T12:00:00.000Z",
                "text": "Body"
            }]}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["articles"][0]["summary"], "Short.");
    }
}
