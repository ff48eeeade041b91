mod config;
mod convert;
mod enrich;
mod http;
mod llm;
mod metrics;
mod models;
mod pipeline;
mod taxonomy;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use config::PipelineConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, ConvertRequest, ConvertResponse, EnhanceRequest};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use serde_json::json;
use std::{convert::Infallible, net::SocketAddr};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

const PROGRESS_BUFFER: usize = 64;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "forge.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = PipelineConfig::from_env()?;
    let pipeline = Pipeline::from_env(config);
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| eyre::eyre!("prometheus recorder: {err}"))?;
    let app = router(AppState {
        pipeline,
        prometheus_handle,
    });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "forge.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    prometheus_handle: PrometheusHandle,
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/convert", post(convert_catalog))
        .route("/enhance", post(enhance_catalog))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Reports whether the model key and the category catalog are available.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "listing-forge",
        "model_configured": state.pipeline.model_ready(),
        "categories_loaded": state.pipeline.has_selector(),
    }))
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(16 * 1024 * 1024)
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
}

/// Convert a catalog export into listing rows.
///
/// - Method: `POST`
/// - Path: `/convert`
/// - Body: `ConvertRequest`
/// - Response: `ConvertResponse` (rows as CSV + per-stage transcript)
async fn convert_catalog(
    State(state): State<AppState>,
    Json(payload): Json<ConvertRequest>,
) -> Result<Json<ConvertResponse>, AppError> {
    crate::metrics::inc_requests("/convert");
    let conversion = state.pipeline.convert(&payload).await?;
    info!(
        target = "forge.api",
        products = conversion.products_count,
        rows = conversion.rows.len(),
        "catalog converted"
    );
    Ok(Json(ConvertResponse {
        products_count: conversion.products_count,
        rows_count: conversion.rows.len(),
        csv: conversion.csv,
        stages: conversion.stages,
    }))
}

/// Enrich listing rows with generated copy and categories.
///
/// - Method: `POST`
/// - Path: `/enhance`
/// - Body: `EnhanceRequest`
/// - Response: server-sent `ProgressEvent`s, ending with `done`
async fn enhance_catalog(
    State(state): State<AppState>,
    Json(payload): Json<EnhanceRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    crate::metrics::inc_requests("/enhance");
    let rows = state.pipeline.prepare_enhance(&payload.csv)?;
    let run_id = Uuid::new_v4();
    info!(target = "forge.api", run_id = %run_id, rows = rows.len(), "enhancement started");

    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(err) = pipeline.enhance(rows, run_id, tx).await {
            warn!(target = "forge.api", run_id = %run_id, error = %err, "enhancement failed");
        }
    });

    let stream = ReceiverStream::new(rx).map(|progress| {
        let event = Event::default().json_data(&progress).unwrap_or_else(|err| {
            Event::default()
                .event("error")
                .data(format!("unserializable progress event: {err}"))
        });
        Ok(event)
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::ImageFetcher;
    use crate::enrich::images::{DownloadError, FetchedImage};
    use crate::llm::{GenerativeModel, LlmError, LlmResponse, Part};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct CopyModel;

    #[async_trait]
    impl GenerativeModel for CopyModel {
        async fn generate(&self, _parts: Vec<Part>) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                text: "TITLE: Kite\nDESCRIPTION:\nFlies high.\nTAGS: kite".into(),
                usage: None,
            })
        }
    }

    struct BlankFetcher;

    #[async_trait]
    impl ImageFetcher for BlankFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedImage, DownloadError> {
            Ok(FetchedImage {
                mime_type: "image/jpeg".into(),
                bytes: vec![0],
            })
        }
    }

    fn app(model_ready: bool) -> Router {
        let mut config = PipelineConfig::default();
        config.enrichment.backoff_unit = std::time::Duration::ZERO;
        let pipeline = Pipeline::new(
            config,
            Arc::new(CopyModel),
            model_ready,
            Arc::new(BlankFetcher),
            None,
        );
        let prometheus_handle = PrometheusBuilder::new().build_recorder().handle();
        router(AppState {
            pipeline,
            prometheus_handle,
        })
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn health_reports_readiness() {
        let response = app(false)
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).expect("json");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model_configured"], false);
        assert_eq!(body["categories_loaded"], false);
    }

    #[tokio::test]
    async fn convert_returns_rows_and_stages() {
        let csv = "Handle,Title,Variant Price,Image Src\nkite,Kite,10,https://cdn.example.com/k.jpg\n";
        let response = app(false)
            .oneshot(post_json("/convert", json!({ "csv": csv, "category": "Toys" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).expect("json");
        assert_eq!(body["products_count"], 1);
        assert_eq!(body["rows_count"], 1);
        assert_eq!(body["stages"].as_array().map(Vec::len), Some(3));
        assert!(body["csv"].as_str().expect("csv").contains("\n,,Toys,I did,"));
    }

    #[tokio::test]
    async fn convert_rejects_exports_without_handles() {
        let response = app(false)
            .oneshot(post_json("/convert", json!({ "csv": "Title\nKite\n" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).expect("json");
        assert_eq!(body["error"], "parse_source");
    }

    #[tokio::test]
    async fn enhance_without_model_is_rejected_before_streaming() {
        let response = app(false)
            .oneshot(post_json("/enhance", json!({ "csv": "Title\n" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn enhance_streams_progress_until_done() {
        let csv = "Title,SKU,Photo 1\n,00001,https://cdn.example.com/k.jpg\n";
        let response = app(true)
            .oneshot(post_json("/enhance", json!({ "csv": csv })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("\"status\":\"starting\""));
        assert!(body.contains("\"status\":\"complete\""));
        assert!(body.contains("\"status\":\"done\""));
        assert!(body.contains("Kite"));
    }
}
