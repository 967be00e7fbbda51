use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use fitcheck::AppState;
use fitcheck::config::Config;
use fitcheck::fetch::ContentFetcher;
use fitcheck::handlers;
use fitcheck::llm::{LlmClient, LlmHandle};
use fitcheck::pipeline::PipelineEngine;
use fitcheck::profile::EngineerProfile;
use fitcheck::search::HttpSearchClient;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::health::health_check, handlers::fit_check::stream),
    components(schemas(handlers::health::HealthResponse, handlers::fit_check::FitCheckRequest)),
    tags(
        (name = "System", description = "Liveness and readiness probes"),
        (name = "FitCheck", description = "The fit-check analysis pipeline"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("fitcheck.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leaked deliberately: the writer guard must outlive main(), which
        // never returns before process shutdown.
        Box::leak(Box::new(guard));
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("fit-check engine starting up");
    tracing::info!("configuration loaded successfully");

    let config = Arc::new(config);

    let profile = Arc::new(EngineerProfile::load()?);
    tracing::info!(name = %profile.name, "engineer profile loaded from embedded fixture");

    let llm = LlmHandle::new(Arc::new(LlmClient::new(config.llm.clone())));
    let search = Arc::new(HttpSearchClient::new(config.search.clone()));
    let fetcher = Arc::new(ContentFetcher::new(config.fetch.clone()));

    let engine = Arc::new(PipelineEngine::new(
        llm,
        search,
        fetcher,
        Arc::clone(&profile),
        Arc::clone(&config),
    ));

    let state = AppState { config: Arc::clone(&config), engine, profile };

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::ready_check))
        .route("/api/fit-check/stream", post(handlers::fit_check::stream))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);
    tracing::info!("fit-check engine is ready to serve requests");

    axum::serve(listener, app).await?;

    Ok(())
}
