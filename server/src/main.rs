mod handlers;
mod routes;
mod state;

use std::env;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use blog_generator_cli::config::{GeneratorConfig, PipelineConfig};
use blog_generator_cli::pipeline::BatchPipeline;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use routes::blog::blog_routes;
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = PipelineConfig::from_env()?;
    let generator = GeneratorConfig::from_env()?.build(config.generation_timeout)?;
    let pipeline = BatchPipeline::from_config(config, generator)?;

    let state = AppState::new(pipeline);
    let retention = env::var("BATCH_RETENTION_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(600));
    state.spawn_sweeper(retention);

    let mut app = blog_routes(state).layer(TraceLayer::new_for_http());

    // CORS only when a browser client is configured
    if let Ok(client_url) = env::var("CLIENT_URL") {
        let cors = CorsLayer::new()
            .allow_origin(client_url.parse::<HeaderValue>()?)
            .allow_methods([Method::POST, Method::GET, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
        app = app.layer(cors);
    }

    let addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "blog generator server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
