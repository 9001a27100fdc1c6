use crate::cache::{CacheStore, GenerationCoordinator};
use crate::config::Config;
use crate::library::DirectoryLibrary;
use crate::orchestrator::{MediaService, ServiceSettings};
use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use reelcache_av::{
    ConfiguredHardwareProbe, EncoderCatalog, FfprobeService, ToolPaths, TranscodeExecutor,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod routes;

pub use error::AppError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub media: MediaService,
}

impl AppContext {
    /// Wire every collaborator from configuration.
    ///
    /// Tool paths come from `[tools]` or `PATH`; a missing binary is reported
    /// when first used, not here.
    pub fn from_config(config: Config) -> Result<Self> {
        let tools = ToolPaths::resolve(
            config.tools.ffmpeg_path.as_deref(),
            config.tools.ffprobe_path.as_deref(),
        );

        let store = CacheStore::new(&config.cache.dir, &config.cache.work_dir);
        store.ensure_dirs().with_context(|| {
            format!(
                "Failed to create cache directories under {}",
                config.cache.dir.display()
            )
        })?;

        let mut catalog = EncoderCatalog::builtin();
        if let Some(device) = &config.transcode.hw_device {
            catalog = catalog.with_device_path(device);
        }

        let media = MediaService::new(
            Arc::new(DirectoryLibrary::new(
                &config.library.movies_dir,
                &config.library.shows_dir,
            )),
            Arc::new(FfprobeService::new(&tools.ffprobe)),
            TranscodeExecutor::new(&tools.ffmpeg)
                .with_timeout(Duration::from_secs(config.transcode.timeout_secs)),
            catalog,
            store,
            GenerationCoordinator::new(
                config.coordinator.poll_interval(),
                config.coordinator.max_attempts,
            ),
            Arc::new(ConfiguredHardwareProbe::new(
                config.transcode.hardware_encoder.clone(),
            )),
            ServiceSettings::from(&config),
        );

        Ok(Self {
            config: Arc::new(config),
            media,
        })
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", routes::media_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    start_server_with_listener(config, listener).await
}

/// Serve on an already-bound listener until a shutdown signal arrives.
pub async fn start_server_with_listener(
    config: Config,
    listener: tokio::net::TcpListener,
) -> Result<()> {
    let ctx = AppContext::from_config(config)?;
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_context(dir: &std::path::Path) -> AppContext {
        let movies = dir.join("movies");
        std::fs::create_dir_all(movies.join("Heat")).unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        std::fs::write(movies.join("Heat").join("Heat.mp4"), data).unwrap();

        let mut config = Config::default();
        config.library.movies_dir = movies;
        config.library.shows_dir = dir.join("shows");
        config.cache.dir = dir.join("cache");
        config.cache.work_dir = dir.join("work");
        // Never reached by these requests.
        config.tools.ffmpeg_path = Some(dir.join("missing-ffmpeg"));
        config.tools.ffprobe_path = Some(dir.join("missing-ffprobe"));
        AppContext::from_config(config).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_context(dir.path()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_movie_is_404_json() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_context(dir.path()));
        let response = app
            .oneshot(
                Request::get("/api/video/movie/Ronin?audio=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn invalid_clip_window_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_context(dir.path()));
        let response = app
            .oneshot(
                Request::get("/api/clip/movie/Heat?start=50&end=40")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
