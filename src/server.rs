//! Static asset server for browser hosts.
//!
//! Browsers only enable shared-memory features on cross-origin isolated
//! pages, so every response carries the COOP and COEP headers.

use axum::http::{header::HeaderName, HeaderValue};
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{Result, SlidemixError};

const CROSS_ORIGIN_OPENER_POLICY: &str = "cross-origin-opener-policy";
const CROSS_ORIGIN_EMBEDDER_POLICY: &str = "cross-origin-embedder-policy";

pub fn router(dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(dir).append_index_html_on_directories(true))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(CROSS_ORIGIN_OPENER_POLICY),
            HeaderValue::from_static("same-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(CROSS_ORIGIN_EMBEDDER_POLICY),
            HeaderValue::from_static("require-corp"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Serve `config.dir` on `config.port` until Ctrl-C.
pub async fn serve(config: &ServerConfig) -> Result<()> {
    let dir = config.dir.canonicalize().map_err(|e| {
        SlidemixError::Config(format!("Cannot serve {}: {}", config.dir.display(), e))
    })?;
    if !dir.is_dir() {
        return Err(SlidemixError::Config(format!("{} is not a directory", dir.display())));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving {} at http://localhost:{}", dir.display(), config.port);

    axum::serve(listener, router(&dir))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_responses_are_cross_origin_isolated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();

        let response = router(dir.path())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CROSS_ORIGIN_OPENER_POLICY], "same-origin");
        assert_eq!(response.headers()[CROSS_ORIGIN_EMBEDDER_POLICY], "require-corp");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<html></html>");
    }

    #[tokio::test]
    async fn test_missing_files_still_carry_headers() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(dir.path())
            .oneshot(Request::get("/missing.js").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CROSS_ORIGIN_EMBEDDER_POLICY], "require-corp");
    }

    #[tokio::test]
    async fn test_serve_rejects_missing_dir() {
        let config = ServerConfig {
            port: 0,
            dir: "/nonexistent/slidemix-web".into(),
        };
        assert!(matches!(serve(&config).await, Err(SlidemixError::Config(_))));
    }
}
