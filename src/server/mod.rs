//! 予測用HTTPサーバ
//!
//! - `POST /predict` : multipart の `file` フィールドで画像を受け取り分類結果を返す
//! - `GET /health`   : 稼働確認

pub mod context;
pub mod error;
pub mod handlers;
pub mod types;

use std::future::Future;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

pub use context::{verify_class_names, ServiceContext, SharedContext};
pub use error::ApiError;
pub use types::{ErrorBody, HealthResponse, PredictResponse};

/// ルーターを構築
pub fn router(ctx: SharedContext, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health_check))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(ctx)
}

/// 指定したリスナーでサーバを起動し、`shutdown` が完了するまで待つ
pub async fn serve<F>(
    listener: TcpListener,
    ctx: SharedContext,
    body_limit_bytes: usize,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(ctx, body_limit_bytes);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on http://{}", addr);
    }
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}

/// Ctrl-C を待つ
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
