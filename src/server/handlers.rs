use axum::extract::{Multipart, State};
use axum::response::Json;

use super::context::SharedContext;
use super::error::ApiError;
use super::types::*;
use crate::error::PredictError;

// ============================================================================
// Health Check
// ============================================================================

pub async fn health_check(State(ctx): State<SharedContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        num_classes: ctx.class_names().len(),
    })
}

// ============================================================================
// Prediction
// ============================================================================

/// アップロードされたファイル
struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

/// multipartから `file` フィールドを取り出す
///
/// ファイル名を持たないフィールドは通常のフォーム値として無視します。
async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let bytes = field.bytes().await?;
        return Ok(Some(Upload {
            filename,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

pub async fn predict(
    State(ctx): State<SharedContext>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let upload = read_upload(&mut multipart).await?.ok_or(ApiError::MissingFile)?;

    let filename = upload.filename;
    if filename.is_empty() {
        return Err(ApiError::EmptyFilename);
    }

    let size = upload.bytes.len();
    let worker_ctx = ctx.clone();
    let prediction = tokio::task::spawn_blocking(move || worker_ctx.predict_bytes(&upload.bytes))
        .await
        .map_err(|e| PredictError::inference(format!("inference task failed: {}", e)))??;

    tracing::info!(
        file = %filename,
        bytes = size,
        label = %prediction.label,
        confidence = prediction.confidence,
        attempts = prediction.attempts,
        "prediction"
    );

    Ok(Json(PredictResponse {
        predicted_class: prediction.label,
        confidence: prediction.confidence,
    }))
}
