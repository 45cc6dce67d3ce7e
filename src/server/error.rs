//! HTTP境界のエラー
//!
//! 内部エラーの詳細はサーバ側ログにのみ出力し、クライアントには固定文言を返します。

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::error::PredictError;
use crate::server::types::ErrorBody;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No file part in the request")]
    MissingFile,

    #[error("No file selected")]
    EmptyFilename,

    #[error("malformed multipart body: {message}")]
    BadMultipart { status: StatusCode, message: String },

    #[error(transparent)]
    Predict(#[from] PredictError),
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadMultipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::EmptyFilename => StatusCode::BAD_REQUEST,
            ApiError::BadMultipart { status, .. } => *status,
            ApiError::Predict(PredictError::Decode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Predict(PredictError::ShapeMismatch { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Predict(PredictError::Inference { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// クライアントに返す文言
    pub fn public_message(&self) -> &'static str {
        match self {
            ApiError::MissingFile => "No file part in the request",
            ApiError::EmptyFilename => "No file selected",
            ApiError::BadMultipart { .. } => "Malformed multipart request",
            ApiError::Predict(PredictError::Decode(_)) => "Uploaded file could not be decoded as an image",
            ApiError::Predict(PredictError::ShapeMismatch { .. }) => "Model input shape mismatch",
            ApiError::Predict(PredictError::Inference { .. }) => "Inference failed",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, source = ?std::error::Error::source(&self), "prediction failed");
        } else {
            tracing::warn!(error = %self, "rejected request");
        }

        (status, Json(ErrorBody::new(self.public_message()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_error() -> PredictError {
        match image::load_from_memory(b"garbage") {
            Err(e) => PredictError::Decode(e),
            Ok(_) => unreachable!(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::EmptyFilename.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(decode_error()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::from(PredictError::shape_mismatch("x")).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(PredictError::inference("x")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_prediction_failures_are_server_errors() {
        let errors = [
            ApiError::from(decode_error()),
            ApiError::from(PredictError::shape_mismatch("x")),
            ApiError::from(PredictError::inference("x")),
        ];
        let statuses: Vec<StatusCode> = errors.iter().map(ApiError::status).collect();
        assert!(statuses.iter().all(StatusCode::is_server_error));
        assert_ne!(statuses[0], statuses[1]);
        assert_ne!(statuses[1], statuses[2]);
        assert_ne!(statuses[0], statuses[2]);
    }

    #[test]
    fn test_internal_text_is_not_exposed() {
        let err = ApiError::from(PredictError::inference("cuda device lost at 0xdeadbeef"));
        assert_eq!(err.public_message(), "Inference failed");
        assert!(err.to_string().contains("0xdeadbeef"));
    }
}
