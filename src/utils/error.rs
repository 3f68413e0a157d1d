use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// 模型在启动时加载失败，直到重启前都不可用
    #[error("{0} model not loaded")]
    ModelNotLoaded(&'static str),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("{0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 请求体超过 max_request_size
    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Decode(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::ModelNotLoaded(_) => "MODEL_NOT_LOADED",
            ServiceError::Decode(_) => "DECODE_ERROR",
            ServiceError::Inference(_) => "INFERENCE_ERROR",
            ServiceError::InvalidInput(_) => "INVALID_INPUT",
            ServiceError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ServiceError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            ServiceError::Config(_) => "CONFIG_ERROR",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 为推理错误加上端点前缀，例如 "YOLO detection failed: ..."
    pub fn context(self, operation: &str) -> Self {
        match self {
            ServiceError::Inference(msg) => {
                ServiceError::Inference(format!("{} failed: {}", operation, msg))
            }
            other => other,
        }
    }
}

impl From<base64::DecodeError> for ServiceError {
    fn from(e: base64::DecodeError) -> Self {
        ServiceError::Decode(format!("invalid base64: {}", e))
    }
}

impl From<ort::Error> for ServiceError {
    fn from(e: ort::Error) -> Self {
        ServiceError::Inference(e.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        ServiceError::Inference(e.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "detail": self.to_string(),
            "code": self.error_code(),
        });

        tracing::error!("Request failed: {} ({})", self, status);

        (status, axum::Json(error_response)).into_response()
    }
}
