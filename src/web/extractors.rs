use crate::{
    analysis::{CompleteAnalysisRequest, CostEstimateRequest, ImageRequest},
    utils::error::ServiceError,
};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::Deserialize;

/// 验证的JSON提取器，解析或校验失败时返回统一的错误体
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: for<'de> Deserialize<'de> + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(json_rejection)?;

        value.validate().map_err(ServiceError::InvalidInput)?;

        Ok(ValidatedJson(value))
    }
}

/// 超限的请求体保留 413，其余解析失败按无效输入处理
fn json_rejection(rejection: JsonRejection) -> ServiceError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge(rejection.body_text())
    } else {
        ServiceError::InvalidInput(rejection.body_text())
    }
}

/// 验证trait
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

fn require_image(image: &str) -> Result<(), String> {
    if image.trim().is_empty() {
        return Err("Image data cannot be empty".to_string());
    }
    Ok(())
}

impl Validate for ImageRequest {
    fn validate(&self) -> Result<(), String> {
        require_image(&self.image)
    }
}

impl Validate for CompleteAnalysisRequest {
    fn validate(&self) -> Result<(), String> {
        require_image(&self.image)
    }
}

impl Validate for CostEstimateRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(item) = self
            .detections
            .iter()
            .find(|d| !(0.0..=1.0).contains(&d.confidence))
        {
            return Err(format!(
                "Confidence for '{}' must be between 0.0 and 1.0",
                item.class_name
            ));
        }
        Ok(())
    }
}

/// 请求ID提取器，优先使用客户端提供的 X-Request-ID
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get("X-Request-ID")
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(RequestId(request_id))
    }
}
