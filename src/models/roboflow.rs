use crate::config::RoboflowConfig;
use crate::image::{ImageCodec, PixelBuffer};
use crate::models::{ObjectDetector, RawDetection};
use crate::utils::error::ServiceError;
use crate::Result;
use reqwest::blocking::Client;
use serde::Deserialize;

/// Roboflow 托管推理接口的返回体
#[derive(Debug, Deserialize)]
struct RoboflowResponse {
    #[serde(default)]
    predictions: Vec<RoboflowPrediction>,
}

/// 中心点 + 宽高格式的预测框
#[derive(Debug, Deserialize)]
struct RoboflowPrediction {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    confidence: f32,
    class: String,
}

/// 通过 Roboflow 托管 API 运行的损伤检测器
pub struct RoboflowDetector {
    client: Client,
    api_key: String,
    endpoint: String,
    confidence: u32,
    overlap: u32,
}

impl RoboflowDetector {
    /// 校验 API 密钥并定位项目版本；必须在阻塞线程中调用
    pub fn connect(config: &RoboflowConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ServiceError::ModelLoad("ROBOFLOW_API_KEY is not set".to_string()))?;

        let client = Client::builder()
            .build()
            .map_err(|e| ServiceError::ModelLoad(format!("HTTP client: {}", e)))?;

        tracing::info!(
            "Connecting to Roboflow project {}/{}",
            config.project,
            config.version
        );

        let response = client
            .get(format!("{}/", config.api_url.trim_end_matches('/')))
            .query(&[("api_key", api_key.as_str())])
            .send()
            .map_err(|e| ServiceError::ModelLoad(format!("Roboflow unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ModelLoad(format!(
                "Roboflow rejected API key: HTTP {}",
                response.status()
            )));
        }

        Ok(Self {
            client,
            api_key,
            endpoint: format!(
                "{}/{}/{}",
                config.detect_url.trim_end_matches('/'),
                config.project,
                config.version
            ),
            confidence: config.confidence,
            overlap: config.overlap,
        })
    }
}

impl ObjectDetector for RoboflowDetector {
    fn model_id(&self) -> &str {
        "roboflow"
    }

    fn detect(&self, image: &PixelBuffer) -> Result<Vec<RawDetection>> {
        let body = ImageCodec::encode(image)?;
        let confidence = self.confidence.to_string();
        let overlap = self.overlap.to_string();

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("confidence", confidence.as_str()),
                ("overlap", overlap.as_str()),
                ("format", "json"),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(ServiceError::Inference(format!(
                "Roboflow returned HTTP {}: {}",
                status, text
            )));
        }

        let parsed: RoboflowResponse = response.json()?;
        Ok(to_raw_detections(parsed))
    }
}

fn to_raw_detections(response: RoboflowResponse) -> Vec<RawDetection> {
    response
        .predictions
        .into_iter()
        .map(|p| RawDetection {
            bbox: [
                p.x - p.width / 2.0,
                p.y - p.height / 2.0,
                p.x + p.width / 2.0,
                p.y + p.height / 2.0,
            ],
            confidence: p.confidence,
            class_name: p.class,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_boxes_become_corners() {
        let body = r#"{
            "time": 0.12,
            "image": {"width": 640, "height": 480},
            "predictions": [
                {"x": 100.0, "y": 50.0, "width": 40.0, "height": 20.0,
                 "confidence": 0.87, "class": "scratch", "class_id": 3}
            ]
        }"#;
        let parsed: RoboflowResponse = serde_json::from_str(body).unwrap();
        let detections = to_raw_detections(parsed);

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, [80.0, 40.0, 120.0, 60.0]);
        assert_eq!(detections[0].class_name, "scratch");
    }

    #[test]
    fn test_missing_predictions_is_empty() {
        let parsed: RoboflowResponse = serde_json::from_str("{}").unwrap();
        assert!(to_raw_detections(parsed).is_empty());
    }

    #[test]
    fn test_connect_requires_api_key() {
        let err = RoboflowDetector::connect(&RoboflowConfig::default()).err().unwrap();
        assert!(matches!(err, ServiceError::ModelLoad(_)));

        let blank = RoboflowConfig {
            api_key: Some("  ".to_string()),
            ..RoboflowConfig::default()
        };
        assert!(RoboflowDetector::connect(&blank).is_err());
    }
}
