use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单个检测框
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    /// 置信度 (0.0 - 1.0)
    pub confidence: f32,
    /// 像素坐标 [x1, y1, x2, y2]
    #[serde(rename = "bbox")]
    pub bounding_box: [i32; 4],
}

/// /ai-check 结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiCheckResult {
    pub is_ai_generated: bool,
    /// 所选类别的概率，即 max(p, 1 - p)
    pub confidence: f32,
    pub processing_time: f64,
    pub model_used: String,
}

/// /yolo-detect 与 /roboflow-detect 结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    /// 平均置信度，无检测时为 0
    pub confidence: f32,
    pub processing_time: f64,
    /// base64 JPEG
    pub annotated_image: String,
    pub model_used: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityResult {
    pub severity: String,
    pub confidence: f32,
    pub all_predictions: BTreeMap<String, f32>,
    pub processing_time: f64,
    pub model_used: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandPrediction {
    pub brand: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandResult {
    pub brand: String,
    pub confidence: f32,
    /// 前 5 名
    pub all_predictions: Vec<BrandPrediction>,
    pub processing_time: f64,
    pub model_used: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageType {
    #[serde(rename = "type")]
    pub damage_type: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageTypeResult {
    pub damage_types: Vec<DamageType>,
    /// 没有类型超过阈值时为 "no_damage"
    pub primary_damage: String,
    pub processing_time: f64,
    pub model_used: String,
}

/// 综合分析报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub ai_check: AiCheckResult,
    pub detection: DetectionResult,
    pub brand: BrandResult,
    pub damage_types: DamageTypeResult,
    pub severity: SeverityResult,
    pub total_processing_time: f64,
}

/// /complete-analysis 的两种返回：被 AI 检测拦截，或完整报告
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CompleteAnalysis {
    Rejected { error: String, ai_check: AiCheckResult },
    Report(Box<AnalysisReport>),
}

/// 综合分析使用的检测器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMethod {
    #[default]
    Yolo,
    Roboflow,
}

impl DetectionMethod {
    /// 缺省为 yolo；其他任何取值都走 roboflow
    pub fn from_request(method: Option<&str>) -> Self {
        match method {
            None | Some("yolo") => DetectionMethod::Yolo,
            Some(_) => DetectionMethod::Roboflow,
        }
    }
}

/// 单图请求体
#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    /// Base64编码的图像数据
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteAnalysisRequest {
    pub image: String,
    #[serde(default)]
    pub method: Option<String>,
}
