pub mod hf_classifier;
pub mod keras;
pub mod registry;
pub mod roboflow;
pub mod session;
pub mod yolo;

use crate::image::PixelBuffer;
use crate::Result;

pub use hf_classifier::HfImageClassifier;
pub use keras::KerasImageModel;
pub use registry::{ModelHandle, ModelRegistry, ModelStatus, ModelStatusInfo};
pub use roboflow::RoboflowDetector;
pub use yolo::YoloDetector;

/// 检测器输出的原始框，坐标为原图像素 (x1, y1, x2, y2)
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_name: String,
}

/// 分类器输出的单个标签得分
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScore {
    pub label: String,
    pub score: f32,
}

/// 输出一组概率的模型（AI生成检测、严重程度）
pub trait ScoreModel: Send + Sync {
    fn model_id(&self) -> &str;

    fn predict(&self, image: &PixelBuffer) -> Result<Vec<f32>>;
}

/// 目标检测模型
pub trait ObjectDetector: Send + Sync {
    fn model_id(&self) -> &str;

    fn detect(&self, image: &PixelBuffer) -> Result<Vec<RawDetection>>;
}

/// 图像分类模型，按得分降序返回
pub trait ImageClassifier: Send + Sync {
    fn model_id(&self) -> &str;

    fn classify(&self, image: &PixelBuffer) -> Result<Vec<ClassScore>>;
}
