use crate::config::OnnxConfig;
use crate::image::{ImageTransforms, Letterbox, PixelBuffer};
use crate::models::session::OnnxModel;
use crate::models::{ObjectDetector, RawDetection};
use crate::utils::error::ServiceError;
use crate::Result;
use ndarray::{ArrayD, Axis, Ix2};
use std::path::Path;

/// 与 YOLOv5 hub 推理的默认参数一致
#[derive(Debug, Clone, Copy)]
pub struct YoloParams {
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 1000,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    bbox: [f32; 4],
    confidence: f32,
    class_id: usize,
}

/// YOLOv5 损伤检测器（ONNX 导出，输出 [1, N, 5 + C]）
pub struct YoloDetector {
    model: OnnxModel,
    model_id: String,
    labels: Vec<String>,
    params: YoloParams,
}

impl YoloDetector {
    pub fn load(model_path: &Path, labels_path: &Path, onnx_config: &OnnxConfig) -> Result<Self> {
        let model = OnnxModel::load(model_path, onnx_config, "YOLO")?;

        let labels = match std::fs::read_to_string(labels_path) {
            Ok(text) => parse_labels(&text),
            Err(e) => {
                tracing::warn!(
                    "YOLO labels not found at {} ({}), using numeric class names",
                    labels_path.display(),
                    e
                );
                Vec::new()
            }
        };

        let model_id = model_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo".to_string());

        Ok(Self {
            model,
            model_id,
            labels,
            params: YoloParams::default(),
        })
    }
}

impl ObjectDetector for YoloDetector {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn detect(&self, image: &PixelBuffer) -> Result<Vec<RawDetection>> {
        let rgb = image.to_rgb_image();
        let (boxed, letterbox) = ImageTransforms::letterbox(&rgb, self.params.input_size);
        let input = ImageTransforms::to_nchw_tensor(&boxed, [0.0; 3], [1.0; 3]);

        let prediction = self.model.run(input)?;
        let candidates = decode_predictions(
            &prediction,
            &letterbox,
            (image.width() as f32, image.height() as f32),
            self.params.conf_threshold,
        )?;

        let kept = nms(candidates, self.params.iou_threshold, self.params.max_detections);
        tracing::debug!("YOLO kept {} detections after NMS", kept.len());

        Ok(kept
            .into_iter()
            .map(|c| RawDetection {
                bbox: c.bbox,
                confidence: c.confidence,
                class_name: class_name(&self.labels, c.class_id),
            })
            .collect())
    }
}

/// 每行一个类别名，忽略空行
pub fn parse_labels(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn class_name(labels: &[String], class_id: usize) -> String {
    labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id))
}

/// 解析 (cx, cy, w, h, obj, cls...) 行，映射回原图坐标
fn decode_predictions(
    prediction: &ArrayD<f32>,
    letterbox: &Letterbox,
    original: (f32, f32),
    conf_threshold: f32,
) -> Result<Vec<Candidate>> {
    let shape = prediction.shape();
    if shape.len() != 3 || shape[0] == 0 || shape[2] < 6 {
        return Err(ServiceError::Inference(format!(
            "Unsupported YOLO output shape: {:?}, expected [1, N, 5 + classes]",
            shape
        )));
    }

    let (orig_w, orig_h) = original;
    let rows = prediction
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(|e| ServiceError::Inference(e.to_string()))?;
    let mut candidates = Vec::new();

    for row in rows.outer_iter() {
        let objectness = row[4];
        if objectness <= conf_threshold {
            continue;
        }

        let (class_id, class_score) = row
            .iter()
            .skip(5)
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, &s)| if s > best.1 { (i, s) } else { best });

        let confidence = objectness * class_score;
        if confidence <= conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let (x1, y1) = letterbox.restore(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.restore(cx + w / 2.0, cy + h / 2.0);

        candidates.push(Candidate {
            bbox: [
                x1.clamp(0.0, orig_w),
                y1.clamp(0.0, orig_h),
                x2.clamp(0.0, orig_w),
                y2.clamp(0.0, orig_h),
            ],
            confidence,
            class_id,
        });
    }

    Ok(candidates)
}

/// 按类别的非极大值抑制
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32, max_detections: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
