//! 各模型族原始输出到统一响应结构的归一化

use crate::analysis::types::{BrandPrediction, DamageType, Detection};
use crate::models::{ClassScore, RawDetection};
use image::Rgb;
use std::collections::BTreeMap;

/// AI 生成判定阈值
pub const AI_THRESHOLD: f32 = 0.5;

/// 损伤类型过滤阈值
pub const DAMAGE_TYPE_THRESHOLD: f32 = 0.1;

pub const NO_DAMAGE: &str = "no_damage";

pub const BRAND_TOP_K: usize = 5;

/// 严重程度模型的固定类别顺序
pub const SEVERITY_CLASSES: [&str; 3] = ["minor", "moderate", "severe"];

/// 两种检测器实现
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    Yolo,
    Roboflow,
}

impl DetectorKind {
    pub fn label(&self) -> &'static str {
        match self {
            DetectorKind::Yolo => "YOLO",
            DetectorKind::Roboflow => "Roboflow",
        }
    }

    /// YOLO 本地过滤 conf > 0.3；Roboflow 以 confidence=30 在服务端过滤
    pub fn keeps(&self, confidence: f32) -> bool {
        match self {
            DetectorKind::Yolo => confidence > 0.3,
            DetectorKind::Roboflow => confidence >= 0.3,
        }
    }

    /// 标注颜色：YOLO 绿色，Roboflow 蓝色
    pub fn color(&self) -> Rgb<u8> {
        match self {
            DetectorKind::Yolo => Rgb([0, 255, 0]),
            DetectorKind::Roboflow => Rgb([0, 0, 255]),
        }
    }
}

/// p > 0.5 判为 AI 生成，置信度取所选类别的概率
pub fn interpret_ai_score(probability: f32) -> (bool, f32) {
    let is_ai = probability > AI_THRESHOLD;
    let confidence = if is_ai { probability } else { 1.0 - probability };
    (is_ai, confidence)
}

/// 过滤低置信度检测并把坐标截断为整数像素
pub fn normalize_detections(kind: DetectorKind, raw: Vec<RawDetection>) -> Vec<Detection> {
    raw.into_iter()
        .filter(|d| kind.keeps(d.confidence))
        .map(|d| Detection {
            class_name: d.class_name,
            confidence: d.confidence,
            bounding_box: [
                d.bbox[0] as i32,
                d.bbox[1] as i32,
                d.bbox[2] as i32,
                d.bbox[3] as i32,
            ],
        })
        .collect()
}

/// 平均置信度；没有检测时为 0.0 而不是 NaN
pub fn average_confidence(detections: &[Detection]) -> f32 {
    if detections.is_empty() {
        return 0.0;
    }

    let sum: f32 = detections.iter().map(|d| d.confidence).sum();
    sum / detections.len() as f32
}

/// 品牌：第一名作为主结果，附前 5 名；空输出时为 unknown / 0.0
pub fn summarize_brands(ranked: &[ClassScore]) -> (String, f32, Vec<BrandPrediction>) {
    let (brand, confidence) = match ranked.first() {
        Some(top) => (top.label.clone(), top.score),
        None => ("unknown".to_string(), 0.0),
    };

    let all_predictions = ranked
        .iter()
        .take(BRAND_TOP_K)
        .map(|s| BrandPrediction {
            brand: s.label.clone(),
            confidence: s.score,
        })
        .collect();

    (brand, confidence, all_predictions)
}

/// 损伤类型：保留得分 > 0.1 的标签，顺序与模型输出一致
pub fn filter_damage_types(ranked: &[ClassScore]) -> (Vec<DamageType>, String) {
    let damage_types: Vec<DamageType> = ranked
        .iter()
        .filter(|s| s.score > DAMAGE_TYPE_THRESHOLD)
        .map(|s| DamageType {
            damage_type: s.label.clone(),
            confidence: s.score,
        })
        .collect();

    let primary = damage_types
        .first()
        .map(|d| d.damage_type.clone())
        .unwrap_or_else(|| NO_DAMAGE.to_string());

    (damage_types, primary)
}

/// 严重程度：arg-max 标签、其概率和完整分布
///
/// 没有有限的最大值（空输出或全为 NaN）时报告 unknown / 0.0
pub fn summarize_severity(distribution: &[f32]) -> (String, f32, BTreeMap<String, f32>) {
    let best = distribution
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| p.is_finite())
        .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
            Some((_, top)) if top >= p => best,
            _ => Some((i, p)),
        });

    let (severity, confidence) = match best {
        Some((index, confidence)) => (
            SEVERITY_CLASSES
                .get(index)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            confidence,
        ),
        None => ("unknown".to_string(), 0.0),
    };

    let all_predictions = SEVERITY_CLASSES
        .iter()
        .zip(distribution)
        .map(|(label, &p)| (label.to_string(), p))
        .collect();

    (severity, confidence, all_predictions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(confidence: f32) -> RawDetection {
        RawDetection {
            bbox: [10.7, 20.2, 30.9, 40.5],
            confidence,
            class_name: "dent".to_string(),
        }
    }

    fn scores(pairs: &[(&str, f32)]) -> Vec<ClassScore> {
        pairs
            .iter()
            .map(|(label, score)| ClassScore {
                label: label.to_string(),
                score: *score,
            })
            .collect()
    }

    #[test]
    fn test_ai_score_interpretation() {
        assert_eq!(interpret_ai_score(0.9), (true, 0.9));
        let (is_ai, confidence) = interpret_ai_score(0.2);
        assert!(!is_ai);
        assert!((confidence - 0.8).abs() < 1e-6);
        // 恰好 0.5 不算 AI 生成
        assert_eq!(interpret_ai_score(0.5), (false, 0.5));
    }

    #[test]
    fn test_yolo_threshold_is_strict() {
        let kept = normalize_detections(DetectorKind::Yolo, vec![raw(0.3), raw(0.31), raw(0.1)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bounding_box, [10, 20, 30, 40]);
    }

    #[test]
    fn test_roboflow_keeps_server_threshold() {
        let kept = normalize_detections(DetectorKind::Roboflow, vec![raw(0.3), raw(0.29)]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_average_confidence_zero_when_empty() {
        let kept = normalize_detections(DetectorKind::Yolo, vec![raw(0.2)]);
        let avg = average_confidence(&kept);
        assert_eq!(avg, 0.0);
        assert!(!avg.is_nan());
    }

    #[test]
    fn test_average_confidence() {
        let kept = normalize_detections(DetectorKind::Yolo, vec![raw(0.4), raw(0.8)]);
        assert!((average_confidence(&kept) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_brand_top_five() {
        let ranked = scores(&[("BMW", 0.5), ("Audi", 0.2), ("Ford", 0.1), ("Kia", 0.1), ("Fiat", 0.05), ("Seat", 0.05)]);
        let (brand, confidence, all) = summarize_brands(&ranked);
        assert_eq!(brand, "BMW");
        assert_eq!(confidence, 0.5);
        assert_eq!(all.len(), 5);
        assert_eq!(all[4].brand, "Fiat");
    }

    #[test]
    fn test_brand_empty_output() {
        let (brand, confidence, all) = summarize_brands(&[]);
        assert_eq!(brand, "unknown");
        assert_eq!(confidence, 0.0);
        assert!(all.is_empty());
    }

    #[test]
    fn test_damage_types_keep_model_order() {
        // 顺序按模型输出，不重新排序
        let ranked = scores(&[("scratch", 0.3), ("dent", 0.5), ("crack", 0.1), ("glass", 0.05)]);
        let (types, primary) = filter_damage_types(&ranked);
        let labels: Vec<&str> = types.iter().map(|t| t.damage_type.as_str()).collect();
        assert_eq!(labels, vec!["scratch", "dent"]);
        assert_eq!(primary, "scratch");
    }

    #[test]
    fn test_damage_types_sentinel() {
        let ranked = scores(&[("dent", 0.1), ("scratch", 0.05)]);
        let (types, primary) = filter_damage_types(&ranked);
        assert!(types.is_empty());
        assert_eq!(primary, NO_DAMAGE);
    }

    #[test]
    fn test_severity_argmax() {
        let (severity, confidence, all) = summarize_severity(&[0.1, 0.7, 0.2]);
        assert_eq!(severity, "moderate");
        assert_eq!(confidence, 0.7);
        assert_eq!(all.len(), 3);
        assert_eq!(all["severe"], 0.2);
    }

    #[test]
    fn test_severity_out_of_range_index() {
        let (severity, confidence, all) = summarize_severity(&[0.1, 0.1, 0.1, 0.7]);
        assert_eq!(severity, "unknown");
        assert_eq!(confidence, 0.7);
        assert_eq!(all.len(), 3);

        let (severity, _, all) = summarize_severity(&[0.6, 0.4]);
        assert_eq!(severity, "minor");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_severity_without_finite_scores() {
        let (severity, confidence, _) = summarize_severity(&[f32::NAN, f32::NAN, f32::NAN]);
        assert_eq!(severity, "unknown");
        assert_eq!(confidence, 0.0);

        let (severity, confidence, all) = summarize_severity(&[]);
        assert_eq!(severity, "unknown");
        assert_eq!(confidence, 0.0);
        assert!(all.is_empty());

        // NaN 不参与 arg-max
        let (severity, confidence, _) = summarize_severity(&[f32::NAN, 0.3, 0.2]);
        assert_eq!(severity, "moderate");
        assert_eq!(confidence, 0.3);
    }
}
