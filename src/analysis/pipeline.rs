use crate::analysis::adapters::{self, DetectorKind};
use crate::analysis::types::{
    AiCheckResult, AnalysisReport, BrandResult, CompleteAnalysis, DamageTypeResult,
    DetectionMethod, DetectionResult, SeverityResult,
};
use crate::image::{Annotator, ImageCodec, PixelBuffer};
use crate::models::{ImageClassifier, ModelHandle, ModelRegistry, ObjectDetector, ScoreModel};
use crate::utils::error::ServiceError;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;

pub const AI_GENERATED_ERROR: &str = "AI-generated image detected";

const AI_CHECK_OP: &str = "AI detection";
const SEVERITY_OP: &str = "Damage severity analysis";
const BRAND_OP: &str = "Brand detection";
const DAMAGE_TYPE_OP: &str = "Damage type detection";
const COMPLETE_OP: &str = "Complete analysis";

/// 车辆图像分析流水线
///
/// 所有方法都是同步阻塞的，Web 层需在 `spawn_blocking` 中调用。
/// 每个方法先确认所需模型已加载，再解码图像。
#[derive(Clone)]
pub struct Analyzer {
    registry: Arc<ModelRegistry>,
    annotator: Arc<Annotator>,
}

impl Analyzer {
    pub fn new(registry: Arc<ModelRegistry>, annotator: Arc<Annotator>) -> Self {
        Self { registry, annotator }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// AI 生成图像检测
    pub fn ai_check(&self, image: &str) -> Result<AiCheckResult> {
        let model = self.registry.gnet.get()?;
        let pixels = ImageCodec::decode(image)?;
        run_ai_check(model.as_ref(), &pixels).map_err(|e| e.context(AI_CHECK_OP))
    }

    pub fn yolo_detect(&self, image: &str) -> Result<DetectionResult> {
        self.detect(DetectorKind::Yolo, image)
    }

    pub fn roboflow_detect(&self, image: &str) -> Result<DetectionResult> {
        self.detect(DetectorKind::Roboflow, image)
    }

    pub fn damage_severity(&self, image: &str) -> Result<SeverityResult> {
        let model = self.registry.damage_severity.get()?;
        let pixels = ImageCodec::decode(image)?;
        run_severity(model.as_ref(), &pixels).map_err(|e| e.context(SEVERITY_OP))
    }

    pub fn brand_detection(&self, image: &str) -> Result<BrandResult> {
        let model = self.registry.car_brand.get()?;
        let pixels = ImageCodec::decode(image)?;
        run_brand(model.as_ref(), &pixels).map_err(|e| e.context(BRAND_OP))
    }

    pub fn damage_type(&self, image: &str) -> Result<DamageTypeResult> {
        let model = self.registry.damage_type.get()?;
        let pixels = ImageCodec::decode(image)?;
        run_damage_type(model.as_ref(), &pixels).map_err(|e| e.context(DAMAGE_TYPE_OP))
    }

    /// 综合分析：AI 检测把关，通过后依次运行检测、品牌、损伤类型和严重程度
    pub fn complete_analysis(&self, image: &str, method: DetectionMethod) -> Result<CompleteAnalysis> {
        self.run_complete(image, method)
            .map_err(|e| e.context(COMPLETE_OP))
    }

    fn run_complete(&self, image: &str, method: DetectionMethod) -> Result<CompleteAnalysis> {
        let start = Instant::now();

        let gnet = self.registry.gnet.get()?;
        let pixels = ImageCodec::decode(image)?;

        let ai_check = run_ai_check(gnet.as_ref(), &pixels).map_err(|e| e.context(AI_CHECK_OP))?;
        if ai_check.is_ai_generated {
            tracing::info!(
                "Complete analysis stopped: AI-generated image (confidence {:.3})",
                ai_check.confidence
            );
            return Ok(CompleteAnalysis::Rejected {
                error: AI_GENERATED_ERROR.to_string(),
                ai_check,
            });
        }

        let kind = match method {
            DetectionMethod::Yolo => DetectorKind::Yolo,
            DetectionMethod::Roboflow => DetectorKind::Roboflow,
        };
        let detector = self.detector(kind).get()?;
        let detection = run_detection(kind, detector.as_ref(), &self.annotator, &pixels)
            .map_err(|e| e.context(&detection_op(kind)))?;

        let brand_model = self.registry.car_brand.get()?;
        let brand = run_brand(brand_model.as_ref(), &pixels).map_err(|e| e.context(BRAND_OP))?;

        let damage_model = self.registry.damage_type.get()?;
        let damage_types = run_damage_type(damage_model.as_ref(), &pixels)
            .map_err(|e| e.context(DAMAGE_TYPE_OP))?;

        let severity_model = self.registry.damage_severity.get()?;
        let severity = run_severity(severity_model.as_ref(), &pixels)
            .map_err(|e| e.context(SEVERITY_OP))?;

        let total_processing_time = start.elapsed().as_secs_f64();
        tracing::info!(
            "Complete analysis finished in {:.3}s ({} detections, brand {}, severity {})",
            total_processing_time,
            detection.detections.len(),
            brand.brand,
            severity.severity
        );

        Ok(CompleteAnalysis::Report(Box::new(AnalysisReport {
            ai_check,
            detection,
            brand,
            damage_types,
            severity,
            total_processing_time,
        })))
    }

    fn detect(&self, kind: DetectorKind, image: &str) -> Result<DetectionResult> {
        let model = self.detector(kind).get()?;
        let pixels = ImageCodec::decode(image)?;
        run_detection(kind, model.as_ref(), &self.annotator, &pixels)
            .map_err(|e| e.context(&detection_op(kind)))
    }

    fn detector(&self, kind: DetectorKind) -> &ModelHandle<dyn ObjectDetector> {
        match kind {
            DetectorKind::Yolo => &self.registry.yolo,
            DetectorKind::Roboflow => &self.registry.roboflow,
        }
    }
}

fn detection_op(kind: DetectorKind) -> String {
    format!("{} detection", kind.label())
}

fn run_ai_check(model: &dyn ScoreModel, image: &PixelBuffer) -> Result<AiCheckResult> {
    let start = Instant::now();

    let scores = model.predict(image)?;
    let probability = *scores
        .first()
        .ok_or_else(|| ServiceError::Inference("empty model output".to_string()))?;
    let (is_ai_generated, confidence) = adapters::interpret_ai_score(probability);

    Ok(AiCheckResult {
        is_ai_generated,
        confidence,
        processing_time: start.elapsed().as_secs_f64(),
        model_used: model.model_id().to_string(),
    })
}

fn run_detection(
    kind: DetectorKind,
    model: &dyn ObjectDetector,
    annotator: &Annotator,
    image: &PixelBuffer,
) -> Result<DetectionResult> {
    let start = Instant::now();

    let raw = model.detect(image)?;
    let detections = adapters::normalize_detections(kind, raw);
    let confidence = adapters::average_confidence(&detections);

    let annotated = annotator.annotate(image, &detections, kind.color());
    let annotated_image = ImageCodec::encode(&annotated)?;

    tracing::debug!("{} found {} detections", kind.label(), detections.len());

    Ok(DetectionResult {
        detections,
        confidence,
        processing_time: start.elapsed().as_secs_f64(),
        annotated_image,
        model_used: model.model_id().to_string(),
    })
}

fn run_severity(model: &dyn ScoreModel, image: &PixelBuffer) -> Result<SeverityResult> {
    let start = Instant::now();

    let distribution = model.predict(image)?;
    let (severity, confidence, all_predictions) = adapters::summarize_severity(&distribution);

    Ok(SeverityResult {
        severity,
        confidence,
        all_predictions,
        processing_time: start.elapsed().as_secs_f64(),
        model_used: model.model_id().to_string(),
    })
}

fn run_brand(model: &dyn ImageClassifier, image: &PixelBuffer) -> Result<BrandResult> {
    let start = Instant::now();

    let ranked = model.classify(image)?;
    let (brand, confidence, all_predictions) = adapters::summarize_brands(&ranked);

    Ok(BrandResult {
        brand,
        confidence,
        all_predictions,
        processing_time: start.elapsed().as_secs_f64(),
        model_used: model.model_id().to_string(),
    })
}

fn run_damage_type(model: &dyn ImageClassifier, image: &PixelBuffer) -> Result<DamageTypeResult> {
    let start = Instant::now();

    let ranked = model.classify(image)?;
    let (damage_types, primary_damage) = adapters::filter_damage_types(&ranked);

    Ok(DamageTypeResult {
        damage_types,
        primary_damage,
        processing_time: start.elapsed().as_secs_f64(),
        model_used: model.model_id().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::codec::tests::sample_png_base64;
    use crate::models::{ClassScore, RawDetection};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubScore {
        id: &'static str,
        scores: Vec<f32>,
        calls: AtomicUsize,
    }

    impl StubScore {
        fn new(id: &'static str, scores: Vec<f32>) -> Arc<Self> {
            Arc::new(Self {
                id,
                scores,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ScoreModel for StubScore {
        fn model_id(&self) -> &str {
            self.id
        }

        fn predict(&self, _image: &PixelBuffer) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores.clone())
        }
    }

    struct StubDetector {
        id: &'static str,
        detections: Vec<RawDetection>,
        calls: AtomicUsize,
    }

    impl StubDetector {
        fn new(id: &'static str, detections: Vec<RawDetection>) -> Arc<Self> {
            Arc::new(Self {
                id,
                detections,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ObjectDetector for StubDetector {
        fn model_id(&self) -> &str {
            self.id
        }

        fn detect(&self, _image: &PixelBuffer) -> Result<Vec<RawDetection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.detections.clone())
        }
    }

    struct StubClassifier {
        scores: Vec<ClassScore>,
        calls: AtomicUsize,
    }

    impl StubClassifier {
        fn new(pairs: &[(&str, f32)]) -> Arc<Self> {
            Arc::new(Self {
                scores: pairs
                    .iter()
                    .map(|(label, score)| ClassScore {
                        label: label.to_string(),
                        score: *score,
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ImageClassifier for StubClassifier {
        fn model_id(&self) -> &str {
            "stub-classifier"
        }

        fn classify(&self, _image: &PixelBuffer) -> Result<Vec<ClassScore>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores.clone())
        }
    }

    struct FailingDetector;

    impl ObjectDetector for FailingDetector {
        fn model_id(&self) -> &str {
            "broken"
        }

        fn detect(&self, _image: &PixelBuffer) -> Result<Vec<RawDetection>> {
            Err(ServiceError::Inference("output tensor missing".to_string()))
        }
    }

    struct Fixture {
        gnet: Arc<StubScore>,
        yolo: Arc<StubDetector>,
        roboflow: Arc<StubDetector>,
        severity: Arc<StubScore>,
        brand: Arc<StubClassifier>,
        damage: Arc<StubClassifier>,
    }

    impl Fixture {
        fn new(ai_probability: f32) -> Self {
            let dent = RawDetection {
                bbox: [1.0, 1.0, 6.0, 6.0],
                confidence: 0.9,
                class_name: "dent".to_string(),
            };
            Self {
                gnet: StubScore::new("gnet.onnx", vec![ai_probability]),
                yolo: StubDetector::new("best.onnx", vec![dent.clone()]),
                roboflow: StubDetector::new("roboflow", vec![dent]),
                severity: StubScore::new("car-damage-model.onnx", vec![0.2, 0.1, 0.7]),
                brand: StubClassifier::new(&[("BMW", 0.8), ("Audi", 0.1)]),
                damage: StubClassifier::new(&[("scratch", 0.6), ("dent", 0.05)]),
            }
        }

        fn analyzer(&self) -> Analyzer {
            let registry = ModelRegistry::unloaded()
                .with_gnet(self.gnet.clone())
                .with_yolo(self.yolo.clone())
                .with_roboflow(self.roboflow.clone())
                .with_damage_severity(self.severity.clone())
                .with_car_brand(self.brand.clone())
                .with_damage_type(self.damage.clone());
            Analyzer::new(Arc::new(registry), Arc::new(Annotator::without_font()))
        }
    }

    #[test]
    fn test_ai_check_reports_model_and_confidence() {
        let fixture = Fixture::new(0.2);
        let result = fixture.analyzer().ai_check(&sample_png_base64(8, 8)).unwrap();

        assert!(!result.is_ai_generated);
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert_eq!(result.model_used, "gnet.onnx");
    }

    #[test]
    fn test_not_loaded_is_checked_before_decoding() {
        let analyzer = Analyzer::new(
            Arc::new(ModelRegistry::unloaded()),
            Arc::new(Annotator::without_font()),
        );
        // 即使图像非法，也先报告模型未加载
        let err = analyzer.yolo_detect("not base64!").err().unwrap();
        assert_eq!(err.to_string(), "YOLO model not loaded");
    }

    #[test]
    fn test_invalid_image_is_decode_error() {
        let fixture = Fixture::new(0.2);
        let err = fixture.analyzer().brand_detection("%%%").err().unwrap();
        assert!(matches!(err, ServiceError::Decode(_)));
        assert_eq!(fixture.brand.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_detection_result_has_annotated_image() {
        let fixture = Fixture::new(0.2);
        let result = fixture.analyzer().yolo_detect(&sample_png_base64(10, 10)).unwrap();

        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.detections[0].bounding_box, [1, 1, 6, 6]);
        assert!((result.confidence - 0.9).abs() < 1e-6);
        assert_eq!(result.model_used, "best.onnx");
        assert!(ImageCodec::decode(&result.annotated_image).is_ok());
    }

    #[test]
    fn test_inference_error_carries_endpoint_prefix() {
        let registry = ModelRegistry::unloaded().with_roboflow(Arc::new(FailingDetector));
        let analyzer = Analyzer::new(Arc::new(registry), Arc::new(Annotator::without_font()));

        let err = analyzer.roboflow_detect(&sample_png_base64(4, 4)).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Roboflow detection failed: output tensor missing"
        );
    }

    #[test]
    fn test_complete_analysis_gate_stops_pipeline() {
        let fixture = Fixture::new(0.95);
        let outcome = fixture
            .analyzer()
            .complete_analysis(&sample_png_base64(8, 8), DetectionMethod::Yolo)
            .unwrap();

        match outcome {
            CompleteAnalysis::Rejected { error, ai_check } => {
                assert_eq!(error, AI_GENERATED_ERROR);
                assert!(ai_check.is_ai_generated);
            }
            CompleteAnalysis::Report(_) => panic!("expected the AI gate to reject the image"),
        }
        assert_eq!(fixture.yolo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.brand.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.severity.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_complete_analysis_runs_selected_detector_only() {
        let fixture = Fixture::new(0.1);
        let outcome = fixture
            .analyzer()
            .complete_analysis(&sample_png_base64(8, 8), DetectionMethod::Roboflow)
            .unwrap();

        let report = match outcome {
            CompleteAnalysis::Report(report) => report,
            CompleteAnalysis::Rejected { .. } => panic!("expected a full report"),
        };

        assert_eq!(fixture.yolo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.roboflow.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.brand.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.damage.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.severity.calls.load(Ordering::SeqCst), 1);

        assert_eq!(report.detection.model_used, "roboflow");
        assert_eq!(report.brand.brand, "BMW");
        assert_eq!(report.damage_types.primary_damage, "scratch");
        assert_eq!(report.severity.severity, "severe");
        assert!(report.total_processing_time >= 0.0);
    }

    #[test]
    fn test_complete_analysis_fails_without_partial_report() {
        let fixture = Fixture::new(0.1);
        let registry = ModelRegistry::unloaded()
            .with_gnet(fixture.gnet.clone())
            .with_yolo(Arc::new(FailingDetector))
            .with_car_brand(fixture.brand.clone());
        let analyzer = Analyzer::new(Arc::new(registry), Arc::new(Annotator::without_font()));

        let err = analyzer
            .complete_analysis(&sample_png_base64(8, 8), DetectionMethod::Yolo)
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Complete analysis failed: YOLO detection failed: output tensor missing"
        );
        assert_eq!(fixture.brand.calls.load(Ordering::SeqCst), 0);
    }
}
