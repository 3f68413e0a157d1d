use crate::{
    analysis::{
        cost, AiCheckResult, Analyzer, BrandResult, CompleteAnalysis, CompleteAnalysisRequest,
        CostEstimate, CostEstimateRequest, DamageTypeResult, DetectionMethod, DetectionResult,
        ImageRequest, SeverityResult,
    },
    utils::error::ServiceError,
    web::{
        extractors::{RequestId, ValidatedJson},
        AppState,
    },
    Result,
};
use axum::{extract::State, response::Json};
use std::time::Instant;

/// 在阻塞线程池中运行一次分析；任务崩溃映射为内部错误
async fn run_blocking<T, F>(analyzer: Analyzer, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Analyzer) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || job(&analyzer))
        .await
        .map_err(|e| ServiceError::Internal(format!("Analysis task failed: {}", e)))?
}

/// AI 生成图像检测
pub async fn ai_check_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ImageRequest>,
) -> Result<Json<AiCheckResult>> {
    let start_time = Instant::now();
    let result = run_blocking(state.analyzer, move |a| a.ai_check(&request.image)).await?;

    tracing::info!(
        "AI check completed: request_id={}, is_ai_generated={}, confidence={:.3}, time={:.2}ms",
        request_id,
        result.is_ai_generated,
        result.confidence,
        start_time.elapsed().as_secs_f64() * 1000.0
    );

    Ok(Json(result))
}

pub async fn yolo_detect_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ImageRequest>,
) -> Result<Json<DetectionResult>> {
    let start_time = Instant::now();
    let result = run_blocking(state.analyzer, move |a| a.yolo_detect(&request.image)).await?;

    log_detection("YOLO", &request_id, &result, start_time);
    Ok(Json(result))
}

pub async fn roboflow_detect_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ImageRequest>,
) -> Result<Json<DetectionResult>> {
    let start_time = Instant::now();
    let result = run_blocking(state.analyzer, move |a| a.roboflow_detect(&request.image)).await?;

    log_detection("Roboflow", &request_id, &result, start_time);
    Ok(Json(result))
}

fn log_detection(detector: &str, request_id: &str, result: &DetectionResult, start_time: Instant) {
    tracing::info!(
        "{} detection completed: request_id={}, detections={}, confidence={:.3}, time={:.2}ms",
        detector,
        request_id,
        result.detections.len(),
        result.confidence,
        start_time.elapsed().as_secs_f64() * 1000.0
    );
}

pub async fn damage_severity_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ImageRequest>,
) -> Result<Json<SeverityResult>> {
    let result = run_blocking(state.analyzer, move |a| a.damage_severity(&request.image)).await?;

    tracing::info!(
        "Severity analysis completed: request_id={}, severity={}, confidence={:.3}",
        request_id,
        result.severity,
        result.confidence
    );

    Ok(Json(result))
}

pub async fn brand_detection_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ImageRequest>,
) -> Result<Json<BrandResult>> {
    let result = run_blocking(state.analyzer, move |a| a.brand_detection(&request.image)).await?;

    tracing::info!(
        "Brand detection completed: request_id={}, brand={}, confidence={:.3}",
        request_id,
        result.brand,
        result.confidence
    );

    Ok(Json(result))
}

pub async fn damage_type_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ImageRequest>,
) -> Result<Json<DamageTypeResult>> {
    let result = run_blocking(state.analyzer, move |a| a.damage_type(&request.image)).await?;

    tracing::info!(
        "Damage type detection completed: request_id={}, primary={}, types={}",
        request_id,
        result.primary_damage,
        result.damage_types.len()
    );

    Ok(Json(result))
}

/// 综合分析
pub async fn complete_analysis_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<CompleteAnalysisRequest>,
) -> Result<Json<CompleteAnalysis>> {
    let start_time = Instant::now();
    let method = DetectionMethod::from_request(request.method.as_deref());

    tracing::info!(
        "Processing complete analysis: request_id={}, method={:?}",
        request_id,
        method
    );

    let image = request.image;
    let result = run_blocking(state.analyzer, move |a| a.complete_analysis(&image, method)).await?;

    let outcome = match &result {
        CompleteAnalysis::Rejected { .. } => "rejected",
        CompleteAnalysis::Report(_) => "report",
    };
    tracing::info!(
        "Complete analysis finished: request_id={}, outcome={}, time={:.2}ms",
        request_id,
        outcome,
        start_time.elapsed().as_secs_f64() * 1000.0
    );

    Ok(Json(result))
}

/// 维修费用估算，纯计算，不经过模型
pub async fn cost_estimation_handler(
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<CostEstimateRequest>,
) -> Result<Json<CostEstimate>> {
    let estimate = cost::estimate(&request);

    tracing::info!(
        "Cost estimation completed: request_id={}, items={}, total={} {}",
        request_id,
        estimate.breakdown.len(),
        estimate.total_cost,
        estimate.currency
    );

    Ok(Json(estimate))
}
