pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::{
    analysis::Analyzer, image::Annotator, models::ModelRegistry, utils::error::ServiceError,
    Config, Result,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Analyzer,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(analyzer: Analyzer, config: Config) -> Self {
        Self {
            analyzer,
            config: Arc::new(config),
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    // 模型加载会阻塞，放到阻塞线程池
    let load_config = config.clone();
    let registry = tokio::task::spawn_blocking(move || ModelRegistry::load_all(&load_config))
        .await
        .map_err(|e| ServiceError::Internal(format!("Model loading task failed: {}", e)))?;

    let annotator = Annotator::new(&config.resolved_font_path());
    let analyzer = Analyzer::new(Arc::new(registry), Arc::new(annotator));

    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        ServiceError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    let app = create_app(AppState::new(analyzer, config));

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /ai-check           - AI-generated image check");
    tracing::info!("  POST /yolo-detect        - Damage detection (YOLO)");
    tracing::info!("  POST /roboflow-detect    - Damage detection (Roboflow)");
    tracing::info!("  POST /damage-severity    - Damage severity");
    tracing::info!("  POST /brand-detection    - Car brand");
    tracing::info!("  POST /damage-type        - Damage type");
    tracing::info!("  POST /complete-analysis  - Full pipeline");
    tracing::info!("  POST /cost-estimation    - Repair cost estimate");
    tracing::info!("  GET  /health             - Health check");
    tracing::info!("  GET  /api/info           - Service information");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ServiceError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ServiceError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let server_config = state.config.server_config.clone();

    Router::new()
        // 分析路由
        .route("/ai-check", post(handlers::ai_check_handler))
        .route("/yolo-detect", post(handlers::yolo_detect_handler))
        .route("/roboflow-detect", post(handlers::roboflow_detect_handler))
        .route("/damage-severity", post(handlers::damage_severity_handler))
        .route("/brand-detection", post(handlers::brand_detection_handler))
        .route("/damage-type", post(handlers::damage_type_handler))
        .route("/complete-analysis", post(handlers::complete_analysis_handler))
        .route("/cost-estimation", post(handlers::cost_estimation_handler))
        // 系统路由
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        // Json 提取器自带 2MB 上限，需与 tower-http 的限制保持一致
        .layer(DefaultBodyLimit::max(server_config.max_request_size))
        .layer(RequestBodyLimitLayer::new(server_config.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(server_config.request_timeout)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "models_loaded": state.analyzer.registry().health(),
    }))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = &state.config;
    Json(json!({
        "service": "AutoExpert Vision Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "models": state.analyzer.registry().statuses(),
        "server": {
            "workers": config.workers,
            "dev_mode": config.dev_mode,
            "request_timeout": config.server_config.request_timeout,
            "max_request_size": config.server_config.max_request_size,
            "onnx_intra_threads": config.onnx_config.intra_threads,
            "roboflow_project": format!("{}/{}", config.roboflow.project, config.roboflow.version),
        }
    }))
}
