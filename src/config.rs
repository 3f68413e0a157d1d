use crate::utils::error::ServiceError;
use crate::Result;
use std::path::PathBuf;

/// Hugging Face 品牌识别模型仓库
pub const CAR_BRAND_REPO: &str = "dima806/car_brands_image_detection";

/// Hugging Face 损伤类型模型仓库
pub const DAMAGE_TYPE_REPO: &str = "beingamit99/car_damage_detection";

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 标注字体文件（缺失时只绘制边框）
    pub font_path: Option<PathBuf>,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,

    /// Roboflow 托管模型配置
    pub roboflow: RoboflowConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

#[derive(Debug, Clone)]
pub struct RoboflowConfig {
    pub api_key: Option<String>,
    pub project: String,
    pub version: u32,
    /// 账户/工作区接口，用于启动时校验密钥
    pub api_url: String,
    /// 托管推理接口
    pub detect_url: String,
    /// 以百分比表示的置信度阈值
    pub confidence: u32,
    /// 以百分比表示的NMS重叠阈值
    pub overlap: u32,
}

impl Default for RoboflowConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            project: "car-damage-coco-v9i".to_string(),
            version: 1,
            api_url: "https://api.roboflow.com".to_string(),
            detect_url: "https://detect.roboflow.com".to_string(),
            confidence: 30,
            overlap: 50,
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        if bind_addr.trim().is_empty() {
            return Err(ServiceError::Config("bind address is empty".to_string()));
        }

        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1),
            optimization_level: 3,
        };

        let server_config = ServerConfig {
            // 综合分析要串行跑六个模型，超时给得宽一些
            request_timeout: if dev_mode { 600 } else { 120 },
            max_request_size: 50 * 1024 * 1024, // 50MB
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            font_path: None,
            workers,
            dev_mode,
            onnx_config,
            server_config,
            roboflow: RoboflowConfig::default(),
        })
    }

    pub fn with_roboflow(mut self, roboflow: RoboflowConfig) -> Self {
        self.roboflow = roboflow;
        self
    }

    pub fn with_font_path(mut self, font_path: Option<PathBuf>) -> Self {
        self.font_path = font_path;
        self
    }

    /// AI生成图像检测模型 (GNet)
    pub fn gnet_model_path(&self) -> PathBuf {
        self.models_dir.join("gnet.onnx")
    }

    /// YOLO 损伤检测模型
    pub fn yolo_model_path(&self) -> PathBuf {
        self.models_dir.join("best.onnx")
    }

    /// YOLO 类别名称，每行一个
    pub fn yolo_labels_path(&self) -> PathBuf {
        self.models_dir.join("best.names")
    }

    /// 损伤严重程度模型
    pub fn damage_severity_model_path(&self) -> PathBuf {
        self.models_dir.join("car-damage-model.onnx")
    }

    /// 品牌识别模型目录（model.onnx + config.json）
    pub fn car_brand_model_dir(&self) -> PathBuf {
        self.models_dir.join(CAR_BRAND_REPO)
    }

    /// 损伤类型模型目录（model.onnx + config.json）
    pub fn damage_type_model_dir(&self) -> PathBuf {
        self.models_dir.join(DAMAGE_TYPE_REPO)
    }

    pub fn resolved_font_path(&self) -> PathBuf {
        self.font_path
            .clone()
            .unwrap_or_else(|| self.models_dir.join("font.ttf"))
    }
}
