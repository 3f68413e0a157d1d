use crate::config::{Config, CAR_BRAND_REPO, DAMAGE_TYPE_REPO};
use crate::models::{
    HfImageClassifier, ImageClassifier, KerasImageModel, ObjectDetector, RoboflowDetector,
    ScoreModel, YoloDetector,
};
use crate::utils::error::ServiceError;
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 模型加载状态
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStatus {
    Unloaded,
    Loaded,
    Failed(String),
}

/// 单个模型槽位：启动时写入一次，之后只读
pub struct ModelHandle<T: ?Sized> {
    name: &'static str,
    display_name: &'static str,
    status: ModelStatus,
    model: Option<Arc<T>>,
}

impl<T: ?Sized> ModelHandle<T> {
    pub fn unloaded(name: &'static str, display_name: &'static str) -> Self {
        Self {
            name,
            display_name,
            status: ModelStatus::Unloaded,
            model: None,
        }
    }

    pub fn loaded(name: &'static str, display_name: &'static str, model: Arc<T>) -> Self {
        Self {
            name,
            display_name,
            status: ModelStatus::Loaded,
            model: Some(model),
        }
    }

    /// 记录加载结果，失败只记日志不向上传播
    fn from_load(name: &'static str, display_name: &'static str, result: Result<Arc<T>>) -> Self {
        match result {
            Ok(model) => {
                tracing::info!("{} model loaded successfully", display_name);
                Self::loaded(name, display_name, model)
            }
            Err(e) => {
                tracing::warn!("Failed to load {} model: {}", display_name, e);
                Self {
                    name,
                    display_name,
                    status: ModelStatus::Failed(e.to_string()),
                    model: None,
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn status(&self) -> &ModelStatus {
        &self.status
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// 获取模型引用；未加载时返回固定的 "not loaded" 错误
    pub fn get(&self) -> Result<Arc<T>> {
        self.model
            .as_ref()
            .map(Arc::clone)
            .ok_or(ServiceError::ModelNotLoaded(self.display_name))
    }

    fn info(&self) -> ModelStatusInfo {
        let (status, message) = match &self.status {
            ModelStatus::Unloaded => ("unloaded", None),
            ModelStatus::Loaded => ("loaded", None),
            ModelStatus::Failed(msg) => ("failed", Some(msg.clone())),
        };
        ModelStatusInfo {
            name: self.name.to_string(),
            status: status.to_string(),
            message,
        }
    }
}

/// /api/info 中的单个模型状态
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatusInfo {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 进程内全部模型，启动时构建一次并通过 Arc 注入处理器
pub struct ModelRegistry {
    pub gnet: ModelHandle<dyn ScoreModel>,
    pub yolo: ModelHandle<dyn ObjectDetector>,
    pub damage_severity: ModelHandle<dyn ScoreModel>,
    pub roboflow: ModelHandle<dyn ObjectDetector>,
    pub car_brand: ModelHandle<dyn ImageClassifier>,
    pub damage_type: ModelHandle<dyn ImageClassifier>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::unloaded()
    }
}

impl ModelRegistry {
    /// 尚未尝试加载的注册表
    pub fn unloaded() -> Self {
        Self {
            gnet: ModelHandle::unloaded("gnet", "GNet"),
            yolo: ModelHandle::unloaded("yolo", "YOLO"),
            damage_severity: ModelHandle::unloaded("damage_severity", "Damage severity"),
            roboflow: ModelHandle::unloaded("roboflow", "Roboflow"),
            car_brand: ModelHandle::unloaded("car_brand", "Car brand"),
            damage_type: ModelHandle::unloaded("damage_type", "Damage type"),
        }
    }

    /// 依次加载所有模型，各自失败互不影响。会阻塞，需在阻塞线程中调用。
    pub fn load_all(config: &Config) -> Self {
        tracing::info!("Loading models from {}", config.models_dir.display());

        if let Err(e) = std::fs::create_dir_all(&config.models_dir) {
            tracing::warn!(
                "Could not create models directory {}: {}",
                config.models_dir.display(),
                e
            );
        }

        let onnx = &config.onnx_config;

        let gnet = ModelHandle::from_load(
            "gnet",
            "GNet",
            KerasImageModel::load(&config.gnet_model_path(), onnx, "GNet")
                .map(|m| Arc::new(m) as Arc<dyn ScoreModel>),
        );

        let yolo = ModelHandle::from_load(
            "yolo",
            "YOLO",
            YoloDetector::load(&config.yolo_model_path(), &config.yolo_labels_path(), onnx)
                .map(|m| Arc::new(m) as Arc<dyn ObjectDetector>),
        );

        let damage_severity = ModelHandle::from_load(
            "damage_severity",
            "Damage severity",
            KerasImageModel::load(&config.damage_severity_model_path(), onnx, "Damage severity")
                .map(|m| Arc::new(m) as Arc<dyn ScoreModel>),
        );

        let roboflow = ModelHandle::from_load(
            "roboflow",
            "Roboflow",
            RoboflowDetector::connect(&config.roboflow)
                .map(|m| Arc::new(m) as Arc<dyn ObjectDetector>),
        );

        let car_brand = ModelHandle::from_load(
            "car_brand",
            "Car brand",
            HfImageClassifier::load(&config.car_brand_model_dir(), CAR_BRAND_REPO, onnx)
                .map(|m| Arc::new(m) as Arc<dyn ImageClassifier>),
        );

        let damage_type = ModelHandle::from_load(
            "damage_type",
            "Damage type",
            HfImageClassifier::load(&config.damage_type_model_dir(), DAMAGE_TYPE_REPO, onnx)
                .map(|m| Arc::new(m) as Arc<dyn ImageClassifier>),
        );

        let registry = Self {
            gnet,
            yolo,
            damage_severity,
            roboflow,
            car_brand,
            damage_type,
        };

        let loaded = registry.health().values().filter(|v| **v).count();
        tracing::info!("Model registry ready: {}/6 models loaded", loaded);

        registry
    }

    pub fn with_gnet(mut self, model: Arc<dyn ScoreModel>) -> Self {
        self.gnet = ModelHandle::loaded("gnet", "GNet", model);
        self
    }

    pub fn with_yolo(mut self, model: Arc<dyn ObjectDetector>) -> Self {
        self.yolo = ModelHandle::loaded("yolo", "YOLO", model);
        self
    }

    pub fn with_damage_severity(mut self, model: Arc<dyn ScoreModel>) -> Self {
        self.damage_severity = ModelHandle::loaded("damage_severity", "Damage severity", model);
        self
    }

    pub fn with_roboflow(mut self, model: Arc<dyn ObjectDetector>) -> Self {
        self.roboflow = ModelHandle::loaded("roboflow", "Roboflow", model);
        self
    }

    pub fn with_car_brand(mut self, model: Arc<dyn ImageClassifier>) -> Self {
        self.car_brand = ModelHandle::loaded("car_brand", "Car brand", model);
        self
    }

    pub fn with_damage_type(mut self, model: Arc<dyn ImageClassifier>) -> Self {
        self.damage_type = ModelHandle::loaded("damage_type", "Damage type", model);
        self
    }

    /// 模型名 -> 是否已加载
    pub fn health(&self) -> BTreeMap<String, bool> {
        [
            (self.gnet.name(), self.gnet.is_loaded()),
            (self.yolo.name(), self.yolo.is_loaded()),
            (self.damage_severity.name(), self.damage_severity.is_loaded()),
            (self.roboflow.name(), self.roboflow.is_loaded()),
            (self.car_brand.name(), self.car_brand.is_loaded()),
            (self.damage_type.name(), self.damage_type.is_loaded()),
        ]
        .into_iter()
        .map(|(name, loaded)| (name.to_string(), loaded))
        .collect()
    }

    pub fn statuses(&self) -> Vec<ModelStatusInfo> {
        vec![
            self.gnet.info(),
            self.yolo.info(),
            self.damage_severity.info(),
            self.roboflow.info(),
            self.car_brand.info(),
            self.damage_type.info(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoboflowConfig;
    use crate::image::PixelBuffer;

    struct FixedScores(Vec<f32>);

    impl ScoreModel for FixedScores {
        fn model_id(&self) -> &str {
            "fixed"
        }

        fn predict(&self, _image: &PixelBuffer) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_unloaded_registry_reports_nothing_loaded() {
        let registry = ModelRegistry::unloaded();
        let health = registry.health();

        assert_eq!(health.len(), 6);
        assert!(health.values().all(|loaded| !loaded));
        assert!(registry
            .statuses()
            .iter()
            .all(|s| s.status == "unloaded"));
    }

    #[test]
    fn test_not_loaded_error_names_the_model() {
        let registry = ModelRegistry::unloaded();
        let err = registry.damage_severity.get().err().unwrap();
        assert_eq!(err.to_string(), "Damage severity model not loaded");
    }

    #[test]
    fn test_builder_marks_single_model_loaded() {
        let registry = ModelRegistry::unloaded().with_gnet(Arc::new(FixedScores(vec![0.2])));
        let health = registry.health();

        assert_eq!(health["gnet"], true);
        assert_eq!(health["yolo"], false);
        assert!(registry.gnet.get().is_ok());
        assert_eq!(registry.gnet.status(), &ModelStatus::Loaded);
    }

    #[test]
    fn test_load_all_tolerates_missing_models() {
        let dir = tempfile::tempdir().unwrap();
        let models_dir = dir.path().join("models");
        let config = Config::new(
            "127.0.0.1:0".into(),
            models_dir.to_string_lossy().into_owned(),
            Some(1),
            false,
        )
        .unwrap()
        .with_roboflow(RoboflowConfig::default());

        let registry = ModelRegistry::load_all(&config);

        assert!(models_dir.exists());
        assert!(registry.health().values().all(|loaded| !loaded));
        for info in registry.statuses() {
            assert_eq!(info.status, "failed", "{} should have failed", info.name);
            assert!(info.message.is_some());
        }
    }
}
