use crate::config::OnnxConfig;
use crate::image::{ImageTransforms, PixelBuffer};
use crate::models::session::{softmax, OnnxModel};
use crate::models::{ClassScore, ImageClassifier};
use crate::utils::error::ServiceError;
use crate::Result;
use serde_json::Value;
use std::path::Path;

/// 与 transformers image-classification pipeline 的默认 top_k 一致
const DEFAULT_TOP_K: usize = 5;

/// 预处理参数，来自 preprocessor_config.json
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessing {
    pub width: u32,
    pub height: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Preprocessing {
    fn default() -> Self {
        // ViT 图像处理器默认值
        Self {
            width: 224,
            height: 224,
            mean: [0.5; 3],
            std: [0.5; 3],
        }
    }
}

impl Preprocessing {
    pub fn from_json(value: &Value) -> Self {
        let mut prep = Self::default();

        match value.get("size") {
            Some(Value::Number(n)) => {
                if let Some(n) = n.as_u64() {
                    prep.width = n as u32;
                    prep.height = n as u32;
                }
            }
            Some(Value::Object(size)) => {
                if let Some(edge) = size.get("shortest_edge").and_then(Value::as_u64) {
                    prep.width = edge as u32;
                    prep.height = edge as u32;
                }
                if let Some(w) = size.get("width").and_then(Value::as_u64) {
                    prep.width = w as u32;
                }
                if let Some(h) = size.get("height").and_then(Value::as_u64) {
                    prep.height = h as u32;
                }
            }
            _ => {}
        }

        if let Some(mean) = triple(value.get("image_mean")) {
            prep.mean = mean;
        }
        if let Some(std) = triple(value.get("image_std")) {
            prep.std = std;
        }

        prep
    }
}

fn triple(value: Option<&Value>) -> Option<[f32; 3]> {
    let values = value?.as_array()?;
    if values.len() != 3 {
        return None;
    }
    let mut out = [0.0; 3];
    for (slot, v) in out.iter_mut().zip(values) {
        *slot = v.as_f64()? as f32;
    }
    Some(out)
}

/// 从 config.json 的 id2label 构建按索引排列的标签表
pub fn parse_id2label(config: &Value) -> Result<Vec<String>> {
    let map = config
        .get("id2label")
        .and_then(Value::as_object)
        .ok_or_else(|| ServiceError::ModelLoad("config.json has no id2label".to_string()))?;

    let mut entries = Vec::with_capacity(map.len());
    for (id, label) in map {
        let id: usize = id
            .parse()
            .map_err(|_| ServiceError::ModelLoad(format!("Invalid label id '{}'", id)))?;
        let label = label
            .as_str()
            .ok_or_else(|| ServiceError::ModelLoad(format!("Label {} is not a string", id)))?;
        entries.push((id, label.to_string()));
    }
    entries.sort_by_key(|(id, _)| *id);

    for (expected, (id, _)) in entries.iter().enumerate() {
        if *id != expected {
            return Err(ServiceError::ModelLoad(format!("Label ids are not contiguous at {}", expected)));
        }
    }

    Ok(entries.into_iter().map(|(_, label)| label).collect())
}

/// Hugging Face 图像分类模型（ONNX 导出 + config.json）
pub struct HfImageClassifier {
    model: OnnxModel,
    repo_id: String,
    labels: Vec<String>,
    preprocessing: Preprocessing,
    top_k: usize,
}

impl HfImageClassifier {
    pub fn load(model_dir: &Path, repo_id: &str, onnx_config: &OnnxConfig) -> Result<Self> {
        let config = read_json(&model_dir.join("config.json"))?;
        let labels = parse_id2label(&config)?;

        let preprocessing = match read_json(&model_dir.join("preprocessor_config.json")) {
            Ok(value) => Preprocessing::from_json(&value),
            Err(e) => {
                tracing::debug!("Using default preprocessing for {}: {}", repo_id, e);
                Preprocessing::default()
            }
        };

        let model = OnnxModel::load(&model_dir.join("model.onnx"), onnx_config, repo_id)?;
        tracing::info!("{} ready with {} labels", repo_id, labels.len());

        Ok(Self {
            model,
            repo_id: repo_id.to_string(),
            labels,
            preprocessing,
            top_k: DEFAULT_TOP_K,
        })
    }
}

impl ImageClassifier for HfImageClassifier {
    fn model_id(&self) -> &str {
        &self.repo_id
    }

    fn classify(&self, image: &PixelBuffer) -> Result<Vec<ClassScore>> {
        let prep = &self.preprocessing;
        let resized = ImageTransforms::resize(&image.to_rgb_image(), prep.width, prep.height);
        let input = ImageTransforms::to_nchw_tensor(&resized, prep.mean, prep.std);

        let output = self.model.run(input)?;
        let logits = label_logits(&self.labels, output.iter().copied().collect())?;

        Ok(rank(&self.labels, &softmax(&logits), self.top_k))
    }
}

/// 输出长度必须与 id2label 一致，多或少都视为模型与配置不匹配
fn label_logits(labels: &[String], logits: Vec<f32>) -> Result<Vec<f32>> {
    if logits.len() != labels.len() {
        return Err(ServiceError::Inference(format!(
            "Expected {} logits, model returned {}",
            labels.len(),
            logits.len()
        )));
    }
    Ok(logits)
}

/// 按得分降序排列并截断到 top_k
pub fn rank(labels: &[String], probs: &[f32], top_k: usize) -> Vec<ClassScore> {
    let mut scores: Vec<ClassScore> = labels
        .iter()
        .zip(probs)
        .map(|(label, &score)| ClassScore {
            label: label.clone(),
            score,
        })
        .collect();

    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores.truncate(top_k);
    scores
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ServiceError::ModelLoad(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| ServiceError::ModelLoad(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_id2label_orders_by_id() {
        let config = json!({"id2label": {"1": "dent", "0": "crack", "2": "scratch"}});
        assert_eq!(parse_id2label(&config).unwrap(), vec!["crack", "dent", "scratch"]);
    }

    #[test]
    fn test_parse_id2label_rejects_gaps() {
        let config = json!({"id2label": {"0": "a", "2": "c"}});
        assert!(parse_id2label(&config).is_err());
        assert!(parse_id2label(&json!({})).is_err());
    }

    #[test]
    fn test_preprocessing_from_json() {
        let value = json!({
            "size": {"height": 384, "width": 384},
            "image_mean": [0.485, 0.456, 0.406],
            "image_std": [0.229, 0.224, 0.225]
        });
        let prep = Preprocessing::from_json(&value);
        assert_eq!((prep.width, prep.height), (384, 384));
        assert!((prep.mean[0] - 0.485).abs() < 1e-6);
        assert!((prep.std[2] - 0.225).abs() < 1e-6);

        let prep = Preprocessing::from_json(&json!({"size": 256}));
        assert_eq!((prep.width, prep.height), (256, 256));
        assert_eq!(prep.mean, [0.5; 3]);
    }

    #[test]
    fn test_rank_sorts_and_truncates() {
        let labels: Vec<String> = ["a", "b", "c", "d", "e", "f"].iter().map(|s| s.to_string()).collect();
        let probs = [0.05, 0.4, 0.1, 0.2, 0.15, 0.1];
        let ranked = rank(&labels, &probs, 5);

        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].label, "b");
        assert_eq!(ranked[1].label, "d");
        assert_eq!(ranked[2].label, "e");
        assert!(ranked.iter().all(|s| s.label != "a"));
    }

    #[test]
    fn test_logit_count_must_match_labels() {
        let labels: Vec<String> = vec!["dent".into(), "scratch".into()];

        assert_eq!(label_logits(&labels, vec![0.1, 0.9]).unwrap(), vec![0.1, 0.9]);

        let err = label_logits(&labels, vec![0.1, 0.9, 0.3]).err().unwrap();
        assert_eq!(err.to_string(), "Expected 2 logits, model returned 3");
        assert!(label_logits(&labels, vec![0.1]).is_err());
    }
}
