use crate::config::OnnxConfig;
use crate::utils::error::ServiceError;
use crate::Result;
use ndarray::{Array4, ArrayD};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::Path;

/// 单输入单输出的 ONNX 会话封装
///
/// `Session::run` 需要可变借用，因此用互斥锁保护；输入/输出名称在加载时动态发现。
pub struct OnnxModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxModel {
    pub fn load(model_path: &Path, onnx_config: &OnnxConfig, kind: &str) -> Result<Self> {
        if !model_path.exists() {
            return Err(ServiceError::ModelLoad(format!(
                "{} model not found: {}",
                kind,
                model_path.display()
            )));
        }

        tracing::info!("Loading {} model from: {}", kind, model_path.display());

        let session = Session::builder()
            .map_err(|e| load_error(model_path, e))?
            .with_optimization_level(optimization_level(onnx_config.optimization_level))
            .map_err(|e| load_error(model_path, e))?
            .with_intra_threads(onnx_config.intra_threads)
            .map_err(|e| load_error(model_path, e))?
            .commit_from_file(model_path)
            .map_err(|e| load_error(model_path, e))?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(ServiceError::ModelLoad(format!("{} model has no inputs", kind)));
            }
        };

        // 动态发现输出名称
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(ServiceError::ModelLoad(format!("{} model has no outputs", kind)));
            }
        };

        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("{} output[{}]: '{}'", kind, i, output.name);
        }
        tracing::info!("{} model io: '{}' -> '{}'", kind, input_name, output_name);

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    /// 运行一次前向推理，立即拷贝输出以结束对会话的借用
    pub fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let input_tensor = Tensor::from_array(input)?;

        let mut session = self.session.lock();
        let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

        match outputs.get(&self.output_name) {
            Some(output) => Ok(output.try_extract_array::<f32>()?.into_owned()),
            None => {
                let available_outputs: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                Err(ServiceError::Inference(format!(
                    "Output '{}' not found. Available outputs: {:?}",
                    self.output_name, available_outputs
                )))
            }
        }
    }
}

fn load_error<E: std::fmt::Display>(model_path: &Path, e: E) -> ServiceError {
    ServiceError::ModelLoad(format!("{}: {}", model_path.display(), e))
}

fn optimization_level(level: i32) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

/// logits -> 概率分布
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}
