use crate::config::OnnxConfig;
use crate::image::{ImageTransforms, PixelBuffer};
use crate::models::session::OnnxModel;
use crate::models::ScoreModel;
use crate::utils::error::ServiceError;
use crate::Result;
use ndarray::ArrayD;
use std::path::Path;

/// Keras 导出的 ONNX 图像模型：224x224 RGB、NHWC、[0, 1] 输入，
/// 输出为 sigmoid 标量 (GNet) 或 softmax 分布 (严重程度)
pub struct KerasImageModel {
    model: OnnxModel,
    model_id: String,
    input_size: u32,
}

impl KerasImageModel {
    pub fn load(model_path: &Path, onnx_config: &OnnxConfig, kind: &str) -> Result<Self> {
        let model = OnnxModel::load(model_path, onnx_config, kind)?;
        let model_id = model_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| kind.to_string());

        Ok(Self {
            model,
            model_id,
            input_size: 224,
        })
    }
}

impl ScoreModel for KerasImageModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn predict(&self, image: &PixelBuffer) -> Result<Vec<f32>> {
        let resized = ImageTransforms::resize(&image.to_rgb_image(), self.input_size, self.input_size);
        let input = ImageTransforms::to_nhwc_tensor(&resized);
        let output = self.model.run(input)?;
        first_row(&output)
    }
}

/// 取 batch 中第一条样本的全部输出
fn first_row(output: &ArrayD<f32>) -> Result<Vec<f32>> {
    let row: Vec<f32> = match output.ndim() {
        0 => vec![output.iter().copied().next().unwrap_or_default()],
        1 => output.iter().copied().collect(),
        _ => {
            let per_sample = output.len() / output.shape()[0].max(1);
            output.iter().copied().take(per_sample).collect()
        }
    };

    if row.is_empty() {
        return Err(ServiceError::Inference("Model returned an empty output".to_string()));
    }

    Ok(row)
}
