use image::{imageops::FilterType, Rgb, RgbImage};
use ndarray::Array4;

/// 信箱缩放后的几何信息，用于把检测框映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// 模型坐标 -> 原图坐标
    pub fn restore(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// 直接缩放到目标尺寸（双线性，不保持宽高比）
    pub fn resize(image: &RgbImage, width: u32, height: u32) -> RgbImage {
        image::imageops::resize(image, width, height, FilterType::Triangle)
    }

    /// 保持宽高比缩放并用灰色 (114) 填充到正方形
    pub fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
        let (orig_w, orig_h) = image.dimensions();
        let scale = (size as f32 / orig_w as f32).min(size as f32 / orig_h as f32);

        let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, size);
        let resized = Self::resize(image, new_w, new_h);

        let pad_x = (size - new_w) / 2;
        let pad_y = (size - new_h) / 2;

        let mut canvas = RgbImage::from_pixel(size, size, Rgb([114, 114, 114]));
        image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

        (
            canvas,
            Letterbox {
                scale,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            },
        )
    }

    /// NHWC [1, H, W, 3]，数值归一化到 [0, 1]（Keras 导出模型的输入布局）
    pub fn to_nhwc_tensor(image: &RgbImage) -> Array4<f32> {
        let (width, height) = image.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, height as usize, width as usize, 3));

        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = pixel.0[c] as f32 / 255.0;
            }
        }

        tensor
    }

    /// NCHW [1, 3, H, W]，先缩放到 [0, 1] 再按通道做 (v - mean) / std
    pub fn to_nchw_tensor(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Array4<f32> {
        let (width, height) = image.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel.0[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - mean[c]) / std[c];
            }
        }

        tensor
    }
}
