use crate::utils::error::ServiceError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use ndarray::Array3;
use std::io::Cursor;

/// 解码后的像素缓冲区，HWC 布局，通道顺序为 BGR
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    data: Array3<u8>,
}

impl PixelBuffer {
    /// 从 RGB 图像构建（交换 R/B 通道）
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let mut data = Array3::<u8>::zeros((height as usize, width as usize, 3));

        for (x, y, pixel) in image.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            data[[y as usize, x as usize, 0]] = b;
            data[[y as usize, x as usize, 1]] = g;
            data[[y as usize, x as usize, 2]] = r;
        }

        Self { data }
    }

    /// 转回 RGB 图像，供预处理、绘制和编码使用
    pub fn to_rgb_image(&self) -> RgbImage {
        let (height, width, _) = self.data.dim();
        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            let (x, y) = (x as usize, y as usize);
            image::Rgb([
                self.data[[y, x, 2]],
                self.data[[y, x, 1]],
                self.data[[y, x, 0]],
            ])
        })
    }

    pub fn width(&self) -> u32 {
        self.data.dim().1 as u32
    }

    pub fn height(&self) -> u32 {
        self.data.dim().0 as u32
    }

    /// 原始 BGR 数据视图
    pub fn as_array(&self) -> &Array3<u8> {
        &self.data
    }
}

/// base64 图像与像素缓冲区之间的转换
pub struct ImageCodec;

impl ImageCodec {
    /// base64 -> BGR 像素缓冲区
    pub fn decode(base64_data: &str) -> Result<PixelBuffer> {
        // 检测并移除可能的数据URL前缀 (data:image/xxx;base64,)
        let base64_clean = match base64_data.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
            None => base64_data,
        };

        let image_bytes = base64::engine::general_purpose::STANDARD.decode(base64_clean.trim())?;

        let image = image::load_from_memory(&image_bytes)
            .map_err(|e| ServiceError::Decode(e.to_string()))?;

        Ok(PixelBuffer::from_rgb(&image.to_rgb8()))
    }

    /// 像素缓冲区 -> JPEG -> base64（有损）
    pub fn encode(pixels: &PixelBuffer) -> Result<String> {
        Self::encode_rgb(&pixels.to_rgb_image())
    }

    pub(crate) fn encode_rgb(image: &RgbImage) -> Result<String> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
            .map_err(|e| ServiceError::Inference(format!("JPEG encode failed: {}", e)))?;

        Ok(base64::engine::general_purpose::STANDARD.encode(buffer))
    }
}
