use crate::analysis::types::Detection;
use crate::image::PixelBuffer;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_OFFSET: i32 = 10; // 标签位于边框上方 10px
const BOX_THICKNESS: i32 = 2;

/// 在图像副本上绘制检测框和 "class: conf" 标签
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// 加载标签字体；字体不可用时退化为只画框
    pub fn new(font_path: &Path) -> Self {
        let font = match std::fs::read(font_path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    tracing::info!("Annotation font loaded from {}", font_path.display());
                    Some(font)
                }
                Err(e) => {
                    tracing::warn!("Invalid annotation font {}: {}", font_path.display(), e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Annotation font not available at {} ({}), labels will be omitted",
                    font_path.display(),
                    e
                );
                None
            }
        };

        Self { font }
    }

    pub fn without_font() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(&self, image: &PixelBuffer, detections: &[Detection], color: Rgb<u8>) -> PixelBuffer {
        let mut canvas = image.to_rgb_image();
        for detection in detections {
            self.draw_detection(&mut canvas, detection, color);
        }
        PixelBuffer::from_rgb(&canvas)
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let (w, h) = (canvas.width() as i32, canvas.height() as i32);
        let [x1, y1, x2, y2] = detection.bounding_box;

        let x_min = x1.clamp(0, w - 1);
        let y_min = y1.clamp(0, h - 1);
        let x_max = x2.clamp(0, w - 1);
        let y_max = y2.clamp(0, h - 1);

        if x_min >= x_max || y_min >= y_max {
            return;
        }

        // 边框加粗：向内逐像素收缩
        for t in 0..BOX_THICKNESS {
            let width = x_max - x_min - 2 * t;
            let height = y_max - y_min - 2 * t;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        if let Some(font) = &self.font {
            let label = format!("{}: {:.2}", detection.class_name, detection.confidence);
            let label_y = (y_min - LABEL_OFFSET - LABEL_FONT_SIZE as i32).max(0);
            draw_text_mut(
                canvas,
                color,
                x_min,
                label_y,
                PxScale::from(LABEL_FONT_SIZE),
                font,
                &label,
            );
        }
    }
}
