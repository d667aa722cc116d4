use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use log::debug;

use crate::error::Result;

/// 编码后图片允许的最大像素数
pub const MAX_PIXELS: u64 = 1568 * 1568;

/// 经过尺寸限制并编码为 data URI 的图片
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// `data:image/png;base64,...`
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

/// 计算满足像素预算的目标尺寸
///
/// 未超出预算时原样返回；否则按 `sqrt(max / (w * h))` 等比缩放并四舍五入，
/// 若四舍五入后仍超出预算，则改为向下取整。
/// 极细长的图片短边最少保留 1 像素，此时截短长边以满足预算。
pub fn fit_pixel_budget(width: u32, height: u32, max_pixels: u64) -> (u32, u32) {
    let area = width as u64 * height as u64;
    if area <= max_pixels {
        return (width, height);
    }

    let scale = (max_pixels as f64 / area as f64).sqrt();
    let (w, h) = (width as f64 * scale, height as f64 * scale);

    let rounded = ((w.round() as u32).max(1), (h.round() as u32).max(1));
    if rounded.0 as u64 * rounded.1 as u64 <= max_pixels {
        return rounded;
    }
    let (fw, fh) = ((w.floor() as u32).max(1), (h.floor() as u32).max(1));
    if fw as u64 * fh as u64 <= max_pixels {
        (fw, fh)
    } else if fw <= fh {
        (fw, (max_pixels / fw as u64).max(1) as u32)
    } else {
        ((max_pixels / fh as u64).max(1) as u32, fh)
    }
}

/// 将超出像素预算的图片等比缩小
pub fn resize_to_budget(image: DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (w, h) = fit_pixel_budget(width, height, MAX_PIXELS);
    if (w, h) == (width, height) {
        return image;
    }
    debug!("缩放图片: {}x{} -> {}x{}", width, height, w, h);
    image.resize_exact(w, h, FilterType::Lanczos3)
}

/// 缩放并编码一张已解码的图片
pub fn normalize_image(image: DynamicImage) -> Result<NormalizedImage> {
    let image = resize_to_budget(image);
    let (width, height) = image.dimensions();

    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    let payload = STANDARD.encode(buf.into_inner());

    Ok(NormalizedImage { data_uri: format!("data:image/png;base64,{payload}"), width, height })
}

/// 解码任意格式的图片并规范化
pub fn normalize(bytes: &[u8]) -> Result<NormalizedImage> {
    let image = image::load_from_memory(bytes)?;
    normalize_image(image)
}

/// 从 data URI 中取回 PNG 字节
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let payload = uri.strip_prefix("data:image/png;base64,")?;
    STANDARD.decode(payload).ok()
}
