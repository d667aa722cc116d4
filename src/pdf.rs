use std::path::PathBuf;

use image::DynamicImage;
use log::debug;
use pdfium_render::prelude::*;

use crate::error::{Error, Result};

/// PDF 页面渲染使用的默认 DPI
pub const DEFAULT_DPI: u16 = 150;

/// PDF 文件头
const PDF_MAGIC: &[u8] = b"%PDF-";

/// 判断数据是否为 PDF 文件
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// 将 DPI 换算为 pdfium 的缩放倍数（PDF 单位为 1/72 英寸）
pub fn dpi_scale(dpi: u16) -> f32 {
    dpi as f32 / 72.0
}

/// 使用 pdfium 将 PDF 渲染为图片
#[derive(Debug, Clone)]
pub struct PdfRasterizer {
    /// pdfium 动态库所在目录，找不到时回退到系统库
    library_dir: Option<PathBuf>,
    dpi: u16,
}

impl Default for PdfRasterizer {
    fn default() -> Self {
        Self { library_dir: None, dpi: DEFAULT_DPI }
    }
}

impl PdfRasterizer {
    pub fn new(library_dir: Option<PathBuf>, dpi: u16) -> Self {
        Self { library_dir, dpi }
    }

    fn bind(&self) -> Result<Pdfium> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                    .or_else(|_| Pdfium::bind_to_system_library())
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| Error::Service(format!("无法加载 pdfium: {e}")))?;
        Ok(Pdfium::new(bindings))
    }

    /// 按页面顺序渲染 PDF 的所有页面
    ///
    /// 该函数会阻塞，应在阻塞线程池中调用。
    pub fn render(&self, bytes: &[u8]) -> Result<Vec<DynamicImage>> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| Error::Decode(format!("无法打开 PDF: {e}")))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(dpi_scale(self.dpi));
        let mut pages = vec![];
        for (index, page) in document.pages().iter().enumerate() {
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| Error::Decode(format!("无法渲染第 {} 页: {e}", index + 1)))?;
            let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
            debug!("渲染第 {} 页: {}x{}", index + 1, image.width(), image.height());
            pages.push(image);
        }
        Ok(pages)
    }
}
