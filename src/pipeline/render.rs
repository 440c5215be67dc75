//! PDF rasterisation via pdfium.
//!
//! pdfium is a blocking C library, so the orchestrator always calls
//! [`Rasterizer::render`] from `tokio::task::spawn_blocking`.

use image::ImageFormat;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::error::PipelineError;

/// PDF user-space units per inch.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Default render resolution.
pub const DEFAULT_DPI: u32 = 200;

/// One rendered page. `index` is 1-based and follows document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub index: usize,
    pub png: Vec<u8>,
}

/// Converts a local PDF into one PNG per page.
///
/// Any failure is reported for the whole document; there are no partial
/// results.
pub trait Rasterizer: Send + Sync {
    fn render(&self, pdf_path: &Path) -> Result<Vec<PageImage>, PipelineError>;
}

/// [`Rasterizer`] backed by a dynamically bound pdfium library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(dpi: u32, library_path: Option<PathBuf>) -> Self {
        Self { dpi, library_path }
    }

    /// Binds pdfium from the configured path, then the working directory,
    /// then the system library search path.
    fn bind(&self) -> Result<Pdfium, PipelineError> {
        let explicit = self.library_path.as_ref().map(|path| {
            let lib = if path.is_dir() {
                PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(path))
            } else {
                path.clone()
            };
            Pdfium::bind_to_library(lib)
        });

        let bindings = match explicit {
            Some(Ok(bindings)) => Ok(bindings),
            Some(Err(e)) => {
                warn!("Could not bind pdfium from configured path: {:?}", e);
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                    .or_else(|_| Pdfium::bind_to_system_library())
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| PipelineError::PdfiumBinding(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn render(&self, pdf_path: &Path) -> Result<Vec<PageImage>, PipelineError> {
        let pdfium = self.bind()?;
        let failed = |detail: String| PipelineError::Rasterization {
            path: pdf_path.to_path_buf(),
            detail,
        };

        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| failed(format!("{:?}", e)))?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let scale = self.dpi as f32 / PDF_POINTS_PER_INCH;
        let mut images = Vec::with_capacity(pages.len() as usize);

        for (i, page) in pages.iter().enumerate() {
            let index = i + 1;
            let render_config = PdfRenderConfig::new()
                .set_target_width((page.width().value * scale).round() as i32)
                .set_target_height((page.height().value * scale).round() as i32);

            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| failed(format!("page {}: {:?}", index, e)))?;
            let image = bitmap.as_image();

            let mut png = Vec::new();
            image
                .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
                .map_err(|e| failed(format!("page {}: PNG encoding failed: {}", index, e)))?;

            debug!(
                "Rendered page {} → {}x{} px, {} bytes",
                index,
                image.width(),
                image.height(),
                png.len()
            );
            images.push(PageImage { index, png });
        }

        Ok(images)
    }
}
