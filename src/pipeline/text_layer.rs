//! Text-layer engine: read the text a PDF already embeds, via pdfium.
//!
//! Born-digital PDFs carry exact text, so every region from this engine
//! scores 1.0. Layout mode reports one region per pdfium text segment with a
//! top-left-origin bounding box in PDF points. Scanned pages have no text
//! layer and produce no regions; [`crate::pipeline::ocr::AutoEngine`] hands
//! those to the vision engine.

use crate::output::BoundingBox;
use crate::pipeline::ocr::{
    EngineError, OcrEngine, PageReader, Recognition, RecognitionOptions, TextRegion,
};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Confidence assigned to text read from an embedded text layer.
const TEXT_LAYER_CONFIDENCE: f32 = 1.0;

/// Bind to the pdfium shared library.
///
/// Resolution order: `PDFIUM_LIB_PATH` (path to the library file), a copy
/// next to the working directory, then the system library.
pub(crate) fn bind_pdfium() -> Result<Pdfium, EngineError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => Pdfium::bind_to_library(&p),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| EngineError::Unavailable(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Map a pdfium load error onto the engine error taxonomy.
pub(crate) fn load_error(err: PdfiumError) -> EngineError {
    let err_str = format!("{:?}", err);
    if err_str.contains("Password") || err_str.contains("password") {
        EngineError::PasswordRequired
    } else if err_str.contains("Format") || err_str.contains("File") {
        EngineError::Corrupt(err_str)
    } else {
        EngineError::Failed(err_str)
    }
}

/// One page of embedded text.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 0-indexed page number.
    pub index: usize,
    pub text: String,
    /// Positioned segments; empty unless segments were requested.
    pub segments: Vec<(String, BoundingBox)>,
    /// False when the text came from somewhere other than the text layer
    /// and therefore carries no confidence.
    pub from_text_layer: bool,
}

/// Engine reading the embedded PDF text layer.
#[derive(Debug, Clone, Default)]
pub struct TextLayerEngine;

impl TextLayerEngine {
    pub fn new() -> Self {
        Self
    }

    /// Read every page's text, optionally with positioned segments.
    pub async fn read_pages(
        &self,
        path: &Path,
        options: &RecognitionOptions,
        with_segments: bool,
    ) -> Result<Vec<PageText>, EngineError> {
        let path = path.to_path_buf();
        let password = options.password.clone();

        tokio::task::spawn_blocking(move || {
            read_pages_blocking(&path, password.as_deref(), with_segments)
        })
        .await
        .map_err(|e| EngineError::Failed(format!("Text-layer task panicked: {}", e)))?
    }
}

fn read_pages_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    with_segments: bool,
) -> Result<Vec<PageText>, EngineError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(load_error)?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut results = Vec::with_capacity(pages.len() as usize);
    for (index, page) in pages.iter().enumerate() {
        let page_height = page.height().value;
        let text_page = page
            .text()
            .map_err(|e| EngineError::Failed(format!("page {}: {:?}", index + 1, e)))?;

        let text = text_page.all();
        let mut segments = Vec::new();
        if with_segments {
            for segment in text_page.segments().iter() {
                let seg_text = segment.text();
                if seg_text.trim().is_empty() {
                    continue;
                }
                let bounds = segment.bounds();
                let (left, top) = (bounds.left().value, bounds.top().value);
                let (right, bottom) = (bounds.right().value, bounds.bottom().value);
                segments.push((
                    seg_text,
                    BoundingBox {
                        x: left,
                        // PDF y grows upwards; flip to a top-left origin.
                        y: page_height - top,
                        width: (right - left).abs(),
                        height: (top - bottom).abs(),
                    },
                ));
            }
        }

        debug!(
            "Page {}: {} chars, {} segments",
            index + 1,
            text.chars().count(),
            segments.len()
        );
        results.push(PageText {
            index,
            text,
            segments,
            from_text_layer: true,
        });
    }

    Ok(results)
}

/// Join pages into one recognition result.
///
/// In layout mode each segment becomes a region with a bounding box; in
/// text mode each non-empty text-layer page becomes one region.
pub fn assemble(pages: Vec<PageText>, layout: bool) -> Recognition {
    let page_count = pages.len();
    let mut regions = Vec::new();
    let mut texts = Vec::with_capacity(page_count);

    for page in pages {
        let page_num = page.index + 1;
        if page.from_text_layer {
            if layout {
                regions.extend(page.segments.into_iter().map(|(text, bbox)| TextRegion {
                    page: page_num,
                    text,
                    confidence: TEXT_LAYER_CONFIDENCE,
                    bounding_box: Some(bbox),
                }));
            } else if !page.text.trim().is_empty() {
                regions.push(TextRegion {
                    page: page_num,
                    text: page.text.clone(),
                    confidence: TEXT_LAYER_CONFIDENCE,
                    bounding_box: None,
                });
            }
        }
        texts.push(page.text.trim_end().to_string());
    }

    Recognition {
        text: texts.join("\n\n"),
        page_count,
        regions,
    }
}

#[async_trait]
impl PageReader for TextLayerEngine {
    async fn read_pages(
        &self,
        path: &Path,
        options: &RecognitionOptions,
        with_segments: bool,
    ) -> Result<Vec<PageText>, EngineError> {
        TextLayerEngine::read_pages(self, path, options, with_segments).await
    }
}

#[async_trait]
impl OcrEngine for TextLayerEngine {
    fn name(&self) -> &'static str {
        "text-layer"
    }

    async fn recognize(
        &self,
        path: &Path,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        let pages = self.read_pages(path, options, false).await?;
        Ok(assemble(pages, false))
    }

    async fn recognize_layout(
        &self,
        path: &Path,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        let pages = self.read_pages(path, options, true).await?;
        Ok(assemble(pages, true))
    }
}
