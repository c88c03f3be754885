//! Vision engine: rasterise pages with pdfium and let a VLM transcribe them.
//!
//! Used for scanned documents that have no text layer. Each page is rendered
//! with its longest edge capped, preprocessed according to the
//! [`EnhancementPolicy`], PNG-encoded, and sent to the model with a strict
//! transcription prompt. Pages are transcribed concurrently but returned in
//! page order.
//!
//! VLMs report no per-region confidence, so this engine produces no
//! scorable regions and no layout.

use crate::config::EnhancementPolicy;
use crate::pipeline::ocr::{
    EngineError, OcrEngine, PageTranscriber, Recognition, RecognitionOptions,
};
use crate::pipeline::text_layer::{bind_pdfium, load_error};
use crate::prompts::{transcription_hint, TRANSCRIPTION_SYSTEM_PROMPT};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::stream::{self, StreamExt};
use image::{DynamicImage, GrayImage};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Luma spread (5th→95th percentile) below which `auto` enhances a page.
const LOW_CONTRAST_SPREAD: u8 = 128;

/// Engine transcribing rendered pages with a vision-capable model.
#[derive(Clone)]
pub struct VisionOcrEngine {
    provider: Arc<dyn LLMProvider>,
    max_rendered_pixels: u32,
    concurrency: usize,
    max_tokens: usize,
}

impl VisionOcrEngine {
    pub fn new(provider: Arc<dyn LLMProvider>, max_rendered_pixels: u32, concurrency: usize) -> Self {
        Self {
            provider,
            max_rendered_pixels,
            concurrency: concurrency.max(1),
            max_tokens: 4096,
        }
    }

    /// Cap on generated tokens per page.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    /// Transcribe the given 0-indexed pages, or every page when `indices` is empty.
    ///
    /// Returns `(page_index, text)` pairs in page order.
    pub async fn transcribe_pages(
        &self,
        path: &Path,
        options: &RecognitionOptions,
        indices: &[usize],
    ) -> Result<Vec<(usize, String)>, EngineError> {
        let rendered = render_pages(
            path,
            options.password.as_deref(),
            self.max_rendered_pixels,
            indices,
        )
        .await?;

        let enhancement = options.enhancement;
        let hint = transcription_hint(&options.language);

        let results: Vec<Result<(usize, String), EngineError>> =
            stream::iter(rendered.into_iter().map(|(idx, img)| {
                let hint = hint.clone();
                async move {
                    let img = enhance(img, enhancement);
                    let data = encode_page(&img).map_err(|e| {
                        EngineError::Failed(format!("page {}: image encoding failed: {}", idx + 1, e))
                    })?;
                    let text = self.transcribe(idx + 1, data, &hint).await?;
                    Ok((idx, text))
                }
            }))
            .buffered(self.concurrency)
            .collect()
            .await;

        results.into_iter().collect()
    }

    /// One model call for one page. Single attempt; no retry.
    async fn transcribe(
        &self,
        page_num: usize,
        image: ImageData,
        hint: &str,
    ) -> Result<String, EngineError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(TRANSCRIPTION_SYSTEM_PROMPT),
            ChatMessage::system(hint),
            ChatMessage::user_with_images("", vec![image]),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {:?}",
                    page_num,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
            Err(e) => {
                warn!("Page {}: transcription failed — {}", page_num, e);
                Err(EngineError::Failed(format!(
                    "page {} transcription failed: {}",
                    page_num, e
                )))
            }
        }
    }
}

#[async_trait]
impl PageTranscriber for VisionOcrEngine {
    async fn transcribe_pages(
        &self,
        path: &Path,
        options: &RecognitionOptions,
        indices: &[usize],
    ) -> Result<Vec<(usize, String)>, EngineError> {
        VisionOcrEngine::transcribe_pages(self, path, options, indices).await
    }
}

#[async_trait]
impl OcrEngine for VisionOcrEngine {
    fn name(&self) -> &'static str {
        "vision"
    }

    async fn recognize(
        &self,
        path: &Path,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        let pages = self.transcribe_pages(path, options, &[]).await?;
        let page_count = pages.len();
        let text = pages
            .into_iter()
            .map(|(_, t)| t.trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(Recognition {
            text,
            page_count,
            regions: Vec::new(),
        })
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Rasterise pages of a PDF. Empty `indices` means every page.
///
/// Runs inside `spawn_blocking` since pdfium operations are CPU-bound.
async fn render_pages(
    pdf_path: &Path,
    password: Option<&str>,
    max_pixels: u32,
    indices: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, EngineError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(|s| s.to_string());
    let indices = indices.to_vec();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, password.as_deref(), max_pixels, &indices)
    })
    .await
    .map_err(|e| EngineError::Failed(format!("Render task panicked: {}", e)))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    max_pixels: u32,
    indices: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, EngineError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(load_error)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    let selected: Vec<usize> = if indices.is_empty() {
        (0..total_pages).collect()
    } else {
        indices.to_vec()
    };

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(selected.len());
    for idx in selected {
        if idx >= total_pages {
            warn!("Skipping page {} (out of range, total={})", idx + 1, total_pages);
            continue;
        }

        let page = pages
            .get(idx as u16)
            .map_err(|e| EngineError::Failed(format!("page {}: {:?}", idx + 1, e)))?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| EngineError::Failed(format!("page {} render: {:?}", idx + 1, e)))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        results.push((idx, image));
    }

    info!("Rendered {} of {} pages", results.len(), total_pages);
    Ok(results)
}

// ── Preprocessing and encoding ───────────────────────────────────────────

/// Apply the enhancement policy to a rendered page.
pub fn enhance(img: DynamicImage, policy: EnhancementPolicy) -> DynamicImage {
    match policy {
        EnhancementPolicy::Off => img,
        EnhancementPolicy::Grayscale => DynamicImage::ImageLuma8(stretch_contrast(img.to_luma8())),
        EnhancementPolicy::Auto => {
            let luma = img.to_luma8();
            let (lo, hi) = percentile_bounds(&luma);
            if hi.saturating_sub(lo) < LOW_CONTRAST_SPREAD {
                debug!("Low-contrast page (spread {}); enhancing", hi.saturating_sub(lo));
                DynamicImage::ImageLuma8(stretch_contrast(luma))
            } else {
                img
            }
        }
    }
}

/// 5th and 95th percentile luma values.
fn percentile_bounds(luma: &GrayImage) -> (u8, u8) {
    let mut histogram = [0u64; 256];
    for p in luma.pixels() {
        histogram[p.0[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return (0, 255);
    }

    let lo_target = total / 20;
    let hi_target = total - total / 20;
    let (mut lo, mut hi) = (0u8, 255u8);
    let mut seen = 0u64;
    let mut lo_found = false;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if !lo_found && seen > lo_target {
            lo = value as u8;
            lo_found = true;
        }
        if seen >= hi_target {
            hi = value as u8;
            break;
        }
    }
    (lo, hi.max(lo))
}

/// Linearly map the 5th–95th percentile range onto 0–255.
fn stretch_contrast(mut luma: GrayImage) -> GrayImage {
    let (lo, hi) = percentile_bounds(&luma);
    if hi <= lo {
        return luma;
    }
    let range = (hi - lo) as f32;
    for p in luma.pixels_mut() {
        let v = p.0[0].clamp(lo, hi);
        p.0[0] = (((v - lo) as f32 / range) * 255.0).round() as u8;
    }
    luma
}

/// Encode a rasterised page as a base64 PNG ready for the VLM API.
///
/// PNG keeps text edges lossless; `detail: "high"` lets GPT-4-class models
/// tile the image instead of reading a single downscaled overview.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
