//! Result and response types produced by the pipeline.
//!
//! [`OcrResult`] and [`ExtractionResult`] are the stage outputs. A finished
//! request is a [`PipelineOutcome`]; [`PipelineOutcome::response`] turns it
//! into the normalized JSON shape an HTTP layer returns.

use crate::error::{ErrorKind, ReaderError};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box with a top-left origin, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One recognized text region with its position and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRegion {
    /// 1-indexed page number.
    pub page: usize,
    pub text: String,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

/// Per-region layout returned by layout-mode recognition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    /// Regions in reading order.
    pub regions: Vec<LayoutRegion>,
    /// True when the engine could not produce layout for this document and
    /// the result degraded to text-only recognition.
    pub fallback: bool,
}

/// Output of the OCR stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    /// Average region confidence in `0.0..=1.0`; 0.0 when nothing was scorable.
    pub confidence: f32,
    /// Character count of `text`.
    pub text_length: usize,
    pub page_count: usize,
    /// Name of the engine that produced the result.
    pub engine: String,
    /// Present only for layout-mode requests.
    pub layout: Option<Layout>,
}

impl OcrResult {
    /// Build a result, deriving `text_length` from `text`.
    pub fn new(
        text: String,
        confidence: f32,
        page_count: usize,
        engine: impl Into<String>,
        layout: Option<Layout>,
    ) -> Self {
        let text_length = text.chars().count();
        Self {
            text,
            confidence: confidence.clamp(0.0, 1.0),
            text_length,
            page_count,
            engine: engine.into(),
            layout,
        }
    }
}

/// Output of the AI extraction stage: the model's answer, untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub extracted_data: String,
}

/// Successful output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOutput {
    pub ocr: OcrResult,
    pub extraction: Option<ExtractionResult>,
}

/// Terminal state of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Succeeded {
        ocr: OcrResult,
        extraction: Option<ExtractionResult>,
    },
    Failed {
        kind: ErrorKind,
        status: u16,
        message: String,
    },
}

impl From<Result<ReadOutput, ReaderError>> for PipelineOutcome {
    fn from(result: Result<ReadOutput, ReaderError>) -> Self {
        match result {
            Ok(out) => PipelineOutcome::Succeeded {
                ocr: out.ocr,
                extraction: out.extraction,
            },
            Err(e) => PipelineOutcome::Failed {
                kind: e.kind(),
                status: e.status_code(),
                message: e.to_string(),
            },
        }
    }
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Succeeded { .. })
    }

    /// HTTP status for the outcome: 200 on success.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineOutcome::Succeeded { .. } => 200,
            PipelineOutcome::Failed { status, .. } => *status,
        }
    }

    /// Normalize into the response shape matching the request type.
    ///
    /// Extraction requests answer with confidence + extracted data, layout
    /// requests with the layout shape, everything else with the text shape.
    pub fn response(&self) -> Response {
        match self {
            PipelineOutcome::Succeeded {
                ocr,
                extraction: Some(extraction),
            } => Response::Extraction(ExtractionResponse {
                success: true,
                confidence_score: ocr.confidence,
                extracted_data: extraction.extracted_data.clone(),
            }),
            PipelineOutcome::Succeeded {
                ocr,
                extraction: None,
            } => match &ocr.layout {
                Some(layout) => Response::Layout(LayoutResponse::from_parts(ocr, layout)),
                None => Response::Text(TextResponse {
                    success: true,
                    text: ocr.text.clone(),
                    confidence_score: ocr.confidence,
                    text_length: ocr.text_length,
                }),
            },
            PipelineOutcome::Failed { kind, message, .. } => Response::Error(ErrorResponse {
                success: false,
                error: *kind,
                detail: message.clone(),
            }),
        }
    }
}

// ── Response shapes ──────────────────────────────────────────────────────

/// Normalized response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Text(TextResponse),
    Layout(LayoutResponse),
    Extraction(ExtractionResponse),
    Error(ErrorResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextResponse {
    pub success: bool,
    pub text: String,
    pub confidence_score: f32,
    pub text_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutResponse {
    pub success: bool,
    pub text: String,
    pub text_length: usize,
    pub bounding_boxes: Vec<BoundingBox>,
    pub confidence_scores: Vec<f32>,
    pub layout_info: LayoutInfo,
}

impl LayoutResponse {
    fn from_parts(ocr: &OcrResult, layout: &Layout) -> Self {
        Self {
            success: true,
            text: ocr.text.clone(),
            text_length: ocr.text_length,
            bounding_boxes: layout.regions.iter().map(|r| r.bounding_box).collect(),
            confidence_scores: layout.regions.iter().map(|r| r.confidence).collect(),
            layout_info: LayoutInfo {
                engine: ocr.engine.clone(),
                mode: if layout.fallback {
                    LayoutMode::TextFallback
                } else {
                    LayoutMode::Layout
                },
                page_count: ocr.page_count,
                region_count: layout.regions.len(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutInfo {
    pub engine: String,
    pub mode: LayoutMode,
    pub page_count: usize,
    pub region_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    Layout,
    TextFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResponse {
    pub success: bool,
    pub confidence_score: f32,
    pub extracted_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorKind,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ocr(layout: Option<Layout>) -> OcrResult {
        OcrResult::new("héllo".into(), 0.75, 1, "mock", layout)
    }

    #[test]
    fn text_length_counts_chars_not_bytes() {
        assert_eq!(ocr(None).text_length, 5);
    }

    #[test]
    fn confidence_is_clamped() {
        let r = OcrResult::new("x".into(), 1.7, 1, "mock", None);
        assert_eq!(r.confidence, 1.0);
    }

    #[test]
    fn text_response_shape() {
        let outcome = PipelineOutcome::Succeeded {
            ocr: ocr(None),
            extraction: None,
        };
        let json = serde_json::to_value(outcome.response()).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["text"], "héllo");
        assert_eq!(json["text_length"], 5);
        assert_eq!(json["confidence_score"], 0.75);
        assert!(json.get("extracted_data").is_none());
    }

    #[test]
    fn extraction_response_shape() {
        let outcome = PipelineOutcome::Succeeded {
            ocr: ocr(None),
            extraction: Some(ExtractionResult {
                extracted_data: "{\"a\":1}".into(),
            }),
        };
        let json = serde_json::to_value(outcome.response()).unwrap();
        assert_eq!(json["extracted_data"], "{\"a\":1}");
        assert_eq!(json["confidence_score"], 0.75);
        assert!(json.get("text").is_none());
    }

    #[test]
    fn layout_fallback_shape() {
        let outcome = PipelineOutcome::Succeeded {
            ocr: ocr(Some(Layout {
                regions: vec![],
                fallback: true,
            })),
            extraction: None,
        };
        let json = serde_json::to_value(outcome.response()).unwrap();
        assert_eq!(json["bounding_boxes"].as_array().unwrap().len(), 0);
        assert_eq!(json["confidence_scores"].as_array().unwrap().len(), 0);
        assert_eq!(json["layout_info"]["mode"], "text_fallback");
        assert_eq!(json["layout_info"]["engine"], "mock");
    }

    #[test]
    fn failure_outcome_from_error() {
        let outcome: PipelineOutcome = Err::<ReadOutput, _>(ReaderError::PayloadTooLarge {
            size: 2,
            limit: 1,
        })
        .into();
        assert_eq!(outcome.status_code(), 413);
        let json = serde_json::to_value(outcome.response()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "validation");
    }
}
