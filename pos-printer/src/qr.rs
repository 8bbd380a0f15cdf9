//! QR code jobs
//!
//! Builds the native `GS ( k` QR frame around a request and wraps it in one
//! of three presentations: bare, captioned, or rasterized as an image with
//! a native fallback.

use std::borrow::Cow;

use image::{GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};
use tracing::{debug, instrument, warn};

use crate::config::{PrinterConfig, QrErrorLevel};
use crate::encoding::TextEncoding;
use crate::error::PrintWarning;
use crate::escpos::{EscPosBuilder, MAX_QR_PAYLOAD, qr_frame};

/// Lines fed after a bare QR code
const BARE_FEED_LINES: u8 = 3;

/// Light modules around a rasterized symbol, each side
const QUIET_ZONE: usize = 4;

/// A QR code to print
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrRequest {
    /// Data to encode
    pub data: String,
    /// Module size in dots (1-16)
    pub size: u8,
    /// Error correction level
    pub error_level: QrErrorLevel,
    /// Longest accepted data, in characters
    pub max_len: usize,
}

impl QrRequest {
    /// Request with the configured size, level and limit
    pub fn new(data: impl Into<String>, config: &PrinterConfig) -> Self {
        Self {
            data: data.into(),
            size: config.qr_size,
            error_level: config.qr_error_level,
            max_len: config.max_qr_length,
        }
    }

    /// Data cut down to `max_len` characters
    ///
    /// The result is also kept within [`MAX_QR_PAYLOAD`] bytes, cutting on a
    /// character boundary. Returns the warning to surface when anything was
    /// cut.
    pub fn truncated(&self) -> (Cow<'_, str>, Option<PrintWarning>) {
        let mut end = self
            .data
            .char_indices()
            .nth(self.max_len)
            .map_or(self.data.len(), |(i, _)| i);
        if end > MAX_QR_PAYLOAD {
            end = (0..=MAX_QR_PAYLOAD)
                .rev()
                .find(|&i| self.data.is_char_boundary(i))
                .unwrap_or(0);
        }
        if end == self.data.len() {
            return (Cow::Borrowed(&self.data), None);
        }

        let kept = &self.data[..end];
        let warning = PrintWarning::PayloadTooLarge {
            original: self.data.chars().count(),
            max: kept.chars().count(),
        };
        (Cow::Borrowed(kept), Some(warning))
    }

    /// Native QR command frame for the (truncated) data
    pub fn frame(&self) -> (Vec<u8>, Option<PrintWarning>) {
        let (data, warning) = self.truncated();
        let frame = qr_frame(data.as_bytes(), self.size, self.error_level.ordinal());
        (frame, warning)
    }
}

/// How a QR code is laid out on paper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPresentation {
    /// QR only, then a fixed feed
    Bare,
    /// QR followed by a caption and the configured bottom feed
    Caption(String),
    /// QR drawn as a raster image, falling back to native commands
    Image { caption: Option<String> },
}

/// Compiled QR job bytes plus anything the caller should be told about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQr {
    pub bytes: Vec<u8>,
    pub warnings: Vec<PrintWarning>,
}

/// Composes QR jobs
#[derive(Debug, Clone)]
pub struct QrComposer {
    encoding: TextEncoding,
    line_width: usize,
    print_width_dots: usize,
    feed_lines: usize,
}

impl QrComposer {
    pub fn new(config: &PrinterConfig) -> Self {
        Self {
            encoding: config.encoding,
            line_width: config.line_width,
            print_width_dots: config.print_width_dots(),
            feed_lines: config.feed_lines,
        }
    }

    /// Compile a QR request in the given presentation
    #[instrument(skip(self, request), fields(data_len = request.data.len()))]
    pub fn compose(&self, request: &QrRequest, presentation: &QrPresentation) -> CompiledQr {
        let mut warnings = Vec::new();
        let (data, truncation) = request.truncated();
        if let Some(warning) = truncation {
            warn!(%warning, "QR data truncated");
            warnings.push(warning);
        }

        let caption = match presentation {
            QrPresentation::Bare => None,
            QrPresentation::Caption(caption) => Some(caption.as_str()),
            QrPresentation::Image { caption } => {
                match self.rasterize(&data, request) {
                    Ok(img) => {
                        debug!(width = img.width(), "QR rasterized");
                        let bytes = self.finish(
                            |b| {
                                b.raster(&img);
                            },
                            caption.as_deref(),
                        );
                        return CompiledQr { bytes, warnings };
                    }
                    Err(warning) => {
                        warn!(%warning, "falling back to native QR");
                        warnings.push(warning);
                    }
                }
                caption.as_deref()
            }
        };

        let bytes = self.finish(
            |b| {
                b.qr_code(data.as_bytes(), request.size, request.error_level.ordinal());
            },
            caption,
        );
        CompiledQr { bytes, warnings }
    }

    /// Frame a symbol: init, center, symbol, caption or fixed feed, left
    fn finish(&self, symbol: impl FnOnce(&mut EscPosBuilder), caption: Option<&str>) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.line_width, self.encoding);
        b.center();
        symbol(&mut b);

        match caption {
            Some(caption) => {
                b.newline();
                if !caption.trim().is_empty() {
                    for line in caption.split('\n') {
                        b.line(line.trim_end_matches('\r'));
                    }
                }
                b.blank_lines(self.feed_lines);
            }
            None => {
                b.feed(BARE_FEED_LINES);
            }
        }

        b.left();
        b.build()
    }

    /// Draw the symbol as a bitmap that fits the paper
    fn rasterize(&self, data: &str, request: &QrRequest) -> Result<GrayImage, PrintWarning> {
        let level = match request.error_level {
            QrErrorLevel::L => EcLevel::L,
            QrErrorLevel::M => EcLevel::M,
            QrErrorLevel::Q => EcLevel::Q,
            QrErrorLevel::H => EcLevel::H,
        };

        let code = QrCode::with_error_correction_level(data.as_bytes(), level)
            .map_err(|e| PrintWarning::UnsupportedRender(format!("QR generation failed: {}", e)))?;

        let scale = usize::from(request.size.clamp(1, 16));
        let modules = code.width();
        let dots = (modules + 2 * QUIET_ZONE) * scale;
        if dots > self.print_width_dots {
            return Err(PrintWarning::UnsupportedRender(format!(
                "QR image {} dots wide exceeds {} printable dots",
                dots, self.print_width_dots
            )));
        }

        let side = u32::try_from(dots)
            .map_err(|_| PrintWarning::UnsupportedRender("QR image too large".to_string()))?;
        let img = GrayImage::from_fn(side, side, |x, y| {
            let module = |p: u32| (p as usize / scale).checked_sub(QUIET_ZONE);
            let dark = match (module(x), module(y)) {
                (Some(mx), Some(my)) if mx < modules && my < modules => {
                    code[(mx, my)] == Color::Dark
                }
                _ => false,
            };
            if dark {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        Ok(img)
    }
}
