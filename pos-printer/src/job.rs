//! Print jobs
//!
//! Turns requests (markup text, QR data) into finished byte buffers ready for
//! the delivery transport.

use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{info, instrument};

use crate::config::PrinterConfig;
use crate::error::{PrintError, PrintResult, PrintWarning};
use crate::escpos::EscPosBuilder;
use crate::markup::{MarkupCompiler, preview};
use crate::qr::{QrComposer, QrPresentation, QrRequest};

/// What a job prints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Text,
    Qr,
}

/// A compiled job, consumed once by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub kind: JobKind,
    /// Complete printer stream, margins and feeds included
    pub bytes: Vec<u8>,
    /// Longest the caller is willing to wait for delivery
    pub timeout: Duration,
    /// Non-fatal conditions met while compiling
    pub warnings: Vec<PrintWarning>,
}

impl PrintJob {
    /// Override the delivery timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Blank lines around a text job's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Margins {
    pub top: usize,
    pub bottom: usize,
}

/// Compiles requests into print jobs
///
/// Holds only immutable configuration, so it can be shared freely.
#[derive(Debug, Clone)]
pub struct JobCompiler {
    config: PrinterConfig,
    markup: MarkupCompiler,
    qr: QrComposer,
}

impl JobCompiler {
    pub fn new(config: &PrinterConfig) -> Self {
        Self {
            config: config.clone(),
            markup: MarkupCompiler::new(config.line_width, config.encoding),
            qr: QrComposer::new(config),
        }
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    /// Compile a markup document with the configured margins
    pub fn text_job(&self, document: &str) -> PrintResult<PrintJob> {
        let margins = Margins {
            top: self.config.top_margin_lines,
            bottom: self.config.feed_lines,
        };
        self.text_job_with(document, margins)
    }

    /// Compile a markup document
    ///
    /// Layout: init, line spacing, top margin, body, bottom feed.
    #[instrument(skip(self, document), fields(len = document.len()))]
    pub fn text_job_with(&self, document: &str, margins: Margins) -> PrintResult<PrintJob> {
        if document.trim().is_empty() {
            return Err(PrintError::Validation("text must not be empty".to_string()));
        }
        info!(preview = %preview(document), lines = document.lines().count(), "compiling text job");

        let body = self.markup.compile(document);

        let mut b = EscPosBuilder::new(self.config.line_width, self.config.encoding);
        b.line_spacing(self.config.line_spacing)
            .blank_lines(margins.top)
            .raw(&body)
            .blank_lines(margins.bottom);

        Ok(PrintJob {
            kind: JobKind::Text,
            bytes: b.build(),
            timeout: self.config.print_timeout(),
            warnings: Vec::new(),
        })
    }

    /// Compile a QR code job
    #[instrument(skip(self, data, presentation), fields(data_len = data.len()))]
    pub fn qr_job(&self, data: &str, presentation: &QrPresentation) -> PrintResult<PrintJob> {
        if data.trim().is_empty() {
            return Err(PrintError::Validation("QR data must not be empty".to_string()));
        }
        info!(data = %data.chars().take(50).collect::<String>(), "compiling QR job");

        let request = QrRequest::new(data, &self.config);
        let compiled = self.qr.compose(&request, presentation);

        Ok(PrintJob {
            kind: JobKind::Qr,
            bytes: compiled.bytes,
            timeout: self.config.print_timeout(),
            warnings: compiled.warnings,
        })
    }

    /// Diagnostic page confirming the printer is reachable
    pub fn test_page(&self) -> PrintResult<PrintJob> {
        self.test_page_at(Local::now())
    }

    pub fn test_page_at(&self, now: DateTime<Local>) -> PrintResult<PrintJob> {
        let document = format!(
            "<center><b>TEST PRINT</b></center>\nPrinter: {}\nWidth: {}\nTime: {}\nStatus: Online",
            self.config.port_name,
            self.config.line_width,
            now.format("%Y-%m-%d %H:%M:%S"),
        );
        self.text_job(&document)
    }

    /// QR code with a known caption
    ///
    /// A printer without QR support prints the caption alone.
    pub fn qr_capability_test(&self) -> PrintResult<PrintJob> {
        self.qr_job("TEST", &QrPresentation::Caption("QR Test: TEST".to_string()))
    }
}
