//! Printer configuration
//!
//! A resolved, immutable configuration value handed to [`JobCompiler`] and
//! [`DeliveryTransport`]. How the value is assembled (files, flags, env) is
//! up to the host application; this module only offers the defaults, an
//! environment overlay and a JSON reader.
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | PRINTER_PORT_NAME | COM1 | Device or port name |
//! | PRINTER_LINE_WIDTH | 32 | Characters per line (32 = 58mm, 48 = 80mm) |
//! | PRINTER_TIMEOUT_MS | 10000 | Print timeout in milliseconds |
//! | PRINTER_LINE_SPACING | 34 | Line spacing in 1/180 inch |
//! | PRINTER_MAX_QR_LENGTH | 300 | Maximum QR payload length (1-7089) |
//! | PRINTER_QR_SIZE | 6 | QR module size (1-16) |
//! | PRINTER_QR_ERROR_LEVEL | 48 | 48 = L, 49 = M, 50 = Q, 51 = H |
//! | PRINTER_TOP_MARGIN | 3 | Blank lines before content |
//! | PRINTER_FEED_LINES | 4 | Blank lines after content |
//! | PRINTER_ENCODING | latin1 | `latin1` or `gbk` |
//! | PRINTER_STAGING_DIR | system temp | Where transient buffers are staged |
//!
//! [`JobCompiler`]: crate::JobCompiler
//! [`DeliveryTransport`]: crate::DeliveryTransport

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::encoding::TextEncoding;
use crate::error::{PrintError, PrintResult};
use crate::escpos::MAX_QR_PAYLOAD;

/// Dots per character cell in the printer's default font (font A, 12x24)
const DOTS_PER_CHAR: usize = 12;

/// QR error correction level
///
/// Serialized as the ordinal byte the printer expects (48..=51).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QrErrorLevel {
    /// ~7% recovery
    #[default]
    L,
    /// ~15% recovery
    M,
    /// ~25% recovery
    Q,
    /// ~30% recovery
    H,
}

impl QrErrorLevel {
    /// Parameter byte for `GS ( k ... 49 69 n`
    pub fn ordinal(self) -> u8 {
        match self {
            QrErrorLevel::L => 48,
            QrErrorLevel::M => 49,
            QrErrorLevel::Q => 50,
            QrErrorLevel::H => 51,
        }
    }
}

impl TryFrom<u8> for QrErrorLevel {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            48 => Ok(QrErrorLevel::L),
            49 => Ok(QrErrorLevel::M),
            50 => Ok(QrErrorLevel::Q),
            51 => Ok(QrErrorLevel::H),
            other => Err(format!("QR error level must be 48..=51, got {}", other)),
        }
    }
}

impl From<QrErrorLevel> for u8 {
    fn from(level: QrErrorLevel) -> Self {
        level.ordinal()
    }
}

/// Resolved printer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Device or port name (`COM1`, `/dev/usb/lp0`, ...)
    pub port_name: String,
    /// Characters per printed line
    pub line_width: usize,
    /// Print timeout in milliseconds
    pub print_timeout_ms: u64,
    /// Line spacing in 1/180 inch units (`ESC 3 n`)
    pub line_spacing: u8,
    /// Maximum QR payload length; longer data is truncated
    pub max_qr_length: usize,
    /// QR module size (1-16)
    pub qr_size: u8,
    /// QR error correction level
    pub qr_error_level: QrErrorLevel,
    /// Blank lines emitted before content
    pub top_margin_lines: usize,
    /// Blank lines emitted after content
    pub feed_lines: usize,
    /// Text encoding of printed content
    pub encoding: TextEncoding,
    /// Directory for transient buffers; `None` uses the system temp dir
    pub staging_dir: Option<PathBuf>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            port_name: "COM1".to_string(),
            line_width: 32,
            print_timeout_ms: 10_000,
            line_spacing: 34,
            max_qr_length: 300,
            qr_size: 6,
            qr_error_level: QrErrorLevel::L,
            top_margin_lines: 3,
            feed_lines: 4,
            encoding: TextEncoding::Latin1,
            staging_dir: None,
        }
    }
}

impl PrinterConfig {
    /// Load configuration from `PRINTER_*` environment variables
    ///
    /// Unset or unparsable variables keep their default value.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        Self {
            port_name: lookup("PRINTER_PORT_NAME").unwrap_or(defaults.port_name),
            line_width: parse(&lookup, "PRINTER_LINE_WIDTH").unwrap_or(defaults.line_width),
            print_timeout_ms: parse(&lookup, "PRINTER_TIMEOUT_MS").unwrap_or(defaults.print_timeout_ms),
            line_spacing: parse(&lookup, "PRINTER_LINE_SPACING").unwrap_or(defaults.line_spacing),
            max_qr_length: parse(&lookup, "PRINTER_MAX_QR_LENGTH").unwrap_or(defaults.max_qr_length),
            qr_size: parse(&lookup, "PRINTER_QR_SIZE").unwrap_or(defaults.qr_size),
            qr_error_level: parse::<u8>(&lookup, "PRINTER_QR_ERROR_LEVEL")
                .and_then(|n| QrErrorLevel::try_from(n).ok())
                .unwrap_or(defaults.qr_error_level),
            top_margin_lines: parse(&lookup, "PRINTER_TOP_MARGIN").unwrap_or(defaults.top_margin_lines),
            feed_lines: parse(&lookup, "PRINTER_FEED_LINES").unwrap_or(defaults.feed_lines),
            encoding: lookup("PRINTER_ENCODING")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.encoding),
            staging_dir: lookup("PRINTER_STAGING_DIR")
                .map(PathBuf::from)
                .or(defaults.staging_dir),
        }
    }

    /// Parse configuration from JSON; missing fields take defaults
    pub fn from_json(json: &str) -> PrintResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PrintError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the compiler or transport cannot work with
    pub fn validate(&self) -> PrintResult<()> {
        if self.port_name.trim().is_empty() {
            return Err(PrintError::InvalidConfig("port name is empty".to_string()));
        }
        if self.line_width == 0 {
            return Err(PrintError::InvalidConfig("line width must be > 0".to_string()));
        }
        if self.print_timeout_ms == 0 {
            return Err(PrintError::InvalidConfig(
                "print timeout must be > 0".to_string(),
            ));
        }
        if !(1..=16).contains(&self.qr_size) {
            return Err(PrintError::InvalidConfig(format!(
                "QR size must be 1..=16, got {}",
                self.qr_size
            )));
        }
        if !(1..=MAX_QR_PAYLOAD).contains(&self.max_qr_length) {
            return Err(PrintError::InvalidConfig(format!(
                "max QR length must be 1..={}, got {}",
                MAX_QR_PAYLOAD, self.max_qr_length
            )));
        }
        Ok(())
    }

    /// Print timeout as a duration
    pub fn print_timeout(&self) -> Duration {
        Duration::from_millis(self.print_timeout_ms)
    }

    /// Printable width in dots, used to bound raster images
    pub fn print_width_dots(&self) -> usize {
        self.line_width * DOTS_PER_CHAR
    }

    /// Directory where transient buffers are staged
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
