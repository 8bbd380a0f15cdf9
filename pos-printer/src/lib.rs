//! # pos-printer
//!
//! Receipt markup compiler and bounded ESC/POS delivery for thermal printers.
//!
//! ## Scope
//!
//! - Markup compilation (`<tr>`, `<td>`, `<b>`, `<h1>`, alignment tags)
//! - QR code framing (`GS ( k`), optionally rasterized as an image
//! - Latin-1 and GBK text encoding
//! - Delivery through a staged temp buffer with a hard timeout
//! - Device/port printers and network printers (TCP port 9100)
//!
//! Accepting requests (HTTP, CLI) stays in application code.
//!
//! ## Example
//!
//! ```ignore
//! use pos_printer::{PrintService, PrinterConfig, QrPresentation};
//!
//! let config = PrinterConfig::from_env();
//! let service = PrintService::from_config(&config)?;
//!
//! service
//!     .print_text("<center><h1>SHOP</h1></center>\n<td>Coffee</td><td>3.50</td>")
//!     .await?;
//! service
//!     .print_qr("https://example.com/r/42", &QrPresentation::Caption("Scan me".into()))
//!     .await?;
//! ```

mod config;
mod encoding;
mod error;
mod job;
mod printer;
mod qr;
mod service;
mod transport;

pub mod escpos;
pub mod markup;

// Re-exports
pub use config::{PrinterConfig, QrErrorLevel};
pub use encoding::{TextEncoding, gbk_width};
pub use error::{PrintError, PrintFailure, PrintResult, PrintWarning};
pub use escpos::{EscPosBuilder, qr_frame, qr_length_prefix, qr_payload_len};
pub use job::{JobCompiler, JobKind, Margins, PrintJob};
pub use markup::{MarkupCompiler, preview, strip_markup};
pub use printer::{DevicePrinter, NetworkPrinter, Printer, RAW_PRINT_PORT, open_endpoint};
pub use qr::{CompiledQr, QrComposer, QrPresentation, QrRequest};
pub use service::{PrintOutcome, PrintService};
pub use transport::{
    DeliveryReport, DeliverySnapshot, DeliveryState, DeliveryStats, DeliveryTransport,
};
