//! ESC/POS command builder
//!
//! Provides the raw command constants and a fluent API for building
//! ESC/POS print data.

use image::GrayImage;

use crate::encoding::{GBK_CODE_PAGE, GBK_MODE_OFF, GBK_MODE_ON, TextEncoding};

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;

/// ESC @ - Initialize printer
pub const INIT: [u8; 2] = [ESC, 0x40];
/// ESC a 0 - Left align
pub const ALIGN_LEFT: [u8; 3] = [ESC, 0x61, 0x00];
/// ESC a 1 - Center align
pub const ALIGN_CENTER: [u8; 3] = [ESC, 0x61, 0x01];
/// ESC a 2 - Right align
pub const ALIGN_RIGHT: [u8; 3] = [ESC, 0x61, 0x02];
/// ESC E 1 - Emphasis on
pub const BOLD_ON: [u8; 3] = [ESC, 0x45, 0x01];
/// ESC E 0 - Emphasis off
pub const BOLD_OFF: [u8; 3] = [ESC, 0x45, 0x00];
/// GS ! 0x11 - Double width and height
pub const SIZE_DOUBLE: [u8; 3] = [GS, 0x21, 0x11];
/// GS ! 0x00 - Normal size
pub const SIZE_NORMAL: [u8; 3] = [GS, 0x21, 0x00];
/// Line ending expected by the printer port
pub const CRLF: [u8; 2] = [b'\r', b'\n'];

/// Function 165: select QR model 2
const QR_MODEL_2: [u8; 9] = [GS, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x32, 0x00];
/// Function 181: print the stored symbol
const QR_PRINT: [u8; 8] = [GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30];
/// Bytes counted by pL/pH ahead of the payload (cn fn m)
pub const QR_STORE_HEADER_LEN: usize = 3;

/// Largest payload a QR symbol can hold (version 40, numeric data)
pub const MAX_QR_PAYLOAD: usize = 7089;

/// Encode a QR store length as (pL, pH)
///
/// The length covers the payload plus the 3-byte function header.
/// `payload_len` must not exceed [`MAX_QR_PAYLOAD`]; [`qr_frame`] enforces it.
pub fn qr_length_prefix(payload_len: usize) -> (u8, u8) {
    let len = payload_len + QR_STORE_HEADER_LEN;
    ((len & 0xFF) as u8, ((len >> 8) & 0xFF) as u8)
}

/// Recover the payload length from a (pL, pH) pair
pub fn qr_payload_len(p_l: u8, p_h: u8) -> usize {
    (usize::from(p_l) + usize::from(p_h) * 256).saturating_sub(QR_STORE_HEADER_LEN)
}

/// Build the full native QR command frame for an already-encoded payload
///
/// Model 2, module size, error correction, store, print.
///
/// Payloads longer than [`MAX_QR_PAYLOAD`] are cut so the stored length
/// always matches the bytes that follow it.
pub fn qr_frame(payload: &[u8], size: u8, error_level: u8) -> Vec<u8> {
    let payload = &payload[..payload.len().min(MAX_QR_PAYLOAD)];
    let size = size.clamp(1, 16);
    let mut frame = Vec::with_capacity(payload.len() + 40);

    frame.extend_from_slice(&QR_MODEL_2);

    // Function 167: Set module size
    frame.extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, size]);

    // Function 169: Set error correction
    frame.extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, error_level]);

    // Function 180: Store data
    let (p_l, p_h) = qr_length_prefix(payload.len());
    frame.extend_from_slice(&[GS, 0x28, 0x6B, p_l, p_h, 0x31, 0x50, 0x30]);
    frame.extend_from_slice(payload);

    frame.extend_from_slice(&QR_PRINT);
    frame
}

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers.
/// Text is encoded as it is written; commands are written verbatim.
#[derive(Debug, Clone)]
pub struct EscPosBuilder {
    buf: Vec<u8>,
    width: usize,
    encoding: TextEncoding,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in characters
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    ///
    /// The buffer starts with a printer initialize, so no style state leaks
    /// in from a previous job.
    pub fn new(width: usize, encoding: TextEncoding) -> Self {
        let mut builder = Self {
            buf: Vec::with_capacity(4096),
            width,
            encoding,
        };
        builder.init();
        if encoding == TextEncoding::Gbk {
            builder.buf.extend_from_slice(&GBK_CODE_PAGE);
        }
        builder
    }

    /// Get the configured paper width
    pub fn width(&self) -> usize {
        self.width
    }

    /// Get the text encoding
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    // === Text Output ===

    /// Write text in the builder's encoding
    pub fn text(&mut self, s: &str) -> &mut Self {
        let bytes = self.encoding.encode(s);
        self.buf.extend_from_slice(&bytes);
        self
    }

    /// Write text followed by CRLF
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.extend_from_slice(&CRLF);
        self
    }

    /// Write a bare line feed
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Write `n` blank CRLF lines
    pub fn blank_lines(&mut self, n: usize) -> &mut Self {
        for _ in 0..n {
            self.buf.extend_from_slice(&CRLF);
        }
        self
    }

    /// Print buffered data and feed n lines (ESC d n)
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, 0x64, lines]);
        self
    }

    /// Set line spacing to n/180 inch (ESC 3 n)
    pub fn line_spacing(&mut self, n: u8) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, 0x33, n]);
        self
    }

    // === Alignment ===

    /// Align text to center
    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&ALIGN_CENTER);
        self
    }

    /// Align text to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&ALIGN_LEFT);
        self
    }

    /// Align text to right
    pub fn right(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&ALIGN_RIGHT);
        self
    }

    // === Text Style ===

    /// Enable bold text
    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&BOLD_ON);
        self
    }

    /// Disable bold text
    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&BOLD_OFF);
        self
    }

    /// Double width and height
    pub fn double_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&SIZE_DOUBLE);
        self
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&SIZE_NORMAL);
        self
    }

    // === QR Code ===

    /// Print a native QR code from an already-encoded payload
    pub fn qr_code(&mut self, payload: &[u8], size: u8, error_level: u8) -> &mut Self {
        let frame = qr_frame(payload, size, error_level);
        self.buf.extend_from_slice(&frame);
        self
    }

    // === Raster Image ===

    /// Print a monochrome raster image (GS v 0)
    ///
    /// Pixels darker than mid-grey print black.
    pub fn raster(&mut self, img: &GrayImage) -> &mut Self {
        let (w, h) = img.dimensions();
        let x_bytes = w.div_ceil(8);

        // GS v 0 m xL xH yL yH
        self.buf.extend_from_slice(&[GS, 0x76, 0x30, 0x00]);
        self.buf.push((x_bytes & 0xFF) as u8);
        self.buf.push(((x_bytes >> 8) & 0xFF) as u8);
        self.buf.push((h & 0xFF) as u8);
        self.buf.push(((h >> 8) & 0xFF) as u8);

        for y in 0..h {
            for x_byte in 0..x_bytes {
                let mut byte = 0u8;
                for bit in 0..8 {
                    let x = x_byte * 8 + bit;
                    if x < w && img.get_pixel(x, y)[0] < 128 {
                        byte |= 1 << (7 - bit);
                    }
                }
                self.buf.push(byte);
            }
        }

        self.buf.push(b'\n');
        self
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Reset printer to default state
    ///
    /// Chinese mode is cleared by ESC @, so it is re-enabled for GBK.
    pub fn init(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&INIT);
        if self.encoding == TextEncoding::Gbk {
            self.buf.extend_from_slice(&GBK_MODE_ON);
        }
        self
    }

    // === Build ===

    /// Build the final byte buffer
    pub fn build(mut self) -> Vec<u8> {
        if self.encoding == TextEncoding::Gbk {
            self.buf.extend_from_slice(&GBK_MODE_OFF);
        }
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(32, TextEncoding::Latin1)
    }
}
