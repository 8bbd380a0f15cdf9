//! Text encoding for thermal printers
//!
//! Printers take single-byte text by default; Chinese models take GBK.
//! Control sequences are pure ASCII, so both encodings leave them intact.
//! This module provides:
//! - Encoding text runs into printer bytes
//! - Measuring printed width in character cells
//! - The GBK mode switches that must surround GBK text

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// FS & - Enable Chinese mode
pub(crate) const GBK_MODE_ON: [u8; 2] = [0x1C, 0x26];
/// FS C 1 - Select GBK code page
pub(crate) const GBK_CODE_PAGE: [u8; 3] = [0x1C, 0x43, 0x01];
/// FS . - Exit Chinese mode
pub(crate) const GBK_MODE_OFF: [u8; 2] = [0x1C, 0x2E];

/// Encoding used for printed text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// One byte per character; anything above U+00FF prints as `?`
    #[default]
    Latin1,
    /// GBK for Chinese printers
    Gbk,
}

impl TextEncoding {
    /// Encode a text run into printer bytes
    pub fn encode(self, s: &str) -> Vec<u8> {
        match self {
            TextEncoding::Latin1 => s
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            TextEncoding::Gbk => encode_gbk(s),
        }
    }

    /// Printed width of a string in character cells
    pub fn width(self, s: &str) -> usize {
        match self {
            TextEncoding::Latin1 => s.chars().count(),
            TextEncoding::Gbk => gbk_width(s),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Latin1 => f.write_str("latin1"),
            TextEncoding::Gbk => f.write_str("gbk"),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latin1" | "latin-1" | "binary" => Ok(TextEncoding::Latin1),
            "gbk" => Ok(TextEncoding::Gbk),
            other => Err(format!("unknown encoding: {}", other)),
        }
    }
}

/// Get the GBK byte width of a string
///
/// Chinese characters are 2 bytes in GBK and print two cells wide.
pub fn gbk_width(s: &str) -> usize {
    let (cow, _, _) = encoding_rs::GBK.encode(s);
    cow.len()
}

/// Encode UTF-8 text to GBK
///
/// The euro sign has no GBK code point, so it is printed by leaving Chinese
/// mode, switching to PC858 and re-entering Chinese mode.
fn encode_gbk(s: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(s.len() * 2);
    let parts: Vec<&str> = s.split('€').collect();

    for (idx, part) in parts.iter().enumerate() {
        if !part.is_empty() {
            let (gbk, _, _) = encoding_rs::GBK.encode(part);
            result.extend_from_slice(&gbk);
        }
        if idx < parts.len() - 1 {
            result.extend_from_slice(&GBK_MODE_OFF);
            result.extend_from_slice(&[0x1B, 0x74, 19, 0xD5]);
            result.extend_from_slice(&GBK_MODE_ON);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbk_width() {
        assert_eq!(gbk_width("hello"), 5);
        assert_eq!(gbk_width("你好"), 4);
        assert_eq!(gbk_width("AB中文CD"), 8);
    }

    #[test]
    fn test_latin1_encode() {
        assert_eq!(TextEncoding::Latin1.encode("Total: 5"), b"Total: 5".to_vec());
        assert_eq!(TextEncoding::Latin1.encode("café"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(TextEncoding::Latin1.encode("中"), vec![b'?']);
    }

    #[test]
    fn test_control_bytes_survive() {
        let s = "\x1B\x45\x01HI\x1B\x45\x00";
        assert_eq!(TextEncoding::Latin1.encode(s), s.as_bytes().to_vec());
        assert_eq!(TextEncoding::Gbk.encode(s), s.as_bytes().to_vec());
    }

    #[test]
    fn test_width_by_encoding() {
        assert_eq!(TextEncoding::Latin1.width("你好"), 2);
        assert_eq!(TextEncoding::Gbk.width("你好"), 4);
    }

    #[test]
    fn test_euro_escape() {
        let bytes = TextEncoding::Gbk.encode("5€");
        assert_eq!(bytes[0], b'5');
        assert_eq!(&bytes[1..3], &GBK_MODE_OFF);
        assert_eq!(&bytes[bytes.len() - 2..], &GBK_MODE_ON);
    }

    #[test]
    fn test_parse() {
        assert_eq!("GBK".parse::<TextEncoding>(), Ok(TextEncoding::Gbk));
        assert_eq!("binary".parse::<TextEncoding>(), Ok(TextEncoding::Latin1));
        assert!("utf-16".parse::<TextEncoding>().is_err());
    }
}
