//! Receipt markup compiler
//!
//! A small tag vocabulary rendered to ESC/POS:
//!
//! | Markup | Output |
//! |--------|--------|
//! | `<tr>` ... `</tr>` | a row |
//! | `<br>` | line break |
//! | `<td>` ... `</td>` | column (one = centered, two = left/right) |
//! | `<center>` `<left>` `<right>` | alignment (closing tags optional) |
//! | `<b>` ... `</b>` | bold |
//! | `<h1>` ... `</h1>` | double width and height |
//!
//! Stages run in a fixed order: tokenize, split rows, lay out columns,
//! compile styles. Breaks are expanded in the last stage so that column
//! widths are measured on the text a cell actually prints.

mod layout;
mod style;
mod tokenizer;

pub use layout::ColumnLayout;
pub use style::{StyleCompiler, StyleState};
pub use tokenizer::{Align, Row, Tag, Token, split_rows, tokenize};

use crate::encoding::TextEncoding;
use tracing::instrument;

/// Longest preview of a document written to logs
const PREVIEW_LEN: usize = 100;

/// Markup to ESC/POS compiler
///
/// Pure and stateless; one instance can compile any number of documents
/// concurrently.
#[derive(Debug, Clone, Copy)]
pub struct MarkupCompiler {
    layout: ColumnLayout,
    style: StyleCompiler,
}

impl MarkupCompiler {
    pub fn new(line_width: usize, encoding: TextEncoding) -> Self {
        Self {
            layout: ColumnLayout::new(line_width, encoding),
            style: StyleCompiler::new(encoding),
        }
    }

    /// Compile a document body to printer bytes
    #[instrument(skip(self, document), fields(len = document.len()))]
    pub fn compile(&self, document: &str) -> Vec<u8> {
        let lines: Vec<Row<'_>> = split_rows(tokenize(document))
            .into_iter()
            .map(|row| self.layout.layout(row))
            .collect();
        self.style.compile(&lines)
    }
}

/// Remove every `<...>` marker, recognized or not
pub fn strip_markup(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find('<') {
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        out.push_str(&rest[..open]);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

/// Tag-free, length-capped rendition of a document for log lines
pub fn preview(document: &str) -> String {
    let clean = strip_markup(document);
    if clean.chars().count() > PREVIEW_LEN {
        let head: String = clean.chars().take(PREVIEW_LEN).collect();
        format!("{}...", head)
    } else {
        clean
    }
}
