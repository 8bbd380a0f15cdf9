//! Column layout
//!
//! Turns `<td>` cells in a row into one physical line. Fixed-width paper
//! has a known character budget, so all per-cell width arithmetic lives
//! here.

use std::borrow::Cow;

use super::strip_markup;
use super::tokenizer::{Align, Row, Tag, Token};
use crate::encoding::TextEncoding;

/// Lays out rows with zero, one or two columns
#[derive(Debug, Clone, Copy)]
pub struct ColumnLayout {
    line_width: usize,
    encoding: TextEncoding,
}

impl ColumnLayout {
    pub fn new(line_width: usize, encoding: TextEncoding) -> Self {
        Self {
            line_width,
            encoding,
        }
    }

    /// Flatten one row
    ///
    /// - no columns: the row is returned unchanged
    /// - one column: centered, with its inner alignment tags removed
    /// - two or more: first column left, second column right, the rest
    ///   dropped; whatever sat outside the columns follows verbatim
    pub fn layout<'a>(&self, row: Row<'a>) -> Row<'a> {
        let (columns, remainder) = extract_columns(row);
        let mut columns = columns.into_iter();

        let Some(first) = columns.next() else {
            return remainder;
        };
        let first = strip_alignment(first);

        let mut line = Vec::with_capacity(first.len() + remainder.len() + 2);
        match columns.next() {
            None => {
                line.push(Token::synthetic(Tag::AlignOpen(Align::Center)));
                line.extend(first);
            }
            Some(second) => {
                let second = strip_alignment(second);
                let spacing = self.spacing(&first, &second);
                line.extend(first);
                line.push(Token::Text(Cow::Owned(" ".repeat(spacing))));
                line.extend(second);
            }
        }
        line.extend(remainder);
        line
    }

    /// Gap between two columns, never less than one space
    pub fn spacing(&self, left: &[Token<'_>], right: &[Token<'_>]) -> usize {
        let content = self.visible_width(left) + self.visible_width(right);
        self.line_width.saturating_sub(content).max(1)
    }

    /// Printed width of tokens once every `<...>` marker is gone
    pub fn visible_width(&self, tokens: &[Token<'_>]) -> usize {
        let source: String = tokens.iter().map(Token::source).collect();
        self.encoding.width(&strip_markup(&source))
    }
}

/// Pull matched `<td>...</td>` pairs out of a row
///
/// A `<td>` closes at the first following `</td>`. Unpaired markers stay
/// in the remainder.
fn extract_columns(row: Row<'_>) -> (Vec<Row<'_>>, Row<'_>) {
    let mut columns = Vec::new();
    let mut remainder = Vec::new();
    // tokens since an unclosed <td>, the marker included
    let mut open: Option<Row<'_>> = None;

    for token in row {
        let tag = token.tag();
        match open.as_mut() {
            None if tag == Some(Tag::ColumnOpen) => open = Some(vec![token]),
            None => remainder.push(token),
            Some(_) if tag == Some(Tag::ColumnClose) => {
                if let Some(mut cell) = open.take() {
                    cell.remove(0);
                    columns.push(cell);
                }
            }
            Some(cell) => cell.push(token),
        }
    }
    if let Some(cell) = open {
        remainder.extend(cell);
    }

    (columns, remainder)
}

fn strip_alignment(tokens: Row<'_>) -> Row<'_> {
    tokens.into_iter().filter(|t| !t.is_alignment()).collect()
}
