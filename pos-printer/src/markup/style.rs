//! Style compiler
//!
//! Rewrites laid-out lines into printer bytes: recognized tags become
//! ESC/POS commands, text is encoded, every line ending becomes CRLF.

use super::tokenizer::{Align, Row, Tag, Token};
use crate::encoding::TextEncoding;
use crate::escpos::{
    ALIGN_CENTER, ALIGN_LEFT, ALIGN_RIGHT, BOLD_OFF, BOLD_ON, CRLF, SIZE_DOUBLE, SIZE_NORMAL,
};
use tracing::debug;

/// Bold/size/alignment mode as seen by the printer
///
/// Every job starts from the default state because jobs begin with ESC @.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StyleState {
    pub bold: bool,
    pub double_size: bool,
    pub align: Align,
}

impl StyleState {
    fn apply(&mut self, tag: Tag) {
        match tag {
            Tag::AlignOpen(align) => self.align = align,
            Tag::BoldOpen => self.bold = true,
            Tag::BoldClose => self.bold = false,
            Tag::HeadingOpen => self.double_size = true,
            Tag::HeadingClose => self.double_size = false,
            _ => {}
        }
    }
}

/// Maps the inline tag vocabulary to ESC/POS commands
#[derive(Debug, Clone, Copy)]
pub struct StyleCompiler {
    encoding: TextEncoding,
}

impl StyleCompiler {
    pub fn new(encoding: TextEncoding) -> Self {
        Self { encoding }
    }

    /// Compile laid-out lines, joined by CRLF
    pub fn compile(&self, lines: &[Row<'_>]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut state = StyleState::default();

        for (idx, line) in lines.iter().enumerate() {
            if idx > 0 {
                out.extend_from_slice(&CRLF);
            }
            for token in line {
                self.emit(token, &mut state, &mut out);
            }
        }

        if state.bold || state.double_size {
            debug!(?state, "markup left a style open");
        }
        out
    }

    fn emit(&self, token: &Token<'_>, state: &mut StyleState, out: &mut Vec<u8>) {
        let tag = match token {
            Token::Text(s) => {
                out.extend_from_slice(&self.encoding.encode(s));
                return;
            }
            Token::Newline => {
                out.extend_from_slice(&CRLF);
                return;
            }
            Token::Tag { tag, .. } => *tag,
        };

        state.apply(tag);
        match tag {
            Tag::RowOpen | Tag::Break => out.extend_from_slice(&CRLF),
            Tag::RowClose | Tag::AlignClose(_) => {}
            Tag::AlignOpen(Align::Left) => out.extend_from_slice(&ALIGN_LEFT),
            Tag::AlignOpen(Align::Center) => out.extend_from_slice(&ALIGN_CENTER),
            Tag::AlignOpen(Align::Right) => out.extend_from_slice(&ALIGN_RIGHT),
            Tag::BoldOpen => out.extend_from_slice(&BOLD_ON),
            Tag::BoldClose => out.extend_from_slice(&BOLD_OFF),
            Tag::HeadingOpen => out.extend_from_slice(&SIZE_DOUBLE),
            Tag::HeadingClose => out.extend_from_slice(&SIZE_NORMAL),
            // columns the layout did not consume print as written
            Tag::ColumnOpen | Tag::ColumnClose => {
                out.extend_from_slice(&self.encoding.encode(token.source()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::tokenizer::tokenize;

    fn compile(src: &str) -> Vec<u8> {
        StyleCompiler::new(TextEncoding::Latin1).compile(&[tokenize(src)])
    }

    #[test]
    fn test_tag_mapping() {
        assert_eq!(compile("<right>x</right>"), b"\x1B\x61\x02x".to_vec());
        assert_eq!(compile("<left>x"), b"\x1B\x61\x00x".to_vec());
        assert_eq!(compile("<h1>T</h1>"), b"\x1D\x21\x11T\x1D\x21\x00".to_vec());
        assert_eq!(compile("a<br>b"), b"a\r\nb".to_vec());
    }

    #[test]
    fn test_other_text_untouched() {
        assert_eq!(compile("<i>x</i> & <td>"), b"<i>x</i> & <td>".to_vec());
    }

    #[test]
    fn test_lines_joined_with_crlf() {
        let lines = vec![tokenize("A"), tokenize(""), tokenize("B")];
        let out = StyleCompiler::new(TextEncoding::Latin1).compile(&lines);
        assert_eq!(out, b"A\r\n\r\nB".to_vec());
    }

    #[test]
    fn test_style_state_tracking() {
        let mut state = StyleState::default();
        for token in tokenize("<center><b><h1>X</h1>") {
            if let Some(tag) = token.tag() {
                state.apply(tag);
            }
        }
        assert_eq!(
            state,
            StyleState {
                bold: true,
                double_size: false,
                align: Align::Center,
            }
        );
    }
}
