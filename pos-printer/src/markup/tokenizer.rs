//! Tag tokenizer
//!
//! One pass over the document turns it into text runs, newlines and the
//! fixed tag vocabulary. Anything that looks like a tag but is not in the
//! vocabulary stays literal text.

use std::borrow::Cow;

/// Horizontal alignment selected by `<left>`, `<center>` and `<right>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Recognized markup tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    RowOpen,
    RowClose,
    Break,
    ColumnOpen,
    ColumnClose,
    AlignOpen(Align),
    AlignClose(Align),
    BoldOpen,
    BoldClose,
    HeadingOpen,
    HeadingClose,
}

/// Bytes searched for the `>` closing a tag
///
/// Longer than every tag in the vocabulary plus whitespace inside `<br />`;
/// keeps a stray `<` from scanning the rest of the document.
const MAX_TAG_SCAN: usize = 32;

const TAGS: &[(&str, Tag)] = &[
    ("tr", Tag::RowOpen),
    ("/tr", Tag::RowClose),
    ("td", Tag::ColumnOpen),
    ("/td", Tag::ColumnClose),
    ("center", Tag::AlignOpen(Align::Center)),
    ("/center", Tag::AlignClose(Align::Center)),
    ("left", Tag::AlignOpen(Align::Left)),
    ("/left", Tag::AlignClose(Align::Left)),
    ("right", Tag::AlignOpen(Align::Right)),
    ("/right", Tag::AlignClose(Align::Right)),
    ("b", Tag::BoldOpen),
    ("/b", Tag::BoldClose),
    ("h1", Tag::HeadingOpen),
    ("/h1", Tag::HeadingClose),
];

impl Tag {
    /// Canonical markup for tags synthesized by later stages
    pub fn markup(self) -> &'static str {
        match self {
            Tag::RowOpen => "<tr>",
            Tag::RowClose => "</tr>",
            Tag::Break => "<br>",
            Tag::ColumnOpen => "<td>",
            Tag::ColumnClose => "</td>",
            Tag::AlignOpen(Align::Left) => "<left>",
            Tag::AlignOpen(Align::Center) => "<center>",
            Tag::AlignOpen(Align::Right) => "<right>",
            Tag::AlignClose(Align::Left) => "</left>",
            Tag::AlignClose(Align::Center) => "</center>",
            Tag::AlignClose(Align::Right) => "</right>",
            Tag::BoldOpen => "<b>",
            Tag::BoldClose => "</b>",
            Tag::HeadingOpen => "<h1>",
            Tag::HeadingClose => "</h1>",
        }
    }

    fn is_alignment(self) -> bool {
        matches!(self, Tag::AlignOpen(_) | Tag::AlignClose(_))
    }
}

/// A unit of the token stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Literal text (never contains a newline)
    Text(Cow<'a, str>),
    /// `\n` or `\r\n` in the source
    Newline,
    /// A recognized tag and the source text it was read from
    Tag { tag: Tag, raw: &'a str },
}

impl<'a> Token<'a> {
    /// Token for a tag that did not come from the source
    pub fn synthetic(tag: Tag) -> Self {
        Token::Tag {
            tag,
            raw: tag.markup(),
        }
    }

    pub fn tag(&self) -> Option<Tag> {
        match self {
            Token::Tag { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    pub fn is_alignment(&self) -> bool {
        self.tag().is_some_and(Tag::is_alignment)
    }

    /// Source text of this token
    pub fn source(&self) -> &str {
        match self {
            Token::Text(s) => s,
            Token::Newline => "\n",
            Token::Tag { raw, .. } => raw,
        }
    }
}

/// One output line, before column layout
pub type Row<'a> = Vec<Token<'a>>;

/// Split a document into tokens
pub fn tokenize(document: &str) -> Vec<Token<'_>> {
    let bytes = document.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                let end = if i > text_start && bytes[i - 1] == b'\r' { i - 1 } else { i };
                flush(&mut tokens, document, text_start, end);
                tokens.push(Token::Newline);
                i += 1;
                text_start = i;
            }
            b'<' => {
                let tag = bytes[i + 1..]
                    .iter()
                    .take(MAX_TAG_SCAN)
                    .position(|&b| b == b'>')
                    .and_then(|len| parse_tag(&document[i + 1..i + 1 + len]).map(|t| (t, len)));

                match tag {
                    Some((tag, len)) => {
                        flush(&mut tokens, document, text_start, i);
                        let end = i + len + 2;
                        tokens.push(Token::Tag {
                            tag,
                            raw: &document[i..end],
                        });
                        i = end;
                        text_start = i;
                    }
                    // Not a tag we know: '<' is literal, keep scanning after it
                    None => i += 1,
                }
            }
            _ => i += 1,
        }
    }
    flush(&mut tokens, document, text_start, bytes.len());

    tokens
}

fn flush<'a>(tokens: &mut Vec<Token<'a>>, document: &'a str, start: usize, end: usize) {
    if end > start {
        tokens.push(Token::Text(Cow::Borrowed(&document[start..end])));
    }
}

/// Recognize the inside of `<...>`
fn parse_tag(inner: &str) -> Option<Tag> {
    if let Some(&(_, tag)) = TAGS.iter().find(|(name, _)| name.eq_ignore_ascii_case(inner)) {
        return Some(tag);
    }

    // <br>, <br/>, <br />
    let prefix = inner.get(..2).filter(|p| p.eq_ignore_ascii_case("br"))?;
    let rest = inner[prefix.len()..].trim_start();
    (rest.is_empty() || rest == "/").then_some(Tag::Break)
}

/// Split a token stream into rows
///
/// Row boundaries come from `<tr>` and newlines; `</tr>` is consumed.
/// Empty rows opened by `<tr>` before any content are dropped. `<br>` is
/// kept as a token so it survives column layout.
pub fn split_rows(tokens: Vec<Token<'_>>) -> Vec<Row<'_>> {
    let mut rows = Vec::new();
    let mut current = Vec::new();

    for token in tokens {
        match token.tag() {
            Some(Tag::RowOpen) => {
                if rows.is_empty() && current.is_empty() {
                    continue;
                }
                rows.push(std::mem::take(&mut current));
            }
            Some(Tag::RowClose) => {}
            _ if token == Token::Newline => rows.push(std::mem::take(&mut current)),
            _ => current.push(token),
        }
    }
    rows.push(current);

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Token<'_> {
        Token::Text(Cow::Borrowed(s))
    }

    #[test]
    fn test_tokenize_tags_and_text() {
        let tokens = tokenize("<b>HI</B> there");
        assert_eq!(
            tokens,
            vec![
                Token::Tag { tag: Tag::BoldOpen, raw: "<b>" },
                text("HI"),
                Token::Tag { tag: Tag::BoldClose, raw: "</B>" },
                text(" there"),
            ]
        );
    }

    #[test]
    fn test_break_variants() {
        for src in ["<br>", "<br/>", "<br />", "<BR  />"] {
            assert_eq!(tokenize(src), vec![Token::Tag { tag: Tag::Break, raw: src }]);
        }
        assert_eq!(tokenize("<brx>"), vec![text("<brx>")]);
    }

    #[test]
    fn test_unknown_tags_are_text() {
        assert_eq!(tokenize("<i>x</i>"), vec![text("<i>x</i>")]);
        assert_eq!(tokenize("a < b"), vec![text("a < b")]);
    }

    #[test]
    fn test_many_stray_angles_stay_text() {
        let mut doc = "<".repeat(1_000_000);
        doc.push('>');
        let tokens = tokenize(&doc);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].source().len(), doc.len());
    }

    #[test]
    fn test_tag_beyond_scan_window_is_text() {
        let padded = format!("<br{}/>", " ".repeat(40));
        assert_eq!(tokenize(&padded), vec![text(&padded)]);
        assert_eq!(tokenize("<br    />").len(), 1);
        assert_eq!(tokenize("<br    />")[0].tag(), Some(Tag::Break));
    }

    #[test]
    fn test_stray_angle_before_tag() {
        assert_eq!(
            tokenize("<<b>"),
            vec![text("<"), Token::Tag { tag: Tag::BoldOpen, raw: "<b>" }]
        );
    }

    #[test]
    fn test_crlf_is_one_newline() {
        assert_eq!(
            tokenize("a\r\nb\nc"),
            vec![text("a"), Token::Newline, text("b"), Token::Newline, text("c")]
        );
    }

    #[test]
    fn test_split_rows() {
        let rows = split_rows(tokenize("<tr>A</tr><tr>B</tr>"));
        assert_eq!(rows, vec![vec![text("A")], vec![text("B")]]);
    }

    #[test]
    fn test_split_rows_keeps_breaks() {
        let rows = split_rows(tokenize("<tr><td>a<br>b</td>"));
        assert_eq!(rows.len(), 1);
        assert!(rows[0].iter().any(|t| t.tag() == Some(Tag::Break)));
    }

    #[test]
    fn test_split_rows_newlines() {
        let rows = split_rows(tokenize("A\n\nB"));
        assert_eq!(rows, vec![vec![text("A")], vec![], vec![text("B")]]);
    }
}
