//! Parser for the XML subset used by world descriptions.
//!
//! Hand-rolled byte cursor over the input. Supported: one optional
//! `<?xml ...?>` declaration, comments, elements with single- or
//! double-quoted attributes, self-closing tags, text content, and the five
//! predefined character entities. Unsupported (and unneeded for world
//! files): CDATA, processing instructions, doctypes, namespaces.

use std::fmt;

use crate::element::Element;

/// Parse failure with 1-based document position.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse a complete document and return its root element.
pub fn parse(input: &str) -> Result<Element, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse_document()
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            col: self.col,
            message: message.into(),
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn starts_with(&self, prefix: &[u8]) -> bool {
        self.input[self.pos..].starts_with(prefix)
    }

    fn expect_byte(&mut self, expected: u8) -> Result<(), ParseError> {
        match self.peek_byte() {
            Some(b) if b == expected => {
                self.advance();
                Ok(())
            }
            Some(b) => Err(self.error(format!(
                "expected '{}', found '{}'",
                expected as char, b as char
            ))),
            None => Err(self.error(format!("expected '{}', found end of input", expected as char))),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Skip whitespace, comments, and (at most once, before the root) the
    /// XML declaration.
    fn skip_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_whitespace();
            if self.starts_with(b"<!--") {
                self.skip_comment()?;
            } else if self.starts_with(b"<?") {
                self.skip_declaration()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_comment(&mut self) -> Result<(), ParseError> {
        let (line, col) = (self.line, self.col);
        for _ in 0..4 {
            self.advance();
        }
        loop {
            if self.starts_with(b"-->") {
                for _ in 0..3 {
                    self.advance();
                }
                return Ok(());
            }
            if self.advance().is_none() {
                return Err(ParseError {
                    line,
                    col,
                    message: "unterminated comment".into(),
                });
            }
        }
    }

    fn skip_declaration(&mut self) -> Result<(), ParseError> {
        let (line, col) = (self.line, self.col);
        loop {
            if self.starts_with(b"?>") {
                self.advance();
                self.advance();
                return Ok(());
            }
            if self.advance().is_none() {
                return Err(ParseError {
                    line,
                    col,
                    message: "unterminated declaration".into(),
                });
            }
        }
    }

    fn parse_document(&mut self) -> Result<Element, ParseError> {
        self.skip_misc()?;
        if self.peek_byte() != Some(b'<') {
            return Err(self.error("expected a root element"));
        }
        let root = self.parse_element()?;
        self.skip_misc()?;
        if self.pos < self.input.len() {
            return Err(self.error("trailing content after the root element"));
        }
        Ok(root)
    }

    fn parse_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.' || b == b':' {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected a name"));
        }
        // Names are restricted to ASCII above.
        Ok(std::str::from_utf8(&self.input[start..self.pos])
            .expect("name bytes are ASCII")
            .to_owned())
    }

    fn parse_element(&mut self) -> Result<Element, ParseError> {
        self.expect_byte(b'<')?;
        let name = self.parse_name()?;
        let mut element = Element {
            name,
            ..Element::default()
        };

        // Attributes.
        loop {
            self.skip_whitespace();
            match self.peek_byte() {
                Some(b'/') => {
                    self.advance();
                    self.expect_byte(b'>')?;
                    return Ok(element);
                }
                Some(b'>') => {
                    self.advance();
                    break;
                }
                Some(_) => {
                    let key = self.parse_name()?;
                    self.skip_whitespace();
                    self.expect_byte(b'=')?;
                    self.skip_whitespace();
                    let value = self.parse_quoted()?;
                    element.attributes.push((key, value));
                }
                None => return Err(self.error("unterminated start tag")),
            }
        }

        // Content: children interleaved with text. Bytes are accumulated
        // raw; the input is valid UTF-8 and only split at ASCII delimiters.
        let mut text: Vec<u8> = Vec::new();
        loop {
            if self.starts_with(b"<!--") {
                self.skip_comment()?;
                continue;
            }
            if self.starts_with(b"</") {
                self.advance();
                self.advance();
                let close = self.parse_name()?;
                if close != element.name {
                    return Err(self.error(format!(
                        "mismatched close tag: expected </{}>, found </{}>",
                        element.name, close
                    )));
                }
                self.skip_whitespace();
                self.expect_byte(b'>')?;
                let text = String::from_utf8(text).expect("text bytes come from a str");
                element.text = text.trim().to_owned();
                return Ok(element);
            }
            match self.peek_byte() {
                Some(b'<') => element.children.push(self.parse_element()?),
                Some(b'&') => {
                    let mut buf = [0u8; 4];
                    text.extend_from_slice(self.parse_entity()?.encode_utf8(&mut buf).as_bytes());
                }
                Some(_) => {
                    let b = self.advance().expect("peeked byte");
                    text.push(b);
                }
                None => {
                    return Err(self.error(format!("unterminated element <{}>", element.name)));
                }
            }
        }
    }

    fn parse_quoted(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek_byte() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.error("expected a quoted attribute value")),
        };
        self.advance();
        let mut value: Vec<u8> = Vec::new();
        loop {
            match self.peek_byte() {
                Some(q) if q == quote => {
                    self.advance();
                    return Ok(String::from_utf8(value).expect("value bytes come from a str"));
                }
                Some(b'&') => {
                    let mut buf = [0u8; 4];
                    value.extend_from_slice(self.parse_entity()?.encode_utf8(&mut buf).as_bytes());
                }
                Some(b) => {
                    self.advance();
                    value.push(b);
                }
                None => return Err(self.error("unterminated attribute value")),
            }
        }
    }

    fn parse_entity(&mut self) -> Result<char, ParseError> {
        let (line, col) = (self.line, self.col);
        self.advance(); // &
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b == b';' {
                let name = &self.input[start..self.pos];
                self.advance();
                return match name {
                    b"lt" => Ok('<'),
                    b"gt" => Ok('>'),
                    b"amp" => Ok('&'),
                    b"quot" => Ok('"'),
                    b"apos" => Ok('\''),
                    other => Err(ParseError {
                        line,
                        col,
                        message: format!(
                            "unknown entity '&{};'",
                            String::from_utf8_lossy(other)
                        ),
                    }),
                };
            }
            if !b.is_ascii_alphanumeric() {
                break;
            }
            self.advance();
        }
        Err(ParseError {
            line,
            col,
            message: "unterminated entity".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document() {
        let root = parse("<world/>").unwrap();
        assert_eq!(root.name, "world");
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_declaration_comments_and_nesting() {
        let input = r#"<?xml version="1.0"?>
<!-- test world -->
<world name="empty">
  <model name="rover">
    <pose>1 0 0.5</pose>
    <!-- wheels go here -->
    <link name="chassis"/>
  </model>
</world>"#;
        let root = parse(input).unwrap();
        assert_eq!(root.name, "world");
        assert_eq!(root.attr("name"), Some("empty"));
        let model = root.child("model").unwrap();
        assert_eq!(model.attr("name"), Some("rover"));
        assert_eq!(model.child("pose").unwrap().text, "1 0 0.5");
        assert_eq!(model.child("link").unwrap().attr("name"), Some("chassis"));
    }

    #[test]
    fn test_single_quoted_attributes_and_entities() {
        let root = parse("<tag label='a &amp; b &lt;c&gt;'>x &amp; y</tag>").unwrap();
        assert_eq!(root.attr("label"), Some("a & b <c>"));
        assert_eq!(root.text, "x & y");
    }

    #[test]
    fn test_mismatched_close_tag_reports_position() {
        let err = parse("<world>\n  <model></link>\n</world>").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("mismatched close tag"));
    }

    #[test]
    fn test_unterminated_element() {
        let err = parse("<world><model>").unwrap_err();
        assert!(err.message.contains("unterminated element <model>"));
    }

    #[test]
    fn test_trailing_content_rejected() {
        let err = parse("<a/><b/>").unwrap_err();
        assert!(err.message.contains("trailing content"));
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let err = parse("<a>&copy;</a>").unwrap_err();
        assert!(err.message.contains("unknown entity"));
    }
}
