//! RML markup parsing.
//!
//! A hand-written recursive-descent parser for the RML subset the preview
//! pane renders: nested elements, quoted attributes, self-closing tags,
//! comments, and character entities. `<style>` content is read verbatim so
//! embedded RCSS survives untouched.

use thiserror::Error;

/// Error produced when a document cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
}

/// A node in the parsed document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with its attributes and children, tag name lowercased.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Look up an attribute value by (lowercase) name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// The whitespace-separated entries of the `class` attribute.
    pub fn classes(&self) -> Vec<&str> {
        self.attribute("class")
            .map(|value| value.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// The first direct child element with the given tag name.
    pub fn find_child(&self, tag: &str) -> Option<&Element> {
        self.child_elements().find(|element| element.tag == tag)
    }

    /// All descendant text, whitespace-collapsed.
    pub fn text_content(&self) -> String {
        fn walk(element: &Element, out: &mut String) {
            for child in &element.children {
                match child {
                    Node::Text(text) => out.push_str(text),
                    Node::Element(element) => walk(element, out),
                }
            }
        }
        let mut raw = String::new();
        walk(self, &mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// A parsed RML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    /// Parse `source` into a document tree.
    pub fn parse(source: &str) -> Result<Self, MarkupError> {
        let mut parser = Parser::new(source);
        parser.skip_misc()?;
        if parser.peek() != Some('<') {
            return Err(parser.error("expected a root element"));
        }
        let root = parser.parse_element()?;
        parser.skip_misc()?;
        if parser.peek().is_some() {
            return Err(parser.error("unexpected content after the root element"));
        }
        Ok(Self { root })
    }

    pub fn head(&self) -> Option<&Element> {
        if self.root.tag == "head" {
            Some(&self.root)
        } else {
            self.root.find_child("head")
        }
    }

    pub fn body(&self) -> Option<&Element> {
        if self.root.tag == "body" {
            Some(&self.root)
        } else {
            self.root.find_child("body")
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn starts_with(&self, prefix: &str) -> bool {
        prefix
            .chars()
            .enumerate()
            .all(|(offset, ch)| self.chars.get(self.pos + offset) == Some(&ch))
    }

    fn eat_str(&mut self, prefix: &str) -> bool {
        if !self.starts_with(prefix) {
            return false;
        }
        for _ in prefix.chars() {
            self.bump();
        }
        true
    }

    fn snapshot(&self) -> (usize, usize, usize) {
        (self.pos, self.line, self.column)
    }

    fn restore(&mut self, snapshot: (usize, usize, usize)) {
        self.pos = snapshot.0;
        self.line = snapshot.1;
        self.column = snapshot.2;
    }

    fn error(&self, message: impl Into<String>) -> MarkupError {
        MarkupError::Syntax {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
            self.bump();
        }
    }

    /// Skip whitespace, comments, and processing instructions between nodes.
    fn skip_misc(&mut self) -> Result<(), MarkupError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<!--") {
                self.skip_comment()?;
            } else if self.starts_with("<?") {
                self.skip_until("?>", "unterminated processing instruction")?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_comment(&mut self) -> Result<(), MarkupError> {
        self.eat_str("<!--");
        loop {
            if self.eat_str("-->") {
                return Ok(());
            }
            if self.bump().is_none() {
                return Err(self.error("unterminated comment"));
            }
        }
    }

    fn skip_until(&mut self, terminator: &str, message: &str) -> Result<(), MarkupError> {
        loop {
            if self.eat_str(terminator) {
                return Ok(());
            }
            if self.bump().is_none() {
                return Err(self.error(message));
            }
        }
    }

    fn parse_name(&mut self) -> Result<String, MarkupError> {
        let mut name = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == ':' {
                name.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.error("expected a name"));
        }
        Ok(name)
    }

    fn parse_element(&mut self) -> Result<Element, MarkupError> {
        if self.bump() != Some('<') {
            return Err(self.error("expected '<'"));
        }
        let tag = self.parse_name()?.to_ascii_lowercase();
        let attributes = self.parse_attributes()?;
        self.skip_whitespace();
        if self.eat_str("/>") {
            return Ok(Element {
                tag,
                attributes,
                children: Vec::new(),
            });
        }
        if self.bump() != Some('>') {
            return Err(self.error(format!("malformed start tag <{tag}>")));
        }
        let children = if tag == "style" {
            self.parse_raw_text(&tag)?
        } else {
            self.parse_children(&tag)?
        };
        Ok(Element {
            tag,
            attributes,
            children,
        })
    }

    fn parse_attributes(&mut self) -> Result<Vec<(String, String)>, MarkupError> {
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('>') | Some('/') | None => return Ok(attributes),
                _ => {}
            }
            let name = self.parse_name()?.to_ascii_lowercase();
            self.skip_whitespace();
            if self.bump() != Some('=') {
                return Err(self.error(format!("attribute '{name}' is missing a value")));
            }
            self.skip_whitespace();
            let value = self.parse_quoted(&name)?;
            attributes.push((name, value));
        }
    }

    fn parse_quoted(&mut self, attr: &str) -> Result<String, MarkupError> {
        let quote = match self.peek() {
            Some(ch @ ('"' | '\'')) => ch,
            _ => return Err(self.error(format!("attribute '{attr}' value must be quoted"))),
        };
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(format!("unterminated value for attribute '{attr}'")))
                }
                Some(ch) if ch == quote => {
                    self.bump();
                    return Ok(value);
                }
                Some('&') => {
                    let entity = self.parse_entity();
                    value.push_str(&entity);
                }
                Some(ch) => {
                    value.push(ch);
                    self.bump();
                }
            }
        }
    }

    fn parse_children(&mut self, parent: &str) -> Result<Vec<Node>, MarkupError> {
        let mut children = Vec::new();
        let mut text = String::new();
        let flush = |text: &mut String, children: &mut Vec<Node>| {
            if !text.is_empty() {
                children.push(Node::Text(std::mem::take(text)));
            }
        };
        loop {
            match self.peek() {
                None => return Err(self.error(format!("missing closing tag for <{parent}>"))),
                Some('<') => {
                    if self.starts_with("<!--") {
                        self.skip_comment()?;
                        continue;
                    }
                    flush(&mut text, &mut children);
                    if self.eat_str("</") {
                        let close = self.parse_name()?.to_ascii_lowercase();
                        self.skip_whitespace();
                        if self.bump() != Some('>') {
                            return Err(self.error(format!("malformed closing tag </{close}>")));
                        }
                        if close != parent {
                            return Err(
                                self.error(format!("expected </{parent}>, found </{close}>"))
                            );
                        }
                        return Ok(children);
                    }
                    let element = self.parse_element()?;
                    children.push(Node::Element(element));
                }
                Some('&') => {
                    let entity = self.parse_entity();
                    text.push_str(&entity);
                }
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
    }

    /// Read the raw content of an element (used for `<style>`), stopping at
    /// its closing tag without interpreting markup inside.
    fn parse_raw_text(&mut self, tag: &str) -> Result<Vec<Node>, MarkupError> {
        let close = format!("</{tag}");
        let mut text = String::new();
        loop {
            if self.eat_str(&close) {
                self.skip_whitespace();
                if self.bump() != Some('>') {
                    return Err(self.error(format!("malformed closing tag for <{tag}>")));
                }
                let mut children = Vec::new();
                if !text.trim().is_empty() {
                    children.push(Node::Text(text));
                }
                return Ok(children);
            }
            match self.bump() {
                Some(ch) => text.push(ch),
                None => return Err(self.error(format!("missing closing tag for <{tag}>"))),
            }
        }
    }

    /// Decode a character entity at the current position. Unknown or
    /// malformed entities fall back to a literal ampersand.
    fn parse_entity(&mut self) -> String {
        let start = self.snapshot();
        self.bump(); // consume '&'
        let mut name = String::new();
        while name.len() < 8 {
            match self.peek() {
                Some(';') => {
                    self.bump();
                    let decoded = match name.as_str() {
                        "lt" => Some("<".to_string()),
                        "gt" => Some(">".to_string()),
                        "amp" => Some("&".to_string()),
                        "quot" => Some("\"".to_string()),
                        "apos" => Some("'".to_string()),
                        _ => decode_numeric_entity(&name),
                    };
                    match decoded {
                        Some(text) => return text,
                        None => break,
                    }
                }
                Some(ch) if ch.is_ascii_alphanumeric() || ch == '#' => {
                    name.push(ch);
                    self.bump();
                }
                _ => break,
            }
        }
        self.restore(start);
        self.bump();
        "&".to_string()
    }
}

fn decode_numeric_entity(name: &str) -> Option<String> {
    let digits = name.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code).map(|ch| ch.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Document {
        Document::parse(source).expect("document should parse")
    }

    #[test]
    fn test_parse_minimal_document() {
        let doc = parse("<rml><head></head><body>Hi</body></rml>");
        assert_eq!(doc.root.tag, "rml");
        let body = doc.body().expect("body");
        assert_eq!(body.text_content(), "Hi");
    }

    #[test]
    fn test_parse_nested_elements() {
        let doc = parse("<body><div><p>one</p><p>two</p></div></body>");
        let div = doc.body().unwrap().find_child("div").unwrap();
        assert_eq!(div.child_elements().count(), 2);
        assert_eq!(div.text_content(), "one two");
    }

    #[test]
    fn test_parse_attributes_both_quote_styles() {
        let doc = parse(r#"<body><p id="intro" class='note big'>x</p></body>"#);
        let p = doc.body().unwrap().find_child("p").unwrap();
        assert_eq!(p.id(), Some("intro"));
        assert_eq!(p.classes(), vec!["note", "big"]);
    }

    #[test]
    fn test_parse_self_closing_tag() {
        let doc = parse("<body>a<br/>b</body>");
        let body = doc.body().unwrap();
        assert!(body.find_child("br").is_some());
        assert_eq!(body.text_content(), "ab");
    }

    #[test]
    fn test_parse_comments_skipped() {
        let doc = parse("<body><!-- note --><p>x</p><!-- tail --></body>");
        assert_eq!(doc.body().unwrap().child_elements().count(), 1);
    }

    #[test]
    fn test_parse_entities() {
        let doc = parse("<body>&lt;tag&gt; &amp; &#65;</body>");
        assert_eq!(doc.body().unwrap().text_content(), "<tag> & A");
    }

    #[test]
    fn test_lone_ampersand_is_literal() {
        let doc = parse("<body>fish & chips</body>");
        assert_eq!(doc.body().unwrap().text_content(), "fish & chips");
    }

    #[test]
    fn test_style_content_is_raw() {
        let doc = parse("<rml><head><style>p { color: red; }</style></head><body></body></rml>");
        let style = doc.head().unwrap().find_child("style").unwrap();
        match &style.children[0] {
            Node::Text(text) => assert!(text.contains("color: red")),
            Node::Element(_) => panic!("style content should be text"),
        }
    }

    #[test]
    fn test_mismatched_closing_tag_errors() {
        let err = Document::parse("<body><p>x</div></body>").unwrap_err();
        let MarkupError::Syntax { message, .. } = err;
        assert!(message.contains("expected </p>"));
    }

    #[test]
    fn test_missing_closing_tag_errors() {
        assert!(Document::parse("<body><p>x").is_err());
    }

    #[test]
    fn test_error_carries_position() {
        let err = Document::parse("<body>\n  <p x></p></body>").unwrap_err();
        let MarkupError::Syntax { line, .. } = err;
        assert_eq!(line, 2);
    }

    #[test]
    fn test_trailing_content_rejected() {
        assert!(Document::parse("<body></body><body></body>").is_err());
    }

    #[test]
    fn test_processing_instruction_skipped() {
        let doc = parse("<?xml version=\"1.0\"?><rml><body>x</body></rml>");
        assert_eq!(doc.root.tag, "rml");
    }
}
