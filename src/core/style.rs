//! RCSS stylesheet engine.
//!
//! Parses the RCSS subset the preview pane understands (element, `.class`
//! and `#id` selectors; color, background-color, font-size, font-weight,
//! font-style and text-align declarations) and resolves computed styles by
//! specificity, with inline `style` attributes applied last.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::core::markup::Element;

/// Error produced when a stylesheet cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StyleError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// An opaque sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

const NAMED_COLORS: &[(&str, Color)] = &[
    ("black", Color::new(0x00, 0x00, 0x00)),
    ("silver", Color::new(0xc0, 0xc0, 0xc0)),
    ("gray", Color::new(0x80, 0x80, 0x80)),
    ("grey", Color::new(0x80, 0x80, 0x80)),
    ("white", Color::new(0xff, 0xff, 0xff)),
    ("maroon", Color::new(0x80, 0x00, 0x00)),
    ("red", Color::new(0xff, 0x00, 0x00)),
    ("purple", Color::new(0x80, 0x00, 0x80)),
    ("fuchsia", Color::new(0xff, 0x00, 0xff)),
    ("green", Color::new(0x00, 0x80, 0x00)),
    ("lime", Color::new(0x00, 0xff, 0x00)),
    ("olive", Color::new(0x80, 0x80, 0x00)),
    ("yellow", Color::new(0xff, 0xff, 0x00)),
    ("navy", Color::new(0x00, 0x00, 0x80)),
    ("blue", Color::new(0x00, 0x00, 0xff)),
    ("teal", Color::new(0x00, 0x80, 0x80)),
    ("aqua", Color::new(0x00, 0xff, 0xff)),
    ("orange", Color::new(0xff, 0xa5, 0x00)),
];

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb`, `#rrggbb`, `rgb(r, g, b)` or a basic named color.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if let Some(hex) = value.strip_prefix('#') {
            return Self::parse_hex(hex);
        }
        if let Some(args) = value.strip_prefix("rgb(").and_then(|v| v.strip_suffix(')')) {
            let parts: Vec<&str> = args.split(',').map(str::trim).collect();
            if parts.len() != 3 {
                return None;
            }
            let r = parts[0].parse().ok()?;
            let g = parts[1].parse().ok()?;
            let b = parts[2].parse().ok()?;
            return Some(Self::new(r, g, b));
        }
        NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == value)
            .map(|(_, color)| *color)
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        match hex.len() {
            3 => {
                let mut channels = hex.chars().map(|ch| ch.to_digit(16).map(|v| (v * 17) as u8));
                Some(Self::new(channels.next()??, channels.next()??, channels.next()??))
            }
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some(Self::new(r, g, b))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

static LENGTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]*\.?[0-9]+)(px|pt|em)?$").expect("length pattern is valid"));

/// A font-size value, resolved against the parent size at cascade time.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Length {
    Px(f32),
    Pt(f32),
    Em(f32),
}

impl Length {
    fn parse(value: &str) -> Option<Self> {
        let captures = LENGTH_RE.captures(value.trim())?;
        let number: f32 = captures[1].parse().ok()?;
        match captures.get(2).map(|m| m.as_str()) {
            None | Some("px") => Some(Self::Px(number)),
            Some("pt") => Some(Self::Pt(number)),
            Some("em") => Some(Self::Em(number)),
            Some(_) => None,
        }
    }

    fn resolve(self, parent_px: f32) -> f32 {
        match self {
            Self::Px(v) => v,
            Self::Pt(v) => v * 96.0 / 72.0,
            Self::Em(v) => v * parent_px,
        }
    }
}

/// The declarations of one rule or inline `style` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StyleProperties {
    color: Option<Color>,
    background_color: Option<Color>,
    font_size: Option<Length>,
    font_weight: Option<FontWeight>,
    font_style: Option<FontStyle>,
    text_align: Option<TextAlign>,
}

impl StyleProperties {
    /// Parse a `name: value; name: value` declaration list. Unknown
    /// properties and malformed values are ignored, as a stylesheet engine
    /// is expected to recover rather than reject the document.
    pub fn parse_declarations(source: &str) -> Self {
        let mut properties = Self::default();
        for declaration in source.split(';') {
            let declaration = declaration.trim();
            if declaration.is_empty() {
                continue;
            }
            let Some((name, value)) = declaration.split_once(':') else {
                continue;
            };
            properties.set(name.trim(), value.trim());
        }
        properties
    }

    fn set(&mut self, name: &str, value: &str) {
        let keyword = value.to_ascii_lowercase();
        let keyword = keyword.as_str();
        match name.to_ascii_lowercase().as_str() {
            "color" => self.color = Color::parse(value),
            "background-color" => self.background_color = Color::parse(value),
            "font-size" => self.font_size = Length::parse(value),
            "font-weight" => {
                self.font_weight = match keyword {
                    "bold" | "bolder" => Some(FontWeight::Bold),
                    "normal" => Some(FontWeight::Normal),
                    _ => None,
                }
            }
            "font-style" => {
                self.font_style = match keyword {
                    "italic" | "oblique" => Some(FontStyle::Italic),
                    "normal" => Some(FontStyle::Normal),
                    _ => None,
                }
            }
            "text-align" => {
                self.text_align = match keyword {
                    "left" => Some(TextAlign::Left),
                    "center" => Some(TextAlign::Center),
                    "right" => Some(TextAlign::Right),
                    _ => None,
                }
            }
            _ => {}
        }
    }

    fn apply_to(&self, computed: &mut ComputedStyle, parent_px: f32) {
        if let Some(color) = self.color {
            computed.color = color;
        }
        if let Some(background) = self.background_color {
            computed.background_color = Some(background);
        }
        if let Some(size) = self.font_size {
            computed.font_size = size.resolve(parent_px);
        }
        if let Some(weight) = self.font_weight {
            computed.font_weight = weight;
        }
        if let Some(style) = self.font_style {
            computed.font_style = style;
        }
        if let Some(align) = self.text_align {
            computed.text_align = align;
        }
    }
}

/// A simple selector: `*`, `tag`, `.class` or `#id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Universal,
    Tag(String),
    Class(String),
    Id(String),
}

impl Selector {
    fn parse(token: &str) -> Option<Self> {
        fn is_name(value: &str) -> bool {
            !value.is_empty()
                && value
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        }
        if token == "*" {
            return Some(Self::Universal);
        }
        if let Some(class) = token.strip_prefix('.') {
            return is_name(class).then(|| Self::Class(class.to_string()));
        }
        if let Some(id) = token.strip_prefix('#') {
            return is_name(id).then(|| Self::Id(id.to_string()));
        }
        is_name(token).then(|| Self::Tag(token.to_ascii_lowercase()))
    }

    fn specificity(&self) -> u32 {
        match self {
            Self::Universal => 0,
            Self::Tag(_) => 1,
            Self::Class(_) => 10,
            Self::Id(_) => 100,
        }
    }

    fn matches(&self, element: &Element) -> bool {
        match self {
            Self::Universal => true,
            Self::Tag(tag) => element.tag == *tag,
            Self::Class(class) => element.classes().contains(&class.as_str()),
            Self::Id(id) => element.id() == Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Rule {
    selector: Selector,
    properties: StyleProperties,
}

/// An ordered collection of style rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSheet {
    rules: Vec<Rule>,
}

impl StyleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Parse an RCSS source into a sheet.
    pub fn parse(source: &str) -> Result<Self, StyleError> {
        let cleaned = strip_comments(source)?;
        let mut sheet = Self::new();
        let mut rest = cleaned.as_str();
        let mut line = 1usize;
        loop {
            let skipped = rest.len() - rest.trim_start().len();
            line += rest[..skipped].matches('\n').count();
            rest = &rest[skipped..];
            if rest.is_empty() {
                return Ok(sheet);
            }
            let Some(open) = rest.find('{') else {
                return Err(StyleError::Syntax {
                    line,
                    message: "expected '{' after selector".into(),
                });
            };
            let selector_src = &rest[..open];
            let Some(close) = rest[open..].find('}') else {
                return Err(StyleError::Syntax {
                    line: line + selector_src.matches('\n').count(),
                    message: "unclosed declaration block".into(),
                });
            };
            let properties = StyleProperties::parse_declarations(&rest[open + 1..open + close]);
            for token in selector_src.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                match Selector::parse(token) {
                    Some(selector) => sheet.rules.push(Rule {
                        selector,
                        properties,
                    }),
                    None => log::warn!("ignoring unsupported selector '{token}'"),
                }
            }
            line += rest[..open + close + 1].matches('\n').count();
            rest = &rest[open + close + 1..];
        }
    }

    /// Append another sheet; its rules override on equal specificity.
    pub fn merge(&mut self, other: StyleSheet) {
        self.rules.extend(other.rules);
    }

    /// Compute the style of `element` given its parent's computed style.
    pub fn resolve(&self, element: &Element, parent: &ComputedStyle) -> ComputedStyle {
        let mut computed = ComputedStyle {
            background_color: None,
            ..*parent
        };
        let mut matched: Vec<(u32, usize, &StyleProperties)> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.selector.matches(element))
            .map(|(order, rule)| (rule.selector.specificity(), order, &rule.properties))
            .collect();
        matched.sort_by_key(|(specificity, order, _)| (*specificity, *order));
        let parent_px = parent.font_size;
        for (_, _, properties) in matched {
            properties.apply_to(&mut computed, parent_px);
        }
        if let Some(inline) = element.attribute("style") {
            StyleProperties::parse_declarations(inline).apply_to(&mut computed, parent_px);
        }
        computed
    }
}

/// The fully resolved style of one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputedStyle {
    pub color: Color,
    pub background_color: Option<Color>,
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub text_align: TextAlign,
}

impl ComputedStyle {
    /// The style at the document root before any rule applies.
    pub fn root() -> Self {
        Self {
            color: Color::new(0xf0, 0xf0, 0xf0),
            background_color: None,
            font_size: 14.0,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            text_align: TextAlign::Left,
        }
    }
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self::root()
    }
}

const DEFAULT_RCSS: &str = "\
body { color: #f0f0f0; font-size: 14px; }
h1 { font-size: 28px; font-weight: bold; }
h2 { font-size: 23px; font-weight: bold; }
h3 { font-size: 19px; font-weight: bold; }
h4 { font-size: 16px; font-weight: bold; }
em, i { font-style: italic; }
strong, b { font-weight: bold; }
button { color: #ffffff; background-color: #3a6ea5; }
";

/// The built-in stylesheet every preview document starts from.
pub static DEFAULT_STYLE_SHEET: Lazy<StyleSheet> =
    Lazy::new(|| StyleSheet::parse(DEFAULT_RCSS).expect("built-in stylesheet is valid"));

/// Replace `/* ... */` comments with spaces, preserving line breaks.
fn strip_comments(source: &str) -> Result<String, StyleError> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    let mut line = 1usize;
    while let Some(start) = rest.find("/*") {
        let head = &rest[..start];
        line += head.matches('\n').count();
        out.push_str(head);
        match rest[start..].find("*/") {
            Some(end) => {
                let comment = &rest[start..start + end + 2];
                for ch in comment.chars() {
                    out.push(if ch == '\n' { '\n' } else { ' ' });
                }
                line += comment.matches('\n').count();
                rest = &rest[start + end + 2..];
            }
            None => {
                return Err(StyleError::Syntax {
                    line,
                    message: "unterminated comment".into(),
                })
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}
