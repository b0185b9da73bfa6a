//! Preview document hosting.
//!
//! Plays the renderer role for the document session: previews are loaded
//! wholesale from a source buffer, addressed through opaque handles, and
//! closed before being replaced. The tree and resolved stylesheet are kept
//! here; drawing happens in the UI layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::markup::{Document, Element, MarkupError, Node};
use crate::core::style::{StyleError, StyleSheet, DEFAULT_STYLE_SHEET};

/// Error produced when a source buffer cannot be shown as a preview.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Markup(#[from] MarkupError),
    #[error(transparent)]
    Style(#[from] StyleError),
    #[error("document has no <body> element")]
    MissingBody,
}

/// Opaque handle to a loaded preview document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

/// A fully loaded preview: parsed body, resolved stylesheet, and the
/// source it was built from (kept for stylesheet reloads).
#[derive(Debug)]
pub struct PreviewDocument {
    pub source_path: PathBuf,
    pub title: Option<String>,
    pub body: Element,
    pub styles: StyleSheet,
    source: String,
}

/// Owns every currently shown preview document.
#[derive(Debug, Default)]
pub struct PreviewHost {
    documents: HashMap<DocumentId, PreviewDocument>,
    next_id: u64,
}

impl PreviewHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `source` and show it as a new preview document. Linked
    /// stylesheets are resolved relative to `path`.
    pub fn load(&mut self, path: &Path, source: &str) -> Result<DocumentId, PreviewError> {
        let document = build_document(path, source)?;
        self.next_id += 1;
        let id = DocumentId(self.next_id);
        log::debug!("loaded preview document {}", path.display());
        self.documents.insert(id, document);
        Ok(id)
    }

    /// Unload a previously shown document. Unknown handles are ignored.
    pub fn close(&mut self, id: DocumentId) {
        if self.documents.remove(&id).is_none() {
            log::debug!("close of unknown preview document ignored");
        }
    }

    pub fn get(&self, id: DocumentId) -> Option<&PreviewDocument> {
        self.documents.get(&id)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Rebuild every loaded document from its retained source, picking up
    /// edits to linked stylesheets. Documents that fail to rebuild keep
    /// their previous state. Returns the number of documents refreshed.
    pub fn reload_styles(&mut self) -> usize {
        let ids: Vec<DocumentId> = self.documents.keys().copied().collect();
        let mut refreshed = 0;
        for id in ids {
            let (path, source) = {
                let document = &self.documents[&id];
                (document.source_path.clone(), document.source.clone())
            };
            match build_document(&path, &source) {
                Ok(document) => {
                    self.documents.insert(id, document);
                    refreshed += 1;
                }
                Err(err) => {
                    log::warn!("stylesheet reload for {} failed: {err}", path.display());
                }
            }
        }
        refreshed
    }
}

fn build_document(path: &Path, source: &str) -> Result<PreviewDocument, PreviewError> {
    let document = Document::parse(source)?;
    let body = document.body().ok_or(PreviewError::MissingBody)?.clone();
    let mut styles = DEFAULT_STYLE_SHEET.clone();
    let mut title = None;
    if let Some(head) = document.head() {
        for link in head.child_elements().filter(|el| el.tag == "link") {
            if !is_stylesheet_link(link) {
                continue;
            }
            let Some(href) = link.attribute("href") else {
                continue;
            };
            let target = path.parent().unwrap_or_else(|| Path::new(".")).join(href);
            match std::fs::read_to_string(&target) {
                Ok(rcss) => match StyleSheet::parse(&rcss) {
                    Ok(sheet) => styles.merge(sheet),
                    Err(err) => {
                        log::warn!("ignoring stylesheet {}: {err}", target.display());
                    }
                },
                Err(err) => log::warn!("stylesheet {} not read: {err}", target.display()),
            }
        }
        // Inline blocks are part of the document itself; errors fail the load.
        for style in head.child_elements().filter(|el| el.tag == "style") {
            styles.merge(StyleSheet::parse(&raw_text(style))?);
        }
        title = head
            .find_child("title")
            .map(Element::text_content)
            .filter(|text| !text.is_empty());
    }
    Ok(PreviewDocument {
        source_path: path.to_path_buf(),
        title,
        body,
        styles,
        source: source.to_string(),
    })
}

fn is_stylesheet_link(link: &Element) -> bool {
    link.attribute("type")
        .is_some_and(|value| value.eq_ignore_ascii_case("text/rcss"))
        || link.attribute("href").is_some_and(|href| href.ends_with(".rcss"))
}

fn raw_text(element: &Element) -> String {
    let mut out = String::new();
    for child in &element.children {
        if let Node::Text(text) = child {
            out.push_str(text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::style::{Color, ComputedStyle};
    use std::fs;

    const MINIMAL: &str = "<rml><head><title>Demo</title></head><body><p>Hi</p></body></rml>";

    #[test]
    fn test_load_and_get() {
        let mut host = PreviewHost::new();
        let id = host.load(Path::new("demo.rml"), MINIMAL).unwrap();
        assert_eq!(host.document_count(), 1);
        let document = host.get(id).unwrap();
        assert_eq!(document.title.as_deref(), Some("Demo"));
        assert_eq!(document.body.text_content(), "Hi");
    }

    #[test]
    fn test_close_unloads() {
        let mut host = PreviewHost::new();
        let id = host.load(Path::new("demo.rml"), MINIMAL).unwrap();
        host.close(id);
        assert_eq!(host.document_count(), 0);
        assert!(host.get(id).is_none());
    }

    #[test]
    fn test_close_stale_handle_is_ignored() {
        let mut host = PreviewHost::new();
        let id = host.load(Path::new("demo.rml"), MINIMAL).unwrap();
        host.close(id);
        host.close(id);
        assert_eq!(host.document_count(), 0);
    }

    #[test]
    fn test_handles_are_distinct() {
        let mut host = PreviewHost::new();
        let first = host.load(Path::new("demo.rml"), MINIMAL).unwrap();
        let second = host.load(Path::new("demo.rml"), MINIMAL).unwrap();
        assert_ne!(first, second);
        assert_eq!(host.document_count(), 2);
    }

    #[test]
    fn test_missing_body_is_an_error() {
        let mut host = PreviewHost::new();
        let result = host.load(Path::new("demo.rml"), "<rml><head></head></rml>");
        assert!(matches!(result, Err(PreviewError::MissingBody)));
    }

    #[test]
    fn test_inline_style_block_applies() {
        let mut host = PreviewHost::new();
        let source = "<rml><head><style>p { color: #ff0000; }</style></head>\
                      <body><p>x</p></body></rml>";
        let id = host.load(Path::new("demo.rml"), source).unwrap();
        let document = host.get(id).unwrap();
        let p = document.body.find_child("p").unwrap();
        let computed = document.styles.resolve(p, &ComputedStyle::root());
        assert_eq!(computed.color, Color::new(255, 0, 0));
    }

    #[test]
    fn test_malformed_inline_style_fails_load() {
        let mut host = PreviewHost::new();
        let source = "<rml><head><style>p { color: red;</style></head><body></body></rml>";
        assert!(host.load(Path::new("demo.rml"), source).is_err());
        assert_eq!(host.document_count(), 0);
    }

    #[test]
    fn test_linked_stylesheet_resolved_relative_to_document() {
        let dir = tempfile::tempdir().unwrap();
        let sheet_path = dir.path().join("style.rcss");
        fs::write(&sheet_path, "#x { color: #00ff00; }").unwrap();
        let doc_path = dir.path().join("doc.rml");
        let source = "<rml><head><link type=\"text/rcss\" href=\"style.rcss\"/></head>\
                      <body><p id=\"x\">x</p></body></rml>";

        let mut host = PreviewHost::new();
        let id = host.load(&doc_path, source).unwrap();
        let document = host.get(id).unwrap();
        let p = document.body.find_child("p").unwrap();
        let computed = document.styles.resolve(p, &ComputedStyle::root());
        assert_eq!(computed.color, Color::new(0, 255, 0));
    }

    #[test]
    fn test_missing_linked_stylesheet_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("doc.rml");
        let source = "<rml><head><link type=\"text/rcss\" href=\"absent.rcss\"/></head>\
                      <body><p>x</p></body></rml>";
        let mut host = PreviewHost::new();
        assert!(host.load(&doc_path, source).is_ok());
    }

    #[test]
    fn test_reload_styles_picks_up_stylesheet_edits() {
        let dir = tempfile::tempdir().unwrap();
        let sheet_path = dir.path().join("style.rcss");
        fs::write(&sheet_path, "p { color: #ff0000; }").unwrap();
        let doc_path = dir.path().join("doc.rml");
        let source = "<rml><head><link type=\"text/rcss\" href=\"style.rcss\"/></head>\
                      <body><p>x</p></body></rml>";

        let mut host = PreviewHost::new();
        let id = host.load(&doc_path, source).unwrap();
        fs::write(&sheet_path, "p { color: #0000ff; }").unwrap();
        assert_eq!(host.reload_styles(), 1);

        let document = host.get(id).unwrap();
        let p = document.body.find_child("p").unwrap();
        let computed = document.styles.resolve(p, &ComputedStyle::root());
        assert_eq!(computed.color, Color::new(0, 0, 255));
    }
}
