//! Document session management.
//!
//! The set of open editor tabs: each pairs a text buffer with its backing
//! file and, for RML documents, a live preview document. Saving writes the
//! buffer verbatim and replaces the preview wholesale, so buffer, disk and
//! preview cannot drift apart.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};

use crate::core::preview::{DocumentId, PreviewHost};
use crate::utils::encoding;

/// One open document: its text buffer, backing file, and preview handle.
///
/// The backing path is fixed at creation; there is no rename or save-as.
pub struct EditorTab {
    pub buffer: String,
    file_path: PathBuf,
    file_name: String,
    dirty: bool,
    preview: Option<DocumentId>,
    preview_error: Option<String>,
}

impl EditorTab {
    fn new(file_path: PathBuf, buffer: String) -> Self {
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.display().to_string());
        Self {
            buffer,
            file_path,
            file_name,
            dirty: false,
            preview: None,
            preview_error: None,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn preview(&self) -> Option<DocumentId> {
        self.preview
    }

    pub fn preview_error(&self) -> Option<&str> {
        self.preview_error.as_deref()
    }

    /// Record that the text widget changed the buffer this frame.
    pub fn mark_edited(&mut self) {
        self.dirty = true;
    }

    /// Tab label, with a marker while there are unsaved changes.
    pub fn title(&self) -> String {
        if self.dirty {
            format!("*{}", self.file_name)
        } else {
            self.file_name.clone()
        }
    }

    /// Whether this document type gets a rendered preview. Stylesheets are
    /// editor-only; they reach the preview through `<link>` references.
    pub fn wants_preview(&self) -> bool {
        self.file_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("rml"))
    }

    /// Replace the preview with one built from the current buffer: the old
    /// document is closed first so the host never holds two per tab.
    fn refresh_preview(&mut self, host: &mut PreviewHost) {
        if let Some(id) = self.preview.take() {
            host.close(id);
        }
        if !self.wants_preview() {
            return;
        }
        match host.load(&self.file_path, &self.buffer) {
            Ok(id) => {
                self.preview = Some(id);
                self.preview_error = None;
            }
            Err(err) => {
                log::warn!("preview for {} not loaded: {err}", self.file_name);
                self.preview_error = Some(err.to_string());
            }
        }
    }
}

/// Outcome of a save-all pass.
pub struct SaveReport {
    pub saved: usize,
    pub failures: Vec<(String, anyhow::Error)>,
}

impl SaveReport {
    pub fn all_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The open tabs and which one is focused.
#[derive(Default)]
pub struct DocumentSession {
    tabs: Vec<EditorTab>,
    active: Option<usize>,
}

impl DocumentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self) -> &[EditorTab] {
        &self.tabs
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn set_active(&mut self, index: usize) {
        if index < self.tabs.len() {
            self.active = Some(index);
        }
    }

    pub fn active_tab(&self) -> Option<&EditorTab> {
        self.active.and_then(|index| self.tabs.get(index))
    }

    pub fn active_tab_mut(&mut self) -> Option<&mut EditorTab> {
        self.active.and_then(|index| self.tabs.get_mut(index))
    }

    /// Open a file from disk in a new focused tab; RML documents are shown
    /// in the preview immediately.
    pub fn open_existing(&mut self, path: &Path, host: &mut PreviewHost) -> Result<usize> {
        let buffer = encoding::read_document(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut tab = EditorTab::new(path.to_path_buf(), buffer);
        tab.refresh_preview(host);
        self.tabs.push(tab);
        let index = self.tabs.len() - 1;
        self.active = Some(index);
        Ok(index)
    }

    /// Create an empty file at `path` (truncating any existing content) and
    /// open it in a new focused tab. No preview exists until the first save.
    pub fn create_new(&mut self, path: &Path) -> Result<usize> {
        fs::write(path, b"").with_context(|| format!("failed to create {}", path.display()))?;
        self.tabs.push(EditorTab::new(path.to_path_buf(), String::new()));
        let index = self.tabs.len() - 1;
        self.active = Some(index);
        Ok(index)
    }

    /// Write one tab's buffer verbatim to its backing file, then rebuild
    /// its preview from the just-saved content. The dirty flag is cleared
    /// only when the write succeeded.
    pub fn save(&mut self, index: usize, host: &mut PreviewHost) -> Result<()> {
        let Some(tab) = self.tabs.get_mut(index) else {
            bail!("no open document at index {index}");
        };
        fs::write(&tab.file_path, tab.buffer.as_bytes())
            .with_context(|| format!("failed to write {}", tab.file_path.display()))?;
        tab.dirty = false;
        tab.refresh_preview(host);
        Ok(())
    }

    pub fn save_active(&mut self, host: &mut PreviewHost) -> Result<()> {
        let Some(index) = self.active else {
            bail!("no document is open");
        };
        self.save(index, host)
    }

    /// Save every tab with unsaved changes. Clean tabs are skipped so an
    /// untouched document is never rewritten or re-parsed.
    pub fn save_dirty(&mut self, host: &mut PreviewHost) -> SaveReport {
        let mut report = SaveReport {
            saved: 0,
            failures: Vec::new(),
        };
        for index in 0..self.tabs.len() {
            if !self.tabs[index].dirty {
                continue;
            }
            let name = self.tabs[index].file_name.clone();
            match self.save(index, host) {
                Ok(()) => report.saved += 1,
                Err(err) => report.failures.push((name, err)),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HI: &str = "<rml><body>Hi</body></rml>";
    const BYE: &str = "<rml><body>Bye</body></rml>";

    fn session_with_file(content: &str) -> (tempfile::TempDir, DocumentSession, PreviewHost, usize)
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.rml");
        fs::write(&path, content).unwrap();
        let mut session = DocumentSession::new();
        let mut host = PreviewHost::new();
        let index = session.open_existing(&path, &mut host).unwrap();
        (dir, session, host, index)
    }

    #[test]
    fn test_open_existing_reads_file_and_shows_preview() {
        let (_dir, session, host, index) = session_with_file(HI);
        let tab = &session.tabs()[index];
        assert_eq!(tab.buffer, HI);
        assert_eq!(tab.file_name(), "a.rml");
        assert!(!tab.is_dirty());
        let id = tab.preview().expect("rml documents are previewed on open");
        assert_eq!(host.get(id).unwrap().body.text_content(), "Hi");
        assert_eq!(session.active_index(), Some(index));
    }

    #[test]
    fn test_open_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = DocumentSession::new();
        let mut host = PreviewHost::new();
        let result = session.open_existing(&dir.path().join("absent.rml"), &mut host);
        assert!(result.is_err());
        assert!(session.is_empty());
    }

    #[test]
    fn test_open_stylesheet_has_no_preview() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("theme.rcss");
        fs::write(&path, "body { color: red; }").unwrap();
        let mut session = DocumentSession::new();
        let mut host = PreviewHost::new();
        let index = session.open_existing(&path, &mut host).unwrap();
        assert!(session.tabs()[index].preview().is_none());
        assert_eq!(host.document_count(), 0);
    }

    #[test]
    fn test_create_new_makes_empty_file_without_preview() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.rcss");
        let mut session = DocumentSession::new();
        let index = session.create_new(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"");
        let tab = &session.tabs()[index];
        assert!(tab.buffer.is_empty());
        assert!(!tab.is_dirty());
        assert!(tab.preview().is_none());
    }

    #[test]
    fn test_create_new_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.rcss");
        fs::write(&path, "old content").unwrap();
        let mut session = DocumentSession::new();
        session.create_new(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn test_edit_marks_dirty() {
        let (_dir, mut session, _host, _index) = session_with_file(HI);
        let tab = session.active_tab_mut().unwrap();
        tab.buffer = BYE.to_string();
        tab.mark_edited();
        assert!(tab.is_dirty());
        assert_eq!(tab.title(), "*a.rml");
    }

    #[test]
    fn test_save_round_trips_and_clears_dirty() {
        let (_dir, mut session, mut host, index) = session_with_file(HI);
        {
            let tab = session.active_tab_mut().unwrap();
            tab.buffer = BYE.to_string();
            tab.mark_edited();
        }
        session.save(index, &mut host).unwrap();
        let tab = &session.tabs()[index];
        assert!(!tab.is_dirty());
        assert_eq!(fs::read(tab.file_path()).unwrap(), BYE.as_bytes());
    }

    #[test]
    fn test_save_replaces_preview_without_leaking() {
        let (_dir, mut session, mut host, index) = session_with_file(HI);
        let first = session.tabs()[index].preview().unwrap();
        {
            let tab = session.active_tab_mut().unwrap();
            tab.buffer = BYE.to_string();
            tab.mark_edited();
        }
        session.save(index, &mut host).unwrap();
        let second = session.tabs()[index].preview().unwrap();
        assert_ne!(first, second);
        assert_eq!(host.document_count(), 1);
        assert_eq!(host.get(second).unwrap().body.text_content(), "Bye");
        assert!(host.get(first).is_none());
    }

    #[test]
    fn test_save_with_malformed_markup_keeps_file_saved() {
        let (_dir, mut session, mut host, index) = session_with_file(HI);
        {
            let tab = session.active_tab_mut().unwrap();
            tab.buffer = "<rml><body>broken".to_string();
            tab.mark_edited();
        }
        session.save(index, &mut host).unwrap();
        let tab = &session.tabs()[index];
        assert!(!tab.is_dirty());
        assert!(tab.preview().is_none());
        assert!(tab.preview_error().is_some());
        assert_eq!(host.document_count(), 0);
        assert_eq!(fs::read_to_string(tab.file_path()).unwrap(), "<rml><body>broken");
    }

    #[test]
    fn test_save_dirty_skips_clean_tabs() {
        let dir = tempfile::tempdir().unwrap();
        let clean_path = dir.path().join("clean.rml");
        let dirty_path = dir.path().join("dirty.rml");
        fs::write(&clean_path, HI).unwrap();
        fs::write(&dirty_path, HI).unwrap();

        let mut session = DocumentSession::new();
        let mut host = PreviewHost::new();
        session.open_existing(&clean_path, &mut host).unwrap();
        let dirty_index = session.open_existing(&dirty_path, &mut host).unwrap();
        {
            session.set_active(dirty_index);
            let tab = session.active_tab_mut().unwrap();
            tab.buffer = BYE.to_string();
            tab.mark_edited();
        }
        // Sentinel written behind the session's back: a save of the clean
        // tab would overwrite it.
        fs::write(&clean_path, "sentinel").unwrap();

        let report = session.save_dirty(&mut host);
        assert_eq!(report.saved, 1);
        assert!(report.all_ok());
        assert_eq!(fs::read_to_string(&clean_path).unwrap(), "sentinel");
        assert_eq!(fs::read_to_string(&dirty_path).unwrap(), BYE);
        assert!(session.tabs().iter().all(|tab| !tab.is_dirty()));
    }

    #[test]
    fn test_save_failure_reported_and_dirty_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.rml");
        fs::write(&path, HI).unwrap();
        let mut session = DocumentSession::new();
        let mut host = PreviewHost::new();
        let index = session.open_existing(&path, &mut host).unwrap();
        {
            let tab = session.active_tab_mut().unwrap();
            tab.buffer = BYE.to_string();
            tab.mark_edited();
        }
        // Turning the backing file into a directory makes the write fail.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let report = session.save_dirty(&mut host);
        assert_eq!(report.saved, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(session.tabs()[index].is_dirty());
    }

    #[test]
    fn test_open_edit_save_all_scenario() {
        let (_dir, mut session, mut host, index) = session_with_file(HI);
        {
            let tab = session.active_tab_mut().unwrap();
            tab.buffer = BYE.to_string();
            tab.mark_edited();
        }
        assert!(session.tabs()[index].is_dirty());
        let report = session.save_dirty(&mut host);
        assert_eq!(report.saved, 1);
        let tab = &session.tabs()[index];
        assert!(!tab.is_dirty());
        assert_eq!(fs::read_to_string(tab.file_path()).unwrap(), BYE);
        let id = tab.preview().unwrap();
        assert_eq!(host.get(id).unwrap().body.text_content(), "Bye");
    }
}
