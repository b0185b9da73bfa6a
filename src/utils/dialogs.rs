//! Native file dialogs, polled per frame.
//!
//! Each dialog runs on its own thread so the frame loop never blocks; the
//! result comes back over a channel and is consumed at most once. At most
//! one dialog is in flight at a time, matching the modal behavior of the
//! native pickers.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

/// Which dialog the frame loop asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogRequest {
    OpenDocument,
    NewDocument,
    LoadFont,
}

pub struct DialogBroker {
    pending: Option<(DialogRequest, Receiver<Option<PathBuf>>)>,
}

impl DialogBroker {
    pub fn new() -> Self {
        Self { pending: None }
    }

    pub fn is_open(&self) -> bool {
        self.pending.is_some()
    }

    /// Show a dialog. Ignored while another one is already open.
    pub fn open(&mut self, request: DialogRequest, start_dir: Option<&Path>) {
        if self.pending.is_some() {
            return;
        }
        let (sender, receiver) = mpsc::channel();
        let start_dir = start_dir.map(Path::to_path_buf);
        thread::spawn(move || {
            let mut dialog = rfd::FileDialog::new();
            if let Some(dir) = start_dir {
                dialog = dialog.set_directory(dir);
            }
            let result = match request {
                DialogRequest::OpenDocument => dialog
                    .set_title("Open a document")
                    .add_filter("RML documents", &["rml", "rcss"])
                    .add_filter("All files", &["*"])
                    .pick_file(),
                DialogRequest::NewDocument => dialog
                    .set_title("Create a new document")
                    .set_file_name("untitled.rml")
                    .add_filter("RML documents", &["rml", "rcss"])
                    .save_file(),
                DialogRequest::LoadFont => dialog
                    .set_title("Load a font")
                    .add_filter("Font files", &["ttf", "otf", "ttc"])
                    .pick_file(),
            };
            // The receiver may be gone if the app exited; nothing to do then.
            let _ = sender.send(result);
        });
        self.pending = Some((request, receiver));
    }

    /// Poll for a finished dialog. A returned value consumes the result and
    /// closes the dialog; `None` in the payload means it was cancelled.
    pub fn poll(&mut self) -> Option<(DialogRequest, Option<PathBuf>)> {
        let (request, receiver) = self.pending.as_ref()?;
        let request = *request;
        match receiver.try_recv() {
            Ok(result) => {
                self.pending = None;
                Some((request, result))
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::warn!("file dialog thread ended without a result");
                self.pending = None;
                None
            }
        }
    }
}

impl Default for DialogBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_without_dialog_is_a_no_op() {
        let mut broker = DialogBroker::new();
        assert!(!broker.is_open());
        assert!(broker.poll().is_none());
    }
}
