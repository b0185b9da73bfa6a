//! Font registry persisted to a flat list file.
//!
//! `fonts.txt` holds one font file path per line. The whole list is read at
//! startup and installed as fallback faces behind the built-in fonts; new
//! registrations append to the file and take effect on the next start.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

pub struct FontRegistry {
    list_path: PathBuf,
    entries: Vec<PathBuf>,
}

impl FontRegistry {
    /// Read the font list, creating an empty list file if none exists.
    pub fn load(list_path: PathBuf) -> io::Result<Self> {
        if !list_path.exists() {
            fs::write(&list_path, b"")?;
        }
        let content = fs::read_to_string(&list_path)?;
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect();
        Ok(Self { list_path, entries })
    }

    /// A registry with no extra fonts, used when the list file is unreadable.
    pub fn empty(list_path: PathBuf) -> Self {
        Self {
            list_path,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Append a font path to the list file. The font is installed on the
    /// next start; egui font families are fixed once the context is built.
    pub fn register(&mut self, path: &Path) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.list_path)?;
        writeln!(file, "{}", path.display())?;
        self.entries.push(path.to_path_buf());
        Ok(())
    }

    /// Build the font set: the built-in faces plus every listed font file,
    /// appended as fallbacks to both families. Each path is installed at
    /// most once; unreadable files are skipped with a warning.
    pub fn font_definitions(&self) -> egui::FontDefinitions {
        let mut fonts = egui::FontDefinitions::default();
        for path in &self.entries {
            let name = path.display().to_string();
            if fonts.font_data.contains_key(&name) {
                continue;
            }
            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    log::warn!("skipping font {name}: {err}");
                    continue;
                }
            };
            fonts
                .font_data
                .insert(name.clone(), egui::FontData::from_owned(bytes));
            for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
                if let Some(faces) = fonts.families.get_mut(&family) {
                    faces.push(name.clone());
                }
            }
            log::info!("loaded font {name}");
        }
        fonts
    }
}
