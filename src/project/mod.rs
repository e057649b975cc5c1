pub mod store;

pub use store::{JsonProjectStore, ProjectStore, PROJECT_FORMAT_VERSION};

use crate::error::{Result, SubmythError};
use crate::fs::FileSystem;
use crate::subtitle::SubtitleDocument;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PROJECT_EXTENSION: &str = "smpr";

/// File types a project knows about, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Subtitle,
    Wav,
    Project,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "srt" => Some(FileFormat::Subtitle),
            "wav" => Some(FileFormat::Wav),
            PROJECT_EXTENSION => Some(FileFormat::Project),
            _ => None,
        }
    }
}

/// Append `.ext` to the file name unless it already ends with it, in any case.
pub fn ensure_extension(path: &Path, ext: &str) -> PathBuf {
    let has_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext));
    if has_ext {
        return path.to_path_buf();
    }
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(ext);
    path.with_file_name(name)
}

/// Where a subtitle file is in its lazy parse.
#[derive(Debug, Clone, Default)]
pub enum SubtitleState {
    #[default]
    Unparsed,
    Parsing,
    Parsed(SubtitleDocument),
}

#[derive(Debug, Clone)]
pub enum FileKind {
    Subtitle(SubtitleState),
    Media,
}

/// How a file should be shown in the project list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Offline,
    Changed,
    Normal,
}

/// A file referenced by a project.
///
/// Two files are equal when name and directory match; the display suffix and
/// any parsed content are ignored.
#[derive(Debug, Clone)]
pub struct ProjectFile {
    name: String,
    dir: PathBuf,
    suffix: u32,
    kind: FileKind,
}

impl ProjectFile {
    pub fn subtitle(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self::new(name, dir, FileKind::Subtitle(SubtitleState::Unparsed))
    }

    pub fn media(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self::new(name, dir, FileKind::Media)
    }

    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            suffix: 0,
            kind,
        }
    }

    /// Build a subtitle or media file from its path. Project files are refused.
    pub fn from_path(path: &Path) -> Result<Self> {
        let (name, dir) = split_path(path)?;
        match FileFormat::from_path(path) {
            Some(FileFormat::Subtitle) => Ok(Self::subtitle(name, dir)),
            Some(FileFormat::Wav) => Ok(Self::media(name, dir)),
            Some(FileFormat::Project) | None => {
                Err(SubmythError::UnsupportedFormat(path.display().to_string()))
            }
        }
    }

    pub fn with_suffix(mut self, suffix: u32) -> Self {
        self.suffix = suffix;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    pub fn suffix(&self) -> u32 {
        self.suffix
    }

    pub fn kind(&self) -> &FileKind {
        &self.kind
    }

    pub fn is_subtitle(&self) -> bool {
        matches!(self.kind, FileKind::Subtitle(_))
    }

    pub fn subtitle_state(&self) -> Option<&SubtitleState> {
        match &self.kind {
            FileKind::Subtitle(state) => Some(state),
            FileKind::Media => None,
        }
    }

    pub fn subtitle_state_mut(&mut self) -> Option<&mut SubtitleState> {
        match &mut self.kind {
            FileKind::Subtitle(state) => Some(state),
            FileKind::Media => None,
        }
    }

    pub fn document(&self) -> Option<&SubtitleDocument> {
        match self.subtitle_state()? {
            SubtitleState::Parsed(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn document_mut(&mut self) -> Option<&mut SubtitleDocument> {
        match self.subtitle_state_mut()? {
            SubtitleState::Parsed(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.document().is_some()
    }

    /// Name shown in the project list, e.g. `a.srt (1)`.
    pub fn display_name(&self) -> String {
        if self.suffix == 0 {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.suffix)
        }
    }

    pub fn is_online(&self, fs: &dyn FileSystem) -> bool {
        fs.exists(&self.path())
    }

    /// True when the parsed document has unsaved edits.
    pub fn is_changed(&self) -> bool {
        self.document().is_some_and(|doc| doc.is_changed())
    }

    pub fn status(&self, fs: &dyn FileSystem) -> FileStatus {
        if !self.is_online(fs) {
            FileStatus::Offline
        } else if self.is_changed() {
            FileStatus::Changed
        } else {
            FileStatus::Normal
        }
    }

    /// Install the outcome of a background parse. `None` returns the file to
    /// the unparsed state so the parse can be requested again.
    pub fn finish_parse(&mut self, doc: Option<SubtitleDocument>) {
        if let Some(state) = self.subtitle_state_mut() {
            *state = match doc {
                Some(doc) => SubtitleState::Parsed(doc),
                None => SubtitleState::Unparsed,
            };
        }
    }
}

impl PartialEq for ProjectFile {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.dir == other.dir
    }
}

impl Eq for ProjectFile {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(usize),
    AlreadyPresent(usize),
}

/// A named set of subtitle and media files, saved as a `.smpr` file.
#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    dir: PathBuf,
    files: Vec<ProjectFile>,
    changed: bool,
}

impl Project {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            files: Vec::new(),
            changed: false,
        }
    }

    /// Project stored at `path`, named after the file.
    pub fn at(path: &Path) -> Result<Self> {
        let (name, dir) = split_path(path)?;
        Ok(Self::new(name, dir))
    }

    pub(crate) fn with_files(mut self, files: Vec<ProjectFile>) -> Self {
        self.files = files;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    pub fn files(&self) -> &[ProjectFile] {
        &self.files
    }

    pub fn file(&self, position: usize) -> Option<&ProjectFile> {
        self.files.get(position)
    }

    pub fn file_mut(&mut self, position: usize) -> Option<&mut ProjectFile> {
        self.files.get_mut(position)
    }

    pub fn position_of(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|f| f.path() == path)
    }

    pub fn files_at_mut<'a>(&'a mut self, path: &'a Path) -> impl Iterator<Item = &'a mut ProjectFile> {
        self.files.iter_mut().filter(move |f| f.path() == path)
    }

    /// Add a file, giving it a display suffix when another file has the same
    /// name in a different directory. Adding the same file twice is a no-op.
    pub fn add_file(&mut self, mut file: ProjectFile) -> AddOutcome {
        for (i, existing) in self.files.iter().enumerate() {
            if existing.name != file.name {
                continue;
            }
            if *existing == file {
                return AddOutcome::AlreadyPresent(i);
            }
            file.suffix = file.suffix.max(existing.suffix + 1);
        }

        info!("Added {} to project {}", file.display_name(), self.name);
        self.files.push(file);
        self.changed = true;
        AddOutcome::Added(self.files.len() - 1)
    }

    pub fn remove_file(&mut self, position: usize) -> Option<ProjectFile> {
        if position >= self.files.len() {
            return None;
        }
        let file = self.files.remove(position);
        info!("Removed {} from project {}", file.display_name(), self.name);
        self.changed = true;
        Some(file)
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_saved(&mut self) {
        self.changed = false;
    }
}

fn split_path(path: &Path) -> Result<(String, PathBuf)> {
    let name = path
        .file_name()
        .ok_or_else(|| SubmythError::UnsupportedFormat(path.display().to_string()))?
        .to_string_lossy()
        .into_owned();
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok((name, dir))
}
