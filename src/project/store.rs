// Project persistence
use super::{FileKind, Project, ProjectFile, SubtitleState};
use crate::error::{Result, SubmythError};
use crate::fs::FileSystem;
use crate::subtitle::{SkippedBlock, SubtitleDocument, SubtitleEntry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const PROJECT_FORMAT_VERSION: u32 = 1;

pub trait ProjectStore: Send + Sync {
    /// Persist the project at its own path. The changed flag is cleared only
    /// when the write succeeds.
    fn save(&self, project: &mut Project) -> Result<()>;

    /// Load a project; its name and directory come from `path`.
    fn load(&self, path: &Path) -> Result<Project>;
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectRecord {
    version: u32,
    files: Vec<FileRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum FileRecord {
    Subtitle {
        name: String,
        dir: PathBuf,
        #[serde(default)]
        suffix: u32,
        /// Present only while the file has unsaved edits.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cues: Option<Vec<SubtitleEntry>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        skipped: Vec<SkippedBlock>,
    },
    Media {
        name: String,
        dir: PathBuf,
        #[serde(default)]
        suffix: u32,
    },
}

impl From<&ProjectFile> for FileRecord {
    fn from(file: &ProjectFile) -> Self {
        match file.kind() {
            FileKind::Subtitle(state) => {
                // A clean document is read again from disk on next open.
                let doc = match state {
                    SubtitleState::Parsed(doc) if doc.is_changed() => Some(doc),
                    _ => None,
                };
                FileRecord::Subtitle {
                    name: file.name().to_string(),
                    dir: file.dir().to_path_buf(),
                    suffix: file.suffix(),
                    cues: doc.map(|d| d.entries().cloned().collect()),
                    skipped: doc.map(|d| d.skipped_blocks().to_vec()).unwrap_or_default(),
                }
            }
            FileKind::Media => FileRecord::Media {
                name: file.name().to_string(),
                dir: file.dir().to_path_buf(),
                suffix: file.suffix(),
            },
        }
    }
}

impl From<FileRecord> for ProjectFile {
    fn from(record: FileRecord) -> Self {
        match record {
            FileRecord::Subtitle {
                name,
                dir,
                suffix,
                cues,
                skipped,
            } => {
                let state = match cues {
                    Some(cues) => SubtitleState::Parsed(
                        SubtitleDocument::from_entries(cues, true).with_skipped(skipped),
                    ),
                    None => SubtitleState::Unparsed,
                };
                ProjectFile::new(name, dir, FileKind::Subtitle(state)).with_suffix(suffix)
            }
            FileRecord::Media { name, dir, suffix } => {
                ProjectFile::media(name, dir).with_suffix(suffix)
            }
        }
    }
}

/// Stores projects as pretty-printed, versioned JSON.
pub struct JsonProjectStore {
    fs: Arc<dyn FileSystem>,
}

impl JsonProjectStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    pub fn to_json(project: &Project) -> Result<String> {
        let record = ProjectRecord {
            version: PROJECT_FORMAT_VERSION,
            files: project.files().iter().map(FileRecord::from).collect(),
        };
        Ok(serde_json::to_string_pretty(&record)?)
    }

    pub fn from_json(path: &Path, contents: &str) -> Result<Project> {
        let probe: VersionProbe = serde_json::from_str(contents)?;
        if probe.version != PROJECT_FORMAT_VERSION {
            return Err(SubmythError::UnsupportedProjectVersion(probe.version));
        }

        let record: ProjectRecord = serde_json::from_str(contents)?;
        let files = record.files.into_iter().map(ProjectFile::from).collect();
        Ok(Project::at(path)?.with_files(files))
    }
}

impl ProjectStore for JsonProjectStore {
    fn save(&self, project: &mut Project) -> Result<()> {
        let path = project.path();
        let json = Self::to_json(project)?;
        self.fs.write(&path, &json)?;
        project.mark_saved();
        info!("Saved project {} ({} files)", path.display(), project.files().len());
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Project> {
        if !self.fs.exists(path) {
            return Err(SubmythError::FileNotFound(path.display().to_string()));
        }
        let contents = self.fs.read_to_string(path)?;
        let project = Self::from_json(path, &contents)?;
        debug!("Loaded project {} ({} files)", path.display(), project.files().len());
        Ok(project)
    }
}
