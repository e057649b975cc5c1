//! Interactive editing session.
//!
//! The session owns every open project and is driven from a single task:
//! user actions are `&mut self` methods, and the only cross-task traffic is
//! the parse completions collected by [`Session::pump`].

use crate::config::Config;
use crate::error::{Result, SubmythError};
use crate::fs::{FileSystem, LocalFs};
use crate::loader::{Completion, Dispatch, ParseScheduler};
use crate::project::{
    ensure_extension, AddOutcome, FileFormat, JsonProjectStore, Project, ProjectFile,
    ProjectStore, SubtitleState, PROJECT_EXTENSION,
};
use crate::subtitle::{EditOutcome, Field, SubtitleDocument};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The file currently shown in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenedFile {
    Subtitle(PathBuf),
    Media(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddFileOutcome {
    File(AddOutcome),
    ProjectOpened,
}

/// A parse completion after it has been installed into the project files.
#[derive(Debug)]
pub struct ParseEvent {
    pub path: PathBuf,
    /// Number of cues on success.
    pub result: Result<usize>,
}

pub struct Session {
    fs: Arc<dyn FileSystem>,
    store: Box<dyn ProjectStore>,
    scheduler: ParseScheduler,
    projects: Vec<Project>,
    selected: Option<usize>,
    opened: Option<OpenedFile>,
}

impl Session {
    pub fn new(fs: Arc<dyn FileSystem>, store: Box<dyn ProjectStore>, config: &Config) -> Self {
        Self {
            scheduler: ParseScheduler::new(fs.clone(), config),
            fs,
            store,
            projects: Vec::new(),
            selected: None,
            opened: None,
        }
    }

    /// Session over the real filesystem with JSON project files.
    pub fn local(config: &Config) -> Self {
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFs);
        let store = Box::new(JsonProjectStore::new(fs.clone()));
        Self::new(fs, store, config)
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn selected_project(&self) -> Option<&Project> {
        self.selected.and_then(|i| self.projects.get(i))
    }

    pub fn opened(&self) -> Option<&OpenedFile> {
        self.opened.as_ref()
    }

    /// Switch to another open project by name. Closes the opened file.
    pub fn select_project(&mut self, name: &str) -> bool {
        match self.projects.iter().position(|p| p.name() == name) {
            Some(i) => {
                if self.selected != Some(i) {
                    self.opened = None;
                }
                self.selected = Some(i);
                true
            }
            None => false,
        }
    }

    /// Create an empty project at `path` (`.smpr` appended if missing) and save it.
    pub fn new_project(&mut self, path: &Path) -> Result<&Project> {
        let path = ensure_extension(path, PROJECT_EXTENSION);
        let mut project = Project::at(&path)?;
        self.store.save(&mut project)?;
        info!("Created project {}", path.display());
        Ok(self.register(project))
    }

    pub fn open_project(&mut self, path: &Path) -> Result<&Project> {
        if FileFormat::from_path(path) != Some(FileFormat::Project) {
            return Err(SubmythError::UnsupportedFormat(path.display().to_string()));
        }
        let project = self.store.load(path)?;
        info!("Opened project {}", path.display());
        Ok(self.register(project))
    }

    /// Save the selected project. On failure its changed flag stays set.
    pub fn save_project(&mut self) -> Result<()> {
        let i = self.selected.ok_or(SubmythError::NoProjectSelected)?;
        self.store.save(&mut self.projects[i])
    }

    /// Add a subtitle or media file to the selected project; a project file is opened instead.
    pub fn add_file(&mut self, path: &Path) -> Result<AddFileOutcome> {
        match FileFormat::from_path(path) {
            Some(FileFormat::Project) => {
                self.open_project(path)?;
                Ok(AddFileOutcome::ProjectOpened)
            }
            _ => {
                let file = ProjectFile::from_path(path)?;
                let project = self.selected_mut()?;
                Ok(AddFileOutcome::File(project.add_file(file)))
            }
        }
    }

    pub fn remove_file(&mut self, position: usize) -> Result<ProjectFile> {
        let project = self.selected_mut()?;
        let file = project
            .remove_file(position)
            .ok_or_else(|| SubmythError::FileNotFound(format!("file #{}", position)))?;

        let removed = file.path();
        let was_opened = matches!(
            &self.opened,
            Some(OpenedFile::Subtitle(p)) | Some(OpenedFile::Media(p)) if *p == removed
        );
        if was_opened {
            self.opened = None;
        }
        Ok(file)
    }

    /// Open a file of the selected project, starting its parse if needed.
    pub fn open_file(&mut self, position: usize) -> Result<Dispatch> {
        let i = self.selected.ok_or(SubmythError::NoProjectSelected)?;
        let file = self.projects[i]
            .file_mut(position)
            .ok_or_else(|| SubmythError::FileNotFound(format!("file #{}", position)))?;

        let dispatch = self.scheduler.request(file);
        self.opened = Some(if file.is_subtitle() {
            OpenedFile::Subtitle(file.path())
        } else {
            OpenedFile::Media(file.path())
        });
        debug!("Opened {} ({:?})", file.display_name(), dispatch);
        Ok(dispatch)
    }

    /// Install every parse that has finished since the last call.
    pub fn pump(&mut self) -> Vec<ParseEvent> {
        let done = self.scheduler.poll();
        done.into_iter().map(|c| self.install(c)).collect()
    }

    /// Wait for every in-flight parse and install the results.
    pub async fn finish_parsing(&mut self) -> Vec<ParseEvent> {
        let done = self.scheduler.wait_all().await;
        done.into_iter().map(|c| self.install(c)).collect()
    }

    pub fn parses_in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    pub fn opened_file(&self) -> Option<&ProjectFile> {
        let path = match self.opened.as_ref()? {
            OpenedFile::Subtitle(p) | OpenedFile::Media(p) => p,
        };
        let project = self.selected_project()?;
        project.files().iter().find(|f| f.path() == *path)
    }

    pub fn opened_document(&self) -> Option<&SubtitleDocument> {
        self.opened_file()?.document()
    }

    /// Validate and apply an edit to the opened subtitle.
    pub fn edit(&mut self, index: u32, field: Field, proposed: &str) -> Result<EditOutcome> {
        let doc = self.opened_document_mut()?;
        doc.apply_edit(index, field, proposed)
    }

    /// Write the opened subtitle back to disk. On failure it stays marked changed.
    pub fn save_file(&mut self) -> Result<PathBuf> {
        let fs = self.fs.clone();
        let path = self.opened_subtitle_path()?;
        let doc = self.opened_document_mut()?;

        fs.write(&path, &doc.render())?;
        doc.mark_saved();
        info!("Saved {}", path.display());
        Ok(path)
    }

    fn register(&mut self, project: Project) -> &Project {
        let i = match self.projects.iter().position(|p| p.name() == project.name()) {
            Some(i) => {
                warn!("Replacing open project {}", project.name());
                self.projects[i] = project;
                i
            }
            None => {
                self.projects.push(project);
                self.projects.len() - 1
            }
        };
        self.selected = Some(i);
        self.opened = None;
        &self.projects[i]
    }

    fn selected_mut(&mut self) -> Result<&mut Project> {
        let i = self.selected.ok_or(SubmythError::NoProjectSelected)?;
        Ok(&mut self.projects[i])
    }

    fn opened_subtitle_path(&self) -> Result<PathBuf> {
        match &self.opened {
            Some(OpenedFile::Subtitle(path)) => Ok(path.clone()),
            _ => Err(SubmythError::NoFileOpened),
        }
    }

    fn opened_document_mut(&mut self) -> Result<&mut SubtitleDocument> {
        let path = self.opened_subtitle_path()?;
        let project = self.selected_mut()?;
        let position = project.position_of(&path).ok_or(SubmythError::NoFileOpened)?;
        let file = project.file_mut(position).ok_or(SubmythError::NoFileOpened)?;
        let name = file.display_name();
        file.document_mut().ok_or(SubmythError::NotParsed(name))
    }

    /// Hand a completion to every file waiting on that path, in any project.
    fn install(&mut self, completion: Completion) -> ParseEvent {
        let Completion { path, result } = completion;
        let mut waiting = 0;

        for project in &mut self.projects {
            for file in project.files_at_mut(&path) {
                if matches!(file.subtitle_state(), Some(SubtitleState::Parsing)) {
                    file.finish_parse(result.as_ref().ok().cloned());
                    waiting += 1;
                }
            }
        }

        if waiting == 0 {
            debug!("Discarding parse of {}: file no longer open", path.display());
        }

        match &result {
            Ok(doc) => info!("Parsed {} ({} cues)", path.display(), doc.len()),
            Err(e) => warn!("Failed to parse {}: {}", path.display(), e),
        }

        ParseEvent {
            path,
            result: result.map(|doc| doc.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MalformedPolicy;
    use crate::fs::MemoryFs;

    const SRT: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello world\n\n2\n00:00:03,000 --> 00:00:04,000\nLine one\nLine two\n\n";

    fn session(fs: Arc<MemoryFs>) -> Session {
        session_with(fs, &Config::default())
    }

    fn session_with(fs: Arc<MemoryFs>, config: &Config) -> Session {
        let store = Box::new(JsonProjectStore::new(fs.clone()));
        Session::new(fs, store, config)
    }

    fn fs_with_srt() -> Arc<MemoryFs> {
        Arc::new(MemoryFs::new().with_file("/subs/a.srt", SRT))
    }

    #[tokio::test]
    async fn test_new_project_is_saved_and_selected() {
        let fs = Arc::new(MemoryFs::new());
        let mut session = session(fs.clone());

        let project = session.new_project(Path::new("/p/demo")).unwrap();
        assert_eq!(project.name(), "demo.smpr");
        assert!(fs.exists(Path::new("/p/demo.smpr")));
        assert_eq!(session.selected_project().unwrap().name(), "demo.smpr");
    }

    #[tokio::test]
    async fn test_actions_need_a_project() {
        let mut session = session(Arc::new(MemoryFs::new()));
        assert!(matches!(
            session.add_file(Path::new("/subs/a.srt")),
            Err(SubmythError::NoProjectSelected)
        ));
        assert!(matches!(session.save_project(), Err(SubmythError::NoProjectSelected)));
        assert!(matches!(session.save_file(), Err(SubmythError::NoFileOpened)));
    }

    #[tokio::test]
    async fn test_open_edit_save_cycle() {
        let fs = fs_with_srt();
        let mut session = session(fs.clone());
        session.new_project(Path::new("/p/demo.smpr")).unwrap();

        session.add_file(Path::new("/subs/a.srt")).unwrap();
        assert_eq!(session.open_file(0).unwrap(), Dispatch::Started);
        assert!(matches!(
            session.edit(1, Field::Text, "x"),
            Err(SubmythError::NotParsed(_))
        ));

        let events = session.finish_parsing().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result.as_ref().unwrap(), &2);
        assert_eq!(session.open_file(0).unwrap(), Dispatch::AlreadyParsed);

        assert_eq!(
            session.edit(1, Field::Start, "00:00:01,000").unwrap(),
            EditOutcome::Unchanged
        );
        assert!(!session.opened_file().unwrap().is_changed());

        assert_eq!(
            session.edit(1, Field::Text, "Goodbye world").unwrap(),
            EditOutcome::Committed
        );
        assert!(session.opened_file().unwrap().is_changed());

        session.save_file().unwrap();
        assert!(!session.opened_file().unwrap().is_changed());
        let written = fs.contents(Path::new("/subs/a.srt")).unwrap();
        assert!(written.starts_with("1\n00:00:01,000 --> 00:00:02,500\nGoodbye world\n\n2\n"));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_changed() {
        let fs = fs_with_srt();
        let mut session = session(fs.clone());
        session.new_project(Path::new("/p/demo.smpr")).unwrap();
        session.add_file(Path::new("/subs/a.srt")).unwrap();
        session.open_file(0).unwrap();
        session.finish_parsing().await;
        session.edit(2, Field::End, "00:00:05,000").unwrap();

        fs.set_fail_writes(true);
        assert!(matches!(session.save_file(), Err(SubmythError::Io(_))));
        assert!(session.opened_document().unwrap().is_changed());
        assert_eq!(fs.contents(Path::new("/subs/a.srt")).unwrap(), SRT);
    }

    #[tokio::test]
    async fn test_parse_failure_leaves_file_retryable() {
        let fs = Arc::new(MemoryFs::new().with_file("/subs/bad.srt", "x\n\n"));
        let mut session = session(fs.clone());
        session.new_project(Path::new("/p/demo.smpr")).unwrap();
        session.add_file(Path::new("/subs/bad.srt")).unwrap();
        session.open_file(0).unwrap();

        let events = session.finish_parsing().await;
        assert!(events[0].result.is_err());
        assert!(session.opened_document().is_none());

        fs.insert("/subs/bad.srt", SRT);
        assert_eq!(session.open_file(0).unwrap(), Dispatch::Started);
        session.finish_parsing().await;
        assert_eq!(session.opened_document().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_add_project_file_opens_it() {
        let fs = Arc::new(MemoryFs::new());
        let mut session = session(fs.clone());
        session.new_project(Path::new("/p/one.smpr")).unwrap();
        session.new_project(Path::new("/p/two.smpr")).unwrap();
        assert!(session.select_project("one.smpr"));

        assert_eq!(
            session.add_file(Path::new("/p/two.smpr")).unwrap(),
            AddFileOutcome::ProjectOpened
        );
        assert_eq!(session.projects().len(), 2);
        assert_eq!(session.selected_project().unwrap().name(), "two.smpr");
    }

    #[tokio::test]
    async fn test_open_project_rejects_other_formats() {
        let mut session = session(fs_with_srt());
        assert!(matches!(
            session.open_project(Path::new("/subs/a.srt")),
            Err(SubmythError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_opened_file_closes_it() {
        let fs = fs_with_srt();
        let mut session = session(fs);
        session.new_project(Path::new("/p/demo.smpr")).unwrap();
        session.add_file(Path::new("/subs/a.srt")).unwrap();
        session.open_file(0).unwrap();

        let removed = session.remove_file(0).unwrap();
        assert_eq!(removed.name(), "a.srt");
        assert!(session.opened().is_none());

        // The parse still completes but has nowhere to go.
        let events = session.finish_parsing().await;
        assert!(events[0].result.is_ok());
    }

    #[tokio::test]
    async fn test_project_roundtrip_keeps_unsaved_edits() {
        let fs = fs_with_srt();
        let mut session = session(fs.clone());
        session.new_project(Path::new("/p/demo.smpr")).unwrap();
        session.add_file(Path::new("/subs/a.srt")).unwrap();
        session.add_file(Path::new("/other/a.srt")).unwrap();
        session.open_file(0).unwrap();
        session.finish_parsing().await;
        session.edit(1, Field::Text, "changed").unwrap();
        session.save_project().unwrap();
        assert!(!session.selected_project().unwrap().is_changed());

        let mut reopened = self::session(fs);
        let project = reopened.open_project(Path::new("/p/demo.smpr")).unwrap();
        assert_eq!(project.files()[1].display_name(), "a.srt (1)");
        let doc = project.files()[0].document().unwrap();
        assert_eq!(doc.get(1).unwrap().text, "changed");
        assert!(doc.is_changed());
    }

    #[tokio::test]
    async fn test_skip_policy_save_keeps_unreadable_blocks() {
        let raw = "1\n00:00:01,000 --> 00:00:02,000\nOK\n\n2\n00:00:03,000 -> 00:00:04\nhand-typed cue\n\n3\n00:00:05,000 --> 00:00:06,000\nalso ok\n\n";
        let fs = Arc::new(MemoryFs::new().with_file("/subs/a.srt", raw));
        let config = Config {
            malformed_blocks: MalformedPolicy::Skip,
            ..Config::default()
        };
        let mut session = session_with(fs.clone(), &config);
        session.new_project(Path::new("/p/demo.smpr")).unwrap();
        session.add_file(Path::new("/subs/a.srt")).unwrap();
        session.open_file(0).unwrap();
        session.finish_parsing().await;
        assert_eq!(session.opened_document().unwrap().skipped_blocks().len(), 1);

        session.edit(1, Field::Text, "Fine").unwrap();
        session.save_file().unwrap();

        let written = fs.contents(Path::new("/subs/a.srt")).unwrap();
        assert_eq!(written, raw.replace("\nOK\n", "\nFine\n"));
    }

    #[tokio::test]
    async fn test_clean_file_is_read_again_after_reopen() {
        let fs = fs_with_srt();
        let mut session = session(fs.clone());
        session.new_project(Path::new("/p/demo.smpr")).unwrap();
        session.add_file(Path::new("/subs/a.srt")).unwrap();
        session.open_file(0).unwrap();
        session.finish_parsing().await;
        session.save_project().unwrap();

        fs.insert("/subs/a.srt", "1\n00:00:01,000 --> 00:00:02,500\nEdited elsewhere\n\n");

        let mut reopened = self::session(fs);
        reopened.open_project(Path::new("/p/demo.smpr")).unwrap();
        assert_eq!(reopened.open_file(0).unwrap(), Dispatch::Started);
        reopened.finish_parsing().await;
        let doc = reopened.opened_document().unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.get(1).unwrap().text, "Edited elsewhere");
    }
}
