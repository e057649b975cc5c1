use crate::loader::Dispatch;
use crate::project::{FileStatus, ProjectFile};
use crate::session::{AddFileOutcome, OpenedFile, Session};
use crate::subtitle::{
    escape_text, unescape_text, EditOutcome, Field, SubtitleDocument, SubtitleEntry,
};
use anyhow::Context;
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::PathBuf;
use std::time::Duration;

/// Widest a text cell is shown in the cue table.
const TEXT_COLUMN_WIDTH: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    NewProject,
    OpenProject,
    SaveProject,
    AddFile,
    RemoveFile,
    OpenFile,
    ShowCues,
    EditCue,
    SaveFile,
    Quit,
}

impl Action {
    fn label(&self) -> &'static str {
        match self {
            Action::NewProject => "New project",
            Action::OpenProject => "Open project",
            Action::SaveProject => "Save project",
            Action::AddFile => "Add file",
            Action::RemoveFile => "Remove file",
            Action::OpenFile => "Open file",
            Action::ShowCues => "Show cues",
            Action::EditCue => "Edit cue",
            Action::SaveFile => "Save file",
            Action::Quit => "Quit",
        }
    }
}

/// Actions that make sense in the current state, in menu order.
fn available_actions(has_project: bool, has_document: bool) -> Vec<Action> {
    let mut actions = vec![Action::NewProject, Action::OpenProject];
    if has_project {
        actions.extend([
            Action::SaveProject,
            Action::AddFile,
            Action::RemoveFile,
            Action::OpenFile,
        ]);
    }
    if has_document {
        actions.extend([Action::ShowCues, Action::EditCue, Action::SaveFile]);
    }
    actions.push(Action::Quit);
    actions
}

pub async fn run_shell(mut session: Session) -> anyhow::Result<()> {
    print_header();

    loop {
        report_parses(&mut session);
        print_files(&session);

        let actions = available_actions(
            session.selected_project().is_some(),
            session.opened_document().is_some(),
        );
        let labels: Vec<&str> = actions.iter().map(|a| a.label()).collect();
        let selection = Select::new()
            .with_prompt("What next?")
            .items(&labels)
            .default(0)
            .interact()?;

        let result = match actions[selection] {
            Action::NewProject => new_project(&mut session),
            Action::OpenProject => open_project(&mut session),
            Action::SaveProject => session.save_project().context("Failed to save project"),
            Action::AddFile => add_file(&mut session),
            Action::RemoveFile => remove_file(&mut session),
            Action::OpenFile => open_file(&mut session).await,
            Action::ShowCues => {
                if let Some(doc) = session.opened_document() {
                    print_cues(doc);
                }
                Ok(())
            }
            Action::EditCue => edit_cue(&mut session),
            Action::SaveFile => session
                .save_file()
                .map(|path| println!("{} Saved {}", style("✓").green(), path.display()))
                .context("Failed to save file"),
            Action::Quit => {
                if confirm_quit(&session)? {
                    break;
                }
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("{} {:#}", style("✗").red(), e);
        }
    }

    Ok(())
}

fn print_header() {
    println!();
    println!("{}", style("╔═══════════════════════════════════════╗").cyan());
    println!("{}", style("║      submyth - SRT subtitle editor    ║").cyan());
    println!("{}", style("╚═══════════════════════════════════════╝").cyan());
    println!();
}

fn report_parses(session: &mut Session) {
    for event in session.pump() {
        match event.result {
            Ok(count) => println!(
                "{} Parsed {} ({} cues)",
                style("✓").green(),
                event.path.display(),
                count
            ),
            Err(e) => println!("{} {}", style("✗").red(), e),
        }
    }
}

fn print_files(session: &Session) {
    let Some(project) = session.selected_project() else {
        println!("{}", style("No project open").dim());
        return;
    };

    let marker = if project.is_changed() { "*" } else { "" };
    println!("\n{}{}", style(project.name()).bold(), marker);
    if project.files().is_empty() {
        println!("  {}", style("(no files)").dim());
    }
    for (i, file) in project.files().iter().enumerate() {
        let opened = match session.opened() {
            Some(OpenedFile::Subtitle(p)) | Some(OpenedFile::Media(p)) => *p == file.path(),
            None => false,
        };
        println!(
            "  {} {:>2}. {}",
            if opened { ">" } else { " " },
            i + 1,
            styled_name(file, file.status(session.fs()))
        );
    }
    let loading = session.parses_in_flight();
    if loading > 0 {
        println!("  {}", style(format!("Loading {} file(s) ...", loading)).dim());
    }
    println!();
}

fn styled_name(file: &ProjectFile, status: FileStatus) -> String {
    let name = file.display_name();
    match status {
        FileStatus::Offline => style(format!("{} (offline)", name)).red().to_string(),
        FileStatus::Changed => style(format!("{} *", name)).yellow().to_string(),
        FileStatus::Normal => name,
    }
}

fn prompt_path(prompt: &str) -> anyhow::Result<PathBuf> {
    let path: String = Input::new().with_prompt(prompt).interact_text()?;
    Ok(PathBuf::from(path.trim()))
}

fn new_project(session: &mut Session) -> anyhow::Result<()> {
    let path = prompt_path("New project path")?;
    let project = session.new_project(&path).context("Failed to create project")?;
    println!("{} Created {}", style("✓").green(), project.path().display());
    Ok(())
}

fn open_project(session: &mut Session) -> anyhow::Result<()> {
    let path = prompt_path("Project file (.smpr)")?;
    let project = session.open_project(&path).context("Failed to open project")?;
    println!("{} Opened {}", style("✓").green(), project.name());
    Ok(())
}

fn add_file(session: &mut Session) -> anyhow::Result<()> {
    let path = prompt_path("File to add (.srt, .wav or .smpr)")?;
    match session.add_file(&path)? {
        AddFileOutcome::File(crate::project::AddOutcome::Added(_)) => {
            println!("{} Added {}", style("✓").green(), path.display())
        }
        AddFileOutcome::File(crate::project::AddOutcome::AlreadyPresent(_)) => {
            println!("{} Already in project", style("!").yellow())
        }
        AddFileOutcome::ProjectOpened => println!("{} Opened project", style("✓").green()),
    }
    Ok(())
}

fn choose_file(session: &Session, prompt: &str) -> anyhow::Result<Option<usize>> {
    let Some(project) = session.selected_project() else {
        return Ok(None);
    };
    if project.files().is_empty() {
        println!("{} No files in project", style("!").yellow());
        return Ok(None);
    }
    let names: Vec<String> = project.files().iter().map(|f| f.display_name()).collect();
    let selection = Select::new()
        .with_prompt(prompt)
        .items(&names)
        .default(0)
        .interact()?;
    Ok(Some(selection))
}

fn remove_file(session: &mut Session) -> anyhow::Result<()> {
    if let Some(position) = choose_file(session, "Remove which file?")? {
        let file = session.remove_file(position)?;
        println!("{} Removed {}", style("✓").green(), file.display_name());
    }
    Ok(())
}

async fn open_file(session: &mut Session) -> anyhow::Result<()> {
    let Some(position) = choose_file(session, "Open which file?")? else {
        return Ok(());
    };

    match session.open_file(position)? {
        Dispatch::Started | Dispatch::InFlight => {
            println!("{}", style("Loading ...").dim());
            // Give a small file the chance to finish before the menu comes back.
            tokio::time::sleep(Duration::from_millis(50)).await;
            report_parses(session);
        }
        Dispatch::AlreadyParsed => {}
        Dispatch::NotSubtitle => println!("{} Media files cannot be edited", style("!").yellow()),
    }

    if let Some(doc) = session.opened_document() {
        print_cues(doc);
        for block in doc.skipped_blocks() {
            println!(
                "{} Block {} could not be read and will be saved unchanged",
                style("!").yellow(),
                block.block
            );
        }
    }
    Ok(())
}

fn edit_cue(session: &mut Session) -> anyhow::Result<()> {
    let index: u32 = Input::new().with_prompt("Cue index").interact_text()?;
    let fields = [Field::Start, Field::End, Field::Text];
    let labels: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    let field = fields[Select::new()
        .with_prompt("Field")
        .items(&labels)
        .default(0)
        .interact()?];

    let current = session
        .opened_document()
        .and_then(|doc| doc.get(index))
        .map(|entry| cell(entry, field))
        .with_context(|| format!("No cue with index {}", index))?;

    loop {
        let proposed: String = Input::new()
            .with_prompt(format!("{} of cue {}", field, index))
            .with_initial_text(current.clone())
            .allow_empty(field == Field::Text)
            .interact_text()?;
        // Text is edited on one line: "\n" breaks it, "\\" is a backslash.
        let proposed = if field == Field::Text {
            unescape_text(&proposed)
        } else {
            proposed
        };

        match session.edit(index, field, &proposed)? {
            EditOutcome::Committed => {
                println!("{} Updated cue {}", style("✓").green(), index);
                return Ok(());
            }
            EditOutcome::Unchanged => {
                println!("{}", style("No change").dim());
                return Ok(());
            }
            EditOutcome::Rejected(reason) => {
                println!("{} {}", style("invalid:").red(), style(reason).red());
            }
        }
    }
}

fn cell(entry: &SubtitleEntry, field: Field) -> String {
    match field {
        Field::Start => entry.start.to_string(),
        Field::End => entry.end.to_string(),
        Field::Text => escape_text(&entry.text),
    }
}

fn confirm_quit(session: &Session) -> anyhow::Result<bool> {
    let unsaved = session
        .projects()
        .iter()
        .any(|p| p.is_changed() || p.files().iter().any(|f| f.is_changed()));
    if !unsaved {
        return Ok(true);
    }
    Ok(Confirm::new()
        .with_prompt("There are unsaved changes. Quit anyway?")
        .default(false)
        .interact()?)
}

/// One table row: index, start, end and the text on a single line.
pub fn format_row(entry: &SubtitleEntry) -> String {
    let mut text = entry.text.replace('\n', " / ");
    if text.chars().count() > TEXT_COLUMN_WIDTH {
        text = text.chars().take(TEXT_COLUMN_WIDTH - 1).collect::<String>() + "…";
    }
    format!("{:>5}  {}  {}  {}", entry.index, entry.start, entry.end, text)
}

pub fn print_cues(doc: &SubtitleDocument) {
    println!("\n{}", style(format!("{:>5}  {:<12}  {:<12}  text", "#", "start", "end")).bold());
    for entry in doc.entries() {
        let row = format_row(entry);
        if entry.is_inverted() {
            println!("{}", style(row).red());
        } else {
            println!("{}", row);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::Timecode;

    #[test]
    fn test_available_actions() {
        let none = available_actions(false, false);
        assert_eq!(none, vec![Action::NewProject, Action::OpenProject, Action::Quit]);

        let all = available_actions(true, true);
        assert!(all.contains(&Action::EditCue));
        assert_eq!(all.last(), Some(&Action::Quit));
        assert!(!available_actions(true, false).contains(&Action::SaveFile));
    }

    #[test]
    fn test_format_row() {
        let entry = SubtitleEntry::new(
            2,
            Timecode::from_millis(3000),
            Timecode::from_millis(4000),
            "Line one\nLine two",
        );
        assert_eq!(format_row(&entry), "    2  00:00:03,000  00:00:04,000  Line one / Line two");
    }

    #[test]
    fn test_format_row_truncates_long_text() {
        let entry = SubtitleEntry::new(1, Timecode::ZERO, Timecode::ZERO, "x".repeat(100));
        let row = format_row(&entry);
        assert!(row.ends_with('…'));
        assert_eq!(row.chars().filter(|c| *c == 'x').count(), TEXT_COLUMN_WIDTH - 1);
    }

    #[test]
    fn test_cell_escapes_newlines() {
        let entry = SubtitleEntry::new(1, Timecode::ZERO, Timecode::from_millis(1), "a\nb");
        assert_eq!(cell(&entry, Field::Text), "a\\nb");
        assert_eq!(cell(&entry, Field::End), "00:00:00,001");
    }

    #[test]
    fn test_unedited_cell_with_backslash_is_unchanged() {
        let mut doc: SubtitleDocument = "1\n00:00:01,000 --> 00:00:02,000\nC:\\new folder\nnext\n\n"
            .parse()
            .unwrap();
        let shown = cell(doc.get(1).unwrap(), Field::Text);
        assert_eq!(shown, "C:\\\\new folder\\nnext");

        let outcome = doc.apply_edit(1, Field::Text, &unescape_text(&shown)).unwrap();
        assert_eq!(outcome, EditOutcome::Unchanged);
        assert!(!doc.is_changed());
        assert_eq!(doc.get(1).unwrap().text, "C:\\new folder\nnext");
    }
}
