use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use submyth::fs::{FileSystem, LocalFs};
use submyth::loader::parse_file;
use submyth::project::{AddOutcome, FileStatus};
use submyth::session::AddFileOutcome;
use submyth::shell::{print_cues, run_shell};
use submyth::subtitle::unescape_text;
use submyth::{Config, EditOutcome, Field, Session};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "submyth")]
#[command(version, about = "Edit SRT subtitles and organise them in projects")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a subtitle file and report problems
    Check {
        /// Subtitle file (.srt)
        file: PathBuf,
    },

    /// Print the cues of a subtitle file
    Show {
        /// Subtitle file (.srt)
        file: PathBuf,
    },

    /// Change one field of one cue and save the file
    Edit {
        /// Subtitle file (.srt)
        file: PathBuf,

        /// Cue index
        index: u32,

        /// Field to change: start, end, text
        field: String,

        /// New value (HH:MM:SS,mmm for times; in text "\n" breaks the line, "\\" is a backslash)
        value: String,
    },

    /// Manage project files
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Interactive editing session
    Shell {
        /// Project to open on start
        project: Option<PathBuf>,
    },

    /// Show or change settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the settings in effect and where the config file lives
    Show,

    /// Change one setting and save the config file
    Set {
        /// malformed_blocks, parse_workers or default_project_dir
        key: String,

        value: String,
    },
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create an empty project
    New { path: PathBuf },

    /// Add subtitle or media files to a project
    Add {
        project: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List the files of a project
    List { project: PathBuf },

    /// Remove a file by its position in `project list`
    Remove { project: PathBuf, position: usize },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn resolve_project_path(config: &Config, path: &Path) -> PathBuf {
    match &config.default_project_dir {
        Some(dir) if path.is_relative() && path.parent() == Some(Path::new("")) => dir.join(path),
        _ => path.to_path_buf(),
    }
}

fn check(config: &Config, file: &Path) -> Result<()> {
    let doc = parse_file(&LocalFs, file, config.malformed_blocks)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    println!("{}: {} cues", file.display(), doc.len());
    for block in doc.skipped_blocks() {
        println!("  block {} skipped: {}", block.block, block.raw.replace('\n', " / "));
    }
    let inverted = doc.inverted_cues();
    if inverted.is_empty() {
        println!("No timing problems found");
    } else {
        for entry in inverted {
            println!(
                "  cue {} ends before it starts ({} --> {})",
                entry.index, entry.start, entry.end
            );
        }
    }
    Ok(())
}

fn edit(config: &Config, file: &Path, index: u32, field: &str, value: &str) -> Result<()> {
    let field: Field = field.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let value = if field == Field::Text {
        unescape_text(value)
    } else {
        value.to_string()
    };

    let mut doc = parse_file(&LocalFs, file, config.malformed_blocks)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    match doc.apply_edit(index, field, &value)? {
        EditOutcome::Committed => {
            LocalFs
                .write(file, &doc.render())
                .with_context(|| format!("Failed to write {}", file.display()))?;
            doc.mark_saved();
            info!("Updated {} of cue {} in {}", field, index, file.display());
        }
        EditOutcome::Unchanged => info!("Cue {} already has that {}", index, field),
        EditOutcome::Rejected(reason) => anyhow::bail!("Invalid {}: {}", field, reason),
    }
    Ok(())
}

fn project_command(config: &Config, command: ProjectCommand) -> Result<()> {
    let mut session = Session::local(config);

    match command {
        ProjectCommand::New { path } => {
            let path = resolve_project_path(config, &path);
            let project = session.new_project(&path).context("Failed to create project")?;
            println!("Created {}", project.path().display());
        }
        ProjectCommand::Add { project, files } => {
            session
                .open_project(&resolve_project_path(config, &project))
                .context("Failed to open project")?;
            for file in files {
                match session.add_file(&file)? {
                    AddFileOutcome::File(AddOutcome::Added(_)) => println!("Added {}", file.display()),
                    AddFileOutcome::File(AddOutcome::AlreadyPresent(_)) => {
                        println!("Already present: {}", file.display())
                    }
                    AddFileOutcome::ProjectOpened => {
                        anyhow::bail!("{} is a project, not a file", file.display())
                    }
                }
            }
            session.save_project().context("Failed to save project")?;
        }
        ProjectCommand::List { project } => {
            let project = session
                .open_project(&resolve_project_path(config, &project))
                .context("Failed to open project")?;
            for (i, file) in project.files().iter().enumerate() {
                let status = match file.status(&LocalFs) {
                    FileStatus::Offline => " (offline)",
                    FileStatus::Changed => " (unsaved edits)",
                    FileStatus::Normal => "",
                };
                println!("{:>3}. {}{}  {}", i + 1, file.display_name(), status, file.dir().display());
            }
        }
        ProjectCommand::Remove { project, position } => {
            session
                .open_project(&resolve_project_path(config, &project))
                .context("Failed to open project")?;
            let removed = session
                .remove_file(position.checked_sub(1).context("Positions start at 1")?)
                .context("Failed to remove file")?;
            session.save_project().context("Failed to save project")?;
            println!("Removed {}", removed.display_name());
        }
    }
    Ok(())
}

/// Update one key in the config file at `path`, leaving environment overrides out.
fn set_config_value(path: &Path, key: &str, value: &str) -> Result<Config> {
    let mut config = Config::load_from(path)?;
    config.set(key, value)?;
    config.validate().context("Configuration validation failed")?;
    config
        .save_to(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(config)
}

fn config_command(command: ConfigCommand) -> Result<()> {
    let path = Config::file_path().context("No config directory available")?;
    match command {
        ConfigCommand::Show => {
            let config = Config::load().context("Failed to load configuration")?;
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigCommand::Set { key, value } => {
            set_config_value(&path, &key, &value)?;
            info!("Set {} = {} in {}", key, value, path.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Settings stay editable even when the current ones do not validate.
    let command = match cli.command {
        Command::Config(command) => return config_command(command),
        command => command,
    };

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    match command {
        Command::Check { file } => check(&config, &file),
        Command::Show { file } => {
            let doc = parse_file(&LocalFs, &file, config.malformed_blocks)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            print_cues(&doc);
            Ok(())
        }
        Command::Edit {
            file,
            index,
            field,
            value,
        } => edit(&config, &file, index, &field, &value),
        Command::Project(command) => project_command(&config, command),
        Command::Shell { project } => {
            let mut session = Session::local(&config);
            if let Some(path) = project {
                session
                    .open_project(&resolve_project_path(&config, &path))
                    .context("Failed to open project")?;
            }
            run_shell(session).await
        }
        Command::Config(_) => Ok(()),
    }
}
