pub mod config;
pub mod error;
pub mod fs;
pub mod loader;
pub mod project;
pub mod session;
pub mod shell;
pub mod subtitle;

pub use config::{Config, MalformedPolicy};
pub use error::{Result, SubmythError};
pub use project::{AddOutcome, FileFormat, Project, ProjectFile, ProjectStore};
pub use session::Session;
pub use subtitle::{
    validate_text_edit, validate_timecode_edit, EditOutcome, Field, SubtitleDocument,
    SubtitleEntry, Timecode,
};
