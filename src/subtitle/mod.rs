pub mod document;
pub mod edit;
pub mod srt;
pub mod timecode;

pub use document::{SkippedBlock, SubtitleDocument};
pub use edit::{
    escape_text, unescape_text, validate_text_edit, validate_timecode_edit, EditOutcome, Field,
    RejectReason, TextEdit, TimecodeEdit,
};
pub use timecode::Timecode;

use serde::{Deserialize, Serialize};

/// One cue of a subtitle file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    /// Cue label from the source file. Not necessarily contiguous.
    pub index: u32,
    pub start: Timecode,
    pub end: Timecode,
    pub text: String,
}

impl SubtitleEntry {
    pub fn new(index: u32, start: Timecode, end: Timecode, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    /// True when the cue ends before it starts.
    pub fn is_inverted(&self) -> bool {
        self.end < self.start
    }
}
