//! Validation of in-place cell edits.
//!
//! Timecode cells accept the loose shape a user produces while typing
//! (`H:M:S,f` with one or two digits per field and up to three fractional
//! digits). A cell is only committed, and the document only marked changed,
//! when the parsed value differs from what is stored.

use super::{SubtitleDocument, Timecode};
use crate::error::{Result, SubmythError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{debug, warn};

static EDIT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{1,2}):(\d{1,2}),(\d{1,3})").expect("Invalid edit regex")
});

/// Editable column of a cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Start,
    End,
    Text,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Start => write!(f, "start"),
            Field::End => write!(f, "end"),
            Field::Text => write!(f, "text"),
        }
    }
}

impl std::str::FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" => Ok(Field::Start),
            "end" => Ok(Field::End),
            "text" => Ok(Field::Text),
            _ => Err(format!("Unknown field: {}. Use 'start', 'end', or 'text'", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NoMatch,
    MultipleMatches(usize),
    TrailingInput,
    MinuteOutOfRange(u64),
    SecondOutOfRange(u64),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoMatch => write!(f, "expected a time like HH:MM:SS,mmm"),
            RejectReason::MultipleMatches(n) => write!(f, "found {} times, expected one", n),
            RejectReason::TrailingInput => write!(f, "unexpected characters around the time"),
            RejectReason::MinuteOutOfRange(m) => write!(f, "minute {} is not in 0-59", m),
            RejectReason::SecondOutOfRange(s) => write!(f, "second {} is not in 0-59", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimecodeEdit {
    Accept(Timecode),
    Reject(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEdit {
    Accept(String),
    NoChange,
}

/// Result of applying an edit to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Committed,
    Unchanged,
    Rejected(RejectReason),
}

pub fn validate_timecode_edit(proposed: &str) -> TimecodeEdit {
    let candidate = proposed.trim();
    let matches: Vec<_> = EDIT_REGEX.captures_iter(candidate).collect();

    let caps = match matches.as_slice() {
        [] => return TimecodeEdit::Reject(RejectReason::NoMatch),
        [caps] => caps,
        many => return TimecodeEdit::Reject(RejectReason::MultipleMatches(many.len())),
    };

    if caps[0].len() != candidate.len() {
        return TimecodeEdit::Reject(RejectReason::TrailingInput);
    }

    // At most two digits per group, so these always fit.
    let number = |i: usize| caps[i].parse::<u64>().unwrap_or_default();
    let (hours, minutes, seconds) = (number(1), number(2), number(3));

    if minutes > 59 {
        return TimecodeEdit::Reject(RejectReason::MinuteOutOfRange(minutes));
    }
    if seconds > 59 {
        return TimecodeEdit::Reject(RejectReason::SecondOutOfRange(seconds));
    }

    // Fractional digits: ",5" is half a second.
    let millis = format!("{:0<3}", &caps[4]).parse::<u64>().unwrap_or_default();

    TimecodeEdit::Accept(Timecode::from_millis(
        ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis,
    ))
}

/// Compare proposed text with the stored text.
///
/// Empty lines are dropped: in SRT an empty line ends the cue, so text that
/// kept one would not read back as the same cue.
pub fn validate_text_edit(current: &str, proposed: &str) -> TextEdit {
    let text = proposed
        .lines()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text != proposed {
        warn!("Dropped empty lines from cue text");
    }

    if current == text {
        TextEdit::NoChange
    } else {
        TextEdit::Accept(text)
    }
}

/// Put cue text on one line for a single-line prompt: `\` becomes `\\` and
/// a line break becomes `\n`. Reversed exactly by [`unescape_text`].
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Read text typed on one line back into cue text. `\n` is a line break and
/// `\\` a backslash; any other backslash is kept as typed.
pub fn unescape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                chars.next();
                out.push('\n');
            }
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            _ => out.push('\\'),
        }
    }
    out
}

impl SubtitleDocument {
    /// Validate `proposed` for one cell and commit it when it is valid and new.
    pub fn apply_edit(&mut self, index: u32, field: Field, proposed: &str) -> Result<EditOutcome> {
        let entry = self.get(index).ok_or(SubmythError::NoSuchCue(index))?;

        let changed = match field {
            Field::Start | Field::End => match validate_timecode_edit(proposed) {
                TimecodeEdit::Reject(reason) => {
                    debug!("Rejected {} edit of cue {}: {}", field, index, reason);
                    return Ok(EditOutcome::Rejected(reason));
                }
                TimecodeEdit::Accept(tc) if field == Field::Start => self.set_start(index, tc)?,
                TimecodeEdit::Accept(tc) => self.set_end(index, tc)?,
            },
            Field::Text => match validate_text_edit(&entry.text, proposed) {
                TextEdit::NoChange => false,
                TextEdit::Accept(text) => self.set_text(index, text)?,
            },
        };

        Ok(if changed {
            debug!("Committed {} edit of cue {}", field, index);
            EditOutcome::Committed
        } else {
            EditOutcome::Unchanged
        })
    }
}
