use super::srt::{format_entry, parse_block, split_blocks};
use super::{SubtitleEntry, Timecode};
use crate::config::MalformedPolicy;
use crate::error::{Result, SubmythError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// A block that [`MalformedPolicy::Skip`] left out of the cues.
///
/// Its lines are kept as read and written back on render, right after the
/// cue that preceded it in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBlock {
    /// 1-based position in the source file.
    pub block: usize,
    /// Index of the last cue parsed before this block.
    pub after: Option<u32>,
    pub raw: String,
}

/// The cues of one subtitle file, keyed by cue index, plus an unsaved-changes flag.
///
/// Cues are kept and rendered in ascending index order. Parsing a file that
/// repeats an index keeps the cue parsed last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitleDocument {
    cues: BTreeMap<u32, SubtitleEntry>,
    skipped: Vec<SkippedBlock>,
    changed: bool,
}

impl SubtitleDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a document from stored cues, e.g. from a saved project.
    pub fn from_entries(entries: impl IntoIterator<Item = SubtitleEntry>, changed: bool) -> Self {
        let mut doc = Self::new();
        for entry in entries {
            doc.insert(entry);
        }
        doc.changed = changed;
        doc
    }

    pub fn with_skipped(mut self, skipped: Vec<SkippedBlock>) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn parse(raw: &str, policy: MalformedPolicy) -> Result<Self> {
        let mut doc = Self::new();
        let blocks = split_blocks(raw);
        let mut last_index = None;

        for (i, lines) in blocks.iter().enumerate() {
            match parse_block(i + 1, lines) {
                Ok(entry) => {
                    last_index = Some(entry.index);
                    if let Some(old) = doc.insert(entry) {
                        debug!("Cue {} repeated in block {}, keeping the later one", old.index, i + 1);
                    }
                }
                Err(e) if policy == MalformedPolicy::Skip => {
                    warn!("Skipping block, it will be saved unchanged: {}", e);
                    doc.skipped.push(SkippedBlock {
                        block: i + 1,
                        after: last_index,
                        raw: lines.join("\n"),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        debug!("Parsed {} cues from {} blocks", doc.len(), blocks.len());
        Ok(doc)
    }

    /// SRT text for every cue in index order, with skipped blocks in place.
    /// Does not touch the changed flag.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_skipped(&mut out, |after| after.is_none());
        for entry in self.cues.values() {
            out.push_str(&format_entry(entry));
            self.render_skipped(&mut out, |after| after == Some(entry.index));
        }
        self.render_skipped(&mut out, |after| {
            after.is_some_and(|index| !self.cues.contains_key(&index))
        });
        out
    }

    fn render_skipped(&self, out: &mut String, at: impl Fn(Option<u32>) -> bool) {
        for block in self.skipped.iter().filter(|b| at(b.after)) {
            out.push_str(&block.raw);
            out.push_str("\n\n");
        }
    }

    /// Call once the rendered text has been written out.
    pub fn mark_saved(&mut self) {
        self.changed = false;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&SubtitleEntry> {
        self.cues.get(&index)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SubtitleEntry> {
        self.cues.values()
    }

    /// Blocks the parse could not read; they are saved back unchanged.
    pub fn skipped_blocks(&self) -> &[SkippedBlock] {
        &self.skipped
    }

    /// Cues whose end time precedes their start time.
    pub fn inverted_cues(&self) -> Vec<&SubtitleEntry> {
        self.cues.values().filter(|e| e.is_inverted()).collect()
    }

    pub fn set_start(&mut self, index: u32, start: Timecode) -> Result<bool> {
        let entry = self.entry_mut(index)?;
        if entry.start == start {
            return Ok(false);
        }
        entry.start = start;
        warn_if_inverted(entry);
        self.changed = true;
        Ok(true)
    }

    pub fn set_end(&mut self, index: u32, end: Timecode) -> Result<bool> {
        let entry = self.entry_mut(index)?;
        if entry.end == end {
            return Ok(false);
        }
        entry.end = end;
        warn_if_inverted(entry);
        self.changed = true;
        Ok(true)
    }

    pub fn set_text(&mut self, index: u32, text: impl Into<String>) -> Result<bool> {
        let text = text.into();
        let entry = self.entry_mut(index)?;
        if entry.text == text {
            return Ok(false);
        }
        entry.text = text;
        self.changed = true;
        Ok(true)
    }

    fn insert(&mut self, entry: SubtitleEntry) -> Option<SubtitleEntry> {
        self.cues.insert(entry.index, entry)
    }

    fn entry_mut(&mut self, index: u32) -> Result<&mut SubtitleEntry> {
        self.cues.get_mut(&index).ok_or(SubmythError::NoSuchCue(index))
    }
}

fn warn_if_inverted(entry: &SubtitleEntry) {
    if entry.is_inverted() {
        warn!(
            "Cue {} now ends before it starts ({} > {})",
            entry.index, entry.start, entry.end
        );
    }
}

impl FromStr for SubtitleDocument {
    type Err = SubmythError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, MalformedPolicy::Fail)
    }
}

impl fmt::Display for SubtitleDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
