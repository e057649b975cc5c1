// SRT subtitle format
use super::timecode::TIMECODE_PATTERN;
use super::{SubtitleEntry, Timecode};
use crate::error::{Result, SubmythError};
use once_cell::sync::Lazy;
use regex::Regex;

static TIMING_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(TIMECODE_PATTERN).expect("Invalid timing regex"));

/// Split raw SRT text into blocks of non-empty lines.
///
/// An empty line closes the current block; runs of empty lines produce no
/// blocks. A trailing block without a closing blank line is kept.
pub fn split_blocks(raw: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut lines = Vec::new();

    for line in raw.lines() {
        if line.is_empty() {
            if !lines.is_empty() {
                blocks.push(std::mem::take(&mut lines));
            }
        } else {
            lines.push(line);
        }
    }

    if !lines.is_empty() {
        blocks.push(lines);
    }

    blocks
}

/// Parse one block. `number` is the 1-based block position used in errors.
pub fn parse_block(number: usize, lines: &[&str]) -> Result<SubtitleEntry> {
    let index_line = lines
        .first()
        .ok_or_else(|| SubmythError::parse(number, "empty block"))?;
    let index = parse_index(index_line).ok_or_else(|| {
        SubmythError::parse(number, format!("no cue index in '{}'", index_line))
    })?;

    let timing_line = lines
        .get(1)
        .ok_or_else(|| SubmythError::parse(number, "missing timing line"))?;
    let (start, end) = parse_timing(timing_line).map_err(|e| match e {
        SubmythError::Format(reason) => SubmythError::parse(number, reason),
        other => other,
    })?;

    let text = lines[2..].join("\n");

    Ok(SubtitleEntry {
        index,
        start,
        end,
        text,
    })
}

/// Keep only ASCII digits and read them as the cue index.
fn parse_index(line: &str) -> Option<u32> {
    let digits: String = line.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Extract exactly two timecodes from a timing line, ignoring the arrow.
fn parse_timing(line: &str) -> Result<(Timecode, Timecode)> {
    let stamps: Vec<&str> = TIMING_REGEX.find_iter(line).map(|m| m.as_str()).collect();
    match stamps.as_slice() {
        [start, end] => Ok((start.parse()?, end.parse()?)),
        _ => Err(SubmythError::Format(format!(
            "expected 2 timecodes in '{}', found {}",
            line,
            stamps.len()
        ))),
    }
}

pub fn format_entry(entry: &SubtitleEntry) -> String {
    format!(
        "{}\n{} --> {}\n{}\n\n",
        entry.index, entry.start, entry.end, entry.text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_blocks_skips_blank_runs() {
        let blocks = split_blocks("\n\n1\na\nb\n\n\n\n2\nc\n\n");
        assert_eq!(blocks, vec![vec!["1", "a", "b"], vec!["2", "c"]]);
    }

    #[test]
    fn test_split_blocks_keeps_unterminated_tail() {
        let blocks = split_blocks("1\na\n\n2\nb");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], vec!["2", "b"]);
    }

    #[test]
    fn test_split_blocks_crlf() {
        let blocks = split_blocks("1\r\nx\r\n\r\n2\r\ny\r\n\r\n");
        assert_eq!(blocks, vec![vec!["1", "x"], vec!["2", "y"]]);
    }

    #[test]
    fn test_parse_block() {
        let entry = parse_block(
            1,
            &["7", "00:00:01,000 --> 00:00:02,500", "Line one", "Line two"],
        )
        .unwrap();
        assert_eq!(entry.index, 7);
        assert_eq!(entry.start.as_millis(), 1000);
        assert_eq!(entry.end.as_millis(), 2500);
        assert_eq!(entry.text, "Line one\nLine two");
    }

    #[test]
    fn test_index_strips_non_digits() {
        let entry = parse_block(1, &["\u{feff}#12.", "00:00:01,000 --> 00:00:02,000", "x"]).unwrap();
        assert_eq!(entry.index, 12);
    }

    #[test]
    fn test_index_without_digits() {
        let err = parse_block(3, &["abc", "00:00:01,000 --> 00:00:02,000", "x"]).unwrap_err();
        assert!(matches!(err, SubmythError::Parse { block: 3, .. }));
    }

    #[test]
    fn test_timing_ignores_surrounding_text() {
        let entry = parse_block(1, &["1", "00:00:01,000 --> 00:00:02,000 X1:40 X2:600", "x"]).unwrap();
        assert_eq!(entry.end.as_millis(), 2000);
    }

    #[test]
    fn test_timing_needs_exactly_two() {
        for timing in [
            "00:00:01,000",
            "00:00:01,000 --> 00:00:02,000 --> 00:00:03,000",
            "no timing here",
        ] {
            let err = parse_block(2, &["1", timing, "x"]).unwrap_err();
            assert!(matches!(err, SubmythError::Parse { block: 2, .. }), "{timing}");
        }
    }

    #[test]
    fn test_missing_timing_line() {
        let err = parse_block(1, &["1"]).unwrap_err();
        assert!(matches!(err, SubmythError::Parse { block: 1, .. }));
    }

    #[test]
    fn test_out_of_range_timecode_in_timing_line() {
        let err = parse_block(4, &["1", "00:61:00,000 --> 00:62:00,000", "x"]).unwrap_err();
        assert!(matches!(err, SubmythError::Parse { block: 4, .. }));
    }

    #[test]
    fn test_format_entry() {
        let entry = SubtitleEntry::new(
            1,
            Timecode::from_millis(1500),
            Timecode::from_millis(4000),
            "Hello, world!",
        );
        assert_eq!(
            format_entry(&entry),
            "1\n00:00:01,500 --> 00:00:04,000\nHello, world!\n\n"
        );
    }
}
