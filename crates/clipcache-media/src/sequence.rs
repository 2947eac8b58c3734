//! Numbered file sequences.
//!
//! A sequence is described by the first file of it: the last run of digits
//! in the file stem is the frame number, everything before and after it is
//! kept verbatim. A name without digits is a still sequence.

use std::path::{Path, PathBuf};

/// Longest digit run read as a frame number; longer runs keep their leading
/// digits in the head.
const MAX_FRAME_DIGITS: usize = 9;

/// File name split around its frame number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePattern {
    head: String,
    tail: String,
    number: Option<i32>,
    digits: usize,
}

impl SequencePattern {
    /// Split a path into head, frame number and tail.
    pub fn parse<P: AsRef<Path>>(path: P) -> Self {
        let full = path.as_ref().to_string_lossy().into_owned();
        let name_start = full.rfind(|c: char| c == '/' || c == '\\').map_or(0, |i| i + 1);
        let ext_start = full[name_start..]
            .rfind('.')
            .filter(|&i| i > 0)
            .map_or(full.len(), |i| name_start + i);
        let stem = &full[name_start..ext_start];

        let bytes = stem.as_bytes();
        let end = bytes.iter().rposition(|b| b.is_ascii_digit()).map(|i| i + 1);
        let Some(end) = end else {
            return Self {
                head: full[..ext_start].to_string(),
                tail: full[ext_start..].to_string(),
                number: None,
                digits: 0,
            };
        };
        let start = bytes[..end]
            .iter()
            .rposition(|b| !b.is_ascii_digit())
            .map_or(0, |i| i + 1)
            .max(end.saturating_sub(MAX_FRAME_DIGITS));

        let digits = &stem[start..end];
        Self {
            head: full[..name_start + start].to_string(),
            tail: full[name_start + end..].to_string(),
            number: digits.parse().ok(),
            digits: end - start,
        }
    }

    /// Whether the name carries no frame number.
    pub fn is_still(&self) -> bool {
        self.digits == 0
    }

    /// Frame number of the file the pattern was parsed from.
    pub fn first_frame(&self) -> Option<i32> {
        self.number
    }

    /// Number of digits the frame number is padded to.
    pub fn digits(&self) -> usize {
        self.digits
    }

    /// Path of the file holding `frame`. Still sequences ignore `frame`.
    pub fn frame_path(&self, frame: i32) -> PathBuf {
        if self.is_still() {
            return PathBuf::from(format!("{}{}", self.head, self.tail));
        }
        PathBuf::from(format!(
            "{}{:0width$}{}",
            self.head,
            frame,
            self.tail,
            width = self.digits
        ))
    }
}

/// Count consecutive existing files starting at the pattern's first frame.
pub fn probe_sequence_length(pattern: &SequencePattern) -> usize {
    let Some(first) = pattern.first_frame() else {
        return usize::from(pattern.frame_path(0).exists());
    };
    let mut count = 0;
    while pattern.frame_path(first + count as i32).exists() {
        count += 1;
    }
    tracing::debug!(first, count, "probed sequence length");
    count
}
