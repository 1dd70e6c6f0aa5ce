//! Inspects chapter text for malformed fenced code blocks. Findings are
//! warnings: they never stop assembly, but the build reports them and exits
//! unsuccessfully once every chapter has been merged.

use std::fmt;

const FENCE: &str = "```";

/// A problem with a chapter's code fences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
    /// The chapter has an odd number of fence markers, so one block never
    /// closes.
    UnterminatedFence { markers: usize },

    /// The opening fence on `line` (1-based) has no language annotation.
    MissingLanguage { line: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Warning::UnterminatedFence { markers } => write!(
                f,
                "odd number of code fence markers ({}); a code block is never closed",
                markers
            ),
            Warning::MissingLanguage { line } => {
                write!(f, "code block at line {} has no language", line)
            }
        }
    }
}

/// A [`Warning`] attributed to the chapter it was found in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterWarning {
    pub chapter: String,
    pub warning: Warning,
}

impl fmt::Display for ChapterWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "chapter `{}`: {}", self.chapter, self.warning)
    }
}

/// Scans `text` for fence markers: lines that start, after any indentation,
/// with three backticks. Markers alternate between opening and closing a
/// block, so every even-numbered marker is an opener and must carry a
/// language.
pub fn validate(text: &str) -> Vec<Warning> {
    let markers: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = line.trim_start();
            match line.starts_with(FENCE) {
                true => Some((i + 1, line.trim_start_matches('`').trim())),
                false => None,
            }
        })
        .collect();

    let mut warnings = Vec::new();
    if markers.len() % 2 == 1 {
        warnings.push(Warning::UnterminatedFence {
            markers: markers.len(),
        });
    }
    for (line, info) in markers.iter().step_by(2) {
        if info.is_empty() {
            warnings.push(Warning::MissingLanguage { line: *line });
        }
    }
    warnings
}
