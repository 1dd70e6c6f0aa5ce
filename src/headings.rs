//! Moves chapter headings up or down a level so they nest under the chapter
//! title in the merged manuscript. Headings are found with a CommonMark parse
//! rather than a text search so that `#` lines inside code blocks survive.

use pulldown_cmark::{Event, Options, Parser, Tag};
use std::ops::Range;

/// How far, and within which bounds, headings move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadingShift {
    /// The number of levels to move. Negative values promote (`###` towards
    /// `#`), positive values demote.
    pub delta: i32,

    /// Headings at this level or above are never moved, and moved headings
    /// never cross it. With `delta: -1, floor: 2`, `###` becomes `##`, `####`
    /// becomes `###`, and `#`/`##` stay as they are.
    pub floor: u32,
}

impl HeadingShift {
    pub const NONE: HeadingShift = HeadingShift { delta: 0, floor: 1 };

    fn shifted(&self, level: u32) -> Option<u32> {
        if self.delta == 0 || level <= self.floor {
            return None;
        }
        let moved = (level as i64 + self.delta as i64).max(self.floor as i64).min(6) as u32;
        match moved == level {
            true => None,
            false => Some(moved),
        }
    }

    /// Rewrites the ATX heading markers in `text`. Setext headings (underlined
    /// with `===` or `---`) have no marker to rewrite and are left alone.
    pub fn apply(&self, text: &str) -> String {
        if self.delta == 0 {
            return text.to_owned();
        }

        let mut edits: Vec<(Range<usize>, u32)> = Vec::new();
        for (event, range) in Parser::new_ext(text, Options::empty()).into_offset_iter() {
            if let Event::Start(Tag::Heading(level)) = event {
                if let Some(new_level) = self.shifted(level) {
                    if let Some(marker) = atx_marker(text, range, level) {
                        edits.push((marker, new_level));
                    }
                }
            }
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for (marker, level) in edits {
            out.push_str(&text[last..marker.start]);
            out.extend(std::iter::repeat('#').take(level as usize));
            last = marker.end;
        }
        out.push_str(&text[last..]);
        out
    }
}

// Finds the run of `#` that opens the heading spanning `range`.
fn atx_marker(text: &str, range: Range<usize>, level: u32) -> Option<Range<usize>> {
    let slice = &text[range.clone()];
    let indent = slice.len() - slice.trim_start_matches(|c| c == ' ' || c == '\t').len();
    let hashes = slice[indent..].bytes().take_while(|b| *b == b'#').count();
    match hashes as u32 == level {
        true => Some(range.start + indent..range.start + indent + hashes),
        false => None,
    }
}
