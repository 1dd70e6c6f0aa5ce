//! Defines the [`Target`] trait: everything that differs between the output
//! formats. The assembler, rules, link resolver, and trailer generator are
//! shared; a [`Target`] only decides what the emitted text looks like.

use std::fmt;
use std::str::FromStr;

use crate::data::Section;
use crate::headings::HeadingShift;
use crate::trailer::{CodeLink, DiscussionPolicy};

/// An output format for the merged manuscript.
pub trait Target {
    /// The name used on the command line and in configuration files.
    fn name(&self) -> &'static str;

    /// The file name of the merged manuscript in the output directory.
    fn file_name(&self) -> &'static str;

    /// The heading line(s) that replace a chapter's front matter.
    fn title_heading(&self, title: &str, identifier: &str) -> String;

    /// How the headings inside a chapter move relative to the chapter title.
    fn heading_shift(&self) -> HeadingShift;

    /// The replacement for the `{% change %}` marker.
    fn change_marker(&self, assets_prefix: &str) -> String;

    /// Glyphs the downstream toolchain can't typeset, and their replacements.
    fn unicode_substitutions(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    fn chapter_link(&self, label: &str, chapter: &str) -> String;

    fn section_link(&self, label: &str, chapter: &str, anchor: &str) -> String;

    /// Text emitted before the first chapter of a section. `toc_group` is the
    /// configured table-of-contents group heading for the section, if any.
    fn section_divider(&self, section: &Section, toc_group: Option<&str>) -> String;

    fn discussion_block(&self, url: &str) -> String;

    fn code_block(&self, link: &CodeLink) -> String;

    /// Whether the source-code block precedes the discussion block.
    fn code_before_discussion(&self) -> bool {
        false
    }

    /// The policy for chapters without a `comments_id` when the project
    /// doesn't configure one.
    fn default_discussion_policy(&self) -> DiscussionPolicy;
}

/// Plain merged Markdown.
pub struct MarkdownTarget;

impl Target for MarkdownTarget {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn file_name(&self) -> &'static str {
        "full-book.md"
    }

    fn title_heading(&self, title: &str, _identifier: &str) -> String {
        format!("# {}", title)
    }

    fn heading_shift(&self) -> HeadingShift {
        HeadingShift { delta: -1, floor: 2 }
    }

    fn change_marker(&self, assets_prefix: &str) -> String {
        format!("![Change indicator]({}change-marker.png)", assets_prefix)
    }

    /// Links by chapter identifier, not by the id a Markdown toolchain
    /// derives from the heading text (pandoc turns `# Setup an AWS account`
    /// into `#setup-an-aws-account`). The fragment only resolves where the
    /// chapter anchor is the identifier, as on the published site.
    fn chapter_link(&self, label: &str, chapter: &str) -> String {
        format!("[{}](#{})", label, chapter)
    }

    fn section_link(&self, label: &str, _chapter: &str, anchor: &str) -> String {
        format!("[{}](#{})", label, anchor)
    }

    fn section_divider(&self, _section: &Section, _toc_group: Option<&str>) -> String {
        String::new()
    }

    fn discussion_block(&self, url: &str) -> String {
        format!(
            "\n**For help and discussion**\n\n[Comments on this chapter]({})\n",
            url
        )
    }

    fn code_block(&self, link: &CodeLink) -> String {
        format!("\n**{}**\n\n[{}]({})\n", link.lead, link.text, link.url)
    }

    fn default_discussion_policy(&self) -> DiscussionPolicy {
        DiscussionPolicy::Lenient
    }
}

const BOX_COLOR: &str = "serverless-purple";

/// Markdown with embedded LaTeX, for a pandoc-to-PDF toolchain.
pub struct PdfTarget;

impl Target for PdfTarget {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn file_name(&self) -> &'static str {
        "pdf.md"
    }

    // Chapters are linked by label rather than `\hyperlink` because the
    // latter lands half a page above the heading.
    fn title_heading(&self, title: &str, identifier: &str) -> String {
        format!("# {}\n\\label{{chap:{}}}", title, identifier)
    }

    fn heading_shift(&self) -> HeadingShift {
        HeadingShift { delta: -1, floor: 2 }
    }

    fn change_marker(&self, assets_prefix: &str) -> String {
        format!(
            "\\includegraphics[width=2cm, viewport=0 10 146 42]{{{}change-marker.png}}",
            assets_prefix
        )
    }

    // The monospace font has no glyphs for these.
    fn unicode_substitutions(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("&rarr;", "\\faLongArrowAltRight"),
            ("⇒", "\\faLongArrowAltRight"),
            ("✓", "\\faCheck"),
        ]
    }

    fn chapter_link(&self, label: &str, chapter: &str) -> String {
        format!("\\hyperref[chap:{}]{{{}}}", chapter, label)
    }

    fn section_link(&self, label: &str, _chapter: &str, anchor: &str) -> String {
        format!("\\hyperlink{{{}}}{{{}}}", anchor, label)
    }

    fn section_divider(&self, section: &Section, toc_group: Option<&str>) -> String {
        let mut out = String::new();
        if let Some(group) = toc_group {
            out.push_str("\\addtocontents{toc}{~\\par}\n");
            out.push_str("\\addtocontents{toc}{~\\par}\n");
            out.push_str(&format!(
                "\\addtocontents{{toc}}{{\\centerline{{\\textbf{{{}}}}}\\par}}\n",
                group
            ));
        }
        if !section.title.is_empty() {
            out.push_str(&format!("\\part{{{}}}\n\n", section.title));
        }
        out
    }

    fn discussion_block(&self, url: &str) -> String {
        format!(
            "\n\\\n\\awesomebox[{color}]{{1pt}}{{\\faComments}}{{{color}}}{{\n\\textbf{{Help and discussion}}\n\nView the \\href{{{url}}}{{comments for this chapter on our forums}}\n}}\n",
            color = BOX_COLOR,
            url = url
        )
    }

    fn code_block(&self, link: &CodeLink) -> String {
        format!(
            "\n\\awesomebox[{color}]{{1pt}}{{\\faGithub}}{{{color}}}{{\n\\textbf{{{lead}}}\n\n\\href{{{url}}}{{{text}}}\n}}",
            color = BOX_COLOR,
            lead = link.lead,
            url = link.url,
            text = link.text
        )
    }

    fn default_discussion_policy(&self) -> DiscussionPolicy {
        DiscussionPolicy::Lenient
    }
}

/// Markdown with embedded HTML, for an e-book toolchain. Cross references use
/// implicit header references, so links are keyed by heading text.
pub struct EpubTarget;

impl Target for EpubTarget {
    fn name(&self) -> &'static str {
        "epub"
    }

    fn file_name(&self) -> &'static str {
        "epub.md"
    }

    fn title_heading(&self, title: &str, _identifier: &str) -> String {
        format!("## {}\n", title)
    }

    fn heading_shift(&self) -> HeadingShift {
        HeadingShift { delta: 0, floor: 1 }
    }

    fn change_marker(&self, assets_prefix: &str) -> String {
        format!(
            "<img class=\"code-marker\" src=\"{}change-marker.png\" />",
            assets_prefix
        )
    }

    fn chapter_link(&self, label: &str, chapter: &str) -> String {
        format!("[{}][{}]", label, chapter.replace('-', " "))
    }

    fn section_link(&self, label: &str, _chapter: &str, anchor: &str) -> String {
        format!("[{}][{}]", label, anchor.replace('-', " "))
    }

    fn section_divider(&self, section: &Section, _toc_group: Option<&str>) -> String {
        match section.title.is_empty() {
            true => String::new(),
            false => format!("# {}\n\n", section.title),
        }
    }

    fn discussion_block(&self, url: &str) -> String {
        format!(
            "\n<div class=\"post-links\">\n  <p>For help and discussion</p>\n  <a target=\"_blank\" href=\"{}\">\n    Comments on this chapter\n  </a>\n</div>\n",
            url
        )
    }

    fn code_block(&self, link: &CodeLink) -> String {
        format!(
            "\n<div class=\"post-checkpoint\">\n  <p>{}</p>\n  <a target=\"_blank\" href=\"{}\">\n    {}\n  </a>\n</div>\n",
            link.lead, link.url, link.text
        )
    }

    fn code_before_discussion(&self) -> bool {
        true
    }

    fn default_discussion_policy(&self) -> DiscussionPolicy {
        DiscussionPolicy::Strict
    }
}

/// Selects one of the built-in [`Target`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
    Markdown,
    Pdf,
    Epub,
}

static MARKDOWN: MarkdownTarget = MarkdownTarget;
static PDF: PdfTarget = PdfTarget;
static EPUB: EpubTarget = EpubTarget;

impl Format {
    pub const ALL: [Format; 3] = [Format::Markdown, Format::Pdf, Format::Epub];

    pub fn target(self) -> &'static dyn Target {
        match self {
            Format::Markdown => &MARKDOWN,
            Format::Pdf => &PDF,
            Format::Epub => &EPUB,
        }
    }

    pub fn name(self) -> &'static str {
        self.target().name()
    }
}

impl FromStr for Format {
    type Err = UnknownFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .iter()
            .copied()
            .find(|format| format.name() == s)
            .ok_or_else(|| UnknownFormatError(s.to_owned()))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct UnknownFormatError(String);

impl fmt::Display for UnknownFormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unknown format `{}` (expected one of markdown, pdf, epub)",
            &self.0
        )
    }
}

impl std::error::Error for UnknownFormatError {}
