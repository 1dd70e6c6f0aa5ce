//! Exports the [`Assembler`], which merges every chapter named by a
//! [`SectionList`] into one output document. Each chapter goes through the
//! same steps:
//!
//! 1. Load the document ([`crate::chapter`])
//! 2. Validate its code fences ([`crate::validate`]), recording warnings
//! 3. Apply the rewrite rules ([`crate::rules`])
//! 4. Resolve cross references ([`crate::links`])
//! 5. Append the trailer blocks ([`crate::trailer`])
//!
//! Chapters are appended in section order, each followed by its subchapters
//! (depth first) before its next sibling.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use crate::chapter::{self, ChapterSource};
use crate::data::{Changelog, ChapterRef, SectionList, SiteConfig};
use crate::links;
use crate::rules::{self, Context, Ruleset};
use crate::target::Target;
use crate::trailer::{self, DiscussionPolicy};
use crate::validate::{validate, ChapterWarning};

/// The separator written after every chapter.
const CHAPTER_BREAK: &str = "\n\n\n";

/// Merges chapters into a single document for one [`Target`].
pub struct Assembler<'a> {
    pub source: &'a dyn ChapterSource,
    pub target: &'a dyn Target,
    pub ruleset: &'a Ruleset,
    pub site: &'a SiteConfig,
    pub changelog: &'a Changelog,
    pub policy: DiscussionPolicy,

    /// Table-of-contents group headings keyed by section key.
    pub toc_groups: &'a BTreeMap<String, String>,
}

/// The outcome of a successful assembly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    /// The number of chapters (subchapters included) written.
    pub chapters: usize,

    /// Every validation warning, in chapter order.
    pub warnings: Vec<ChapterWarning>,
}

impl Report {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl Assembler<'_> {
    /// Transforms a single chapter. Validation warnings are appended to
    /// `report`; they never fail the chapter.
    pub fn build_chapter(&self, identifier: &str, report: &mut Report) -> Result<String> {
        let doc = self.source.load(identifier)?;
        log::debug!("building chapter `{}`", identifier);

        for warning in validate(&doc.text) {
            let warning = ChapterWarning {
                chapter: doc.identifier.clone(),
                warning,
            };
            log::warn!("{}", warning);
            report.warnings.push(warning);
        }

        let context = Context {
            identifier: &doc.identifier,
            front_matter: &doc.front_matter,
            site: self.site,
            changelog: self.changelog,
        };
        let text = self.ruleset.apply(&doc.text, &context)?;
        let text = links::resolve(&text, self.target, self.site);
        let text = trailer::append_trailer(&text, &context, self.target, self.policy)?;

        let mut text = String::from(text.trim_end_matches(|c| c == '\n' || c == '\r'));
        text.push_str(CHAPTER_BREAK);
        report.chapters += 1;
        Ok(text)
    }

    /// Writes `preamble` and then every chapter of `sections` to `out`. A
    /// chapter is written only once it has been completely transformed.
    pub fn assemble<W: Write>(
        &self,
        sections: &SectionList,
        preamble: Option<&str>,
        out: &mut W,
    ) -> Result<Report> {
        let mut report = Report::default();
        if let Some(preamble) = preamble {
            out.write_all(preamble.as_bytes())?;
            out.write_all(b"\n\n")?;
        }

        for section in sections.iter() {
            let toc_group = self.toc_groups.get(&section.key).map(String::as_str);
            out.write_all(self.target.section_divider(section, toc_group).as_bytes())?;

            // Explicit pre-order traversal; nesting depth is whatever the
            // section list contains.
            let mut stack: Vec<&ChapterRef> = section.chapters.iter().rev().collect();
            while let Some(chapter) = stack.pop() {
                let text = self.build_chapter(chapter.identifier(), &mut report)?;
                out.write_all(text.as_bytes())?;
                stack.extend(chapter.subchapters.iter().rev());
            }
        }

        Ok(report)
    }

    /// Like [`Assembler::assemble`], collecting the output into a string.
    pub fn assemble_to_string(
        &self,
        sections: &SectionList,
        preamble: Option<&str>,
    ) -> Result<(String, Report)> {
        let mut out = Vec::new();
        let report = self.assemble(sections, preamble, &mut out)?;
        // Every piece written was a `&str`.
        let text = String::from_utf8(out)
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        Ok((text, report))
    }
}

/// The result of a fallible assembly operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error that aborts assembly.
#[derive(Debug)]
pub enum Error {
    /// A chapter couldn't be loaded.
    Load(chapter::Error),

    /// A chapter lacks a field its rewrite rules need.
    Rule(rules::Error),

    /// A chapter's trailer couldn't be built.
    Trailer(trailer::Error),

    /// Writing the output failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Load(err) => err.fmt(f),
            Error::Rule(err) => err.fmt(f),
            Error::Trailer(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Load(err) => Some(err),
            Error::Rule(err) => Some(err),
            Error::Trailer(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<chapter::Error> for Error {
    fn from(err: chapter::Error) -> Error {
        Error::Load(err)
    }
}

impl From<rules::Error> for Error {
    fn from(err: rules::Error) -> Error {
        Error::Rule(err)
    }
}

impl From<trailer::Error> for Error {
    fn from(err: trailer::Error) -> Error {
        Error::Trailer(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chapter::MemorySource;
    use crate::data::Section;
    use crate::rules::FixupTable;
    use crate::target::{EpubTarget, Format, MarkdownTarget};
    use crate::validate::Warning;

    struct Fixture {
        source: MemorySource,
        site: SiteConfig,
        changelog: Changelog,
        toc_groups: BTreeMap<String, String>,
    }

    impl Fixture {
        fn new(source: MemorySource) -> Fixture {
            Fixture {
                source,
                site: vec![
                    ("forum_url", "https://f/"),
                    ("forum_thread_prefix", "t/"),
                    ("backend_github_repo", "https://github.com/x/backend"),
                ]
                .into_iter()
                .collect(),
                changelog: Changelog::default(),
                toc_groups: BTreeMap::new(),
            }
        }

        fn assemble(
            &self,
            target: &'static dyn Target,
            policy: DiscussionPolicy,
            sections: &SectionList,
        ) -> Result<(String, Report)> {
            let ruleset = Ruleset::for_target(target, "../../assets/", FixupTable::new());
            Assembler {
                source: &self.source,
                target,
                ruleset: &ruleset,
                site: &self.site,
                changelog: &self.changelog,
                policy,
                toc_groups: &self.toc_groups,
            }
            .assemble_to_string(sections, None)
        }
    }

    fn chapter(title: &str) -> String {
        format!("---\ntitle: {}\ncomments_id: 1\n---\n{} body\n", title, title)
    }

    fn section(key: &str, title: &str, chapters: Vec<ChapterRef>) -> Section {
        Section {
            key: key.to_owned(),
            title: title.to_owned(),
            chapters,
        }
    }

    fn titles(output: &str) -> Vec<&str> {
        output
            .lines()
            .filter_map(|line| line.strip_prefix("# "))
            .collect()
    }

    #[test]
    fn test_end_to_end_chapter() -> Result<()> {
        let fixture = Fixture::new(MemorySource::new().with(
            "intro",
            "---\ntitle: \"Intro\"\ncomments_id: \"42\"\ncode: backend\n---\nWelcome.\n",
        ));
        let sections = SectionList(vec![section("intro", "", vec![ChapterRef::new("/chapters/intro.html")])]);
        let (output, report) =
            fixture.assemble(&MarkdownTarget, DiscussionPolicy::Strict, &sections)?;

        assert!(output.starts_with("# Intro\n"));
        assert!(output.contains("(https://f/t/42)"));
        assert!(output.contains("(https://github.com/x/backend/tree/intro)"));
        assert!(output.ends_with(")\n\n\n"));
        assert_eq!(1, report.chapters);
        assert!(!report.has_warnings());
        Ok(())
    }

    #[test]
    fn test_preserves_section_order() -> Result<()> {
        let source = ["a", "b", "c", "d"]
            .iter()
            .fold(MemorySource::new(), |s, id| s.with(*id, chapter(&id.to_uppercase())));
        let fixture = Fixture::new(source);
        let first = section("first", "", vec![ChapterRef::new("c"), ChapterRef::new("a")]);
        let second = section("second", "", vec![ChapterRef::new("d"), ChapterRef::new("b")]);

        let forward = SectionList(vec![first.clone(), second.clone()]);
        let (output, _) = fixture.assemble(&MarkdownTarget, DiscussionPolicy::Strict, &forward)?;
        assert_eq!(vec!["C", "A", "D", "B"], titles(&output));

        let backward = SectionList(vec![second, first]);
        let (output, _) = fixture.assemble(&MarkdownTarget, DiscussionPolicy::Strict, &backward)?;
        assert_eq!(vec!["D", "B", "C", "A"], titles(&output));
        Ok(())
    }

    #[test]
    fn test_subchapters_depth_first() -> Result<()> {
        let source = ["a", "a1", "a1x", "a2", "b"]
            .iter()
            .fold(MemorySource::new(), |s, id| s.with(*id, chapter(id)));
        let fixture = Fixture::new(source);
        let sections = SectionList(vec![section(
            "s",
            "",
            vec![
                ChapterRef::new("a").with_subchapters(vec![
                    ChapterRef::new("a1").with_subchapters(vec![ChapterRef::new("a1x")]),
                    ChapterRef::new("a2"),
                ]),
                ChapterRef::new("b"),
            ],
        )]);
        let (output, report) =
            fixture.assemble(&MarkdownTarget, DiscussionPolicy::Strict, &sections)?;
        assert_eq!(vec!["a", "a1", "a1x", "a2", "b"], titles(&output));
        assert_eq!(5, report.chapters);
        Ok(())
    }

    #[test]
    fn test_idempotent() -> Result<()> {
        let source = MemorySource::new()
            .with("a", chapter("A"))
            .with("b", "---\ntitle: B\ncomments_id: 2\ncode: backend\n---\n```\nx\n```\n");
        let fixture = Fixture::new(source);
        let sections = SectionList(vec![
            section("one", "One", vec![ChapterRef::new("a")]),
            section("two", "Two", vec![ChapterRef::new("b")]),
        ]);
        for format in Format::ALL.iter() {
            let first = fixture.assemble(format.target(), DiscussionPolicy::Strict, &sections)?;
            let second = fixture.assemble(format.target(), DiscussionPolicy::Strict, &sections)?;
            assert_eq!(first, second, "{} output differs between runs", format);
        }
        Ok(())
    }

    #[test]
    fn test_warnings_do_not_abort() -> Result<()> {
        let source = MemorySource::new()
            .with("a", "---\ntitle: A\ncomments_id: 1\n---\n```js\nx\n```\n```js\n")
            .with("b", chapter("B"));
        let fixture = Fixture::new(source);
        let sections = SectionList(vec![section(
            "s",
            "",
            vec![ChapterRef::new("a"), ChapterRef::new("b")],
        )]);
        let (output, report) =
            fixture.assemble(&MarkdownTarget, DiscussionPolicy::Strict, &sections)?;
        assert_eq!(vec!["A", "B"], titles(&output));
        assert_eq!(
            vec![ChapterWarning {
                chapter: String::from("a"),
                warning: Warning::UnterminatedFence { markers: 3 },
            }],
            report.warnings
        );
        Ok(())
    }

    #[test]
    fn test_missing_chapter_is_fatal() {
        let fixture = Fixture::new(MemorySource::new().with("a", chapter("A")));
        let sections = SectionList(vec![section(
            "s",
            "",
            vec![ChapterRef::new("a"), ChapterRef::new("missing")],
        )]);
        match fixture.assemble(&MarkdownTarget, DiscussionPolicy::Strict, &sections) {
            Err(Error::Load(chapter::Error::NotFound { identifier, .. })) => {
                assert_eq!("missing", identifier)
            }
            other => panic!("wanted not-found error; found {:?}", other),
        }
    }

    #[test]
    fn test_discussion_policy() {
        let fixture =
            Fixture::new(MemorySource::new().with("a", "---\ntitle: A\n---\nBody\n"));
        let sections = SectionList(vec![section("s", "", vec![ChapterRef::new("a")])]);
        assert!(matches!(
            fixture.assemble(&EpubTarget, DiscussionPolicy::Strict, &sections),
            Err(Error::Trailer(trailer::Error::MissingField { .. }))
        ));
        let (output, _) = fixture
            .assemble(&EpubTarget, DiscussionPolicy::Lenient, &sections)
            .unwrap();
        assert!(output.starts_with("## A\n\nBody"));
        assert!(!output.contains("post-links"));
    }

    #[test]
    fn test_epub_section_dividers() -> Result<()> {
        let fixture = Fixture::new(MemorySource::new().with("a", chapter("A")));
        let sections = SectionList(vec![section("s", "Basics", vec![ChapterRef::new("a")])]);
        let (output, _) = fixture.assemble(&EpubTarget, DiscussionPolicy::Strict, &sections)?;
        assert!(output.starts_with("# Basics\n\n## A\n"));
        Ok(())
    }

    #[test]
    fn test_preamble() -> Result<()> {
        let fixture = Fixture::new(MemorySource::new().with("a", chapter("A")));
        let sections = SectionList(vec![section("s", "", vec![ChapterRef::new("a")])]);
        let ruleset = Ruleset::for_target(&MarkdownTarget, "../../assets/", FixupTable::new());
        let (output, _) = Assembler {
            source: &fixture.source,
            target: &MarkdownTarget,
            ruleset: &ruleset,
            site: &fixture.site,
            changelog: &fixture.changelog,
            policy: DiscussionPolicy::Strict,
            toc_groups: &fixture.toc_groups,
        }
        .assemble_to_string(&sections, Some("---\ntitle: Book\n---"))?;
        assert!(output.starts_with("---\ntitle: Book\n---\n\n# A\n"));
        Ok(())
    }
}
