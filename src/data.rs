//! Defines the book-wide data shared by every chapter: the [`SiteConfig`]
//! variables, the [`Changelog`] entries, and the [`SectionList`] that decides
//! assembly order. All three are loaded once before assembly and only ever
//! read afterwards.

use std::{fmt, fs, path::Path};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

/// The site's configuration variables, i.e., the values substituted for
/// `{{ site.KEY }}` placeholders. Iteration follows the order of the source
/// file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SiteConfig(IndexMap<String, String>);

impl SiteConfig {
    /// Parses the site configuration from YAML. Only scalar values are kept;
    /// sequences and mappings have no sensible text form and are skipped.
    pub fn from_yaml(input: &str) -> Result<SiteConfig> {
        if input.trim().is_empty() {
            return Ok(SiteConfig::default());
        }
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(input)?;
        let mut vars = IndexMap::with_capacity(mapping.len());
        for (key, value) in mapping.iter() {
            let key = match scalar_to_string(key) {
                Some(key) => key,
                None => continue,
            };
            match scalar_to_string(value) {
                Some(value) => {
                    vars.insert(key, value);
                }
                None => log::debug!("site variable `{}` is not a scalar; skipping", key),
            }
        }
        Ok(SiteConfig(vars))
    }

    /// Reads and parses the site configuration file at `path`.
    pub fn from_file(path: &Path) -> Result<SiteConfig> {
        annotate(path, read(path).and_then(|s| SiteConfig::from_yaml(&s)))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> std::iter::FromIterator<(K, V)> for SiteConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SiteConfig(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A single changelog entry.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ChangelogEntry {
    pub title: String,

    #[serde(default)]
    pub desc: String,
}

/// The changelog entries keyed by entry id, in file order. Only the chapter
/// whose identifier is `changelog` reads them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Changelog(IndexMap<String, ChangelogEntry>);

impl Changelog {
    pub fn from_yaml(input: &str) -> Result<Changelog> {
        if input.trim().is_empty() {
            return Ok(Changelog::default());
        }
        Ok(Changelog(serde_yaml::from_str(input)?))
    }

    pub fn from_file(path: &Path) -> Result<Changelog> {
        annotate(path, read(path).and_then(|s| Changelog::from_yaml(&s)))
    }

    pub fn get(&self, key: &str) -> Option<&ChangelogEntry> {
        self.0.get(key)
    }
}

impl<K: Into<String>> std::iter::FromIterator<(K, ChangelogEntry)> for Changelog {
    fn from_iter<I: IntoIterator<Item = (K, ChangelogEntry)>>(iter: I) -> Self {
        Changelog(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A reference to a chapter from the [`SectionList`]. Chapters may nest
/// arbitrarily deep via `subchapters`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ChapterRef {
    /// The chapter's published URL or source path, e.g.
    /// `/chapters/setup-aws.html`. The chapter identifier is derived from it.
    pub url: String,

    #[serde(default)]
    pub subchapters: Vec<ChapterRef>,
}

impl ChapterRef {
    pub fn new(url: impl Into<String>) -> ChapterRef {
        ChapterRef {
            url: url.into(),
            subchapters: Vec::new(),
        }
    }

    pub fn with_subchapters(mut self, subchapters: Vec<ChapterRef>) -> ChapterRef {
        self.subchapters = subchapters;
        self
    }

    /// The chapter identifier: the last path component of `url` up to the
    /// first `.` (`/chapters/setup-aws.html` becomes `setup-aws`).
    pub fn identifier(&self) -> &str {
        let trimmed = self.url.trim_end_matches('/');
        let file_name = trimmed.rsplit('/').next().unwrap_or(trimmed);
        file_name.split('.').next().unwrap_or(file_name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    /// The key of the section in the chapter list, e.g. `best-practices-intro`.
    pub key: String,
    pub title: String,
    pub chapters: Vec<ChapterRef>,
}

#[derive(Deserialize)]
struct RawSection {
    #[serde(default)]
    title: String,

    #[serde(default)]
    chapters: Vec<ChapterRef>,
}

/// The ordered list of sections. Its traversal order is the order of the
/// output: nothing is sorted or deduplicated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SectionList(pub Vec<Section>);

impl SectionList {
    /// Parses a YAML mapping of section key to `{title, chapters}`.
    pub fn from_yaml(input: &str) -> Result<SectionList> {
        if input.trim().is_empty() {
            return Ok(SectionList::default());
        }
        let raw: IndexMap<String, RawSection> = serde_yaml::from_str(input)?;
        Ok(SectionList(
            raw.into_iter()
                .map(|(key, section)| Section {
                    key,
                    title: section.title,
                    chapters: section.chapters,
                })
                .collect(),
        ))
    }

    /// Parses a flat order file with one chapter identifier per line into a
    /// single untitled section. Blank lines are ignored.
    pub fn from_order_list(input: &str) -> SectionList {
        let chapters: Vec<ChapterRef> = input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ChapterRef::new)
            .collect();
        SectionList(vec![Section {
            key: String::new(),
            title: String::new(),
            chapters,
        }])
    }

    /// Loads the section list at `path`. Files ending in `.yml` or `.yaml`
    /// are parsed as section mappings; anything else as an order file.
    pub fn from_file(path: &Path) -> Result<SectionList> {
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yml") | Some("yaml")
        );
        annotate(
            path,
            read(path).and_then(|s| match is_yaml {
                true => SectionList::from_yaml(&s),
                false => Ok(SectionList::from_order_list(&s)),
            }),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.0.iter()
    }
}

fn read(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}

fn annotate<T>(path: &Path, result: Result<T>) -> Result<T> {
    result.map_err(|e| Error::Annotated(format!("loading `{}`", path.display()), Box::new(e)))
}

/// Represents the result of loading book data.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading book data.
#[derive(Debug)]
pub enum Error {
    /// Returned when a data file isn't valid YAML or doesn't have the
    /// expected shape.
    DeserializeYaml(serde_yaml::Error),

    /// Returned for I/O errors reading a data file.
    Io(std::io::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::Annotated(annotation, err) => write!(f, "{}: {}", annotation, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DeserializeYaml(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_site_config_keeps_scalars_only() -> Result<()> {
        let site = SiteConfig::from_yaml(
            "title: Book\nversion: 2\npublished: true\nexclude: [a, b]\nnested: {a: 1}\n",
        )?;
        assert_eq!(Some("Book"), site.get("title"));
        assert_eq!(Some("2"), site.get("version"));
        assert_eq!(Some("true"), site.get("published"));
        assert_eq!(None, site.get("exclude"));
        assert_eq!(None, site.get("nested"));
        assert_eq!(3, site.len());
        Ok(())
    }

    #[test]
    fn test_empty_files_are_empty_data() -> Result<()> {
        assert!(SiteConfig::from_yaml("")?.is_empty());
        assert_eq!(Changelog::default(), Changelog::from_yaml("\n")?);
        assert_eq!(SectionList::default(), SectionList::from_yaml("")?);
        Ok(())
    }

    #[test]
    fn test_changelog_entries() -> Result<()> {
        let changelog = Changelog::from_yaml(
            "v1:\n  title: First\n  desc: The first edition\nv2:\n  title: Second\n",
        )?;
        let v1 = changelog.get("v1").expect("v1 entry");
        assert_eq!("First", v1.title);
        assert_eq!("The first edition", v1.desc);
        assert_eq!("", changelog.get("v2").expect("v2 entry").desc);
        Ok(())
    }

    #[test]
    fn test_section_list_preserves_file_order() -> Result<()> {
        let sections = SectionList::from_yaml(
            r#"
zeta:
  title: Last Alphabetically
  chapters:
    - url: /chapters/b.html
    - url: /chapters/a.html
      subchapters:
        - url: /chapters/a-1.html
alpha:
  title: First Alphabetically
  chapters:
    - url: /chapters/c.html
"#,
        )?;
        let keys: Vec<&str> = sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(vec!["zeta", "alpha"], keys);
        let ids: Vec<&str> = sections.0[0].chapters.iter().map(|c| c.identifier()).collect();
        assert_eq!(vec!["b", "a"], ids);
        assert_eq!("a-1", sections.0[0].chapters[1].subchapters[0].identifier());
        Ok(())
    }

    #[test]
    fn test_order_list() {
        let sections = SectionList::from_order_list("intro\n\n  setup-aws \nwrapping-up\n");
        assert_eq!(1, sections.0.len());
        let ids: Vec<&str> = sections.0[0].chapters.iter().map(|c| c.identifier()).collect();
        assert_eq!(vec!["intro", "setup-aws", "wrapping-up"], ids);
    }

    #[test]
    fn test_chapter_identifier() {
        assert_eq!("setup-aws", ChapterRef::new("/chapters/setup-aws.html").identifier());
        assert_eq!("setup-aws", ChapterRef::new("_chapters/setup-aws.md").identifier());
        assert_eq!("setup-aws", ChapterRef::new("/chapters/setup-aws/").identifier());
        assert_eq!("setup-aws", ChapterRef::new("setup-aws").identifier());
    }
}
