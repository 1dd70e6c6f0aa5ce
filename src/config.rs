//! Loads the project configuration (`bindery.yaml`). The project file is
//! searched for in the given directory and then each of its ancestors, and
//! every path in it is relative to the directory that contains it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::rules::{FixupTable, RewriteRule};
use crate::target::{Format, Target, UnknownFormatError};
use crate::trailer::DiscussionPolicy;

/// The name of the project file.
pub const PROJECT_FILE: &str = "bindery.yaml";

const DEFAULT_ASSETS_PREFIX: &str = "../../assets/";

fn default_chapters_directory() -> PathBuf {
    PathBuf::from("_chapters")
}

fn default_site_config() -> PathBuf {
    PathBuf::from("_config.yml")
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("output")
}

fn default_assets_prefix() -> String {
    String::from(DEFAULT_ASSETS_PREFIX)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Project {
    #[serde(default = "default_chapters_directory")]
    chapters_directory: PathBuf,

    #[serde(default = "default_site_config")]
    site_config: PathBuf,

    #[serde(default)]
    changelog: Option<PathBuf>,

    chapter_list: PathBuf,

    #[serde(default = "default_output_directory")]
    output_directory: PathBuf,

    #[serde(default = "default_assets_prefix")]
    assets_prefix: String,

    #[serde(default)]
    discussion: Option<DiscussionPolicy>,

    #[serde(default)]
    preamble: BTreeMap<String, PathBuf>,

    #[serde(default)]
    toc_groups: BTreeMap<String, String>,

    #[serde(default)]
    fixups: BTreeMap<String, Vec<FixupEntry>>,
}

/// A chapter fixup as written in the project file: exactly one of `literal`
/// or `regex`, and the `replace` text.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FixupEntry {
    #[serde(default)]
    literal: Option<String>,

    #[serde(default)]
    regex: Option<String>,

    #[serde(default)]
    replace: String,
}

impl FixupEntry {
    fn into_rule(self, chapter: &str) -> Result<RewriteRule> {
        match (self.literal, self.regex) {
            (Some(literal), None) => Ok(RewriteRule::literal(literal, self.replace)),
            (None, Some(pattern)) => match Regex::new(&pattern) {
                Ok(regex) => Ok(RewriteRule::regex(regex, self.replace)),
                Err(err) => Err(Error::Regex {
                    chapter: chapter.to_owned(),
                    err,
                }),
            },
            _ => Err(Error::InvalidFixup(chapter.to_owned())),
        }
    }
}

/// The resolved project configuration. Every path is already joined onto the
/// project root.
#[derive(Clone, Debug)]
pub struct Config {
    pub project_root: PathBuf,
    pub chapters_directory: PathBuf,
    pub site_config: PathBuf,
    pub changelog: Option<PathBuf>,
    pub chapter_list: PathBuf,
    pub output_directory: PathBuf,

    /// Replaces the `/assets/` prefix of image paths.
    pub assets_prefix: String,

    /// Overrides the targets' default discussion policy when set.
    pub discussion: Option<DiscussionPolicy>,

    pub preambles: BTreeMap<Format, PathBuf>,
    pub toc_groups: BTreeMap<String, String>,
    pub fixups: FixupTable,
}

impl Config {
    /// Finds [`PROJECT_FILE`] in `dir` or the nearest ancestor of `dir` and
    /// loads it. A relative `dir` is resolved against the working directory,
    /// so the project paths in the returned [`Config`] are absolute.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        let cwd = std::env::current_dir()?;
        match find_project_file(&cwd, dir)? {
            Some(path) => Config::from_project_file(&path),
            None => Err(Error::NotFound(dir.to_owned())),
        }
    }

    /// Loads the project file at `path`.
    pub fn from_project_file(path: &Path) -> Result<Config> {
        Config::parse(path).map_err(|e| {
            Error::Annotated(
                format!("loading project file `{}`", path.display()),
                Box::new(e),
            )
        })
    }

    fn parse(path: &Path) -> Result<Config> {
        let project: Project = serde_yaml::from_str(&std::fs::read_to_string(path)?)?;
        let project_root = match path.parent() {
            Some(parent) => parent.to_owned(),
            None => PathBuf::from("."),
        };

        let mut preambles = BTreeMap::new();
        for (format, preamble) in project.preamble {
            preambles.insert(format.parse::<Format>()?, project_root.join(preamble));
        }

        let mut fixups = FixupTable::new();
        for (chapter, entries) in project.fixups {
            for entry in entries {
                fixups.insert(chapter.clone(), entry.into_rule(&chapter)?);
            }
        }

        Ok(Config {
            chapters_directory: project_root.join(project.chapters_directory),
            site_config: project_root.join(project.site_config),
            changelog: project.changelog.map(|p| project_root.join(p)),
            chapter_list: project_root.join(project.chapter_list),
            output_directory: project_root.join(project.output_directory),
            assets_prefix: project.assets_prefix,
            discussion: project.discussion,
            preambles,
            toc_groups: project.toc_groups,
            fixups,
            project_root,
        })
    }

    /// The discussion policy for `target`.
    pub fn discussion_policy(&self, target: &dyn Target) -> DiscussionPolicy {
        self.discussion
            .unwrap_or_else(|| target.default_discussion_policy())
    }

    pub fn preamble(&self, format: Format) -> Option<&Path> {
        self.preambles.get(&format).map(PathBuf::as_path)
    }

    /// The merged manuscript's path for `format`.
    pub fn output_path(&self, format: Format) -> PathBuf {
        self.output_directory.join(format.target().file_name())
    }
}

// `dir` is canonicalized before the search: `Path::parent` only strips
// components from the text, so `.` or `..` would never reach the real parents.
fn find_project_file(cwd: &Path, dir: &Path) -> Result<Option<PathBuf>> {
    let start = std::fs::canonicalize(cwd.join(dir))?;
    Ok(start
        .ancestors()
        .map(|candidate| candidate.join(PROJECT_FILE))
        .find(|path| path.is_file()))
}

/// Represents the result of loading a [`Config`].
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading a [`Config`].
#[derive(Debug)]
pub enum Error {
    /// Returned when no project file exists in the directory or any of its
    /// ancestors.
    NotFound(PathBuf),

    /// Returned when the project file isn't valid YAML or has unknown keys.
    DeserializeYaml(serde_yaml::Error),

    /// Returned when a fixup regex doesn't compile.
    Regex { chapter: String, err: regex::Error },

    /// Returned when a fixup sets both or neither of `literal` and `regex`.
    InvalidFixup(String),

    /// Returned when a preamble is configured for an unknown format.
    UnknownFormat(UnknownFormatError),

    /// Returned for I/O errors resolving the search directory or reading the
    /// project file.
    Io(std::io::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(dir) => write!(
                f,
                "could not find `{}` in `{}` or any parent directory",
                PROJECT_FILE,
                dir.display()
            ),
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::Regex { chapter, err } => {
                write!(f, "fixup for chapter `{}`: {}", chapter, err)
            }
            Error::InvalidFixup(chapter) => write!(
                f,
                "fixup for chapter `{}` must set exactly one of `literal` or `regex`",
                chapter
            ),
            Error::UnknownFormat(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::Annotated(annotation, err) => write!(f, "{}: {}", annotation, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::Regex { err, .. } => Some(err),
            Error::InvalidFixup(_) => None,
            Error::UnknownFormat(err) => Some(err),
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

impl From<UnknownFormatError> for Error {
    fn from(err: UnknownFormatError) -> Error {
        Error::UnknownFormat(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_load_testdata_project() -> Result<()> {
        let root = std::fs::canonicalize("./testdata/book")?;
        let config = Config::from_directory(Path::new("./testdata/book/_chapters"))?;
        assert_eq!(root, config.project_root);
        assert_eq!(root.join("_chapters"), config.chapters_directory);
        assert_eq!(
            Some(root.join("metadata-pdf.md").as_path()),
            config.preamble(Format::Pdf)
        );
        assert_eq!(None, config.preamble(Format::Epub));
        assert_eq!(
            Some("The Basics"),
            config.toc_groups.get("intro").map(String::as_str)
        );
        assert_eq!(1, config.fixups.rules_for("setup").len());
        assert_eq!(root.join("output/pdf.md"), config.output_path(Format::Pdf));
        Ok(())
    }

    #[test]
    fn test_relative_directory_searches_real_parents() -> Result<()> {
        // Running from `_chapters` with the default `--project .`.
        let chapters = std::fs::canonicalize("./testdata/book/_chapters")?;
        let wanted = Some(std::fs::canonicalize("./testdata/book/bindery.yaml")?);
        assert_eq!(wanted, find_project_file(&chapters, Path::new("."))?);
        assert_eq!(wanted, find_project_file(&chapters, Path::new(".."))?);
        assert_eq!(
            wanted,
            find_project_file(&chapters, Path::new("../_data/./"))?
        );
        Ok(())
    }

    #[test]
    fn test_missing_search_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(matches!(
            find_project_file(dir.path(), Path::new("no-such-dir")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_discussion_policy_defaults_per_target() -> Result<()> {
        let mut config = Config::from_directory(Path::new("./testdata/book"))?;
        config.discussion = None;
        assert_eq!(
            DiscussionPolicy::Strict,
            config.discussion_policy(Format::Epub.target())
        );
        assert_eq!(
            DiscussionPolicy::Lenient,
            config.discussion_policy(Format::Pdf.target())
        );
        config.discussion = Some(DiscussionPolicy::Strict);
        assert_eq!(
            DiscussionPolicy::Strict,
            config.discussion_policy(Format::Pdf.target())
        );
        Ok(())
    }

    #[test]
    fn test_missing_project_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        // The temp dir's ancestors might hold a project file on some
        // machines, so only check the error when the search failed.
        if let Err(err) = Config::from_directory(dir.path()) {
            assert!(matches!(err, Error::NotFound(_)));
        }
    }

    #[test]
    fn test_invalid_fixups() {
        let both = FixupEntry {
            literal: Some(String::from("a")),
            regex: Some(String::from("b")),
            replace: String::new(),
        };
        assert!(matches!(both.into_rule("x"), Err(Error::InvalidFixup(_))));

        let bad_regex = FixupEntry {
            literal: None,
            regex: Some(String::from("(unclosed")),
            replace: String::new(),
        };
        assert!(matches!(bad_regex.into_rule("x"), Err(Error::Regex { .. })));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: std::result::Result<Project, _> =
            serde_yaml::from_str("chapter_list: list.yml\nchapter_lsit: typo\n");
        assert!(result.is_err());
    }
}
