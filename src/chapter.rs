//! Defines the [`ChapterDocument`] type and the [`ChapterSource`] trait which
//! loads chapters by identifier. Chapters are Markdown files that begin with
//! a YAML front matter block:
//!
//! ```md
//! ---
//! title: Setup an AWS account
//! comments_id: 42
//! code: backend
//! ---
//! Body text...
//! ```

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

const FENCE: &str = "---";

/// The metadata block at the top of a chapter.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct FrontMatter {
    /// The chapter title. Required by the rule engine, which turns it into
    /// the chapter heading.
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub title: Option<String>,

    /// The forum thread id for the chapter's discussion link.
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub comments_id: Option<String>,

    /// Selects the source-code repository linked at the end of the chapter
    /// (e.g. `backend`, `frontend_full`).
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub code: Option<String>,

    /// Every other front matter field, in file order.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

// Front matter is hand-written, so `comments_id: 42` and
// `comments_id: "42"` must mean the same thing.
fn deserialize_scalar<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a scalar value, found {:?}",
            other
        ))),
    }
}

/// A loaded chapter. The `text` is the complete source including the front
/// matter block, which the rule engine strips later.
#[derive(Clone, Debug, PartialEq)]
pub struct ChapterDocument {
    pub identifier: String,
    pub text: String,
    pub front_matter: FrontMatter,
}

impl ChapterDocument {
    /// Parses a chapter from its identifier and source text.
    pub fn parse(identifier: &str, text: String) -> Result<ChapterDocument> {
        let front_matter = parse_front_matter(&text).map_err(|e| {
            Error::Annotated(format!("parsing chapter `{}`", identifier), Box::new(e))
        })?;

        Ok(ChapterDocument {
            identifier: identifier.to_owned(),
            text,
            front_matter,
        })
    }
}

fn parse_front_matter(text: &str) -> Result<FrontMatter> {
    let split = match split_front_matter(text)? {
        Some(split) => split,
        None => return Ok(FrontMatter::default()),
    };
    let yaml = &text[split.yaml_start..split.yaml_stop];
    if yaml.trim().is_empty() {
        return Ok(FrontMatter::default());
    }
    Ok(serde_yaml::from_str(yaml)?)
}

/// Byte offsets of the front matter block within a chapter's text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrontMatterSplit {
    /// Start of the YAML, just past the opening fence line.
    pub yaml_start: usize,

    /// End of the YAML, at the start of the closing fence line.
    pub yaml_stop: usize,

    /// Just past the closing fence (the line terminator is part of the body).
    pub body_start: usize,
}

/// Locates the front matter block. The text must begin with a `---` line for
/// it to have front matter at all; the block ends at the next line consisting
/// only of `---`.
pub fn split_front_matter(input: &str) -> Result<Option<FrontMatterSplit>> {
    let first_line = input.lines().next().unwrap_or("");
    if first_line.trim_end() != FENCE {
        return Ok(None);
    }

    let yaml_start = match input.find('\n') {
        Some(i) => i + 1,
        None => return Err(Error::FrontmatterMissingEndFence),
    };

    let mut offset = yaml_start;
    for line in input[yaml_start..].split_inclusive('\n') {
        let content = line.trim_end_matches(|c| c == '\n' || c == '\r');
        if content.trim_end() == FENCE {
            return Ok(Some(FrontMatterSplit {
                yaml_start,
                yaml_stop: offset,
                body_start: offset + content.len(),
            }));
        }
        offset += line.len();
    }
    Err(Error::FrontmatterMissingEndFence)
}

/// Decodes raw chapter bytes into text. A leading byte-order mark is dropped
/// and invalid UTF-8 sequences are replaced with U+FFFD.
pub fn decode(identifier: &str, bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            log::warn!(
                "chapter `{}` is not valid UTF-8; replacing invalid sequences",
                identifier
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_owned(),
        None => text,
    }
}

/// Loads chapters by identifier.
pub trait ChapterSource {
    fn load(&self, identifier: &str) -> Result<ChapterDocument>;
}

/// Loads chapters from `{directory}/{identifier}.md`.
pub struct DirectorySource {
    directory: PathBuf,
}

impl DirectorySource {
    pub fn new(directory: impl Into<PathBuf>) -> DirectorySource {
        DirectorySource {
            directory: directory.into(),
        }
    }

    pub fn path(&self, identifier: &str) -> PathBuf {
        self.directory.join(format!("{}.md", identifier))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl ChapterSource for DirectorySource {
    fn load(&self, identifier: &str) -> Result<ChapterDocument> {
        let path = self.path(identifier);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound {
                    identifier: identifier.to_owned(),
                    path,
                })
            }
            Err(e) => {
                return Err(Error::Annotated(
                    format!("reading `{}`", path.display()),
                    Box::new(Error::Io(e)),
                ))
            }
        };
        ChapterDocument::parse(identifier, decode(identifier, bytes))
    }
}

/// Serves chapters from memory, keyed by identifier.
#[derive(Clone, Debug, Default)]
pub struct MemorySource(BTreeMap<String, String>);

impl MemorySource {
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>, text: impl Into<String>) {
        self.0.insert(identifier.into(), text.into());
    }

    pub fn with(mut self, identifier: impl Into<String>, text: impl Into<String>) -> MemorySource {
        self.insert(identifier, text);
        self
    }
}

impl ChapterSource for MemorySource {
    fn load(&self, identifier: &str) -> Result<ChapterDocument> {
        match self.0.get(identifier) {
            Some(text) => ChapterDocument::parse(identifier, text.clone()),
            None => Err(Error::NotFound {
                identifier: identifier.to_owned(),
                path: PathBuf::from(identifier),
            }),
        }
    }
}

/// Represents the result of loading a [`ChapterDocument`].
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading a [`ChapterDocument`].
#[derive(Debug)]
pub enum Error {
    /// Returned when no document exists for the identifier.
    NotFound { identifier: String, path: PathBuf },

    /// Returned when a chapter opens a front matter block (`---`) but never
    /// closes it.
    FrontmatterMissingEndFence,

    /// Returned when the front matter isn't valid YAML.
    DeserializeYaml(serde_yaml::Error),

    /// Returned for other I/O errors.
    Io(std::io::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound { identifier, path } => write!(
                f,
                "chapter `{}` not found at `{}`",
                identifier,
                path.display()
            ),
            Error::FrontmatterMissingEndFence => write!(f, "Missing closing `---`"),
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::Annotated(annotation, err) => write!(f, "{}: {}", annotation, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound { .. } => None,
            Error::FrontmatterMissingEndFence => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
