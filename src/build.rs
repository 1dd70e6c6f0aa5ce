//! Exports the [`build_book`] function which stitches together the high-level
//! steps of producing a manuscript: loading the site data ([`crate::data`]),
//! assembling every chapter for the requested format ([`crate::assemble`]),
//! and writing the result to the output directory. It also exports
//! [`check_chapters`], which validates every chapter source without building.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::assemble::{Assembler, Error as AssembleError, Report};
use crate::chapter::{decode, DirectorySource};
use crate::config::Config;
use crate::data::{Changelog, Error as DataError, SectionList, SiteConfig};
use crate::rules::Ruleset;
use crate::target::Format;
use crate::trailer::DiscussionPolicy;
use crate::validate::{validate, ChapterWarning};

/// Builds the manuscript for `format` from a [`Config`]. `policy` overrides
/// the configured discussion policy when set. The output file is only written
/// once every chapter has been assembled, so a failed build leaves any
/// previous output in place.
pub fn build_book(
    config: &Config,
    format: Format,
    policy: Option<DiscussionPolicy>,
) -> Result<Report> {
    let target = format.target();
    let policy = policy.unwrap_or_else(|| config.discussion_policy(target));
    log::info!("building {} manuscript ({:?} discussion)", format, policy);

    let site = SiteConfig::from_file(&config.site_config)?;
    let changelog = match &config.changelog {
        Some(path) => Changelog::from_file(path)?,
        None => Changelog::default(),
    };
    let sections = SectionList::from_file(&config.chapter_list)?;
    let preamble = match config.preamble(format) {
        Some(path) => Some(read_file(path)?),
        None => None,
    };

    let source = DirectorySource::new(&config.chapters_directory);
    let ruleset = Ruleset::for_target(target, &config.assets_prefix, config.fixups.clone());
    let assembler = Assembler {
        source: &source,
        target,
        ruleset: &ruleset,
        site: &site,
        changelog: &changelog,
        policy,
        toc_groups: &config.toc_groups,
    };

    let mut manuscript = Vec::new();
    let report = assembler.assemble(&sections, preamble.as_deref(), &mut manuscript)?;

    std::fs::create_dir_all(&config.output_directory).map_err(|err| Error::Write {
        path: config.output_directory.clone(),
        err,
    })?;
    let output = config.output_path(format);
    std::fs::write(&output, &manuscript).map_err(|err| Error::Write {
        path: output.clone(),
        err,
    })?;
    log::info!(
        "wrote {} chapters to `{}` ({} warnings)",
        report.chapters,
        output.display(),
        report.warnings.len()
    );
    Ok(report)
}

/// Validates the code fences of every `.md` file under the chapters
/// directory, in path order.
pub fn check_chapters(config: &Config) -> Result<Vec<ChapterWarning>> {
    let mut warnings = Vec::new();
    for entry in WalkDir::new(&config.chapters_directory).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md")
        {
            continue;
        }

        let identifier = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_owned(),
            None => path.display().to_string(),
        };
        let bytes = std::fs::read(path).map_err(|err| Error::Read {
            path: path.to_owned(),
            err,
        })?;
        let text = decode(&identifier, bytes);
        for warning in validate(&text) {
            let warning = ChapterWarning {
                chapter: identifier.clone(),
                warning,
            };
            log::warn!("{}", warning);
            warnings.push(warning);
        }
    }
    Ok(warnings)
}

/// Builds every format in turn. Stops at the first fatal error.
pub fn build_all(
    config: &Config,
    policy: Option<DiscussionPolicy>,
) -> Result<BTreeMap<Format, Report>> {
    let mut reports = BTreeMap::new();
    for format in Format::ALL.iter().copied() {
        reports.insert(format, build_book(config, format, policy)?);
    }
    Ok(reports)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| Error::Read {
        path: path.to_owned(),
        err,
    })
}

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a manuscript. Errors can be while loading the
/// site data, assembling chapters, reading the preamble, or writing output.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors loading the site config, changelog, or chapter
    /// list.
    Data(DataError),

    /// Returned for errors that abort assembly.
    Assemble(AssembleError),

    /// Returned for I/O problems reading a preamble or chapter.
    Read { path: PathBuf, err: std::io::Error },

    /// Returned for I/O problems creating the output directory or file.
    Write { path: PathBuf, err: std::io::Error },

    /// Returned for errors walking the chapters directory.
    Walk(walkdir::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Data(err) => err.fmt(f),
            Error::Assemble(err) => err.fmt(f),
            Error::Read { path, err } => write!(f, "reading `{}`: {}", path.display(), err),
            Error::Write { path, err } => write!(f, "writing `{}`: {}", path.display(), err),
            Error::Walk(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Data(err) => Some(err),
            Error::Assemble(err) => Some(err),
            Error::Read { path: _, err } => Some(err),
            Error::Write { path: _, err } => Some(err),
            Error::Walk(err) => Some(err),
        }
    }
}

impl From<DataError> for Error {
    fn from(err: DataError) -> Error {
        Error::Data(err)
    }
}

impl From<AssembleError> for Error {
    fn from(err: AssembleError) -> Error {
        Error::Assemble(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Error {
        Error::Walk(err)
    }
}
