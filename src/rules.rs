//! The rule engine: an ordered list of text rewrites applied to each chapter.
//! Every rule receives the previous rule's output. Rules hold no state; what
//! they need about the current chapter comes from the [`Context`].

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, NoExpand, Regex};

use crate::chapter::{split_front_matter, FrontMatter};
use crate::data::{Changelog, SiteConfig};
use crate::headings::HeadingShift;
use crate::target::Target;

/// The identifier of the one chapter that receives changelog interpolation.
pub const CHANGELOG_CHAPTER: &str = "changelog";

static SITE_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*site\.([\w-]+)\s*\}\}").expect("valid regex"));

static CHANGELOG_VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*site\.data\.changelog\.([\w.-]+?)\.(title|desc)\s*\}\}")
        .expect("valid regex")
});

static RAW_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{%-?\s*(?:raw|endraw)\s*-?%\}").expect("valid regex"));

static CHANGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{%\s*change\s*%\}").expect("valid regex"));

/// Everything a rule may consult besides the text itself.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub identifier: &'a str,
    pub front_matter: &'a FrontMatter,
    pub site: &'a SiteConfig,
    pub changelog: &'a Changelog,
}

/// A single text-to-text rewrite.
pub trait Rule {
    fn apply(&self, text: &str, context: &Context) -> Result<String>;
}

/// Computes the replacement for one regex match. `None` keeps the match as
/// it is.
pub type Compute = fn(&Captures, &Context) -> Option<String>;

/// A pattern and its replacement.
#[derive(Clone)]
pub enum RewriteRule {
    /// Replaces every occurrence of `find` with `replace`.
    Literal { find: String, replace: String },

    /// Replaces every match of `regex` with `replace`, taken verbatim (`$1`
    /// is not expanded).
    Regex { regex: Regex, replace: String },

    /// Replaces every match of `regex` with a value computed from the
    /// captures and the context.
    Computed { regex: Regex, compute: Compute },
}

impl RewriteRule {
    pub fn literal(find: impl Into<String>, replace: impl Into<String>) -> RewriteRule {
        RewriteRule::Literal {
            find: find.into(),
            replace: replace.into(),
        }
    }

    pub fn regex(regex: Regex, replace: impl Into<String>) -> RewriteRule {
        RewriteRule::Regex {
            regex,
            replace: replace.into(),
        }
    }

    pub fn computed(regex: Regex, compute: Compute) -> RewriteRule {
        RewriteRule::Computed { regex, compute }
    }

    fn rewrite(&self, text: &str, context: &Context) -> String {
        match self {
            RewriteRule::Literal { find, replace } => match find.is_empty() {
                true => text.to_owned(),
                false => text.replace(find.as_str(), replace),
            },
            RewriteRule::Regex { regex, replace } => {
                regex.replace_all(text, NoExpand(replace)).into_owned()
            }
            RewriteRule::Computed { regex, compute } => regex
                .replace_all(text, |caps: &Captures| match compute(caps, context) {
                    Some(value) => value,
                    None => caps[0].to_owned(),
                })
                .into_owned(),
        }
    }
}

impl Rule for RewriteRule {
    fn apply(&self, text: &str, context: &Context) -> Result<String> {
        Ok(self.rewrite(text, context))
    }
}

impl fmt::Debug for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RewriteRule::Literal { find, replace } => {
                write!(f, "Literal({:?} => {:?})", find, replace)
            }
            RewriteRule::Regex { regex, replace } => {
                write!(f, "Regex({:?} => {:?})", regex.as_str(), replace)
            }
            RewriteRule::Computed { regex, .. } => write!(f, "Computed({:?})", regex.as_str()),
        }
    }
}

/// Replaces the front matter block with the target's title heading.
pub struct StripFrontMatter {
    pub target: &'static dyn Target,
}

impl Rule for StripFrontMatter {
    fn apply(&self, text: &str, context: &Context) -> Result<String> {
        let title = context
            .front_matter
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .ok_or_else(|| Error::MalformedDocument {
                chapter: context.identifier.to_owned(),
                field: "title",
            })?;

        // The loader already rejected unterminated front matter, so a split
        // failure here means the text never had any.
        let body = match split_front_matter(text) {
            Ok(Some(split)) => &text[split.body_start..],
            _ => {
                return Err(Error::MalformedDocument {
                    chapter: context.identifier.to_owned(),
                    field: "front matter",
                })
            }
        };

        let mut out = self.target.title_heading(title, context.identifier);
        if !body.starts_with('\n') && !body.starts_with("\r\n") {
            out.push('\n');
        }
        out.push_str(body);
        Ok(out)
    }
}

/// Moves headings by a fixed number of levels. See [`HeadingShift`].
pub struct ShiftHeadings(pub HeadingShift);

impl Rule for ShiftHeadings {
    fn apply(&self, text: &str, _context: &Context) -> Result<String> {
        Ok(self.0.apply(text))
    }
}

/// Applies `rule` only to the chapter named `identifier`.
pub struct OnlyFor {
    pub identifier: String,
    pub rule: Box<dyn Rule>,
}

impl Rule for OnlyFor {
    fn apply(&self, text: &str, context: &Context) -> Result<String> {
        match context.identifier == self.identifier {
            true => self.rule.apply(text, context),
            false => Ok(text.to_owned()),
        }
    }
}

fn site_variable(caps: &Captures, context: &Context) -> Option<String> {
    context.site.get(&caps[1]).map(str::to_owned)
}

fn changelog_variable(caps: &Captures, context: &Context) -> Option<String> {
    let entry = context.changelog.get(&caps[1])?;
    match &caps[2] {
        "title" => Some(entry.title.clone()),
        _ => Some(entry.desc.clone()),
    }
}

/// Extra rules for specific chapters, keyed by chapter identifier. They run
/// after every generic rule, in the order listed.
#[derive(Clone, Debug, Default)]
pub struct FixupTable(BTreeMap<String, Vec<RewriteRule>>);

impl FixupTable {
    pub fn new() -> FixupTable {
        FixupTable::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>, rule: RewriteRule) {
        self.0.entry(identifier.into()).or_default().push(rule);
    }

    pub fn rules_for(&self, identifier: &str) -> &[RewriteRule] {
        self.0.get(identifier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn apply<'t>(&self, text: &'t str, context: &Context) -> Cow<'t, str> {
        let rules = self.rules_for(context.identifier);
        if rules.is_empty() {
            return Cow::Borrowed(text);
        }
        let mut text = text.to_owned();
        for rule in rules {
            text = rule.rewrite(&text, context);
        }
        Cow::Owned(text)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The ordered rules for one output target, followed by the chapter fixups.
pub struct Ruleset {
    rules: Vec<Box<dyn Rule>>,
    fixups: FixupTable,
}

impl Ruleset {
    /// Builds the standard rules for `target`:
    ///
    /// 1. front matter to title heading
    /// 2. heading-level shift
    /// 3. `/assets/` to `assets_prefix`
    /// 4. table-class and `{% raw %}`/`{% endraw %}` markers removed
    /// 5. `{{ site.KEY }}` interpolation
    /// 6. changelog interpolation (the `changelog` chapter only)
    /// 7. `{% change %}` marker, then the target's Unicode substitutions
    ///
    /// and finally the chapter-specific `fixups`.
    pub fn for_target(
        target: &'static dyn Target,
        assets_prefix: &str,
        fixups: FixupTable,
    ) -> Ruleset {
        let mut rules: Vec<Box<dyn Rule>> = vec![
            Box::new(StripFrontMatter { target }),
            Box::new(ShiftHeadings(target.heading_shift())),
            Box::new(RewriteRule::literal("/assets/", assets_prefix)),
            Box::new(RewriteRule::literal("{: .cost-table }", "")),
            Box::new(RewriteRule::regex(RAW_MARKER.clone(), "")),
            Box::new(RewriteRule::computed(SITE_VARIABLE.clone(), site_variable)),
            Box::new(OnlyFor {
                identifier: CHANGELOG_CHAPTER.to_owned(),
                rule: Box::new(RewriteRule::computed(
                    CHANGELOG_VARIABLE.clone(),
                    changelog_variable,
                )),
            }),
            Box::new(RewriteRule::regex(
                CHANGE_MARKER.clone(),
                target.change_marker(assets_prefix),
            )),
        ];
        for (glyph, replacement) in target.unicode_substitutions() {
            rules.push(Box::new(RewriteRule::literal(*glyph, *replacement)));
        }
        Ruleset { rules, fixups }
    }

    /// Builds a ruleset from explicit rules, with no fixups.
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Ruleset {
        Ruleset {
            rules,
            fixups: FixupTable::default(),
        }
    }

    /// Runs every rule in order, then the fixups for the context's chapter.
    pub fn apply(&self, text: &str, context: &Context) -> Result<String> {
        let mut text = Cow::Borrowed(text);
        for rule in &self.rules {
            text = Cow::Owned(rule.apply(&text, context)?);
        }
        Ok(self.fixups.apply(&text, context).into_owned())
    }
}

/// Represents the result of applying a [`Rule`].
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a rule that can't be applied to a chapter.
#[derive(Debug)]
pub enum Error {
    /// Returned when a field a rule depends on is absent from the chapter.
    MalformedDocument {
        chapter: String,
        field: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MalformedDocument { chapter, field } => {
                write!(f, "chapter `{}` is missing required `{}`", chapter, field)
            }
        }
    }
}

impl std::error::Error for Error {}
