//! Appends the trailing blocks of a chapter: a link to the chapter's forum
//! discussion and, when the front matter names one, a link to the source
//! code for the chapter.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::data::SiteConfig;
use crate::rules::Context;
use crate::target::Target;

const FORUM_URL: &str = "forum_url";
const FORUM_THREAD_PREFIX: &str = "forum_thread_prefix";

/// What to do with a chapter that has no `comments_id`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscussionPolicy {
    /// Fail the build.
    Strict,

    /// Leave the discussion block out.
    Lenient,
}

impl FromStr for DiscussionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "strict" => Ok(DiscussionPolicy::Strict),
            "lenient" => Ok(DiscussionPolicy::Lenient),
            _ => Err(format!("unknown discussion policy `{}`", s)),
        }
    }
}

/// A resolved source-code link, ready for a [`Target`] to render.
#[derive(Clone, Debug, PartialEq)]
pub struct CodeLink {
    /// The sentence introducing the link.
    pub lead: &'static str,
    pub text: String,
    pub url: String,
}

struct Repository {
    /// The front matter `code` value selecting this repository.
    code: &'static str,

    /// The site variable holding the repository URL.
    site_key: &'static str,

    text: &'static str,

    /// Whether the link points at the chapter's own branch
    /// (`{repo}/tree/{chapter}`) rather than the repository root.
    per_chapter: bool,
}

const REPOSITORIES: &[Repository] = &[
    Repository {
        code: "backend",
        site_key: "backend_github_repo",
        text: "Backend Source",
        per_chapter: true,
    },
    Repository {
        code: "frontend",
        site_key: "frontend_github_repo",
        text: "Frontend Source",
        per_chapter: true,
    },
    Repository {
        code: "backend_full",
        site_key: "backend_github_repo",
        text: "Backend Source",
        per_chapter: false,
    },
    Repository {
        code: "frontend_full",
        site_key: "frontend_github_repo",
        text: "Frontend Source",
        per_chapter: false,
    },
    Repository {
        code: "mono-repo",
        site_key: "backend_mono_github_repo",
        text: "Mono-repo Backend Source",
        per_chapter: false,
    },
    Repository {
        code: "facebook-login",
        site_key: "frontend_fb_login_github_repo",
        text: "Facebook Login Frontend Source",
        per_chapter: false,
    },
    Repository {
        code: "user-management",
        site_key: "frontend_user_mgmt_github_repo",
        text: "User Management Frontend Source",
        per_chapter: false,
    },
];

fn site_variable(site: &SiteConfig, chapter: &str, key: &'static str) -> Result<String> {
    site.get(key)
        .map(str::to_owned)
        .ok_or_else(|| Error::MissingSiteVariable {
            chapter: chapter.to_owned(),
            key,
        })
}

/// Resolves the discussion URL for the chapter in `context`. Returns
/// `Ok(None)` when the chapter has no `comments_id` and `policy` is lenient.
pub fn discussion_url(context: &Context, policy: DiscussionPolicy) -> Result<Option<String>> {
    let comments_id = match context.front_matter.comments_id.as_deref() {
        Some(id) => id,
        None if policy == DiscussionPolicy::Lenient => {
            log::debug!(
                "chapter `{}` has no `comments_id`; skipping discussion block",
                context.identifier
            );
            return Ok(None);
        }
        None => {
            return Err(Error::MissingField {
                chapter: context.identifier.to_owned(),
                field: "comments_id",
            })
        }
    };

    let forum_url = site_variable(context.site, context.identifier, FORUM_URL)?;
    let prefix = site_variable(context.site, context.identifier, FORUM_THREAD_PREFIX)?;
    Ok(Some(format!("{}{}{}", forum_url, prefix, comments_id)))
}

/// Resolves the source-code link for the chapter in `context`. The `code`
/// values form a closed set; a chapter without `code`, or with a value
/// outside the set, has no link.
pub fn code_link(context: &Context) -> Result<Option<CodeLink>> {
    let code = match context.front_matter.code.as_deref() {
        Some(code) => code,
        None => return Ok(None),
    };
    let repository = match REPOSITORIES.iter().find(|r| r.code == code) {
        Some(repository) => repository,
        None => {
            log::debug!(
                "chapter `{}` has unrecognized `code: {}`; skipping source block",
                context.identifier,
                code
            );
            return Ok(None);
        }
    };

    let repo_url = site_variable(context.site, context.identifier, repository.site_key)?;
    let lead = match code {
        "backend_full" => "For reference, here is the complete code for the backend",
        "frontend_full" => "For reference, here is the complete code for the frontend",
        _ => "For reference, here is the code we are using",
    };
    Ok(Some(match repository.per_chapter {
        true => CodeLink {
            lead,
            text: format!("{}: {}", repository.text, context.identifier),
            url: format!("{}/tree/{}", repo_url, context.identifier),
        },
        false => CodeLink {
            lead,
            text: repository.text.to_owned(),
            url: repo_url,
        },
    }))
}

/// Appends the discussion and source-code blocks to `text`, in the order the
/// target prefers.
pub fn append_trailer(
    text: &str,
    context: &Context,
    target: &dyn Target,
    policy: DiscussionPolicy,
) -> Result<String> {
    let discussion = discussion_url(context, policy)?.map(|url| target.discussion_block(&url));
    let code = code_link(context)?.map(|link| target.code_block(&link));

    let mut out = String::from(text);
    let blocks = match target.code_before_discussion() {
        true => [code, discussion],
        false => [discussion, code],
    };
    for block in blocks.iter().flatten() {
        out.push_str(block);
    }
    Ok(out)
}

/// Represents the result of building a chapter trailer.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error building a chapter trailer.
#[derive(Debug)]
pub enum Error {
    /// Returned in strict mode when a chapter has no `comments_id`.
    MissingField {
        chapter: String,
        field: &'static str,
    },

    /// Returned when a block needs a site variable that isn't configured.
    MissingSiteVariable { chapter: String, key: &'static str },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingField { chapter, field } => {
                write!(f, "chapter `{}` is missing `{}`", chapter, field)
            }
            Error::MissingSiteVariable { chapter, key } => write!(
                f,
                "chapter `{}` needs site variable `{}`, which isn't set",
                chapter, key
            ),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chapter::FrontMatter;
    use crate::data::Changelog;
    use crate::target::{EpubTarget, MarkdownTarget, PdfTarget};

    fn site() -> SiteConfig {
        vec![
            ("forum_url", "https://f/"),
            ("forum_thread_prefix", "t/"),
            ("backend_github_repo", "https://github.com/x/backend"),
            ("frontend_github_repo", "https://github.com/x/frontend"),
        ]
        .into_iter()
        .collect()
    }

    fn front_matter(comments_id: Option<&str>, code: Option<&str>) -> FrontMatter {
        FrontMatter {
            title: Some(String::from("Intro")),
            comments_id: comments_id.map(String::from),
            code: code.map(String::from),
            ..FrontMatter::default()
        }
    }

    fn with_context<T>(front_matter: &FrontMatter, f: impl FnOnce(&Context) -> T) -> T {
        let site = site();
        let changelog = Changelog::default();
        f(&Context {
            identifier: "intro",
            front_matter,
            site: &site,
            changelog: &changelog,
        })
    }

    #[test]
    fn test_markdown_trailer() -> Result<()> {
        let fm = front_matter(Some("42"), Some("backend"));
        let out = with_context(&fm, |ctx| {
            append_trailer("Body\n", ctx, &MarkdownTarget, DiscussionPolicy::Strict)
        })?;
        assert_eq!(
            "Body\n\n**For help and discussion**\n\n[Comments on this chapter](https://f/t/42)\n\
             \n**For reference, here is the code we are using**\n\n\
             [Backend Source: intro](https://github.com/x/backend/tree/intro)\n",
            out
        );
        Ok(())
    }

    #[test]
    fn test_epub_puts_code_first() -> Result<()> {
        let fm = front_matter(Some("42"), Some("frontend_full"));
        let out = with_context(&fm, |ctx| {
            append_trailer("", ctx, &EpubTarget, DiscussionPolicy::Strict)
        })?;
        let code = out.find("post-checkpoint").expect("code block");
        let discussion = out.find("post-links").expect("discussion block");
        assert!(code < discussion);
        assert!(out.contains("href=\"https://github.com/x/frontend\""));
        assert!(out.contains("complete code for the frontend"));
        Ok(())
    }

    #[test]
    fn test_pdf_discussion_block() -> Result<()> {
        let fm = front_matter(Some("42"), None);
        let out = with_context(&fm, |ctx| {
            append_trailer("", ctx, &PdfTarget, DiscussionPolicy::Strict)
        })?;
        assert!(out.contains("\\href{https://f/t/42}{comments for this chapter on our forums}"));
        assert!(!out.contains("faGithub"));
        Ok(())
    }

    #[test]
    fn test_missing_comments_id() {
        let fm = front_matter(None, None);
        let strict =
            with_context(&fm, |ctx| append_trailer("Body", ctx, &PdfTarget, DiscussionPolicy::Strict));
        match strict {
            Err(Error::MissingField { chapter, field }) => {
                assert_eq!("intro", chapter);
                assert_eq!("comments_id", field);
            }
            other => panic!("wanted missing-field error; found {:?}", other),
        }

        let lenient = with_context(&fm, |ctx| {
            append_trailer("Body", ctx, &PdfTarget, DiscussionPolicy::Lenient)
        });
        assert_eq!("Body", lenient.unwrap());
    }

    #[test]
    fn test_unknown_code_yields_no_block() -> Result<()> {
        let fm = front_matter(None, Some("android"));
        assert_eq!(None, with_context(&fm, |ctx| code_link(ctx))?);
        Ok(())
    }

    #[test]
    fn test_code_repository_must_be_configured() {
        let fm = front_matter(None, Some("mono-repo"));
        match with_context(&fm, |ctx| code_link(ctx)) {
            Err(Error::MissingSiteVariable { key, .. }) => {
                assert_eq!("backend_mono_github_repo", key)
            }
            other => panic!("wanted missing-site-variable error; found {:?}", other),
        }
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(Ok(DiscussionPolicy::Strict), "strict".parse::<DiscussionPolicy>());
        assert_eq!(Ok(DiscussionPolicy::Lenient), "lenient".parse::<DiscussionPolicy>());
        assert!("loose".parse::<DiscussionPolicy>().is_err());
    }
}
