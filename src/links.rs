//! Rewrites links between chapters into the cross-reference syntax of the
//! output target. Three shapes are recognized:
//!
//! * chapter links: `[Label]({% link _chapters/ID.md %})` or
//!   `[Label](chapter-ref:ID)`
//! * section links: either of the above followed by `#ANCHOR`
//! * page links: `{% link PAGE.md %}` for pages outside the book, which
//!   become absolute URLs under the site's `url`
//!
//! Anything else is left as it is.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::data::SiteConfig;
use crate::target::Target;

static CHAPTER_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[([^\]]*)\]\((?:\{%\s*link\s+_chapters/([^\s#%]+?)\.md\s*%\}|chapter-ref:([^\s#)]+))(?:#([^)\s]*))?\)",
    )
    .expect("valid regex")
});

static PAGE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{%\s*link\s+([A-Za-z0-9][^.\s%]*)\.md\s*%\}").expect("valid regex")
});

/// The site variable holding the published site's base URL.
pub const SITE_URL: &str = "url";

/// Resolves every chapter, section, and page link in `text` for `target`.
pub fn resolve(text: &str, target: &dyn Target, site: &SiteConfig) -> String {
    let text = CHAPTER_LINK.replace_all(text, |caps: &Captures| {
        let label = &caps[1];
        let chapter = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match caps.get(4).map(|m| m.as_str()).filter(|a| !a.is_empty()) {
            Some(anchor) => target.section_link(label, chapter, anchor),
            None => target.chapter_link(label, chapter),
        }
    });

    let base = match site.get(SITE_URL).map(site_base) {
        Some(Ok(base)) => base,
        Some(Err(e)) => {
            log::warn!("site `url` is not a valid URL ({}); page links left as-is", e);
            return text.into_owned();
        }
        None => return text.into_owned(),
    };

    PAGE_LINK
        .replace_all(&text, |caps: &Captures| match base.join(&caps[1]) {
            Ok(url) => url.to_string(),
            Err(_) => caps[0].to_owned(),
        })
        .into_owned()
}

// NOTE: without a trailing slash, [`Url::join`] treats the last path segment
// as a file name and replaces it.
fn site_base(url: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(url)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}
