//! The library code for the `bindery` manuscript builder. A book is a set of
//! Jekyll-flavored Markdown chapters plus the site data that describes them;
//! `bindery` merges those chapters into a single Markdown manuscript for one
//! output format at a time. Building is broken down into these steps:
//!
//! 1. Loading the project config, site variables, changelog, and chapter
//!    list ([`crate::config`], [`crate::data`])
//! 2. Loading each chapter and its front matter ([`crate::chapter`])
//! 3. Transforming the chapter for the output format ([`crate::assemble`])
//!
//! The third step is the more involved. Each chapter has its code fences
//! validated ([`crate::validate`]), runs through an ordered list of rewrite
//! rules ([`crate::rules`]), has its cross references resolved
//! ([`crate::links`]), and gets its discussion and source-code blocks
//! appended ([`crate::trailer`]). Everything that differs between formats
//! lives behind the [`target::Target`] trait.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod assemble;
pub mod build;
pub mod chapter;
pub mod config;
pub mod data;
pub mod headings;
pub mod links;
pub mod rules;
pub mod target;
pub mod trailer;
pub mod validate;
