//! School Feeds - school meal pages and notice feeds
//!
//! This crate fetches the weekly meal menu and school notice feeds, and
//! renders them as a static HTML page, a JSON result envelope, or a
//! regenerated RSS feed. Each pipeline is a one-shot run.

pub mod config;
pub mod dates;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod meal;
pub mod notice;
pub mod page;
