//! Error types for each pipeline stage.
//!
//! Pipelines never let these escape to the process: the notice pipeline folds
//! them into the envelope, the meal pipeline logs and aborts, and the feed
//! regenerator logs and returns `None`.

use thiserror::Error;

/// HTTP collaborator errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error: {status} for url ({url})")]
    Status { status: u16, url: String },
}

/// Document-level XML errors. Item-level problems are not errors.
#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("no element found")]
    NoRoot,

    #[error("unclosed element <{0}>")]
    Unclosed(String),

    #[error("content outside of the root element")]
    OutsideRoot,
}

/// A feed item that cannot become a notice. The item is skipped.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("item has neither a title nor a link")]
    Empty,
}

#[derive(Debug, Error)]
pub enum MealError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to render meal page: {0}")]
    Render(#[from] askama::Error),

    #[error("No meals between {from} and {to}")]
    Empty { from: String, to: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RegenerateError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid last_updated timestamp: {0}")]
    LastUpdated(#[from] chrono::ParseError),

    #[error("Failed to render feed: {0}")]
    Render(#[from] askama::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}
