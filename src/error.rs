use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Missing or empty media URL. Callers treat it as "no media present".
    #[error("invalid media reference: {0:?}")]
    InvalidReference(Option<String>),
}

/// A single field's evaluation fault. Caught per field; the page survives.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("field `{field}` has malformed value {value:?}")]
    Malformed { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The page loaded (or partly loaded) but could not be used.
    /// `final_url` is where the browser ended up, if it got that far.
    #[error("navigation to {url} failed: {reason}")]
    Navigation {
        url: String,
        final_url: Option<String>,
        reason: String,
    },
    #[error("navigation to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("invalid selector {0:?}")]
    InvalidSelector(String),
}

impl ScrapeError {
    pub fn landed_on(&self) -> Option<&str> {
        match self {
            ScrapeError::Navigation { final_url, .. } => final_url.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("fetch {url} failed: {reason}")]
    Fetch { url: String, reason: String },
    #[error("store {key} failed: {source}")]
    Store {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("upload {key} failed: {reason}")]
    Upload { key: String, reason: String },
}
