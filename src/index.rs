use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::model::PageDescriptor;

#[derive(Deserialize)]
struct ContentsIndex {
    #[serde(rename = "ContentsList")]
    contents_list: Vec<PageDescriptor>,
}

/// Fetch the site's content index and return its pages in index order.
pub async fn fetch_page_list(index_url: &str) -> Result<Vec<PageDescriptor>> {
    info!("Fetching content index: {}", index_url);
    let body = reqwest::Client::new()
        .get(index_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("Failed to fetch content index {}", index_url))?
        .text()
        .await
        .context("Failed to read content index")?;

    let pages = parse_index(&body)?;
    info!("Pages in index: {}", pages.len());
    Ok(pages)
}

pub fn parse_index(json: &str) -> Result<Vec<PageDescriptor>> {
    let index: ContentsIndex = serde_json::from_str(json).context("Malformed content index")?;
    Ok(index.contents_list)
}
