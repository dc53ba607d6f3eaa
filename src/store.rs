use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::model::{visible_slides, ContentBlock, CrawlRecord};

/// Durable home of the accumulating crawl document. Every call replaces the
/// whole document; `&mut self` keeps writes from interleaving.
#[async_trait]
pub trait RecordSink: Send {
    async fn persist(&mut self, records: &[CrawlRecord]) -> Result<()>;
}

/// Pretty-printed JSON file, replaced via a temp file and rename.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonStore {
    async fn persist(&mut self, records: &[CrawlRecord]) -> Result<()> {
        write_json(&self.path, records).await
    }
}

pub async fn write_json<T: Serialize + Sync + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Read a crawl document written by [`JsonStore`].
pub async fn load_records(path: &Path) -> Result<Vec<CrawlRecord>> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("Malformed crawl document {}", path.display()))
}

/// Counts over a persisted crawl document.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub records: usize,
    pub posts: usize,
    pub empty: usize,
    pub redirects: usize,
    /// Blocks per `fieldId`.
    pub blocks: BTreeMap<&'static str, usize>,
    /// Carousel slides that are not loop clones.
    pub visible_slides: usize,
}

impl DocumentStats {
    pub fn of(records: &[CrawlRecord]) -> Self {
        let mut stats = DocumentStats {
            records: records.len(),
            ..Default::default()
        };
        for record in records {
            let post = match record {
                CrawlRecord::Redirect(_) => {
                    stats.redirects += 1;
                    continue;
                }
                CrawlRecord::Post(post) => post,
            };
            stats.posts += 1;
            if post.content.is_empty() {
                stats.empty += 1;
            }
            for block in &post.content {
                *stats.blocks.entry(block.field_id()).or_default() += 1;
                if let ContentBlock::Carousel { items } = block {
                    stats.visible_slides += visible_slides(items).count();
                }
            }
        }
        stats
    }
}
