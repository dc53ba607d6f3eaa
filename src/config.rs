use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const DEFAULT_HOST: &str = "https://lexus.jp";
const INDEX_PATH: &str = "/magazine/json/all_contents.json";
const CHUNK_SIZE: usize = 50;
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(80);
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const ARTICLE_MARKER: &str = ".article__body";

pub const CRAWL_OUTPUT: &str = "scraped_data.json";
pub const POST_OUTPUT: &str = "scraped_post.json";
pub const MEDIA_ROOT: &str = "media";
pub const SPIDER_KEY_ENV: &str = "SPIDER_API_KEY";
pub const BUCKET_ENV: &str = "AWS_BUCKET";

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Site origin, no trailing slash.
    pub host: String,
    pub index_url: String,
    /// Max in-flight page tasks; the next chunk starts once all settle.
    pub chunk_size: usize,
    pub navigation_timeout: Duration,
    pub wait_timeout: Duration,
    /// Selectors that must appear before a page counts as loaded.
    pub required_markers: Vec<String>,
    pub output: PathBuf,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::for_host(DEFAULT_HOST)
    }
}

impl CrawlConfig {
    pub fn for_host(host: &str) -> Self {
        let host = host.trim_end_matches('/').to_string();
        Self {
            index_url: format!("{}{}", host, INDEX_PATH),
            host,
            chunk_size: CHUNK_SIZE,
            navigation_timeout: NAVIGATION_TIMEOUT,
            wait_timeout: WAIT_TIMEOUT,
            required_markers: vec![ARTICLE_MARKER.to_string()],
            output: PathBuf::from(CRAWL_OUTPUT),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: Option<usize>) -> Self {
        if let Some(n) = chunk_size {
            self.chunk_size = n.max(1);
        }
        self
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        if let Some(path) = output {
            self.output = path;
        }
        self
    }

    /// Single-page scrapes skip the marker wait.
    pub fn without_markers(mut self) -> Self {
        self.required_markers.clear();
        self
    }

    /// Absolute URL for an index entry, which is normally a site path.
    pub fn absolute_url(&self, page: &str) -> String {
        if Url::parse(page).is_ok() {
            page.to_string()
        } else {
            format!("{}/{}", self.host, page.trim_start_matches('/'))
        }
    }

    /// Site path for an index entry: `/magazine/post/abc`.
    pub fn canonical_path(&self, page: &str) -> String {
        let path = page.strip_prefix(self.host.as_str()).unwrap_or(page);
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        }
    }
}
