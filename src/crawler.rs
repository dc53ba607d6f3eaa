use std::collections::HashMap;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};
use url::Url;

use crate::browser::Browser;
use crate::config::CrawlConfig;
use crate::error::ScrapeError;
use crate::model::{CrawlRecord, PageDescriptor, PageOutcome, RedirectRecord};
use crate::parser::{self, Ctx};
use crate::store::RecordSink;

/// Crawl counters returned after completion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlStats {
    pub total: usize,
    pub scraped: usize,
    pub empty: usize,
    pub redirected: usize,
    pub failed: usize,
    pub persist_errors: usize,
    /// Canonical paths of pages that produced no record.
    pub failed_pages: Vec<String>,
}

pub struct CrawlReport {
    pub records: Vec<CrawlRecord>,
    pub stats: CrawlStats,
}

/// Load one page and turn it into a record.
///
/// A landing URL different from the requested one short-circuits into a
/// redirect. Missing required markers fail the page.
pub async fn scrape_page(
    browser: &dyn Browser,
    page: &PageDescriptor,
    cfg: &CrawlConfig,
) -> Result<PageOutcome, ScrapeError> {
    let url = cfg.absolute_url(&page.page_url);
    let post_url = cfg.canonical_path(&page.page_url);

    let rendered = timeout(
        cfg.navigation_timeout,
        browser.navigate(&url, cfg.navigation_timeout),
    )
    .await
    .map_err(|_| ScrapeError::Timeout {
        url: url.clone(),
        timeout: cfg.navigation_timeout,
    })??;

    let final_url = rendered.final_url().to_string();
    if !same_url(&final_url, &url) {
        warn!("Redirected from {} to {}", url, final_url);
        return Ok(PageOutcome::Redirected(RedirectRecord {
            post_url,
            redirect_url: final_url,
        }));
    }

    for marker in &cfg.required_markers {
        timeout(cfg.wait_timeout, rendered.wait_for(marker, cfg.wait_timeout))
            .await
            .map_err(|_| ScrapeError::Navigation {
                url: url.clone(),
                final_url: Some(final_url.clone()),
                reason: format!("timed out waiting for `{}`", marker),
            })??;
    }

    let html = rendered.content().await?;
    let ctx = Ctx {
        host: &cfg.host,
        page: &post_url,
    };
    Ok(parser::extract(&html, &ctx).into_outcome(&post_url))
}

fn same_url(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Crawl `pages` in chunks of `cfg.chunk_size`. Pages within a chunk run
/// concurrently; the next chunk starts once every task in this one has
/// settled. The document is persisted after every settled task.
pub async fn crawl<S: RecordSink>(
    browser: Arc<dyn Browser>,
    pages: Vec<PageDescriptor>,
    cfg: Arc<CrawlConfig>,
    sink: &mut S,
) -> CrawlReport {
    let total = pages.len();
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }

    let mut log = CrawlLog::new(sink, total);
    let chunk_size = cfg.chunk_size.max(1);

    for (n, chunk) in pages.chunks(chunk_size).enumerate() {
        info!(
            "Chunk {}: pages {}-{} of {}",
            n + 1,
            n * chunk_size + 1,
            n * chunk_size + chunk.len(),
            total
        );

        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::with_capacity(chunk.len());
        for page in chunk.iter().cloned() {
            let browser = Arc::clone(&browser);
            let cfg = Arc::clone(&cfg);
            let post_url = cfg.canonical_path(&page.page_url);
            let handle = tasks.spawn({
                let post_url = post_url.clone();
                async move {
                    let result = scrape_page(browser.as_ref(), &page, &cfg).await;
                    (post_url, result)
                }
            });
            in_flight.insert(handle.id(), post_url);
        }

        // Barrier: drain every task of this chunk before spawning the next.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((post_url, result)) => log.settle(&post_url, result).await,
                Err(e) => {
                    let post_url = in_flight.remove(&e.id()).unwrap_or_default();
                    error!("Page task aborted on {}: {}", post_url, e);
                    log.fail(post_url);
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    let stats = log.stats.clone();
    info!(
        "Crawled {} pages ({} scraped, {} empty, {} redirected, {} failed)",
        stats.total, stats.scraped, stats.empty, stats.redirected, stats.failed
    );
    CrawlReport {
        records: log.records,
        stats,
    }
}

/// Sole owner of the result list. Tasks hand results back through the join
/// set; only this appends or persists.
struct CrawlLog<'s, S> {
    records: Vec<CrawlRecord>,
    sink: &'s mut S,
    stats: CrawlStats,
}

impl<'s, S: RecordSink> CrawlLog<'s, S> {
    fn new(sink: &'s mut S, total: usize) -> Self {
        Self {
            records: Vec::with_capacity(total),
            sink,
            stats: CrawlStats {
                total,
                ..Default::default()
            },
        }
    }

    async fn settle(&mut self, page_url: &str, result: Result<PageOutcome, ScrapeError>) {
        let record = match result {
            Ok(PageOutcome::Scraped(post)) => {
                info!("Scraped {} ({} blocks)", page_url, post.content.len());
                self.stats.scraped += 1;
                CrawlRecord::Post(post)
            }
            Ok(PageOutcome::EmptyContent(post)) => {
                warn!("No article content on {}", page_url);
                self.stats.empty += 1;
                CrawlRecord::Post(post)
            }
            Ok(PageOutcome::Redirected(redirect)) => {
                self.stats.redirected += 1;
                CrawlRecord::Redirect(redirect)
            }
            Err(e) => match e.landed_on() {
                Some(landed) => {
                    warn!("{} (ended on {}): {}", page_url, landed, e);
                    self.stats.redirected += 1;
                    CrawlRecord::Redirect(RedirectRecord {
                        post_url: page_url.to_string(),
                        redirect_url: landed.to_string(),
                    })
                }
                None => {
                    warn!("Failed {}: {}", page_url, e);
                    self.fail(page_url.to_string());
                    return;
                }
            },
        };

        self.records.push(record);
        if let Err(e) = self.sink.persist(&self.records).await {
            warn!("Failed to persist after {}: {:#}", page_url, e);
            self.stats.persist_errors += 1;
        }
    }

    fn fail(&mut self, post_url: String) {
        self.stats.failed += 1;
        self.stats.failed_pages.push(post_url);
    }
}
