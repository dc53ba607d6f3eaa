mod browser;
mod config;
mod crawler;
mod error;
mod index;
mod media;
mod model;
mod parser;
mod resolver;
mod s3;
mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::browser::{Browser, HttpBrowser, SpiderBrowser};
use crate::config::CrawlConfig;
use crate::media::BlobStore;
use crate::model::{PageDescriptor, PageOutcome};
use crate::s3::{ObjectBlobStore, S3Client};

#[derive(Parser)]
#[command(name = "magazine_scraper", about = "Magazine post scraper and media downloader")]
struct Cli {
    /// Site origin
    #[arg(long, global = true, default_value = config::DEFAULT_HOST)]
    host: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the content index and scrape every post
    Crawl {
        /// Max pages to scrape (default: whole index)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Pages in flight at once
        #[arg(short, long)]
        chunk_size: Option<usize>,
        /// Crawl document path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Scrape one post by site path, e.g. /magazine/post/abc
    Scrape {
        path: String,
        #[arg(short, long, default_value = config::POST_OUTPUT)]
        output: PathBuf,
    },
    /// Download media referenced by a crawl document
    Media {
        #[arg(short, long, default_value = config::CRAWL_OUTPUT)]
        input: PathBuf,
        /// Destination root directory (key prefix when AWS_BUCKET is set)
        #[arg(short, long, default_value = config::MEDIA_ROOT)]
        root: PathBuf,
        /// Only image, banner, carousel and thumbnail media
        #[arg(long)]
        images_only: bool,
    },
    /// Summarize a crawl document
    Stats {
        #[arg(short, long, default_value = config::CRAWL_OUTPUT)]
        input: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Crawl {
            limit,
            chunk_size,
            output,
        } => {
            let cfg = CrawlConfig::for_host(&cli.host)
                .with_chunk_size(chunk_size)
                .with_output(output);
            let mut pages = index::fetch_page_list(&cfg.index_url).await?;
            if let Some(n) = limit {
                pages.truncate(n);
            }
            if pages.is_empty() {
                println!("Content index is empty.");
                return Ok(());
            }

            let browser = make_browser()?;
            let mut sink = store::JsonStore::new(&cfg.output);
            println!(
                "Scraping {} posts in chunks of {} (saving to {})...",
                pages.len(),
                cfg.chunk_size,
                sink.path().display()
            );
            let report = crawler::crawl(browser, pages, Arc::new(cfg), &mut sink).await;
            let s = report.stats;
            println!(
                "Done: {} posts ({} scraped, {} empty, {} redirected, {} failed).",
                s.total, s.scraped, s.empty, s.redirected, s.failed
            );
            for path in &s.failed_pages {
                println!("  failed: {}", path);
            }
            if s.persist_errors > 0 {
                println!("Warning: {} saves failed; see log.", s.persist_errors);
            }
            Ok(())
        }
        Commands::Scrape { path, output } => {
            let cfg = CrawlConfig::for_host(&cli.host).without_markers();
            let browser = make_browser()?;
            let page = PageDescriptor { page_url: path };
            let outcome = crawler::scrape_page(browser.as_ref(), &page, &cfg).await?;
            match &outcome {
                PageOutcome::Scraped(post) => {
                    println!("Scraped {} ({} blocks)", post.post_url, post.content.len())
                }
                PageOutcome::EmptyContent(post) => {
                    println!("No article content on {}", post.post_url)
                }
                PageOutcome::Redirected(r) => {
                    println!("Redirected from {} to {}", r.post_url, r.redirect_url)
                }
            }
            let key = cfg.canonical_path(&page.page_url);
            let doc = BTreeMap::from([(key, outcome.into_record())]);
            store::write_json(&output, &doc).await?;
            println!("Saved to {}", output.display());
            Ok(())
        }
        Commands::Media {
            input,
            root,
            images_only,
        } => {
            let records = store::load_records(&input).await?;
            let fetcher = media::HttpFetcher::new()?;
            let blobs = make_blob_store(&root).await;
            let opts = media::MediaOptions {
                host: cli.host.trim_end_matches('/').to_string(),
                images_only,
            };
            info!("Materializing media from {} into {}", input.display(), root.display());
            let report = media::materialize(&records, &fetcher, blobs.as_ref(), &opts).await;
            for post in report.posts.iter().filter(|p| p.attempted > 0) {
                println!("  {} ({}/{})", post.post_url, post.succeeded, post.attempted);
            }
            println!(
                "Downloaded {} of {} media files ({} failed).",
                report.succeeded,
                report.attempted,
                report.failed()
            );
            Ok(())
        }
        Commands::Stats { input } => {
            let records = store::load_records(&input).await?;
            let s = store::DocumentStats::of(&records);
            println!("Records:   {}", s.records);
            println!("Posts:     {}", s.posts);
            println!("Empty:     {}", s.empty);
            println!("Redirects: {}", s.redirects);
            println!("Slides:    {} visible", s.visible_slides);
            for (field_id, n) in &s.blocks {
                println!("  {:<10} {}", field_id, n);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// spider.cloud when an API key is configured, plain HTTP otherwise.
fn make_browser() -> anyhow::Result<Arc<dyn Browser>> {
    match std::env::var(config::SPIDER_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => {
            info!("Rendering pages through spider.cloud");
            Ok(Arc::new(SpiderBrowser::new(key)?))
        }
        _ => Ok(Arc::new(HttpBrowser::new()?)),
    }
}

/// S3 under `root` when a bucket is configured, local files otherwise.
async fn make_blob_store(root: &Path) -> Box<dyn BlobStore> {
    match std::env::var(config::BUCKET_ENV) {
        Ok(bucket) if !bucket.trim().is_empty() => {
            let client = S3Client::from_env(bucket.trim()).await;
            Box::new(ObjectBlobStore::new(client, &root.to_string_lossy()))
        }
        _ => Box::new(media::FsBlobStore::new(root)),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
