use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::error::MediaError;
use crate::model::{ContentBlock, CrawlRecord, MediaRef, Post};
use crate::parser::blocks::image_source;
use crate::resolver;

static EMBEDDED_IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static EMBEDDED_VIDEO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("video[src], video source[src]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Assigned from where the reference came from, never sniffed.
    pub fn content_type(self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Video => "video/mp4",
            MediaKind::Audio => "audio/mpeg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub media: MediaRef,
    pub kind: MediaKind,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, MediaError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), MediaError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let fetch_err = |e: reqwest::Error| MediaError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?;
        let bytes = response.bytes().await.map_err(fetch_err)?;
        Ok(bytes.to_vec())
    }
}

/// Writes `{root}/{key}`, creating directories on demand and overwriting
/// whatever was there.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn destination(&self, key: &str) -> Result<PathBuf, MediaError> {
        let rel = Path::new(key);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(MediaError::Store {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "key escapes root"),
            });
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), MediaError> {
        let dest = self.destination(key)?;
        let store_err = |source| MediaError::Store {
            key: key.to_string(),
            source,
        };
        if let Some(dir) = dest.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(store_err)?;
        }
        tokio::fs::write(&dest, bytes).await.map_err(store_err)?;
        debug!("Wrote {} ({}, {} bytes)", dest.display(), content_type, bytes.len());
        Ok(())
    }
}

/// Every media reference reachable from a post's blocks, in block order,
/// deduplicated by relative path.
pub fn collect_media(post: &Post, host: &str) -> Vec<MediaItem> {
    let mut items = Vec::new();
    let mut push = |media: &Option<MediaRef>, kind: MediaKind| {
        if let Some(media) = media {
            items.push(MediaItem {
                media: media.clone(),
                kind,
            });
        }
    };

    for block in &post.content {
        match block {
            ContentBlock::Image { image } => push(&image.url, MediaKind::Image),
            ContentBlock::Carousel { items } => {
                for item in items {
                    push(&item.image, MediaKind::Image);
                }
            }
            ContentBlock::Banner { image, .. } => push(image, MediaKind::Image),
            ContentBlock::Video { thumbnail, .. } => push(thumbnail, MediaKind::Image),
            ContentBlock::Audio { url } => push(url, MediaKind::Audio),
            ContentBlock::Html { content } => {
                for (media, kind) in embedded_media(content, host) {
                    push(&Some(media), kind);
                }
            }
            ContentBlock::RichText { .. } | ContentBlock::Heading { .. } => {}
        }
    }

    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.media.relative_path.clone()));
    items
}

fn embedded_media(fragment: &str, host: &str) -> Vec<(MediaRef, MediaKind)> {
    let doc = Html::parse_fragment(fragment);
    let images = doc
        .select(&EMBEDDED_IMG)
        .filter_map(|img| resolver::resolve(image_source(&img), host).ok())
        .map(|m| (m, MediaKind::Image));
    let videos = doc
        .select(&EMBEDDED_VIDEO)
        .filter_map(|v| resolver::resolve(v.value().attr("src"), host).ok())
        .map(|m| (m, MediaKind::Video));
    images.chain(videos).collect()
}

#[derive(Debug, Clone)]
pub struct MediaOptions {
    pub host: String,
    pub images_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReport {
    pub post_url: String,
    pub attempted: usize,
    pub succeeded: usize,
}

#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub posts: Vec<PostReport>,
    pub attempted: usize,
    pub succeeded: usize,
}

impl MaterializeReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }
}

/// Fetch and store every post's media, one item at a time. A failed item is
/// logged and counted; nothing aborts the batch.
pub async fn materialize(
    records: &[CrawlRecord],
    fetcher: &dyn MediaFetcher,
    store: &dyn BlobStore,
    opts: &MediaOptions,
) -> MaterializeReport {
    let worklists: Vec<(&Post, Vec<MediaItem>)> = records
        .iter()
        .filter_map(|r| match r {
            CrawlRecord::Post(post) => Some(post),
            CrawlRecord::Redirect(_) => {
                debug!("Skipping redirect record {}", r.post_url());
                None
            }
        })
        .map(|post| {
            let mut items = collect_media(post, &opts.host);
            if opts.images_only {
                items.retain(|i| i.kind == MediaKind::Image);
            }
            (post, items)
        })
        .collect();

    let total: usize = worklists.iter().map(|(_, items)| items.len()).sum();
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }

    let mut report = MaterializeReport::default();
    for (post, items) in worklists {
        pb.set_message(post.post_url.clone());
        let mut succeeded = 0;
        for item in &items {
            match transfer(item, fetcher, store).await {
                Ok(()) => succeeded += 1,
                Err(e) => warn!("Media failed for {} ({}): {}", post.post_url, item.media.absolute_url, e),
            }
            pb.inc(1);
        }
        info!(
            "Media for {}: {}/{}",
            post.post_url,
            succeeded,
            items.len()
        );
        report.attempted += items.len();
        report.succeeded += succeeded;
        report.posts.push(PostReport {
            post_url: post.post_url.clone(),
            attempted: items.len(),
            succeeded,
        });
    }

    pb.finish_and_clear();
    report
}

async fn transfer(
    item: &MediaItem,
    fetcher: &dyn MediaFetcher,
    store: &dyn BlobStore,
) -> Result<(), MediaError> {
    let bytes = fetcher.get(&item.media.absolute_url).await?;
    store
        .put(&item.media.relative_path, &bytes, item.kind.content_type())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::model::{CarouselItem, ImageDetails, RedirectRecord};

    const HOST: &str = "https://lexus.jp";

    fn media(path: &str) -> Option<MediaRef> {
        resolver::resolve(Some(path), HOST).ok()
    }

    fn post(url: &str, content: Vec<ContentBlock>) -> Post {
        Post {
            post_url: url.to_string(),
            title: String::new(),
            credit: None,
            note: None,
            feature_image: None,
            profiles: Vec::new(),
            content,
        }
    }

    fn image(path: &str) -> ContentBlock {
        ContentBlock::Image {
            image: ImageDetails {
                url: media(path),
                height: None,
                width: None,
                alt: String::new(),
                caption: String::new(),
            },
        }
    }

    /// Serves any URL except those listed as broken.
    struct FakeFetcher {
        broken: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn get(&self, url: &str) -> Result<Vec<u8>, MediaError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.broken.iter().any(|b| url.ends_with(b.as_str())) {
                return Err(MediaError::Fetch {
                    url: url.to_string(),
                    reason: "HTTP 404".into(),
                });
            }
            Ok(url.as_bytes().to_vec())
        }
    }

    fn fetcher(broken: &[&str]) -> FakeFetcher {
        FakeFetcher {
            broken: broken.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn collects_every_media_kind_in_order() {
        let p = post(
            "/magazine/post/a",
            vec![
                ContentBlock::Heading { content: "h".into() },
                image("/m/1.jpg"),
                ContentBlock::Carousel {
                    items: vec![
                        CarouselItem { image: media("/m/s2.jpg"), text: String::new(), is_hidden: true },
                        CarouselItem { image: media("/m/s1.jpg"), text: String::new(), is_hidden: false },
                        CarouselItem { image: media("/m/s2.jpg"), text: String::new(), is_hidden: false },
                    ],
                },
                ContentBlock::Banner { url: None, image: media("/m/banner.jpg"), alt: String::new() },
                ContentBlock::Video {
                    video_url: Some("https://www.youtube.com/embed/x".into()),
                    thumbnail: media("/m/thumb.jpg"),
                    is_half: false,
                    caption: String::new(),
                },
                ContentBlock::Audio { url: media("/m/a.mp3") },
                ContentBlock::Html {
                    content: r#"<p><img srcset="/m/e.jpg 1x"><video src="/m/clip.mp4"></video></p>"#.into(),
                },
            ],
        );
        let got: Vec<(String, MediaKind)> = collect_media(&p, HOST)
            .into_iter()
            .map(|i| (i.media.relative_path, i.kind))
            .collect();
        assert_eq!(
            got,
            vec![
                ("m/1.jpg".to_string(), MediaKind::Image),
                ("m/s2.jpg".to_string(), MediaKind::Image),
                ("m/s1.jpg".to_string(), MediaKind::Image),
                ("m/banner.jpg".to_string(), MediaKind::Image),
                ("m/thumb.jpg".to_string(), MediaKind::Image),
                ("m/a.mp3".to_string(), MediaKind::Audio),
                ("m/e.jpg".to_string(), MediaKind::Image),
                ("m/clip.mp4".to_string(), MediaKind::Video),
            ]
        );
    }

    #[tokio::test]
    async fn failures_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let fetch = fetcher(&["/m/2.jpg"]);
        let records = vec![
            CrawlRecord::Post(post("/magazine/post/a", vec![image("/m/1.jpg"), image("/m/2.jpg"), image("/m/3.jpg")])),
            CrawlRecord::Redirect(RedirectRecord {
                post_url: "/magazine/post/r".into(),
                redirect_url: "https://lexus.jp/".into(),
            }),
            CrawlRecord::Post(post("/magazine/post/b", vec![image("/m/sub/4.jpg")])),
        ];
        let opts = MediaOptions { host: HOST.into(), images_only: false };

        let report = materialize(&records, &fetch, &store, &opts).await;

        assert_eq!(report.attempted, 4);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.posts,
            vec![
                PostReport { post_url: "/magazine/post/a".into(), attempted: 3, succeeded: 2 },
                PostReport { post_url: "/magazine/post/b".into(), attempted: 1, succeeded: 1 },
            ]
        );
        assert!(dir.path().join("m/1.jpg").exists());
        assert!(!dir.path().join("m/2.jpg").exists());
        assert!(dir.path().join("m/sub/4.jpg").exists());
        // Items are fetched one after another in worklist order.
        assert_eq!(
            *fetch.calls.lock().unwrap(),
            vec![
                "https://lexus.jp/m/1.jpg",
                "https://lexus.jp/m/2.jpg",
                "https://lexus.jp/m/3.jpg",
                "https://lexus.jp/m/sub/4.jpg",
            ]
        );
    }

    #[tokio::test]
    async fn rerun_overwrites_destination() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("m/x.jpg", b"old", "image/jpeg").await.unwrap();
        store.put("m/x.jpg", b"new", "image/jpeg").await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("m/x.jpg")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn images_only_skips_other_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let fetch = fetcher(&[]);
        let records = vec![CrawlRecord::Post(post(
            "/magazine/post/a",
            vec![image("/m/1.jpg"), ContentBlock::Audio { url: media("/m/a.mp3") }],
        ))];
        let opts = MediaOptions { host: HOST.into(), images_only: true };
        let report = materialize(&records, &fetch, &store, &opts).await;
        assert_eq!(report.attempted, 1);
        assert!(!dir.path().join("m/a.mp3").exists());
    }

    #[tokio::test]
    async fn escaping_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("root"));
        assert!(matches!(
            store.put("../evil.jpg", b"x", "image/jpeg").await,
            Err(MediaError::Store { .. })
        ));
    }
}
