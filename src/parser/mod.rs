pub mod blocks;
pub mod head;
pub mod rules;

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::model::{ContentBlock, MediaRef, PageOutcome, Post, Profile};
use crate::resolver;

static ARTICLE_BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".article__body").unwrap());

/// Per-page extraction context: the site origin for media resolution and the
/// page path for diagnostics.
pub struct Ctx<'a> {
    pub host: &'a str,
    pub page: &'a str,
}

impl Ctx<'_> {
    /// Resolve a media URL. An invalid reference means "no media here".
    pub fn media(&self, raw: Option<&str>) -> Option<MediaRef> {
        match resolver::resolve(raw, self.host) {
            Ok(media) => Some(media),
            Err(e) => {
                debug!("{}: {}", self.page, e);
                None
            }
        }
    }

    /// Evaluate one field. A fault is logged with the page and the field
    /// falls back to its empty value.
    pub fn field<T: Default>(
        &self,
        name: &'static str,
        eval: impl FnOnce() -> Result<T, ExtractionError>,
    ) -> T {
        match eval() {
            Ok(value) => value,
            Err(e) => {
                warn!("Extraction fault on {} ({}): {}", self.page, name, e);
                T::default()
            }
        }
    }
}

/// Everything pulled out of one rendered page.
#[derive(Debug, Default)]
pub struct Extracted {
    pub feature_image: Option<MediaRef>,
    pub title: String,
    pub credit: Option<String>,
    pub note: Option<String>,
    pub profiles: Vec<Profile>,
    pub content: Vec<ContentBlock>,
    /// Whether the main article container was present.
    pub anchor_found: bool,
}

impl Extracted {
    pub fn into_outcome(self, post_url: &str) -> PageOutcome {
        let anchor_found = self.anchor_found;
        let post = Post {
            post_url: post_url.to_string(),
            title: self.title,
            credit: self.credit,
            note: self.note,
            feature_image: self.feature_image,
            profiles: self.profiles,
            content: self.content,
        };
        if anchor_found {
            PageOutcome::Scraped(post)
        } else {
            PageOutcome::EmptyContent(post)
        }
    }
}

/// Head fields plus body blocks, in document order.
pub fn extract(html: &str, ctx: &Ctx) -> Extracted {
    let doc = Html::parse_document(html);
    let head = head::extract_head(&doc, ctx);

    let body = doc.select(&ARTICLE_BODY).next();
    let content = match body {
        Some(body) => rules::classify_children(body, ctx),
        None => {
            debug!("No article body on {}", ctx.page);
            Vec::new()
        }
    };

    Extracted {
        feature_image: head.feature_image,
        title: head.title,
        credit: head.credit,
        note: head.note,
        profiles: head.profiles,
        content,
        anchor_found: body.is_some(),
    }
}

// ── Tests ──
