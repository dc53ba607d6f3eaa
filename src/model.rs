use serde::{Deserialize, Serialize};

/// Absolute/relative addressing pair for a media asset. Only built by
/// [`crate::resolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub absolute_url: String,
    pub relative_path: String,
}

/// One entry of the site's content index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageDescriptor {
    #[serde(rename = "PageURL")]
    pub page_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub post_url: String,
    pub title: String,
    pub credit: Option<String>,
    pub note: Option<String>,
    pub feature_image: Option<MediaRef>,
    pub profiles: Vec<Profile>,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRecord {
    pub post_url: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub image: Option<MediaRef>,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDetails {
    pub url: Option<MediaRef>,
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub alt: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarouselItem {
    pub image: Option<MediaRef>,
    pub text: String,
    /// Clone slide inserted by the slider's infinite loop.
    pub is_hidden: bool,
}

/// One classified unit of a page body, tagged by `fieldId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fieldId", rename_all = "camelCase")]
pub enum ContentBlock {
    Image {
        image: ImageDetails,
    },
    RichText {
        content: String,
    },
    Heading {
        content: String,
    },
    Carousel {
        items: Vec<CarouselItem>,
    },
    #[serde(rename_all = "camelCase")]
    Video {
        video_url: Option<String>,
        thumbnail: Option<MediaRef>,
        is_half: bool,
        caption: String,
    },
    Banner {
        url: Option<String>,
        image: Option<MediaRef>,
        alt: String,
    },
    Html {
        content: String,
    },
    Audio {
        url: Option<MediaRef>,
    },
}

impl ContentBlock {
    pub fn field_id(&self) -> &'static str {
        match self {
            ContentBlock::Image { .. } => "image",
            ContentBlock::RichText { .. } => "richText",
            ContentBlock::Heading { .. } => "heading",
            ContentBlock::Carousel { .. } => "carousel",
            ContentBlock::Video { .. } => "video",
            ContentBlock::Banner { .. } => "banner",
            ContentBlock::Html { .. } => "html",
            ContentBlock::Audio { .. } => "audio",
        }
    }
}

/// Slides that are real content, i.e. not loop clones.
pub fn visible_slides(items: &[CarouselItem]) -> impl Iterator<Item = &CarouselItem> {
    items.iter().filter(|item| !item.is_hidden)
}

/// One entry of the persisted crawl document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CrawlRecord {
    Redirect(RedirectRecord),
    Post(Post),
}

impl CrawlRecord {
    pub fn post_url(&self) -> &str {
        match self {
            CrawlRecord::Redirect(r) => &r.post_url,
            CrawlRecord::Post(p) => &p.post_url,
        }
    }
}

/// Terminal outcome of scraping one page. Every caller handles all three.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Scraped(Post),
    /// The article container was absent; head fields may still be set.
    EmptyContent(Post),
    Redirected(RedirectRecord),
}

impl PageOutcome {
    pub fn into_record(self) -> CrawlRecord {
        match self {
            PageOutcome::Scraped(post) | PageOutcome::EmptyContent(post) => CrawlRecord::Post(post),
            PageOutcome::Redirected(redirect) => CrawlRecord::Redirect(redirect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_tagged_by_field_id() {
        let block = ContentBlock::Video {
            video_url: Some("https://www.youtube.com/embed/x".into()),
            thumbnail: None,
            is_half: true,
            caption: String::new(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["fieldId"], "video");
        assert_eq!(json["videoUrl"], "https://www.youtube.com/embed/x");
        assert_eq!(json["isHalf"], true);
        assert_eq!(block.field_id(), "video");
    }

    #[test]
    fn rich_text_tag_is_camel_case() {
        let json = serde_json::to_value(ContentBlock::RichText { content: "<p>a</p>".into() }).unwrap();
        assert_eq!(json["fieldId"], "richText");
    }

    #[test]
    fn untagged_records_keep_their_variant() {
        let doc = r#"[
            {"postUrl": "/magazine/post/abc", "redirectUrl": "https://lexus.jp/magazine/post/xyz"},
            {"postUrl": "/magazine/post/def", "title": "t", "credit": null, "note": null,
             "featureImage": null, "profiles": [], "content": [{"fieldId": "heading", "content": "h"}]}
        ]"#;
        let records: Vec<CrawlRecord> = serde_json::from_str(doc).unwrap();
        assert!(matches!(&records[0], CrawlRecord::Redirect(r) if r.redirect_url.ends_with("/xyz")));
        assert!(matches!(&records[1], CrawlRecord::Post(p) if p.content.len() == 1));
        assert_eq!(records[1].post_url(), "/magazine/post/def");
    }

    #[test]
    fn clone_slides_excluded_from_visible_view() {
        let mut items: Vec<CarouselItem> = (0..5)
            .map(|i| CarouselItem { image: None, text: format!("slide {i}"), is_hidden: false })
            .collect();
        items.insert(0, CarouselItem { image: None, text: "clone".into(), is_hidden: true });
        items.push(CarouselItem { image: None, text: "clone".into(), is_hidden: true });
        assert_eq!(items.len(), 7);
        assert_eq!(visible_slides(&items).count(), 5);
    }
}
