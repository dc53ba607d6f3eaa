use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::Ctx;
use crate::error::ExtractionError;
use crate::model::{CarouselItem, ContentBlock, ImageDetails};
use crate::resolver;

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static IMG: LazyLock<Selector> = LazyLock::new(|| sel("img"));
static LINK: LazyLock<Selector> = LazyLock::new(|| sel("a"));
static CAPTION: LazyLock<Selector> = LazyLock::new(|| sel("figcaption.article__caption"));
static ANY_CAPTION: LazyLock<Selector> = LazyLock::new(|| sel(".article__caption"));
static MODULE_BANNER: LazyLock<Selector> = LazyLock::new(|| sel(".article__moduleBanner"));
static SLIDE_IMG: LazyLock<Selector> = LazyLock::new(|| sel(".slick-slide img"));
static IFRAME: LazyLock<Selector> = LazyLock::new(|| sel(".article__iframe"));
static MOVIE_THUMB: LazyLock<Selector> = LazyLock::new(|| sel(".article__movie-thumb img"));
static AUDIO_SRC: LazyLock<Selector> = LazyLock::new(|| sel("audio[src], source[src]"));

// ── Predicates ──

fn has_class(el: &ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

pub fn is_banner(el: &ElementRef) -> bool {
    has_class(el, "article__moduleBanner")
        || (has_class(el, "article__html") && el.select(&MODULE_BANNER).next().is_some())
}

pub fn is_html(el: &ElementRef) -> bool {
    has_class(el, "article__html") || has_class(el, "profile")
}

pub fn is_image(el: &ElementRef) -> bool {
    has_class(el, "article__image")
}

pub fn is_rich_text(el: &ElementRef) -> bool {
    has_class(el, "article__text-area")
}

pub fn is_heading(el: &ElementRef) -> bool {
    has_class(el, "article__heading")
}

pub fn is_carousel(el: &ElementRef) -> bool {
    has_class(el, "article__slider")
}

pub fn is_video(el: &ElementRef) -> bool {
    has_class(el, "article__movie")
}

pub fn is_audio(el: &ElementRef) -> bool {
    has_class(el, "vsw-audio_source")
}

// ── Field helpers ──

/// Visible text, trimmed.
pub fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn attr_trimmed(el: Option<ElementRef>, name: &str) -> String {
    el.and_then(|e| e.value().attr(name))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Lazy-loaded images keep their real URL in `data-srcset`.
pub fn image_source<'a>(img: &ElementRef<'a>) -> Option<&'a str> {
    let el = img.value();
    el.attr("data-srcset")
        .or_else(|| el.attr("srcset"))
        .and_then(resolver::first_srcset_candidate)
        .or_else(|| el.attr("src"))
}

fn dimension(img: Option<ElementRef>, attr: &'static str) -> Result<Option<u32>, ExtractionError> {
    let Some(raw) = img.and_then(|i| i.value().attr(attr)) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.trim_end_matches("px")
        .parse()
        .map(Some)
        .map_err(|_| ExtractionError::Malformed {
            field: attr,
            value: raw.to_string(),
        })
}

// ── Constructors ──

pub fn image(el: ElementRef, ctx: &Ctx) -> ContentBlock {
    let img = el.select(&IMG).next();
    ContentBlock::Image {
        image: ImageDetails {
            url: ctx.media(img.as_ref().and_then(image_source)),
            height: ctx.field("height", || dimension(img, "height")),
            width: ctx.field("width", || dimension(img, "width")),
            alt: attr_trimmed(img, "alt"),
            caption: el.select(&CAPTION).next().map(text_of).unwrap_or_default(),
        },
    }
}

pub fn rich_text(el: ElementRef, _ctx: &Ctx) -> ContentBlock {
    ContentBlock::RichText {
        content: el.inner_html(),
    }
}

pub fn heading(el: ElementRef, _ctx: &Ctx) -> ContentBlock {
    ContentBlock::Heading {
        content: text_of(el),
    }
}

pub fn html(el: ElementRef, _ctx: &Ctx) -> ContentBlock {
    ContentBlock::Html {
        content: el.inner_html(),
    }
}

/// Slides come from `.slick-slide img` once the slider is initialised; a
/// static snapshot has no slick markup, so fall back to every image.
pub fn carousel(el: ElementRef, ctx: &Ctx) -> ContentBlock {
    let mut imgs: Vec<ElementRef> = el.select(&SLIDE_IMG).collect();
    if imgs.is_empty() {
        imgs = el.select(&IMG).collect();
    }
    let items = imgs
        .into_iter()
        .map(|img| CarouselItem {
            image: ctx.media(image_source(&img)),
            text: attr_trimmed(Some(img), "alt"),
            is_hidden: is_clone_slide(img, el),
        })
        .collect();
    ContentBlock::Carousel { items }
}

fn is_clone_slide(img: ElementRef, slider: ElementRef) -> bool {
    img.ancestors()
        .take_while(|node| node.id() != slider.id())
        .filter_map(ElementRef::wrap)
        .any(|a| has_class(&a, "slick-cloned"))
}

pub fn video(el: ElementRef, ctx: &Ctx) -> ContentBlock {
    let iframe = el.select(&IFRAME).next();
    let video_url = iframe
        .and_then(|f| f.value().attr("src").or_else(|| f.value().attr("data-src")))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let thumb_src = el
        .select(&MOVIE_THUMB)
        .next()
        .and_then(|img| img.value().attr("src"))
        .or_else(|| iframe.and_then(|f| f.value().attr("poster")));

    ContentBlock::Video {
        video_url,
        thumbnail: ctx.media(thumb_src),
        is_half: has_class(&el, "size-half"),
        caption: el.select(&ANY_CAPTION).next().map(text_of).unwrap_or_default(),
    }
}

pub fn banner(el: ElementRef, ctx: &Ctx) -> ContentBlock {
    let link = el.select(&LINK).next();
    let img = link
        .and_then(|a| a.select(&IMG).next())
        .or_else(|| el.select(&IMG).next());
    ContentBlock::Banner {
        url: link
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolver::absolutize(href, ctx.host)),
        image: ctx.media(img.as_ref().and_then(image_source)),
        alt: attr_trimmed(img, "alt"),
    }
}

pub fn audio(el: ElementRef, ctx: &Ctx) -> ContentBlock {
    let src = el
        .value()
        .attr("src")
        .or_else(|| el.select(&AUDIO_SRC).next().and_then(|a| a.value().attr("src")));
    ContentBlock::Audio {
        url: ctx.media(src),
    }
}
