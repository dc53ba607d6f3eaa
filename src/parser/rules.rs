use std::sync::LazyLock;

use scraper::{ElementRef, Selector};
use tracing::info;

use super::blocks;
use super::Ctx;
use crate::model::ContentBlock;

/// One classification rule: a structural predicate and the block it builds.
pub struct BlockRule {
    pub name: &'static str,
    pub matches: fn(&ElementRef) -> bool,
    pub build: fn(ElementRef, &Ctx) -> ContentBlock,
}

/// Evaluated top to bottom, first match wins. Banner sits above html because
/// banner containers are html containers too.
pub static RULES: &[BlockRule] = &[
    BlockRule {
        name: "banner",
        matches: blocks::is_banner,
        build: blocks::banner,
    },
    BlockRule {
        name: "html",
        matches: blocks::is_html,
        build: blocks::html,
    },
    BlockRule {
        name: "image",
        matches: blocks::is_image,
        build: blocks::image,
    },
    BlockRule {
        name: "richText",
        matches: blocks::is_rich_text,
        build: blocks::rich_text,
    },
    BlockRule {
        name: "heading",
        matches: blocks::is_heading,
        build: blocks::heading,
    },
    BlockRule {
        name: "carousel",
        matches: blocks::is_carousel,
        build: blocks::carousel,
    },
    BlockRule {
        name: "video",
        matches: blocks::is_video,
        build: blocks::video,
    },
    BlockRule {
        name: "audio",
        matches: blocks::is_audio,
        build: blocks::audio,
    },
];

/// Any element some rule could claim. Used to decide whether an unmatched
/// wrapper is worth descending into.
static RECOGNIZED: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        ".article__image, .article__text-area, .article__heading, .article__slider, \
         .article__movie, .article__html, .article__moduleBanner, .vsw-audio_source, .profile",
    )
    .unwrap()
});

pub fn rule_for(el: &ElementRef) -> Option<&'static BlockRule> {
    RULES.iter().find(|rule| (rule.matches)(el))
}

/// Classify the content region's elements in document order. A claimed
/// element owns its subtree; plain wrappers are descended into; anything else
/// is dropped.
pub fn classify_children(region: ElementRef, ctx: &Ctx) -> Vec<ContentBlock> {
    let mut out = Vec::new();
    walk(region, ctx, &mut out);
    out
}

fn walk(parent: ElementRef, ctx: &Ctx, out: &mut Vec<ContentBlock>) {
    for child in parent.children().filter_map(ElementRef::wrap) {
        if let Some(rule) = rule_for(&child) {
            out.push((rule.build)(child, ctx));
        } else if child.select(&RECOGNIZED).next().is_some() {
            walk(child, ctx, out);
        } else {
            info!(
                "Discarding unrecognized <{}> (class={:?}) on {}",
                child.value().name(),
                child.value().attr("class").unwrap_or(""),
                ctx.page
            );
        }
    }
}
