use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::blocks::{image_source, text_of};
use super::Ctx;
use crate::model::{MediaRef, Profile};

static OG_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());
static LEAD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".article__head .article__lead").unwrap());
static CREDIT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".article__head .article__credit").unwrap());
static NOTE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".article__foot .note__text").unwrap());
static PROFILE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".article__foot .profile").unwrap());
static PROFILE_IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".profile__image img").unwrap());
static PROFILE_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".profile__name").unwrap());
static PROFILE_TEXT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".profile__text").unwrap());

pub struct Head {
    pub feature_image: Option<MediaRef>,
    pub title: String,
    pub credit: Option<String>,
    pub note: Option<String>,
    pub profiles: Vec<Profile>,
}

pub fn extract_head(doc: &Html, ctx: &Ctx) -> Head {
    let feature_src = doc
        .select(&OG_IMAGE)
        .next()
        .and_then(|m| m.value().attr("content"));

    Head {
        feature_image: ctx.media(feature_src),
        title: first_text(doc, &LEAD).unwrap_or_default(),
        credit: first_text(doc, &CREDIT),
        note: first_text(doc, &NOTE),
        profiles: doc.select(&PROFILE).map(|p| profile(p, ctx)).collect(),
    }
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

fn profile(el: ElementRef, ctx: &Ctx) -> Profile {
    let child_text = |s: &Selector| el.select(s).next().map(text_of).unwrap_or_default();
    Profile {
        image: ctx.media(el.select(&PROFILE_IMG).next().as_ref().and_then(image_source)),
        name: child_text(&*PROFILE_NAME),
        description: child_text(&*PROFILE_TEXT),
    }
}
