use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::ResolveError;
use crate::model::MediaRef;

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").unwrap());

/// Turn a URL found in markup into a [`MediaRef`].
///
/// `host` is the site origin, e.g. `https://lexus.jp`. Site-relative paths get
/// the origin prepended; absolute URLs (own host or foreign) are kept as-is.
/// The relative path drops scheme, host, query and fragment plus any leading
/// or trailing slashes, so resolving `absolute_url` again yields the same
/// `relative_path`.
pub fn resolve(raw: Option<&str>, host: &str) -> Result<MediaRef, ResolveError> {
    let invalid = || ResolveError::InvalidReference(raw.map(str::to_string));
    let trimmed = match raw.map(str::trim) {
        Some(s) if !s.is_empty() && !s.starts_with("data:") => s,
        _ => return Err(invalid()),
    };
    let host = host.trim_end_matches('/');

    let (absolute_url, path) = if let Some(rest) = strip_host(trimmed, host) {
        (trimmed.to_string(), rest)
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        let scheme = host.split("://").next().unwrap_or("https");
        (format!("{scheme}://{rest}"), after_authority(rest))
    } else if let Some(m) = SCHEME_RE.find(trimmed) {
        (trimmed.to_string(), after_authority(&trimmed[m.end()..]))
    } else {
        (format!("{}/{}", host, trimmed.trim_start_matches('/')), trimmed)
    };

    let relative_path = normalize_path(path);
    if relative_path.is_empty() {
        return Err(invalid());
    }

    Ok(MediaRef {
        absolute_url,
        relative_path,
    })
}

/// First candidate URL of a `srcset` / `data-srcset` value.
pub fn first_srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .next()
}

/// Resolve a link target against the site origin. Absolute links pass through.
pub fn absolutize(href: &str, host: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let base = Url::parse(host).ok()?;
    base.join(href).ok().map(String::from)
}

fn strip_host<'a>(raw: &'a str, host: &str) -> Option<&'a str> {
    let rest = raw.strip_prefix(host)?;
    if rest.is_empty() || rest.starts_with(['/', '?', '#']) {
        Some(rest)
    } else {
        None
    }
}

fn after_authority(s: &str) -> &str {
    match s.find('/') {
        Some(idx) => &s[idx..],
        None => "",
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "https://lexus.jp";

    fn rel(raw: &str) -> String {
        resolve(Some(raw), HOST).unwrap().relative_path
    }

    #[test]
    fn site_relative_path_gets_host() {
        let m = resolve(Some("/magazine/img/a.jpg"), HOST).unwrap();
        assert_eq!(m.absolute_url, "https://lexus.jp/magazine/img/a.jpg");
        assert_eq!(m.relative_path, "magazine/img/a.jpg");
    }

    #[test]
    fn own_host_absolute_kept() {
        let m = resolve(Some("https://lexus.jp/magazine/img/a.jpg"), HOST).unwrap();
        assert_eq!(m.absolute_url, "https://lexus.jp/magazine/img/a.jpg");
        assert_eq!(m.relative_path, "magazine/img/a.jpg");
    }

    #[test]
    fn foreign_and_protocol_relative() {
        let m = resolve(Some("https://cdn.example.com/x/y.png?w=300"), HOST).unwrap();
        assert_eq!(m.absolute_url, "https://cdn.example.com/x/y.png?w=300");
        assert_eq!(m.relative_path, "x/y.png");

        let m = resolve(Some("//lexus.jp/magazine/b.jpg"), HOST).unwrap();
        assert_eq!(m.absolute_url, "https://lexus.jp/magazine/b.jpg");
        assert_eq!(m.relative_path, "magazine/b.jpg");
    }

    #[test]
    fn trailing_separator_normalized() {
        assert_eq!(rel("/magazine/dir/"), rel("/magazine/dir"));
        assert_eq!(rel("magazine/dir/"), "magazine/dir");
        assert_eq!(rel("https://lexus.jp/magazine/dir/"), "magazine/dir");
    }

    #[test]
    fn resolving_twice_is_stable() {
        for raw in [
            "/magazine/img/a.jpg",
            "magazine/img/a.jpg",
            "https://lexus.jp/magazine/img/a.jpg?v=2",
            "//lexus.jp/magazine/img/a.jpg",
            "https://cdn.example.com/x/y.png",
            "/magazine/dir/",
        ] {
            let once = resolve(Some(raw), HOST).unwrap();
            let twice = resolve(Some(&once.absolute_url), HOST).unwrap();
            assert_eq!(once, twice, "unstable for {raw}");
        }
    }

    #[test]
    fn missing_or_empty_is_invalid() {
        assert!(matches!(resolve(None, HOST), Err(ResolveError::InvalidReference(None))));
        assert!(resolve(Some(""), HOST).is_err());
        assert!(resolve(Some("   "), HOST).is_err());
        assert!(resolve(Some("https://lexus.jp/"), HOST).is_err());
        assert!(resolve(Some("data:image/png;base64,AAAA"), HOST).is_err());
    }

    #[test]
    fn host_prefix_must_end_at_boundary() {
        let m = resolve(Some("https://lexus.jpx.com/a.jpg"), HOST).unwrap();
        assert_eq!(m.absolute_url, "https://lexus.jpx.com/a.jpg");
        assert_eq!(m.relative_path, "a.jpg");
    }

    #[test]
    fn srcset_first_candidate() {
        assert_eq!(first_srcset_candidate("/a.jpg 1x, /b.jpg 2x"), Some("/a.jpg"));
        assert_eq!(first_srcset_candidate("/a.jpg"), Some("/a.jpg"));
        assert_eq!(first_srcset_candidate(""), None);
    }

    #[test]
    fn link_targets_made_absolute() {
        assert_eq!(
            absolutize("/models/rx/", HOST).as_deref(),
            Some("https://lexus.jp/models/rx/")
        );
        assert_eq!(
            absolutize("https://example.com/x", HOST).as_deref(),
            Some("https://example.com/x")
        );
        assert_eq!(absolutize("  ", HOST), None);
    }
}
