//! Article link discovery on listing pages.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use newsdesk_core::SelectorProfile;

use crate::error::CrawlError;
use crate::text::non_empty;

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// A source's selector profile, parsed once per run.
///
/// Each group keeps its selectors in priority order: the first selector with
/// a non-empty match wins, regardless of where it sits in the document.
#[derive(Debug)]
pub struct CompiledProfile {
    pub(crate) containers: Vec<Selector>,
    pub(crate) title: Vec<Selector>,
    pub(crate) excerpt: Vec<Selector>,
    pub(crate) date: Vec<Selector>,
    pub(crate) content: Vec<Selector>,
}

impl CompiledProfile {
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidSelector`] naming the first selector that
    /// does not parse.
    pub fn compile(source_name: &str, profile: &SelectorProfile) -> Result<Self, CrawlError> {
        Ok(Self {
            containers: compile_group(source_name, &profile.containers)?,
            title: compile_group(source_name, &profile.title)?,
            excerpt: compile_group(source_name, &profile.excerpt)?,
            date: compile_group(source_name, &profile.date)?,
            content: compile_group(source_name, &profile.content)?,
        })
    }
}

fn compile_group(source_name: &str, group: &str) -> Result<Vec<Selector>, CrawlError> {
    group
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Selector::parse(s).map_err(|e| CrawlError::InvalidSelector {
                source_name: source_name.to_owned(),
                selector: s.to_owned(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// An article link found on a listing page, with whatever the listing
/// said about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub url: String,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub date: Option<String>,
}

impl ListingEntry {
    #[must_use]
    pub fn bare(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            title: None,
            excerpt: None,
            date: None,
        }
    }
}

/// Extract article links from one listing page.
///
/// Uses the first container selector that matches anything. Links are
/// resolved against `page_url`, restricted to http(s) on the same host, and
/// returned in document order without duplicates.
#[must_use]
pub fn parse_listing(html: &str, page_url: &Url, profile: &CompiledProfile) -> Vec<ListingEntry> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let containers: Vec<ElementRef<'_>> = profile
        .containers
        .iter()
        .map(|sel| root.select(sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for container in containers {
        let Some(url) = container_link(container, profile, page_url) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        entries.push(ListingEntry {
            url,
            title: first_text(container, &profile.title),
            excerpt: first_text(container, &profile.excerpt),
            date: first_date(container, &profile.date),
        });
    }
    entries
}

/// Prefer a link inside the title element, then the first link in the
/// container, then the container itself when it is an anchor.
fn container_link(
    container: ElementRef<'_>,
    profile: &CompiledProfile,
    page_url: &Url,
) -> Option<String> {
    let from_title = profile
        .title
        .iter()
        .flat_map(|sel| container.select(sel))
        .flat_map(|title| title.select(&ANCHOR))
        .find_map(|a| a.value().attr("href"));
    let href = from_title
        .or_else(|| container.select(&ANCHOR).find_map(|a| a.value().attr("href")))
        .or_else(|| {
            (container.value().name() == "a")
                .then(|| container.value().attr("href"))
                .flatten()
        })?;
    resolve_same_host(href, page_url)
}

/// Resolve `href` against `base`, keeping only http(s) urls on `base`'s host.
pub(crate) fn resolve_same_host(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    if resolved.host_str() != base.host_str() {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Normalized text of the first non-empty match, trying selectors in order.
pub(crate) fn first_text(scope: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .flat_map(|sel| scope.select(sel))
        .find_map(|el| non_empty(&el.text().collect::<Vec<_>>().join(" ")))
}

/// Like [`first_text`] but prefers a `datetime` attribute when present.
pub(crate) fn first_date(scope: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .flat_map(|sel| scope.select(sel))
        .find_map(|el| {
            el.value()
                .attr("datetime")
                .and_then(non_empty)
                .or_else(|| non_empty(&el.text().collect::<Vec<_>>().join(" ")))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> CompiledProfile {
        CompiledProfile::compile("test", &SelectorProfile::default()).unwrap()
    }

    fn page() -> Url {
        Url::parse("https://news.example.com/tech/").unwrap()
    }

    #[test]
    fn compile_rejects_bad_selector() {
        let bad = SelectorProfile {
            title: "h1, h2[".to_string(),
            ..SelectorProfile::default()
        };
        let err = CompiledProfile::compile("Broken", &bad).unwrap_err();
        assert!(
            matches!(err, CrawlError::InvalidSelector { ref selector, ref source_name, .. } if selector == "h2[" && source_name == "Broken"),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn extracts_entries_with_hints_in_order() {
        let html = r#"
            <html><body>
              <article>
                <h2><a href="/tech/chips-2024">New chips arrive this fall</a></h2>
                <p class="excerpt">Faster and cheaper.</p>
                <time datetime="2024-05-01T09:00:00Z">May 1</time>
              </article>
              <article>
                <h2>Second story headline here</h2>
                <a href="https://news.example.com/tech/second#comments">read</a>
              </article>
            </body></html>
        "#;
        let entries = parse_listing(html, &page(), &profile());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://news.example.com/tech/chips-2024");
        assert_eq!(
            entries[0].title.as_deref(),
            Some("New chips arrive this fall")
        );
        assert_eq!(entries[0].excerpt.as_deref(), Some("Faster and cheaper."));
        assert_eq!(entries[0].date.as_deref(), Some("2024-05-01T09:00:00Z"));
        assert_eq!(entries[1].url, "https://news.example.com/tech/second");
    }

    #[test]
    fn drops_offsite_and_non_http_links() {
        let html = r#"
            <article><a href="https://other.example.org/story">Elsewhere</a></article>
            <article><a href="mailto:tips@example.com">Tips</a></article>
            <article><a href="javascript:void(0)">Menu</a></article>
            <article><a href="story-3">Relative story</a></article>
        "#;
        let entries = parse_listing(html, &page(), &profile());
        assert_eq!(
            entries.iter().map(|e| e.url.as_str()).collect::<Vec<_>>(),
            vec!["https://news.example.com/tech/story-3"]
        );
    }

    #[test]
    fn dedups_repeated_links_keeping_first() {
        let html = r#"
            <article><a href="/a">First mention</a></article>
            <article><a href="/b">Other</a></article>
            <article><a href="/a#top">Second mention</a></article>
        "#;
        let entries = parse_listing(html, &page(), &profile());
        let urls: Vec<_> = entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://news.example.com/a", "https://news.example.com/b"]
        );
    }

    #[test]
    fn falls_through_to_next_container_selector() {
        let html = r#"
            <div class="story"><h3><a href="/x">Story in a div</a></h3></div>
        "#;
        let entries = parse_listing(html, &page(), &profile());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title.as_deref(), Some("Story in a div"));
    }

    #[test]
    fn page_without_containers_yields_nothing() {
        let html = "<html><body><p>No news today.</p></body></html>";
        assert!(parse_listing(html, &page(), &profile()).is_empty());
    }
}
