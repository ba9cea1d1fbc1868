//! Turning a fetched article page into a [`Candidate`].
//!
//! Structural rules run first (meta tags, then the source's selectors, then
//! the listing hints). The [`ContentAnalyzer`] is only consulted when those
//! leave the title or description empty, or when the source asks for
//! category inference. An analyzer failure never aborts extraction on its
//! own; only a title that is still missing afterwards does.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use newsdesk_core::{ArticleRecord, SourceConfig};

use crate::analyzer::{AnalyzerError, ContentAnalyzer};
use crate::dates::parse_published;
use crate::discover::{first_date, first_text, CompiledProfile, ListingEntry};
use crate::error::ExtractionFailure;
use crate::text::{non_empty, normalize_whitespace, word_count};

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("valid selector literal")
}

static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property="og:title"]"#));
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[property="og:description"]"#));
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[name="description"]"#));
static PUBLISHED_TIME: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[property="article:published_time"]"#));
static TIME_DATETIME: LazyLock<Selector> = LazyLock::new(|| selector("time[datetime]"));
static CANONICAL: LazyLock<Selector> = LazyLock::new(|| selector(r#"link[rel="canonical"]"#));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));

/// An extracted article that has not been deduplicated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub description: String,
    pub url: String,
    pub category: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Hex SHA-256 of the fetched body.
    pub raw_content_hash: String,
}

impl Candidate {
    #[must_use]
    pub fn into_record(self, extracted_at: DateTime<Utc>) -> ArticleRecord {
        ArticleRecord {
            url: self.url,
            title: self.title,
            description: self.description,
            category: self.category,
            source: self.source,
            published_at: self.published_at,
            extracted_at,
        }
    }
}

/// What the page itself says, read in one synchronous pass.
#[derive(Debug, Default)]
struct PageFields {
    title: Option<String>,
    description: Option<String>,
    canonical: Option<String>,
    dates: Vec<String>,
    text: String,
}

fn read_page(raw: &str, profile: &CompiledProfile) -> PageFields {
    let document = Html::parse_document(raw);
    let root = document.root_element();

    let title = meta_content(root, &OG_TITLE).or_else(|| first_text(root, &profile.title));
    let description =
        meta_content(root, &OG_DESCRIPTION).or_else(|| meta_content(root, &META_DESCRIPTION));
    let canonical = root
        .select(&CANONICAL)
        .find_map(|el| el.value().attr("href").map(str::to_owned));

    let mut dates = Vec::new();
    dates.extend(meta_content(root, &PUBLISHED_TIME));
    dates.extend(
        root.select(&TIME_DATETIME)
            .find_map(|el| el.value().attr("datetime").and_then(non_empty)),
    );
    dates.extend(first_date(root, &profile.date));

    let text = first_text(root, &profile.content)
        .or_else(|| first_text(root, std::slice::from_ref(&*BODY)))
        .unwrap_or_default();

    PageFields {
        title,
        description,
        canonical,
        dates,
        text,
    }
}

fn meta_content(root: ElementRef<'_>, sel: &Selector) -> Option<String> {
    root.select(sel)
        .find_map(|el| el.value().attr("content").and_then(non_empty))
}

/// Resolve the canonical link, falling back to the fetched url.
fn article_url(canonical: Option<&str>, page_url: &Url) -> Result<String, ExtractionFailure> {
    if !matches!(page_url.scheme(), "http" | "https") {
        return Err(ExtractionFailure::InvalidUrl(page_url.to_string()));
    }
    let mut resolved = canonical
        .and_then(|href| page_url.join(href.trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or_else(|| page_url.clone());
    resolved.set_fragment(None);
    Ok(resolved.to_string())
}

pub struct Extractor {
    analyzer: Arc<dyn ContentAnalyzer>,
    min_title_words: usize,
}

impl Extractor {
    #[must_use]
    pub fn new(analyzer: Arc<dyn ContentAnalyzer>, min_title_words: usize) -> Self {
        Self {
            analyzer,
            min_title_words,
        }
    }

    /// Extract a candidate from the raw body of `page_url`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractionFailure`] when no usable title or url can be
    /// found, or the title is shorter than the configured minimum.
    pub async fn extract(
        &self,
        raw: &str,
        page_url: &Url,
        source: &SourceConfig,
        profile: &CompiledProfile,
        hint: &ListingEntry,
        now: DateTime<Utc>,
    ) -> Result<Candidate, ExtractionFailure> {
        let page = read_page(raw, profile);
        let url = article_url(page.canonical.as_deref(), page_url)?;

        let mut title = page.title.or_else(|| hint.title.clone());
        let mut description = page.description.or_else(|| hint.excerpt.clone());
        let mut category = None;
        let mut analyzer_error: Option<AnalyzerError> = None;

        if title.is_none() || description.is_none() || source.infer_category {
            match self.analyzer.analyze(&page.text).await {
                Ok(analysis) => {
                    title = title.or(analysis.title);
                    description = description.or(analysis.summary);
                    if source.infer_category {
                        category = analysis.category;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        source = %source.name,
                        url = %url,
                        error = %e,
                        "content analysis failed; using structural fields only"
                    );
                    analyzer_error = Some(e);
                }
            }
        }

        let title = match (title, analyzer_error) {
            (Some(title), _) => normalize_whitespace(&title),
            (None, Some(e)) => return Err(ExtractionFailure::AiUnavailable(e.to_string())),
            (None, None) => return Err(ExtractionFailure::MissingTitle),
        };
        let words = word_count(&title);
        if words < self.min_title_words {
            return Err(ExtractionFailure::TitleTooShort {
                title,
                words,
                min: self.min_title_words,
            });
        }

        let description = description
            .map(|d| normalize_whitespace(&d))
            .unwrap_or_else(|| title.clone());

        let published_at = page
            .dates
            .iter()
            .chain(hint.date.iter())
            .find_map(|raw_date| parse_published(raw_date, now));

        Ok(Candidate {
            title,
            description,
            url,
            category: category.unwrap_or_else(|| source.category.clone()),
            source: source.name.clone(),
            published_at,
            raw_content_hash: format!("{:x}", Sha256::digest(raw.as_bytes())),
        })
    }
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
