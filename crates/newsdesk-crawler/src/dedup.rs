//! Run-scoped duplicate detection.
//!
//! A candidate is a duplicate when any of these was already admitted:
//! - its normalized url,
//! - its fingerprint (normalized title + normalized url),
//! - its title-only fingerprint, for titles of at least
//!   [`MIN_TITLE_WORDS_FOR_TITLE_MATCH`] normalized words.
//!
//! All three are checked and recorded under one lock, so two callers racing
//! on the same story can never both be accepted.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use sha2::{Digest, Sha256};
use url::Url;

use crate::extract::Candidate;

/// Shorter titles ("Live updates", "Weather") recur across unrelated stories.
pub const MIN_TITLE_WORDS_FOR_TITLE_MATCH: usize = 4;

const TRACKING_PARAM_PREFIXES: [&str; 2] = ["utm_", "fbclid"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Carries the url of the record that was admitted first.
    DuplicateOf(String),
}

#[derive(Default)]
struct SeenSets {
    urls: HashMap<String, String>,
    fingerprints: HashMap<String, String>,
    titles: HashMap<String, String>,
}

#[derive(Default)]
pub struct Deduplicator {
    seen: Mutex<SeenSets>,
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `candidate` unless it repeats something already admitted.
    pub fn admit(&self, candidate: &Candidate) -> Admission {
        let url_key = normalize_url(&candidate.url);
        let title_key = normalize_title(&candidate.title);
        let fp = fingerprint_normalized(&title_key, &url_key);
        let title_fp = (title_key.split(' ').count() >= MIN_TITLE_WORDS_FOR_TITLE_MATCH)
            .then(|| sha256_hex(&title_key));

        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = seen
            .urls
            .get(&url_key)
            .or_else(|| seen.fingerprints.get(&fp))
            .or_else(|| title_fp.as_ref().and_then(|t| seen.titles.get(t)));
        if let Some(existing) = existing {
            return Admission::DuplicateOf(existing.clone());
        }

        seen.urls.insert(url_key, candidate.url.clone());
        seen.fingerprints.insert(fp, candidate.url.clone());
        if let Some(title_fp) = title_fp {
            seen.titles.insert(title_fp, candidate.url.clone());
        }
        Admission::Accepted
    }

    /// Number of distinct records admitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .urls
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercase, punctuation folded to spaces, whitespace collapsed.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical form of an absolute url for comparison: no fragment, no
/// `www.` prefix, no tracking parameters, no trailing slash.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.trim().to_lowercase();
    };
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAM_PREFIXES.iter().any(|p| k.starts_with(p)))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let host = url
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_owned())
        .unwrap_or_default();
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    let query = url.query().map(|q| format!("?{q}")).unwrap_or_default();
    format!("{}://{host}{port}{path}{query}", url.scheme())
}

/// Stable fingerprint over the normalized title and url.
#[must_use]
pub fn fingerprint(title: &str, url: &str) -> String {
    fingerprint_normalized(&normalize_title(title), &normalize_url(url))
}

fn fingerprint_normalized(title_key: &str, url_key: &str) -> String {
    sha256_hex(&format!("{title_key}\n{url_key}"))
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn candidate(title: &str, url: &str) -> Candidate {
        Candidate {
            title: title.to_string(),
            description: String::new(),
            url: url.to_string(),
            category: "world".to_string(),
            source: "test".to_string(),
            published_at: None,
            raw_content_hash: String::new(),
        }
    }

    #[test]
    fn normalize_title_folds_case_and_punctuation() {
        assert_eq!(
            normalize_title("  Breaking:  Markets FALL -- again!! "),
            "breaking markets fall again"
        );
    }

    #[test]
    fn normalize_url_strips_variance() {
        assert_eq!(
            normalize_url("https://WWW.Example.com/news/story/?utm_source=x&id=7#comments"),
            "https://example.com/news/story?id=7"
        );
        assert_eq!(
            normalize_url("https://example.com/news/story"),
            "https://example.com/news/story"
        );
    }

    #[test]
    fn fingerprint_ignores_cosmetic_differences() {
        assert_eq!(
            fingerprint("Markets Fall!", "https://www.example.com/a/"),
            fingerprint("markets   fall", "https://example.com/a#x")
        );
        assert_ne!(
            fingerprint("Markets fall", "https://example.com/a"),
            fingerprint("Markets rise", "https://example.com/a")
        );
    }

    #[test]
    fn same_url_is_duplicate() {
        let dedup = Deduplicator::new();
        assert_eq!(
            dedup.admit(&candidate("First title here", "https://example.com/a")),
            Admission::Accepted
        );
        assert_eq!(
            dedup.admit(&candidate("Different words", "https://example.com/a/")),
            Admission::DuplicateOf("https://example.com/a".to_string())
        );
    }

    #[test]
    fn long_identical_title_under_other_url_is_duplicate() {
        let dedup = Deduplicator::new();
        dedup.admit(&candidate(
            "Central bank holds rates steady",
            "https://one.example.com/x",
        ));
        assert_eq!(
            dedup.admit(&candidate(
                "Central Bank Holds Rates Steady!",
                "https://two.example.com/y"
            )),
            Admission::DuplicateOf("https://one.example.com/x".to_string())
        );
    }

    #[test]
    fn short_identical_title_under_other_url_is_accepted() {
        let dedup = Deduplicator::new();
        dedup.admit(&candidate("Live updates", "https://example.com/1"));
        assert_eq!(
            dedup.admit(&candidate("Live updates", "https://example.com/2")),
            Admission::Accepted
        );
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn concurrent_admission_accepts_exactly_one() {
        let dedup = Arc::new(Deduplicator::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let dedup = Arc::clone(&dedup);
                std::thread::spawn(move || {
                    let title = if i % 2 == 0 {
                        "Storm hits the coast"
                    } else {
                        "storm HITS the coast."
                    };
                    dedup.admit(&candidate(title, "https://example.com/storm"))
                })
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|a| *a == Admission::Accepted)
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(dedup.len(), 1);
    }
}
