use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// CSS selector lists used to locate articles on listing and article pages.
///
/// Every field is a comma-separated selector group, exactly as it would be
/// written in a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorProfile {
    pub containers: String,
    pub title: String,
    pub excerpt: String,
    pub date: String,
    pub content: String,
}

impl Default for SelectorProfile {
    fn default() -> Self {
        Self {
            containers: "article, .post, .story, .entry, .article".to_string(),
            title: "h1, h2, h3, .title, .headline".to_string(),
            excerpt: ".excerpt, .summary, .description, p".to_string(),
            date: "time, .date, .published, .timestamp".to_string(),
            content: "article, .article-content, .post-content, .entry-content, .story-body, \
                      [itemprop=\"articleBody\"]"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub category: String,
    pub base_urls: Vec<String>,
    #[serde(default)]
    pub selectors: Option<SelectorProfile>,
    /// Path or query template appended to each base URL for pages 2 and up,
    /// e.g. `/page/{page}` or `?page={page}`.
    #[serde(default)]
    pub pagination: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Ask the analyzer for a category instead of always using `category`.
    #[serde(default)]
    pub infer_category: bool,
}

fn default_max_pages() -> u32 {
    1
}

impl SourceConfig {
    /// The selector profile in effect for this source.
    #[must_use]
    pub fn profile(&self) -> SelectorProfile {
        self.selectors.clone().unwrap_or_default()
    }

    /// Listing page URLs for one base URL, page 1 first.
    ///
    /// Without a pagination template only the base URL itself is returned.
    #[must_use]
    pub fn listing_pages(&self, base_url: &str) -> Vec<String> {
        let mut pages = vec![base_url.to_string()];
        if let Some(template) = &self.pagination {
            let trimmed = base_url.trim_end_matches('/');
            for page in 2..=self.max_pages {
                let suffix = template.replace("{page}", &page.to_string());
                if suffix.starts_with('?') || suffix.starts_with('/') {
                    pages.push(format!("{trimmed}{suffix}"));
                } else {
                    pages.push(format!("{trimmed}/{suffix}"));
                }
            }
        }
        pages
    }
}

#[derive(Debug, Deserialize)]
pub struct SourcesFile {
    pub sources: Vec<SourceConfig>,
}

/// Load and validate the source configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_sources(path: &Path) -> Result<SourcesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SourcesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let sources_file: SourcesFile =
        serde_yaml::from_str(&content).map_err(ConfigError::SourcesFileParse)?;

    validate_sources(&sources_file)?;

    Ok(sources_file)
}

/// Check the invariants the crawler relies on.
///
/// # Errors
///
/// Returns `ConfigError::Validation` describing the first offending source.
pub fn validate_sources(sources_file: &SourcesFile) -> Result<(), ConfigError> {
    let mut seen_names = HashSet::new();

    for source in &sources_file.sources {
        if source.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source name must be non-empty".to_string(),
            ));
        }

        if !seen_names.insert(source.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source name: '{}'",
                source.name
            )));
        }

        if source.category.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{}' has an empty category",
                source.name
            )));
        }

        if source.base_urls.is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{}' has no base_urls",
                source.name
            )));
        }

        for base in &source.base_urls {
            match url::Url::parse(base) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => {
                    return Err(ConfigError::Validation(format!(
                        "source '{}' base url '{base}' has unsupported scheme '{}'",
                        source.name,
                        parsed.scheme()
                    )));
                }
                Err(e) => {
                    return Err(ConfigError::Validation(format!(
                        "source '{}' base url '{base}' is invalid: {e}",
                        source.name
                    )));
                }
            }
        }

        if let Some(template) = &source.pagination {
            if !template.contains("{page}") {
                return Err(ConfigError::Validation(format!(
                    "source '{}' pagination template '{template}' must contain {{page}}",
                    source.name
                )));
            }
        }

        if source.max_pages == 0 {
            return Err(ConfigError::Validation(format!(
                "source '{}' max_pages must be at least 1",
                source.name
            )));
        }
    }

    Ok(())
}
