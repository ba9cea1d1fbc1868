use serde::Serialize;
use thiserror::Error;

/// Failure categories counted in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransientNetwork,
    PermanentHttp,
    Extraction,
    SourceDiscovery,
    SinkWrite,
    AiUnavailable,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::TransientNetwork => "transient_network",
            FailureKind::PermanentHttp => "permanent_http",
            FailureKind::Extraction => "extraction",
            FailureKind::SourceDiscovery => "source_discovery",
            FailureKind::SinkWrite => "sink_write",
            FailureKind::AiUnavailable => "ai_unavailable",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("transient network failure for {url} after {attempts} attempt(s): {cause}")]
    TransientNetwork {
        url: String,
        attempts: u32,
        cause: String,
    },

    #[error("permanent HTTP status {status} from {url}")]
    PermanentHttp { url: String, status: u16 },

    #[error("extraction failed for {url}: {source}")]
    Extraction {
        url: String,
        #[source]
        source: ExtractionFailure,
    },

    #[error("discovery failed for source '{source_name}': {reason}")]
    SourceDiscovery { source_name: String, reason: String },

    #[error("sink write failed for {url}: {source}")]
    SinkWrite {
        url: String,
        #[source]
        source: SinkError,
    },

    #[error("sink flush failed: {0}")]
    SinkFlush(#[source] SinkError),

    #[error("invalid selector \"{selector}\" for source '{source_name}': {reason}")]
    InvalidSelector {
        source_name: String,
        selector: String,
        reason: String,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl CrawlError {
    /// The summary bucket this error is counted under.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            CrawlError::TransientNetwork { .. } | CrawlError::Client(_) => {
                FailureKind::TransientNetwork
            }
            CrawlError::PermanentHttp { .. } => FailureKind::PermanentHttp,
            CrawlError::Extraction {
                source: ExtractionFailure::AiUnavailable(_),
                ..
            } => FailureKind::AiUnavailable,
            CrawlError::Extraction { .. } | CrawlError::InvalidSelector { .. } => {
                FailureKind::Extraction
            }
            CrawlError::SourceDiscovery { .. } => FailureKind::SourceDiscovery,
            CrawlError::SinkWrite { .. } | CrawlError::SinkFlush(_) => FailureKind::SinkWrite,
        }
    }
}

/// Why a fetched page could not be turned into a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    #[error("no title found")]
    MissingTitle,

    #[error("page url '{0}' is not an absolute http(s) url")]
    InvalidUrl(String),

    #[error("title \"{title}\" has {words} word(s); at least {min} required")]
    TitleTooShort {
        title: String,
        words: usize,
        min: usize,
    },

    #[error("no title found and content analysis failed: {0}")]
    AiUnavailable(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed input: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_unavailable_extraction_is_counted_separately() {
        let err = CrawlError::Extraction {
            url: "https://news.example.com/a".to_string(),
            source: ExtractionFailure::AiUnavailable("timed out".to_string()),
        };
        assert_eq!(err.kind(), FailureKind::AiUnavailable);

        let err = CrawlError::Extraction {
            url: "https://news.example.com/a".to_string(),
            source: ExtractionFailure::MissingTitle,
        };
        assert_eq!(err.kind(), FailureKind::Extraction);
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::SourceDiscovery).unwrap();
        assert_eq!(json, "\"source_discovery\"");
        assert_eq!(FailureKind::PermanentHttp.to_string(), "permanent_http");
    }
}
