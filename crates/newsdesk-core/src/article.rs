use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finalized, deduplicated article handed to a sink.
///
/// `url` is the natural key; a run never produces two records with the same url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    pub extracted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_missing_published_at_as_null() {
        let record = ArticleRecord {
            url: "https://news.example.com/a".to_string(),
            title: "Markets rally on rate cut".to_string(),
            description: "Stocks rose sharply.".to_string(),
            category: "business".to_string(),
            source: "Example".to_string(),
            published_at: None,
            extracted_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["published_at"].is_null());
        assert_eq!(json["extracted_at"], "2024-03-01T12:00:00Z");
    }
}
