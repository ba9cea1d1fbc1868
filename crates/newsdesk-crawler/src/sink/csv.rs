//! Append-only CSV output and the offline cleaning pass.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use newsdesk_core::ArticleRecord;

use super::Sink;
use crate::error::SinkError;
use crate::text::{normalize_whitespace, word_count};

const HEADER: [&str; 7] = [
    "description",
    "url",
    "category",
    "title",
    "source",
    "published_at",
    "extracted_at",
];

const CLEAN_DELIMITER: u8 = b'|';

/// Appends one row per record and flushes after each, so rows written before
/// a crash stay on disk.
///
/// Urls already present in the file when it is opened are never appended
/// again.
pub struct CsvSink {
    path: PathBuf,
    file: File,
    delimiter: u8,
    seen: HashSet<String>,
}

impl CsvSink {
    /// Open `path` for appending, creating it (with a header row) if needed.
    /// A trailing row left without its line terminator is cut off first.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] when the file or its directory cannot be
    /// created, read or truncated, and [`SinkError::Malformed`] when the
    /// existing content is not UTF-8.
    pub async fn open(path: &Path, delimiter: u8) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut bytes = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let complete = complete_len(&bytes, delimiter);
        if complete < bytes.len() {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = bytes.len() - complete,
                "csv ends in a partial row; truncating it"
            );
            let file = OpenOptions::new().write(true).open(path).await?;
            file.set_len(u64::try_from(complete).unwrap_or(0)).await?;
            file.sync_data().await?;
            bytes.truncate(complete);
        }
        let existing = String::from_utf8(bytes)
            .map_err(|e| SinkError::Malformed(format!("{} is not UTF-8: {e}", path.display())))?;
        let seen = existing_urls(&existing, delimiter)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        if existing.trim().is_empty() {
            file.write_all(&format_row(&HEADER, delimiter)?).await?;
            file.flush().await?;
        }

        tracing::debug!(
            path = %path.display(),
            existing = seen.len(),
            "csv sink opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            delimiter,
            seen,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for CsvSink {
    async fn write(&mut self, record: &ArticleRecord) -> Result<(), SinkError> {
        if self.seen.contains(&record.url) {
            tracing::debug!(url = %record.url, "url already in csv; skipping");
            return Ok(());
        }
        let published = record
            .published_at
            .map(|d| d.to_rfc3339())
            .unwrap_or_default();
        let extracted = record.extracted_at.to_rfc3339();
        let row = format_row(
            &[
                record.description.as_str(),
                record.url.as_str(),
                record.category.as_str(),
                record.title.as_str(),
                record.source.as_str(),
                published.as_str(),
                extracted.as_str(),
            ],
            self.delimiter,
        )?;
        self.file.write_all(&row).await?;
        self.file.flush().await?;
        self.seen.insert(record.url.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }
}

fn existing_urls(content: &str, delimiter: u8) -> Result<HashSet<String>, SinkError> {
    let mut rows = parse_csv(content, delimiter)?.into_iter();
    let Some(header) = rows.next() else {
        return Ok(HashSet::new());
    };
    let Some(url_col) = column(&header, "url") else {
        return Ok(HashSet::new());
    };
    Ok(rows
        .filter_map(|row| row.get(url_col).map(|u| u.trim().to_owned()))
        .filter(|u| !u.is_empty())
        .collect())
}

fn column(header: &[String], name: &str) -> Option<usize> {
    header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn reader(content: &[u8], delimiter: u8) -> ::csv::Reader<&[u8]> {
    ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content)
}

/// One `\n`-terminated row, quoted only where needed.
fn format_row(fields: &[&str], delimiter: u8) -> Result<Vec<u8>, SinkError> {
    let mut writer = ::csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(::csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| SinkError::Io(std::io::Error::other(e.to_string())))
}

/// Split CSV text into rows of fields. Blank lines are skipped.
fn parse_csv(content: &str, delimiter: u8) -> Result<Vec<Vec<String>>, SinkError> {
    reader(content.as_bytes(), delimiter)
        .into_records()
        .map(|record| -> Result<Vec<String>, SinkError> {
            Ok(record?.iter().map(str::to_owned).collect())
        })
        .collect()
}

/// Length of `content` up to the end of its last terminated row. A write
/// cut short by a crash leaves a final row with no line terminator.
fn complete_len(content: &[u8], delimiter: u8) -> usize {
    if content.is_empty() || content.ends_with(b"\n") {
        return content.len();
    }
    let mut last_start = 0;
    for record in reader(content, delimiter).into_byte_records() {
        let Ok(record) = record else { break };
        if let Some(position) = record.position() {
            last_start = position.byte();
        }
    }
    usize::try_from(last_start).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub kept: usize,
    pub duplicates: usize,
    pub short_titles: usize,
}

/// Rewrite an article CSV as `title|url|category`, dropping rows whose title
/// has fewer than `min_title_words` words and repeated urls (first wins).
///
/// The input delimiter (`|` or `,`) is detected from the header line.
///
/// # Errors
///
/// Returns [`SinkError::Malformed`] when the input lacks a `title` or `url`
/// column, and [`SinkError::Io`] on read or write failure.
pub async fn clean_csv(
    input: &Path,
    output: &Path,
    min_title_words: usize,
) -> Result<CleanReport, SinkError> {
    let content = tokio::fs::read_to_string(input).await?;
    let header_line = content.lines().next().unwrap_or_default();
    let delimiter = if header_line.contains('|') { b'|' } else { b',' };

    let mut rows = parse_csv(&content, delimiter)?.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| SinkError::Malformed(format!("{} is empty", input.display())))?;
    let (Some(title_col), Some(url_col)) = (column(&header, "title"), column(&header, "url"))
    else {
        return Err(SinkError::Malformed(format!(
            "{} needs 'title' and 'url' columns",
            input.display()
        )));
    };
    let category_col = column(&header, "category");

    let mut report = CleanReport::default();
    let mut seen = HashSet::new();
    let mut out = format_row(&["title", "url", "category"], CLEAN_DELIMITER)?;
    for row in rows {
        let field = |idx: usize| row.get(idx).map(String::as_str).unwrap_or_default();
        let title = normalize_whitespace(field(title_col));
        let url = field(url_col).trim();
        if word_count(&title) < min_title_words {
            report.short_titles += 1;
            continue;
        }
        if !seen.insert(url.to_owned()) {
            report.duplicates += 1;
            continue;
        }
        let category = category_col.map(field).unwrap_or_default().trim();
        out.extend(format_row(&[&title, url, category], CLEAN_DELIMITER)?);
        report.kept += 1;
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(output, out).await?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        kept = report.kept,
        duplicates = report.duplicates,
        short_titles = report.short_titles,
        "csv cleaned"
    );
    Ok(report)
}
