use std::path::{Path, PathBuf};

use newsdesk_core::AppConfig;

/// # Errors
///
/// Returns an error if the input cannot be read or lacks `title`/`url`
/// columns, or the output cannot be written.
pub(crate) async fn run_clean(
    config: &AppConfig,
    input: &Path,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let output = output.map_or_else(|| default_clean_output(input), Path::to_path_buf);
    let report = newsdesk_crawler::clean_csv(input, &output, config.min_title_words).await?;
    println!(
        "kept {} rows ({} duplicate urls, {} short titles dropped) -> {}",
        report.kept,
        report.duplicates,
        report.short_titles,
        output.display()
    );
    Ok(())
}

/// `news.csv` becomes `news_cleaned.csv` in the same directory.
pub(crate) fn default_clean_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("articles");
    input.with_file_name(format!("{stem}_cleaned.csv"))
}
