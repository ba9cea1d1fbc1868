use std::path::Path;
use std::time::Duration;

use newsdesk_crawler::CrawlSettings;

use super::*;

#[test]
fn parses_plain_crawl() {
    let cli = Cli::try_parse_from(["newsdesk", "crawl"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Commands::Crawl(CrawlArgs {
            sources: None,
            sink: None,
            continuous: false,
            ..
        })
    ));
}

#[test]
fn parses_crawl_overrides() {
    let cli = Cli::try_parse_from([
        "newsdesk",
        "crawl",
        "--sources",
        "feeds.yaml",
        "--sink",
        "kv",
        "--output",
        "out/store.json",
        "--max-articles",
        "25",
        "--per-source",
        "5",
        "--deadline-secs",
        "90",
    ])
    .unwrap();

    let Commands::Crawl(args) = cli.command else {
        panic!("expected crawl command");
    };
    assert_eq!(args.sources.as_deref(), Some(Path::new("feeds.yaml")));
    assert_eq!(args.sink, Some(SinkKind::KeyValue));
    assert_eq!(args.output.as_deref(), Some(Path::new("out/store.json")));
    assert_eq!(args.max_articles, Some(25));
    assert_eq!(args.per_source, Some(5));
    assert_eq!(args.deadline_secs, Some(90));
}

#[test]
fn rejects_unknown_sink() {
    assert!(Cli::try_parse_from(["newsdesk", "crawl", "--sink", "dynamo"]).is_err());
}

#[test]
fn rejects_zero_caps() {
    for flag in ["--max-articles", "--per-source"] {
        assert!(
            Cli::try_parse_from(["newsdesk", "crawl", flag, "0"]).is_err(),
            "{flag} 0 should be rejected"
        );
    }
    let cli = Cli::try_parse_from(["newsdesk", "crawl", "--per-source", "1"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Crawl(CrawlArgs {
            per_source: Some(1),
            ..
        })
    ));
}

#[test]
fn parses_continuous_with_interval() {
    let cli = Cli::try_parse_from([
        "newsdesk",
        "crawl",
        "--continuous",
        "--interval-minutes",
        "15",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Commands::Crawl(CrawlArgs {
            continuous: true,
            interval_minutes: Some(15),
            ..
        })
    ));
}

#[test]
fn interval_requires_continuous() {
    assert!(Cli::try_parse_from(["newsdesk", "crawl", "--interval-minutes", "15"]).is_err());
}

#[test]
fn parses_clean_with_optional_output() {
    let cli = Cli::try_parse_from(["newsdesk", "clean", "raw.csv"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Clean { ref input, output: None } if input == Path::new("raw.csv")
    ));

    let cli = Cli::try_parse_from(["newsdesk", "clean", "raw.csv", "tidy.csv"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Clean { output: Some(ref o), .. } if o == Path::new("tidy.csv")
    ));
}

#[test]
fn missing_command_is_an_error() {
    assert!(Cli::try_parse_from(["newsdesk"]).is_err());
}

#[test]
fn overrides_replace_only_given_settings() {
    let mut settings = CrawlSettings::default();
    let args = CrawlArgs {
        max_articles: Some(7),
        deadline_secs: Some(45),
        ..CrawlArgs::default()
    };
    crawl::apply_overrides(&mut settings, &args);

    assert_eq!(settings.max_articles, 7);
    assert_eq!(settings.run_deadline, Duration::from_secs(45));
    assert_eq!(
        settings.articles_per_source,
        CrawlSettings::default().articles_per_source
    );
}

#[test]
fn clean_output_defaults_next_to_input() {
    assert_eq!(
        clean::default_clean_output(Path::new("output/news_articles.csv")),
        Path::new("output/news_articles_cleaned.csv")
    );
}
