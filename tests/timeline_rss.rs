// tests/timeline_rss.rs
use nitter_harvester::crawl::timeline::parse_feed;
use nitter_harvester::error::FetchError;

const RSS: &str = include_str!("fixtures/nitter_rss.xml");

#[test]
fn fixture_feed_parses_into_tweets() {
    let tweets = parse_feed("someone", RSS).expect("fixture parses");

    let ids: Vec<u64> = tweets.iter().map(|t| t.tweet_id).collect();
    assert_eq!(
        ids,
        vec![1870000000000000105, 1870000000000000104, 1870000000000000100]
    );

    let first = &tweets[0];
    assert_eq!(first.author, "someone");
    assert_eq!(first.content, "Shipping the new release today & notes below");
    assert_eq!(
        first.source_url,
        "https://x.com/someone/status/1870000000000000105"
    );
    assert_eq!(
        first.media_urls,
        vec!["https://nitter.alpha.example/pic/media%2Fabc.jpg".to_string()]
    );
    assert_eq!(first.published_at.to_rfc3339(), "2025-12-22T09:00:00+00:00");

    // retweets keep the original author
    assert_eq!(tweets[1].author, "another_user");
    assert!(tweets[1].media_urls.is_empty());
}

#[test]
fn html_error_pages_are_parse_errors() {
    let err = parse_feed("someone", "<html><body>rate limited</body></html>").unwrap_err();
    assert!(matches!(err, FetchError::Parse(_)), "got {err:?}");
}

#[test]
fn empty_channel_is_an_empty_page() {
    let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>x</title></channel></rss>"#;
    assert!(parse_feed("someone", xml).unwrap().is_empty());
}
