use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::cancel::Cancel;
use crate::db::Repository;
use crate::error::{AppError, PubDateError, Result, StoreErrorKind};
use crate::models::NewPost;

use super::fetcher::FeedFetcher;

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// RFC 1123 with a numeric zone, after the `Ddd, ` weekday prefix.
const PUB_DATE_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

/// Parses `Mon, 02 Jan 2006 15:04:05 -0700`. The weekday must be one of
/// the seven abbreviations but need not agree with the date.
pub fn parse_pub_date(raw: &str) -> std::result::Result<DateTime<Utc>, PubDateError> {
    let (weekday, rest) = raw.trim().split_once(", ").ok_or(PubDateError::Weekday)?;
    if !WEEKDAYS.contains(&weekday) {
        return Err(PubDateError::Weekday);
    }
    let parsed = DateTime::parse_from_str(rest, PUB_DATE_FORMAT)?;
    Ok(parsed.with_timezone(&Utc))
}

/// Outcome of one scrape tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub feed_name: String,
    pub feed_url: String,
    pub inserted: usize,
    /// Items whose URL was already stored.
    pub duplicates: usize,
    /// Items dropped because their date did not parse.
    pub skipped: usize,
    pub failed: usize,
}

pub struct Scraper<'a> {
    repo: &'a Repository,
    fetcher: &'a FeedFetcher,
}

impl<'a> Scraper<'a> {
    pub fn new(repo: &'a Repository, fetcher: &'a FeedFetcher) -> Self {
        Self { repo, fetcher }
    }

    /// Refreshes the least recently fetched feed. Returns `None` when there
    /// are no feeds at all.
    pub async fn tick(&self, cancel: &Cancel) -> Result<Option<TickReport>> {
        let feed = match self.repo.next_feed_to_fetch(cancel).await {
            Ok(feed) => feed,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let content = self.fetcher.fetch_feed(&feed.url, cancel).await?;

        // Mark before inserting so a crash mid-ingest does not re-pick this
        // feed straight away.
        self.repo.mark_feed_fetched(feed.id, cancel).await?;

        let mut report = TickReport {
            feed_name: feed.name.clone(),
            feed_url: feed.url.clone(),
            ..TickReport::default()
        };

        for item in content.items {
            let published_at = match parse_pub_date(&item.pub_date) {
                Ok(published_at) => published_at,
                Err(err) => {
                    warn!(feed = %feed.url, item = %item.title, "Failed to parse date '{}': {}", item.pub_date, err);
                    report.skipped += 1;
                    continue;
                }
            };

            let post = NewPost {
                feed_id: feed.id,
                title: item.title,
                url: item.link,
                description: Some(item.description).filter(|d| !d.is_empty()),
                published_at: Some(published_at),
            };
            let title = post.title.clone();

            match self.repo.create_post(post, cancel).await {
                Ok(_) => report.inserted += 1,
                Err(err) => match err.kind() {
                    StoreErrorKind::UniqueViolation => report.duplicates += 1,
                    StoreErrorKind::Cancelled => return Err(err.into()),
                    StoreErrorKind::NotFound | StoreErrorKind::Other => {
                        warn!(feed = %feed.url, "Failed to create post '{}': {}", title, err);
                        report.failed += 1;
                    }
                },
            }
        }

        info!(
            feed = %report.feed_url,
            inserted = report.inserted,
            duplicates = report.duplicates,
            skipped = report.skipped,
            failed = report.failed,
            "scraped feed"
        );
        Ok(Some(report))
    }

    /// Ticks every `interval` (the first tick fires immediately) until
    /// `cancel` fires or a tick fails. `on_tick` sees each tick's outcome.
    pub async fn run<F>(&self, interval: Duration, cancel: &Cancel, mut on_tick: F) -> Result<()>
    where
        F: FnMut(Option<&TickReport>),
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("scraper shutdown requested");
                    return Err(AppError::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            let report = self.tick(cancel).await?;
            on_tick(report.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::models::{Feed, NewFeed};

    fn rss(items: &[(&str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(link, date)| {
                format!(
                    "<item><title>Post {link}</title><link>{link}</link><description>About {link}</description><pubDate>{date}</pubDate></item>"
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Fixture</title><link>https://fixture.example/</link><description>d</description>{items}</channel></rss>"#
        )
    }

    async fn serve(body: String) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    async fn setup(url: &str) -> (Repository, Feed) {
        let repo = Repository::open_in_memory().await.unwrap();
        let cancel = Cancel::never();
        let user = repo.create_user("alice", &cancel).await.unwrap();
        let feed = repo
            .create_feed(
                NewFeed {
                    name: "Fixture".to_string(),
                    url: url.to_string(),
                    user_id: user.id,
                },
                &cancel,
            )
            .await
            .unwrap();
        (repo, feed)
    }

    const DATE: &str = "Mon, 02 Jan 2006 15:04:05 -0700";

    #[test]
    fn parses_rfc1123_with_numeric_zone() {
        let parsed = parse_pub_date(DATE).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap());
    }

    #[test]
    fn ignores_a_weekday_that_disagrees_with_the_date() {
        let parsed = parse_pub_date("Tue, 02 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap());
    }

    #[test]
    fn rejects_named_zones_and_garbage() {
        assert!(parse_pub_date("Mon, 02 Jan 2006 15:04:05 GMT").is_err());
        assert!(parse_pub_date("Foo, 02 Jan 2006 15:04:05 -0700").is_err());
        assert!(parse_pub_date("02 Jan 2006 15:04:05 -0700").is_err());
        assert!(parse_pub_date("not a date").is_err());
        assert!(parse_pub_date("").is_err());
    }

    #[tokio::test]
    async fn empty_store_is_a_no_op() {
        let repo = Repository::open_in_memory().await.unwrap();
        let fetcher = FeedFetcher::new().unwrap();
        let report = Scraper::new(&repo, &fetcher).tick(&Cancel::never()).await.unwrap();
        assert!(report.is_none());
    }

    #[tokio::test]
    async fn scraping_twice_does_not_duplicate_posts() {
        let server = serve(rss(&[
            ("https://fixture.example/1", DATE),
            ("https://fixture.example/2", DATE),
            ("https://fixture.example/3", DATE),
        ]))
        .await;
        let (repo, feed) = setup(&format!("{}/rss", server.uri())).await;
        let fetcher = FeedFetcher::new().unwrap();
        let scraper = Scraper::new(&repo, &fetcher);
        let cancel = Cancel::never();

        let first = scraper.tick(&cancel).await.unwrap().unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(first.feed_url, feed.url);
        assert_eq!(repo.count_posts(&cancel).await.unwrap(), 3);

        let second = scraper.tick(&cancel).await.unwrap().unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 3);
        assert_eq!(repo.count_posts(&cancel).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn bad_dates_are_skipped_without_failing_the_tick() {
        let server = serve(rss(&[
            ("https://fixture.example/good", DATE),
            ("https://fixture.example/bad", "not a date"),
            ("https://fixture.example/also-good", "Tue, 03 Jan 2006 10:00:00 +0000"),
        ]))
        .await;
        let (repo, feed) = setup(&format!("{}/rss", server.uri())).await;
        let fetcher = FeedFetcher::new().unwrap();
        let cancel = Cancel::never();

        let report = Scraper::new(&repo, &fetcher).tick(&cancel).await.unwrap().unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);

        repo.create_feed_follow(feed.user_id, feed.id, &cancel).await.unwrap();
        let posts = repo.posts_for_user(feed.user_id, 10, &cancel).await.unwrap();
        let urls: Vec<_> = posts.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, ["https://fixture.example/also-good", "https://fixture.example/good"]);
        assert!(posts.iter().all(|p| p.published_at.is_some()));
    }

    #[tokio::test]
    async fn successful_tick_advances_last_fetched_at() {
        let server = serve(rss(&[])).await;
        let (repo, feed) = setup(&format!("{}/rss", server.uri())).await;
        let fetcher = FeedFetcher::new().unwrap();
        let cancel = Cancel::never();
        assert!(feed.last_fetched_at.is_none());

        Scraper::new(&repo, &fetcher).tick(&cancel).await.unwrap();
        let after = repo.get_feed_by_url(&feed.url, &cancel).await.unwrap();
        assert!(after.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_to_the_caller() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (repo, feed) = setup(&format!("{}/rss", server.uri())).await;
        let fetcher = FeedFetcher::new().unwrap();
        let cancel = Cancel::never();

        let err = Scraper::new(&repo, &fetcher).tick(&cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));

        let after = repo.get_feed_by_url(&feed.url, &cancel).await.unwrap();
        assert!(after.last_fetched_at.is_none());
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let server = serve(rss(&[("https://fixture.example/1", DATE)])).await;
        let (repo, _feed) = setup(&format!("{}/rss", server.uri())).await;
        let fetcher = FeedFetcher::new().unwrap();
        let scraper = Scraper::new(&repo, &fetcher);
        let (source, cancel) = Cancel::channel();

        let mut ticks = 0;
        let result = scraper
            .run(Duration::from_millis(10), &cancel, |report| {
                assert!(report.is_some());
                ticks += 1;
                if ticks == 3 {
                    source.cancel();
                }
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(ticks, 3);
        assert_eq!(repo.count_posts(&Cancel::never()).await.unwrap(), 1);
    }
}
