use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use crossterm::style::Stylize;
use regex::Regex;

use crate::feed::TickReport;
use crate::models::{FeedFollow, FeedWithCreator, FollowedFeed, Post, User};

const SUMMARY_LIMIT: usize = 150;
const RULE: &str = "═══════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────";

pub fn user_line(name: &str, is_current: bool) -> String {
    if is_current {
        format!("* {name} (current)")
    } else {
        format!("* {name}")
    }
}

pub fn print_users(users: &[User], current: &str) {
    for user in users {
        println!("{}", user_line(&user.name, user.name == current));
    }
}

pub fn print_feeds(feeds: &[FeedWithCreator]) {
    if feeds.is_empty() {
        println!("No feeds found.");
        return;
    }

    println!("List of Feeds:");
    for feed in feeds {
        println!(
            "Feed Name: {}\nFeed URL: {}\nCreated by: {}\n",
            feed.feed_name, feed.feed_url, feed.user_name
        );
    }
}

pub fn print_follow(follow: &FeedFollow) {
    println!(
        "You ({}) are now following {}",
        follow.user_name.as_str().bold(),
        follow.feed_name.as_str().cyan()
    );
}

pub fn print_following(user: &User, follows: &[FollowedFeed]) {
    println!("Feeds followed by user {}", user.name);
    for follow in follows {
        println!("- {}", follow.feed_name);
    }
}

pub fn print_tick(report: Option<&TickReport>) {
    match report {
        Some(report) => println!(
            "collected {}: {} new, {} already stored, {} skipped, {} failed",
            report.feed_name.as_str().cyan(),
            report.inserted,
            report.duplicates,
            report.skipped,
            report.failed
        ),
        None => println!("{}", "no feeds to collect".yellow()),
    }
}

/// What `browse` shows beneath a post's date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostNote {
    Comments(String),
    Summary(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostView {
    pub title: String,
    pub feed_name: Option<String>,
    pub published: String,
    pub note: Option<PostNote>,
    pub url: String,
}

impl PostView {
    pub fn from_post(post: &Post) -> Self {
        let note = post.description.as_deref().and_then(|description| {
            match extract_comment_url(description) {
                Some(url) => Some(PostNote::Comments(url)),
                None => {
                    let summary = summarize_description(description);
                    (!summary.is_empty()).then_some(PostNote::Summary(summary))
                }
            }
        });

        Self {
            title: post.title.clone(),
            feed_name: post.feed_name.clone(),
            published: format_published(post.published_at),
            note,
            url: post.url.clone(),
        }
    }
}

pub fn print_posts(user: &User, posts: &[Post]) {
    if posts.is_empty() {
        println!("{}", "📰 No posts found. Try following some feeds first!".yellow().bold());
        return;
    }

    println!("\n{}", format!("📰 Latest Posts for {}", user.name).magenta().bold());
    println!("{}", RULE.magenta());

    for (i, post) in posts.iter().enumerate() {
        if i > 0 {
            println!();
        }
        let view = PostView::from_post(post);

        println!("{}", format!("📄 {}", view.title).cyan().bold());
        if let Some(feed_name) = &view.feed_name {
            println!("{}", format!("📡 {feed_name}").dark_grey());
        }
        println!("{}", format!("🗓️  {}", view.published).green());
        match &view.note {
            Some(PostNote::Comments(url)) => println!("{}", format!("💬 Comments: {url}").blue()),
            Some(PostNote::Summary(text)) => println!("{}", format!("📝  {text}").white()),
            None => {}
        }
        println!("{}", format!("🔗 {}", view.url).blue());
        println!("{}", THIN_RULE.magenta());
    }

    println!("\n{}\n", format!("Showing {} posts", posts.len()).magenta().bold());
}

pub fn format_published(published_at: Option<DateTime<Utc>>) -> String {
    match published_at {
        Some(at) => at.format("%b %-d, %Y at %-I:%M %p").to_string(),
        None => "Published date unknown".to_string(),
    }
}

fn comment_link_regex() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| {
        Regex::new(r#"<a[^>]*href="([^"]*)"[^>]*>(?:Comments?|Discussion)</a>"#)
            .expect("comment link pattern is valid")
    })
}

fn whitespace_regex() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// The href of an `<a ...>Comments</a>` style anchor, as aggregator feeds
/// (Hacker News, Lobsters) put in item descriptions.
pub fn extract_comment_url(html: &str) -> Option<String> {
    comment_link_regex()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|url| !url.is_empty())
}

/// Plain-text rendering of an HTML description, collapsed onto one line and
/// cut to 150 characters.
pub fn summarize_description(html: &str) -> String {
    let text = html2text::from_read(html.as_bytes(), 10_000)
        .unwrap_or_else(|_| tag_regex().replace_all(html, "").into_owned());
    let text = whitespace_regex().replace_all(&text, " ");
    let text = text.trim();

    if text.chars().count() > SUMMARY_LIMIT {
        let cut: String = text.chars().take(SUMMARY_LIMIT - 3).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
