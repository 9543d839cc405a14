use reqwest::Client;
use serde::Serialize;

use crate::cancel::Cancel;
use crate::error::FetchError;

use html_escape::decode_html_entities;

pub const USER_AGENT: &str = "gator";

/// A parsed RSS 2.0 channel with its visible text already unescaped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RssFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RssItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw `pubDate` text; interpreting it is left to the caller.
    pub pub_date: String,
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }

    pub async fn fetch_feed(&self, url: &str, cancel: &Cancel) -> Result<RssFeed, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let body = tokio::select! {
            body = self.download(url) => body?,
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        };

        let feed = parse_feed(url, &body)?;
        tracing::debug!(channel = %feed.title, "Fetched {} items from {}", feed.items.len(), url);
        Ok(feed)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

/// Parses an RSS 2.0 document. Missing optional fields become empty strings;
/// titles and descriptions are HTML-unescaped once.
pub fn parse_feed(url: &str, body: &[u8]) -> Result<RssFeed, FetchError> {
    let channel = rss::Channel::read_from(body).map_err(|source| FetchError::Parse {
        url: url.to_string(),
        source,
    })?;

    let items = channel
        .items()
        .iter()
        .map(|item| RssItem {
            title: decode_html_entities(item.title().unwrap_or_default()).into_owned(),
            link: item.link().unwrap_or_default().to_string(),
            description: decode_html_entities(item.description().unwrap_or_default()).into_owned(),
            pub_date: item.pub_date().unwrap_or_default().to_string(),
        })
        .collect();

    Ok(RssFeed {
        title: decode_html_entities(channel.title()).into_owned(),
        link: channel.link().to_string(),
        description: decode_html_entities(channel.description()).into_owned(),
        items,
    })
}
