use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    /// The user who first added the feed.
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewFeed {
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
}

/// Row of the `feeds` listing: a feed joined with its creator's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedWithCreator {
    pub feed_name: String,
    pub feed_url: String,
    pub user_name: String,
}

/// A freshly created follow, joined with the names it links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedFollow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feed_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_name: String,
    pub feed_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowedFeed {
    pub feed_id: Uuid,
    pub feed_name: String,
}
