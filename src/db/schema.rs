pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- users table
CREATE TABLE IF NOT EXISTS users (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- feeds table
CREATE TABLE IF NOT EXISTS feeds (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_fetched_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_feeds_last_fetched_at ON feeds(last_fetched_at);

-- feed_follows table
CREATE TABLE IF NOT EXISTS feed_follows (
    id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    feed_id BLOB NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(user_id, feed_id)
);

CREATE INDEX IF NOT EXISTS idx_feed_follows_user_id ON feed_follows(user_id);

-- posts table (url is the global dedup key)
CREATE TABLE IF NOT EXISTS posts (
    id BLOB PRIMARY KEY,
    feed_id BLOB NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    description TEXT,
    published_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_feed_id ON posts(feed_id);
CREATE INDEX IF NOT EXISTS idx_posts_published_at ON posts(published_at DESC);
"#;
