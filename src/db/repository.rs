use std::path::Path;

use chrono::Utc;
use rusqlite::{params, InterruptHandle, Row};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::cancel::Cancel;
use crate::error::{Result, StoreError, StoreResult};
use crate::models::{Feed, FeedFollow, FeedWithCreator, FollowedFeed, NewFeed, NewPost, Post, User};

use super::schema::SCHEMA;

pub struct Repository {
    conn: Connection,
    interrupt: InterruptHandle,
}

impl Repository {
    /// Opens the database named by `db_url`, a SQLite path (an optional
    /// `sqlite://` prefix is stripped) or `:memory:`.
    pub async fn open(db_url: &str) -> Result<Self> {
        let path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
        if path == ":memory:" {
            return Self::open_in_memory().await;
        }
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).await.map_err(StoreError::from)?;
        Ok(Self::init(conn).await?)
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(StoreError::from)?;
        Ok(Self::init(conn).await?)
    }

    async fn init(conn: Connection) -> StoreResult<Self> {
        let interrupt = conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(conn.get_interrupt_handle())
            })
            .await?;
        Ok(Self { conn, interrupt })
    }

    /// Runs `function` on the connection thread, abandoning it (and
    /// interrupting SQLite) if `cancel` fires first.
    async fn call<F, R>(&self, cancel: &Cancel, function: F) -> StoreResult<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        tokio::select! {
            result = self.conn.call(move |conn| function(conn).map_err(tokio_rusqlite::Error::from)) => {
                result.map_err(StoreError::from)
            }
            _ = cancel.cancelled() => {
                self.interrupt.interrupt();
                Err(StoreError::Cancelled)
            }
        }
    }

    // User operations

    pub async fn create_user(&self, name: &str, cancel: &Cancel) -> StoreResult<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        let row = user.clone();
        self.call(cancel, move |conn| {
            conn.execute(
                "INSERT INTO users (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![row.id, row.name, row.created_at, row.updated_at],
            )?;
            Ok(())
        })
        .await?;
        tracing::debug!(user = %user.name, "created user");
        Ok(user)
    }

    pub async fn get_user_by_name(&self, name: &str, cancel: &Cancel) -> StoreResult<User> {
        let name = name.to_string();
        self.call(cancel, move |conn| {
            conn.query_row(
                "SELECT id, name, created_at, updated_at FROM users WHERE name = ?1",
                params![name],
                user_from_row,
            )
        })
        .await
    }

    pub async fn list_users(&self, cancel: &Cancel) -> StoreResult<Vec<User>> {
        self.call(cancel, |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_at, updated_at FROM users ORDER BY created_at, name",
            )?;
            let users = stmt
                .query_map([], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
        .await
    }

    /// Empties every table.
    pub async fn reset(&self, cancel: &Cancel) -> StoreResult<()> {
        self.call(cancel, |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM posts", [])?;
            tx.execute("DELETE FROM feed_follows", [])?;
            tx.execute("DELETE FROM feeds", [])?;
            tx.execute("DELETE FROM users", [])?;
            tx.commit()
        })
        .await?;
        tracing::debug!("database reset");
        Ok(())
    }

    // Feed operations

    pub async fn create_feed(&self, feed: NewFeed, cancel: &Cancel) -> StoreResult<Feed> {
        let now = Utc::now();
        let feed = Feed {
            id: Uuid::new_v4(),
            name: feed.name,
            url: feed.url,
            user_id: feed.user_id,
            created_at: now,
            updated_at: now,
            last_fetched_at: None,
        };
        let row = feed.clone();
        self.call(cancel, move |conn| {
            conn.execute(
                "INSERT INTO feeds (id, name, url, user_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![row.id, row.name, row.url, row.user_id, row.created_at, row.updated_at],
            )?;
            Ok(())
        })
        .await?;
        tracing::debug!(feed = %feed.url, "created feed");
        Ok(feed)
    }

    pub async fn get_feed_by_url(&self, url: &str, cancel: &Cancel) -> StoreResult<Feed> {
        let url = url.to_string();
        self.call(cancel, move |conn| {
            conn.query_row(
                "SELECT id, name, url, user_id, created_at, updated_at, last_fetched_at FROM feeds WHERE url = ?1",
                params![url],
                feed_from_row,
            )
        })
        .await
    }

    pub async fn list_feeds_with_user(&self, cancel: &Cancel) -> StoreResult<Vec<FeedWithCreator>> {
        self.call(cancel, |conn| {
            let mut stmt = conn.prepare(
                r#"SELECT f.name, f.url, u.name
                   FROM feeds f
                   JOIN users u ON f.user_id = u.id
                   ORDER BY f.created_at"#,
            )?;
            let feeds = stmt
                .query_map([], |row| {
                    Ok(FeedWithCreator {
                        feed_name: row.get(0)?,
                        feed_url: row.get(1)?,
                        user_name: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(feeds)
        })
        .await
    }

    /// The feed fetched longest ago; never-fetched feeds come first, oldest
    /// first.
    pub async fn next_feed_to_fetch(&self, cancel: &Cancel) -> StoreResult<Feed> {
        self.call(cancel, |conn| {
            conn.query_row(
                r#"SELECT id, name, url, user_id, created_at, updated_at, last_fetched_at
                   FROM feeds
                   ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC
                   LIMIT 1"#,
                [],
                feed_from_row,
            )
        })
        .await
    }

    pub async fn mark_feed_fetched(&self, feed_id: Uuid, cancel: &Cancel) -> StoreResult<()> {
        let updated = self
            .call(cancel, move |conn| {
                let now = Utc::now();
                conn.execute(
                    "UPDATE feeds SET last_fetched_at = ?1, updated_at = ?1 WHERE id = ?2",
                    params![now, feed_id],
                )
            })
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub async fn count_feeds(&self, cancel: &Cancel) -> StoreResult<u64> {
        self.call(cancel, |conn| {
            conn.query_row("SELECT COUNT(*) FROM feeds", [], |row| row.get::<_, i64>(0))
        })
        .await
        .map(|count| count as u64)
    }

    // Follow operations

    pub async fn create_feed_follow(
        &self,
        user_id: Uuid,
        feed_id: Uuid,
        cancel: &Cancel,
    ) -> StoreResult<FeedFollow> {
        let follow = self
            .call(cancel, move |conn| {
                let now = Utc::now();
                let id = Uuid::new_v4();
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO feed_follows (id, user_id, feed_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![id, user_id, feed_id, now],
                )?;
                let follow = tx.query_row(
                    r#"SELECT ff.id, ff.user_id, ff.feed_id, ff.created_at, ff.updated_at, u.name, f.name
                       FROM feed_follows ff
                       JOIN users u ON ff.user_id = u.id
                       JOIN feeds f ON ff.feed_id = f.id
                       WHERE ff.id = ?1"#,
                    params![id],
                    |row| {
                        Ok(FeedFollow {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            feed_id: row.get(2)?,
                            created_at: row.get(3)?,
                            updated_at: row.get(4)?,
                            user_name: row.get(5)?,
                            feed_name: row.get(6)?,
                        })
                    },
                )?;
                tx.commit()?;
                Ok(follow)
            })
            .await?;
        tracing::debug!(user = %follow.user_name, feed = %follow.feed_name, "created follow");
        Ok(follow)
    }

    /// Removes the follow of `feed_url` by `user_id`, returning how many rows
    /// went away.
    pub async fn delete_feed_follow(
        &self,
        user_id: Uuid,
        feed_url: &str,
        cancel: &Cancel,
    ) -> StoreResult<usize> {
        let feed_url = feed_url.to_string();
        let removed = self
            .call(cancel, move |conn| {
                conn.execute(
                    r#"DELETE FROM feed_follows
                       WHERE user_id = ?1
                         AND feed_id IN (SELECT id FROM feeds WHERE url = ?2)"#,
                    params![user_id, feed_url],
                )
            })
            .await?;
        tracing::debug!(removed, "deleted follow");
        Ok(removed)
    }

    pub async fn follows_for_user(&self, user_id: Uuid, cancel: &Cancel) -> StoreResult<Vec<FollowedFeed>> {
        self.call(cancel, move |conn| {
            let mut stmt = conn.prepare(
                r#"SELECT f.id, f.name
                   FROM feed_follows ff
                   JOIN feeds f ON ff.feed_id = f.id
                   WHERE ff.user_id = ?1
                   ORDER BY ff.created_at"#,
            )?;
            let follows = stmt
                .query_map(params![user_id], |row| {
                    Ok(FollowedFeed {
                        feed_id: row.get(0)?,
                        feed_name: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(follows)
        })
        .await
    }

    // Post operations

    pub async fn create_post(&self, post: NewPost, cancel: &Cancel) -> StoreResult<Post> {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            feed_id: post.feed_id,
            title: post.title,
            url: post.url,
            description: post.description,
            published_at: post.published_at,
            created_at: now,
            updated_at: now,
            feed_name: None,
        };
        let row = post.clone();
        self.call(cancel, move |conn| {
            conn.execute(
                r#"INSERT INTO posts (id, feed_id, title, url, description, published_at, created_at, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                params![
                    row.id,
                    row.feed_id,
                    row.title,
                    row.url,
                    row.description,
                    row.published_at,
                    row.created_at,
                    row.updated_at,
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(post)
    }

    /// Newest posts across every feed `user_id` follows, undated posts last.
    pub async fn posts_for_user(&self, user_id: Uuid, limit: u32, cancel: &Cancel) -> StoreResult<Vec<Post>> {
        self.call(cancel, move |conn| {
            let mut stmt = conn.prepare(
                r#"SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at,
                          p.created_at, p.updated_at, f.name
                   FROM posts p
                   JOIN feed_follows ff ON ff.feed_id = p.feed_id
                   JOIN feeds f ON f.id = p.feed_id
                   WHERE ff.user_id = ?1
                   ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC
                   LIMIT ?2"#,
            )?;
            let posts = stmt
                .query_map(params![user_id, limit], post_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(posts)
        })
        .await
    }

    pub async fn count_posts(&self, cancel: &Cancel) -> StoreResult<u64> {
        self.call(cancel, |conn| {
            conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get::<_, i64>(0))
        })
        .await
        .map(|count| count as u64)
    }
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        user_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        last_fetched_at: row.get(6)?,
    })
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        description: row.get(4)?,
        published_at: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        feed_name: row.get(8)?,
    })
}
