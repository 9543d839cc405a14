use anyhow::anyhow;
use url::Url;

use crate::app::App;
use crate::error::{AppError, Result};
use crate::feed::Scraper;
use crate::models::{NewFeed, User};

use super::{output, parse_duration, Command};

const DEFAULT_BROWSE_LIMIT: u32 = 2;

fn usage(message: &str) -> AppError {
    AppError::Usage(message.to_string())
}

pub async fn login(app: &mut App, cmd: Command) -> Result<()> {
    let [name] = cmd.args.as_slice() else {
        return Err(usage("login command expects one argument\n\tUsage: login <username>"));
    };

    app.repository
        .get_user_by_name(name, &app.cancel)
        .await
        .map_err(|err| {
            if err.is_not_found() {
                AppError::UserNotFound(name.clone())
            } else {
                err.into()
            }
        })?;

    app.session.set_current_user(name)?;
    println!("User set to '{name}'");
    Ok(())
}

pub async fn register(app: &mut App, cmd: Command) -> Result<()> {
    let [name] = cmd.args.as_slice() else {
        return Err(usage("register command expects one argument\n\tUsage: register <username>"));
    };
    if name.is_empty() {
        return Err(usage("user name must not be empty"));
    }

    let user = app
        .repository
        .create_user(name, &app.cancel)
        .await
        .map_err(|err| -> AppError {
            if err.is_unique_violation() {
                anyhow!("user '{name}' already exists").into()
            } else {
                err.into()
            }
        })?;

    app.session.set_current_user(&user.name)?;
    println!("successfully registered user: {}", user.name);
    Ok(())
}

pub async fn reset(app: &mut App, _cmd: Command) -> Result<()> {
    app.repository.reset(&app.cancel).await?;
    println!("database reset");
    Ok(())
}

pub async fn users(app: &mut App, _cmd: Command) -> Result<()> {
    let users = app.repository.list_users(&app.cancel).await?;
    output::print_users(&users, app.session.current_user_name());
    Ok(())
}

pub async fn aggregate(app: &mut App, cmd: Command) -> Result<()> {
    let Some(raw_interval) = cmd.args.first() else {
        return Err(usage("missing required argument: time_between_reqs\n\tUsage: agg <interval>"));
    };
    let interval = parse_duration(raw_interval)?;

    let feeds = app.repository.count_feeds(&app.cancel).await?;
    let posts = app.repository.count_posts(&app.cancel).await?;
    println!("Collecting feeds every {raw_interval} ({feeds} feeds, {posts} posts stored)");

    Scraper::new(&app.repository, &app.fetcher)
        .run(interval, &app.cancel, output::print_tick)
        .await
}

pub async fn feeds(app: &mut App, _cmd: Command) -> Result<()> {
    let feeds = app.repository.list_feeds_with_user(&app.cancel).await?;
    output::print_feeds(&feeds);
    Ok(())
}

/// Creates the feed unless its URL is already known, then follows it. An
/// existing follow is left in place silently.
pub async fn add_feed(app: &mut App, cmd: Command, user: User) -> Result<()> {
    let [name, url] = cmd.args.as_slice() else {
        return Err(usage("addfeed requires two arguments\n\tUsage: addfeed <name> <url>"));
    };
    Url::parse(url).map_err(|err| AppError::Usage(format!("invalid feed url '{url}': {err}")))?;

    let feed = match app.repository.get_feed_by_url(url, &app.cancel).await {
        Ok(feed) => {
            tracing::debug!(feed = %feed.url, "feed already exists, reusing it");
            feed
        }
        Err(err) if err.is_not_found() => {
            let new_feed = NewFeed {
                name: name.clone(),
                url: url.clone(),
                user_id: user.id,
            };
            app.repository.create_feed(new_feed, &app.cancel).await?
        }
        Err(err) => return Err(err.into()),
    };

    match app
        .repository
        .create_feed_follow(user.id, feed.id, &app.cancel)
        .await
    {
        Ok(follow) => output::print_follow(&follow),
        Err(err) if err.is_unique_violation() => {
            tracing::debug!(user = %user.name, feed = %feed.url, "already following");
        }
        Err(err) => return Err(err.into()),
    }

    println!("Feed: {} ({})", feed.name, feed.url);
    Ok(())
}

pub async fn follow(app: &mut App, cmd: Command, user: User) -> Result<()> {
    let [url] = cmd.args.as_slice() else {
        return Err(usage("follow takes one argument\n\tUsage: follow <url>"));
    };

    let feed = app
        .repository
        .get_feed_by_url(url, &app.cancel)
        .await
        .map_err(|err| {
            if err.is_not_found() {
                AppError::FeedNotFound(url.clone())
            } else {
                err.into()
            }
        })?;

    let follow = app
        .repository
        .create_feed_follow(user.id, feed.id, &app.cancel)
        .await
        .map_err(|err| -> AppError {
            if err.is_unique_violation() {
                anyhow!("you are already following {url}").into()
            } else {
                err.into()
            }
        })?;

    output::print_follow(&follow);
    Ok(())
}

pub async fn following(app: &mut App, cmd: Command, user: User) -> Result<()> {
    if !cmd.args.is_empty() {
        return Err(usage("following takes 0 arguments"));
    }

    let follows = app.repository.follows_for_user(user.id, &app.cancel).await?;
    output::print_following(&user, &follows);
    Ok(())
}

/// Removes the follow without checking that one existed.
pub async fn unfollow(app: &mut App, cmd: Command, user: User) -> Result<()> {
    let [url] = cmd.args.as_slice() else {
        return Err(usage("unfollow takes one argument\n\tUsage: unfollow <url>"));
    };

    let removed = app
        .repository
        .delete_feed_follow(user.id, url, &app.cancel)
        .await?;
    tracing::debug!(user = %user.name, feed = %url, removed, "unfollow");

    println!("{url} - Feed unfollowed");
    Ok(())
}

pub async fn browse(app: &mut App, cmd: Command, user: User) -> Result<()> {
    let limit = match cmd.args.as_slice() {
        [] => DEFAULT_BROWSE_LIMIT,
        [raw] => raw
            .parse::<u32>()
            .map_err(|err| AppError::Usage(format!("invalid limit '{raw}': {err}")))?,
        _ => return Err(usage("browse takes one optional argument\n\tUsage: browse [limit]")),
    };

    let posts = app
        .repository
        .posts_for_user(user.id, limit, &app.cancel)
        .await?;
    output::print_posts(&user, &posts);
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    use super::super::Commands;
    use super::*;
    use crate::cancel::Cancel;
    use crate::config::Config;
    use crate::session::Session;

    struct Harness {
        app: App,
        commands: Commands,
        dir: TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = Config {
                db_url: ":memory:".to_string(),
                current_user_name: String::new(),
            };
            let session = Session::new(config, dir.path().join("gator.toml"));
            let app = App::new(session, Cancel::never()).await.unwrap();
            Self {
                app,
                commands: Commands::standard(),
                dir,
            }
        }

        async fn run(&mut self, line: &[&str]) -> Result<()> {
            let cmd = Command::from_args(line.iter().map(|s| s.to_string())).unwrap();
            self.commands.run(&mut self.app, cmd).await
        }

        fn config_on_disk(&self) -> Config {
            Config::load_from(&self.dir.path().join("gator.toml")).unwrap()
        }
    }

    const HN: &str = "https://news.example/rss";

    #[tokio::test]
    async fn register_sets_current_user() {
        let mut h = Harness::new().await;

        assert_ok!(h.run(&["register", "alice"]).await);
        assert_eq!(h.app.session.current_user_name(), "alice");
        assert_eq!(h.config_on_disk().current_user_name, "alice");

        let users = h.app.repository.list_users(&Cancel::never()).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(
            output::user_line(&users[0].name, users[0].name == h.app.session.current_user_name()),
            "* alice (current)"
        );
        assert_ok!(h.run(&["users"]).await);
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_bad_arity() {
        let mut h = Harness::new().await;
        assert_ok!(h.run(&["register", "alice"]).await);

        let err = h.run(&["register", "alice"]).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));

        assert!(matches!(h.run(&["register"]).await, Err(AppError::Usage(_))));
    }

    #[tokio::test]
    async fn login_requires_an_existing_user() {
        let mut h = Harness::new().await;

        let err = h.run(&["login", "ghost"]).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(name) if name == "ghost"));
        assert_eq!(h.app.session.current_user_name(), "");

        assert_ok!(h.run(&["register", "alice"]).await);
        assert_ok!(h.run(&["register", "bob"]).await);
        assert_ok!(h.run(&["login", "alice"]).await);
        assert_eq!(h.config_on_disk().current_user_name, "alice");
    }

    #[tokio::test]
    async fn addfeed_twice_keeps_one_feed_and_one_follow() {
        let mut h = Harness::new().await;
        assert_ok!(h.run(&["register", "alice"]).await);

        assert_ok!(h.run(&["addfeed", "Hacker News", HN]).await);
        assert_ok!(h.run(&["addfeed", "Hacker News", HN]).await);

        let cancel = Cancel::never();
        assert_eq!(h.app.repository.count_feeds(&cancel).await.unwrap(), 1);
        let alice = h.app.current_user().await.unwrap();
        let follows = h.app.repository.follows_for_user(alice.id, &cancel).await.unwrap();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].feed_name, "Hacker News");
    }

    #[tokio::test]
    async fn addfeed_reuses_a_feed_created_by_someone_else() {
        let mut h = Harness::new().await;
        assert_ok!(h.run(&["register", "alice"]).await);
        assert_ok!(h.run(&["addfeed", "Hacker News", HN]).await);
        assert_ok!(h.run(&["register", "bob"]).await);
        assert_ok!(h.run(&["addfeed", "HN again", HN]).await);

        let cancel = Cancel::never();
        let feeds = h.app.repository.list_feeds_with_user(&cancel).await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].feed_name, "Hacker News");
        assert_eq!(feeds[0].user_name, "alice");

        let bob = h.app.current_user().await.unwrap();
        assert_eq!(h.app.repository.follows_for_user(bob.id, &cancel).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn addfeed_validates_arguments() {
        let mut h = Harness::new().await;
        assert_ok!(h.run(&["register", "alice"]).await);

        assert!(matches!(h.run(&["addfeed", "only-name"]).await, Err(AppError::Usage(_))));
        assert!(matches!(h.run(&["addfeed", "Bad", "not a url"]).await, Err(AppError::Usage(_))));
        assert_eq!(h.app.repository.count_feeds(&Cancel::never()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn user_scoped_commands_need_a_login() {
        let mut h = Harness::new().await;

        let lines: [&[&str]; 5] = [
            &["addfeed", "HN", HN],
            &["follow", HN],
            &["following"],
            &["unfollow", HN],
            &["browse"],
        ];
        for line in lines {
            let err = h.run(line).await.unwrap_err();
            assert!(matches!(err, AppError::UserNotFound(_)), "{line:?} gave {err}");
        }
    }

    #[tokio::test]
    async fn follows_are_per_user() {
        let mut h = Harness::new().await;
        assert_ok!(h.run(&["register", "alice"]).await);
        assert_ok!(h.run(&["addfeed", "Hacker News", HN]).await);
        assert_ok!(h.run(&["unfollow", HN]).await);
        assert_ok!(h.run(&["register", "bob"]).await);

        assert_ok!(h.run(&["login", "alice"]).await);
        assert_ok!(h.run(&["follow", HN]).await);
        let err = h.run(&["follow", HN]).await.unwrap_err();
        assert!(err.to_string().contains("already following"));

        assert_ok!(h.run(&["login", "bob"]).await);
        assert_ok!(h.run(&["following"]).await);
        let bob = h.app.current_user().await.unwrap();
        let follows = h.app.repository.follows_for_user(bob.id, &Cancel::never()).await.unwrap();
        assert!(follows.is_empty());
    }

    #[tokio::test]
    async fn follow_of_unknown_feed_is_not_found() {
        let mut h = Harness::new().await;
        assert_ok!(h.run(&["register", "alice"]).await);

        let err = h.run(&["follow", "https://nowhere.example/rss"]).await.unwrap_err();
        assert!(matches!(err, AppError::FeedNotFound(url) if url == "https://nowhere.example/rss"));
    }

    #[tokio::test]
    async fn unfollow_without_a_follow_still_succeeds() {
        let mut h = Harness::new().await;
        assert_ok!(h.run(&["register", "alice"]).await);
        assert_ok!(h.run(&["unfollow", HN]).await);
    }

    #[tokio::test]
    async fn browse_parses_its_limit() {
        let mut h = Harness::new().await;
        assert_ok!(h.run(&["register", "alice"]).await);

        assert_ok!(h.run(&["browse"]).await);
        assert_ok!(h.run(&["browse", "0"]).await);
        assert_ok!(h.run(&["browse", "5"]).await);
        assert!(matches!(h.run(&["browse", "-1"]).await, Err(AppError::Usage(_))));
        assert!(matches!(h.run(&["browse", "1", "2"]).await, Err(AppError::Usage(_))));
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let mut h = Harness::new().await;
        assert_ok!(h.run(&["register", "alice"]).await);
        assert_ok!(h.run(&["addfeed", "Hacker News", HN]).await);

        assert_ok!(h.run(&["reset"]).await);

        let cancel = Cancel::never();
        assert!(h.app.repository.list_users(&cancel).await.unwrap().is_empty());
        assert_eq!(h.app.repository.count_feeds(&cancel).await.unwrap(), 0);
        assert!(matches!(h.run(&["following"]).await, Err(AppError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn agg_rejects_bad_intervals() {
        let mut h = Harness::new().await;

        assert!(matches!(h.run(&["agg"]).await, Err(AppError::Usage(_))));
        assert!(matches!(h.run(&["agg", "soon"]).await, Err(AppError::Usage(_))));
    }

    #[tokio::test]
    async fn unknown_verbs_are_rejected() {
        let mut h = Harness::new().await;
        let err = h.run(&["frobnicate"]).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownCommand(ref name) if name == "frobnicate"));
        assert!(err.to_string().contains("command does not exist"));
        assert_err!(h.run(&["Users"]).await);
    }
}
