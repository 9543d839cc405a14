use crate::cancel::Cancel;
use crate::db::Repository;
use crate::error::Result;
use crate::feed::FeedFetcher;
use crate::models::User;
use crate::session::Session;

/// Everything a command handler can reach.
pub struct App {
    pub session: Session,
    pub repository: Repository,
    pub fetcher: FeedFetcher,
    pub cancel: Cancel,
}

impl App {
    pub async fn new(session: Session, cancel: Cancel) -> Result<Self> {
        let repository = Repository::open(session.db_url()).await?;
        let fetcher = FeedFetcher::new()?;

        Ok(Self {
            session,
            repository,
            fetcher,
            cancel,
        })
    }

    pub async fn current_user(&self) -> Result<User> {
        self.session
            .current_user(&self.repository, &self.cancel)
            .await
    }
}
