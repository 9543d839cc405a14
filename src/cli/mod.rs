use std::collections::HashMap;

use futures::future::LocalBoxFuture;

use crate::app::App;
use crate::error::{AppError, Result};
use crate::models::User;

mod duration;
mod handlers;
mod output;

pub use duration::parse_duration;

/// One invocation: the verb and its positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    /// Splits `argv` (without the program name) into verb and arguments.
    pub fn from_args<I>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let name = args.next()?;
        Some(Self {
            name,
            args: args.collect(),
        })
    }
}

pub type Handler = Box<dyn for<'a> Fn(&'a mut App, Command) -> LocalBoxFuture<'a, Result<()>>>;

/// A handler that needs the logged-in user.
pub type UserHandler = for<'a> fn(&'a mut App, Command, User) -> LocalBoxFuture<'a, Result<()>>;

pub fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut App, Command) -> LocalBoxFuture<'a, Result<()>> + 'static,
{
    Box::new(f)
}

/// Resolves the session's user before calling `inner`; fails with
/// "user not found" when nobody is logged in or the name is unknown.
pub fn logged_in(inner: UserHandler) -> Handler {
    handler(move |app, cmd| {
        Box::pin(async move {
            let user = app.current_user().await?;
            inner(app, cmd, user).await
        })
    })
}

#[derive(Default)]
pub struct Commands {
    handlers: HashMap<&'static str, Handler>,
}

impl Commands {
    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    pub async fn run(&self, app: &mut App, cmd: Command) -> Result<()> {
        let handler = self
            .handlers
            .get(cmd.name.as_str())
            .ok_or_else(|| AppError::UnknownCommand(cmd.name.clone()))?;
        handler(app, cmd).await
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// The full verb table.
    pub fn standard() -> Self {
        let mut commands = Self::default();

        commands.register("login", handler(|app, cmd| Box::pin(handlers::login(app, cmd))));
        commands.register("register", handler(|app, cmd| Box::pin(handlers::register(app, cmd))));
        commands.register("reset", handler(|app, cmd| Box::pin(handlers::reset(app, cmd))));
        commands.register("users", handler(|app, cmd| Box::pin(handlers::users(app, cmd))));
        commands.register("agg", handler(|app, cmd| Box::pin(handlers::aggregate(app, cmd))));
        commands.register("feeds", handler(|app, cmd| Box::pin(handlers::feeds(app, cmd))));
        commands.register(
            "addfeed",
            logged_in(|app, cmd, user| Box::pin(handlers::add_feed(app, cmd, user))),
        );
        commands.register(
            "follow",
            logged_in(|app, cmd, user| Box::pin(handlers::follow(app, cmd, user))),
        );
        commands.register(
            "following",
            logged_in(|app, cmd, user| Box::pin(handlers::following(app, cmd, user))),
        );
        commands.register(
            "unfollow",
            logged_in(|app, cmd, user| Box::pin(handlers::unfollow(app, cmd, user))),
        );
        commands.register(
            "browse",
            logged_in(|app, cmd, user| Box::pin(handlers::browse(app, cmd, user))),
        );

        commands
    }
}
