use std::process::ExitCode;

mod app;
mod cancel;
mod cli;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod session;

use app::App;
use cancel::Cancel;
use cli::{Command, Commands};
use error::{AppError, Result};
use session::Session;

/// Exit status for a run interrupted by Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => ExitCode::from(EXIT_CANCELLED),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let commands = Commands::standard();

    // Parse command line arguments
    let Some(cmd) = Command::from_args(std::env::args().skip(1)) else {
        return Err(AppError::Usage(format!(
            "not enough arguments\n\tUsage: gator <command> [args...]\n\tCommands: {}",
            commands.names().join(", ")
        )));
    };

    // Load configuration
    let session = Session::load()?;

    let (source, cancel) = Cancel::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            source.cancel();
        }
    });

    let mut app = App::new(session, cancel).await?;
    commands.run(&mut app, cmd).await
}
