use rusqlite::ffi;
use thiserror::Error;

/// Coarse classification callers branch on without matching driver errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    UniqueViolation,
    Cancelled,
    Other,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database operation cancelled")]
    Cancelled,

    #[error("database error: {0}")]
    Database(tokio_rusqlite::Error),
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::NotFound => StoreErrorKind::NotFound,
            StoreError::UniqueViolation(_) => StoreErrorKind::UniqueViolation,
            StoreError::Cancelled => StoreErrorKind::Cancelled,
            StoreError::Database(_) => StoreErrorKind::Other,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.kind() == StoreErrorKind::UniqueViolation
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == StoreErrorKind::NotFound
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(code, ref message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation
                    && (code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                        || code.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
            {
                StoreError::UniqueViolation(
                    message.clone().unwrap_or_else(|| code.to_string()),
                )
            }
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::OperationInterrupted =>
            {
                StoreError::Cancelled
            }
            other => StoreError::Database(tokio_rusqlite::Error::Rusqlite(other)),
        }
    }
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(inner) => inner.into(),
            other => StoreError::Database(other),
        }
    }
}

/// An item `pubDate` that is not RFC 1123 with a numeric zone.
#[derive(Debug, Error)]
pub enum PubDateError {
    #[error("missing weekday prefix")]
    Weekday,
    #[error(transparent)]
    Parse(#[from] chrono::ParseError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to fetch {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to fetch {url}: HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to parse feed {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: rss::Error,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("user '{0}' not found")]
    UserNotFound(String),

    #[error("feed '{0}' not found")]
    FeedNotFound(String),

    #[error("command does not exist: {0}")]
    UnknownCommand(String),

    #[error("{0}")]
    Usage(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True for every error that stems from the cancellation handle firing.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            AppError::Cancelled | AppError::Store(StoreError::Cancelled) | AppError::Fetch(FetchError::Cancelled)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
