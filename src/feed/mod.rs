mod fetcher;
mod scraper;

pub use fetcher::FeedFetcher;
pub use scraper::{Scraper, TickReport};
