mod feed;
mod post;
mod user;

pub use feed::{Feed, FeedFollow, FeedWithCreator, FollowedFeed, NewFeed};
pub use post::{NewPost, Post};
pub use user::User;
