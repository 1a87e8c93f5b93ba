//! Read-model entities - projections built from the live event stream

mod alert;
mod feed_item;

pub use alert::ActiveAlert;
pub use feed_item::FeedItem;
