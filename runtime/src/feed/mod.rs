//! Live product feed: message dispatch and the feed transports.

pub mod dispatcher;
pub mod stdin;
pub mod websocket;

pub use dispatcher::{FeedClosed, FeedDispatcher, FeedState};
pub use stdin::StdinFeed;
pub use websocket::FeedClient;

use dropcart::LiveProductEvent;
use tokio::sync::mpsc;

/// Live products are handed over one at a time; a slow consumer blocks the
/// feed.
pub const FEED_CHANNEL_CAPACITY: usize = 1;

/// The bounded channel between a feed transport and the automation listener.
pub fn feed_channel() -> (mpsc::Sender<LiveProductEvent>, mpsc::Receiver<LiveProductEvent>) {
    mpsc::channel(FEED_CHANNEL_CAPACITY)
}
