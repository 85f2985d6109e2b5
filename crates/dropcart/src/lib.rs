//! Dropcart: core library for storefront checkout automation.
//!
//! Everything in this crate is synchronous and free of I/O: the page
//! interpreter, keyword engine, proxy rotation, variant selection, queue
//! poll bookkeeping and automation rules. The async driver lives in
//! `dropcart-runtime`.

pub mod automation;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod keywords;
pub mod page;
pub mod proxy;
pub mod queue;
pub mod types;
pub mod variants;

pub use automation::AutomationRule;
pub use error::{DropcartError, DropcartResult, PageError};
pub use feed::{parse_feed_message, FeedMessage, LiveProduct, LiveProductEvent, LiveVariant};
pub use gateway::{known_gateway, resolve_gateway};
pub use keywords::{classify, is_keyword_match, ItemDescriptor};
pub use page::{CheckoutStep, Page};
pub use proxy::{Proxy, ProxyList};
pub use queue::{PollResponse, PollTypename, QueuePoll, QueueState};
pub use types::*;
pub use variants::{select_variant, size_matches};
