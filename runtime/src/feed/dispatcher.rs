//! Routes decoded feed messages to the product channel and feed state.

use std::sync::Arc;

use dropcart::feed::AntibotSnapshot;
use dropcart::{parse_feed_message, FeedMessage, LiveProductEvent};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, RwLock};

/// Site list and anti-bot snapshots received from the feed.
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub sites: Map<String, Value>,
    pub antibot: Option<AntibotSnapshot>,
    pub previous_antibot: Option<AntibotSnapshot>,
}

impl FeedState {
    /// Whether the latest snapshot flags `url` as protected.
    pub fn is_protected(&self, url: &str) -> bool {
        self.antibot.as_ref().is_some_and(|a| a.is_protected(url))
    }
}

/// The product receiver is gone.
#[derive(Debug, thiserror::Error)]
#[error("live product channel closed")]
pub struct FeedClosed;

/// Decodes raw feed text and forwards live products.
#[derive(Clone)]
pub struct FeedDispatcher {
    products: mpsc::Sender<LiveProductEvent>,
    state: Arc<RwLock<FeedState>>,
}

impl FeedDispatcher {
    pub fn new(products: mpsc::Sender<LiveProductEvent>) -> Self {
        Self {
            products,
            state: Arc::new(RwLock::new(FeedState::default())),
        }
    }

    pub fn state(&self) -> Arc<RwLock<FeedState>> {
        self.state.clone()
    }

    /// Handle one raw message. Waits while the product channel is full.
    /// Malformed messages are logged and skipped.
    pub async fn dispatch(&self, raw: &str) -> Result<(), FeedClosed> {
        let message = match parse_feed_message(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Failed to decode feed message: {e}");
                return Ok(());
            }
        };

        match message {
            FeedMessage::LiveProduct(event) => {
                tracing::info!(
                    store = %event.store,
                    product = %event.product.title,
                    price = ?event.product.first_variant().and_then(|v| v.price),
                    "Received live product"
                );
                self.products.send(event).await.map_err(|_| FeedClosed)?;
            }
            FeedMessage::SiteList(sites) => {
                tracing::info!("Received {} sites from the monitor", sites.len());
                self.state.write().await.sites = sites;
            }
            FeedMessage::Antibot(snapshot) => {
                tracing::info!("Received anti-bot data for {} sites", snapshot.sites.len());
                let mut state = self.state.write().await;
                state.previous_antibot = state.antibot.replace(snapshot);
            }
            FeedMessage::Ignored(kind) => {
                tracing::trace!("Ignoring feed message {kind}");
            }
        }
        Ok(())
    }
}
