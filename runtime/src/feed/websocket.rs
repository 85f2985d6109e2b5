//! WebSocket client for the monitor feed.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use super::dispatcher::{FeedClosed, FeedDispatcher};
use crate::config::FeedConfig;
use crate::events::{DropcartEvent, EventBus};

/// Client version reported to the feed server.
pub const FEED_CLIENT_VERSION: &str = "1.9.76";

fn auth_message(key: &str) -> Value {
    json!({
        "server": null,
        "type": "auth",
        "version": FEED_CLIENT_VERSION,
        "key": key,
    })
}

fn stats_message(key: &str) -> Value {
    json!({
        "wsServerDisconnections": 0,
        "shippingRates": [],
        "tasks247Footsites": 0,
        "interval": 3_600_000,
        "type": "tasksStats",
        "version": FEED_CLIENT_VERSION,
        "tasks247": 0,
        "key": key,
        "tasks": 0,
        "wsClientDisconnections": 0,
    })
}

fn ping_message(key: &str) -> Value {
    json!({"type": "ping", "key": key})
}

/// Keeps a connection to the feed open and dispatches what it receives.
pub struct FeedClient {
    config: FeedConfig,
    dispatcher: FeedDispatcher,
    events: Arc<EventBus>,
}

impl FeedClient {
    pub fn new(config: FeedConfig, dispatcher: FeedDispatcher, events: Arc<EventBus>) -> Self {
        Self {
            config,
            dispatcher,
            events,
        }
    }

    /// Connect, read until the socket drops, then reconnect after the
    /// configured delay. Returns once nobody consumes live products.
    pub async fn run(self) {
        loop {
            let reason = match self.session().await {
                Ok(reason) => reason,
                Err(FeedClosed) => {
                    tracing::info!("Live product channel closed, leaving feed");
                    return;
                }
            };

            tracing::warn!(url = %self.config.url, "Feed disconnected: {reason}");
            self.events.emit(DropcartEvent::FeedDisconnected {
                url: self.config.url.clone(),
                reason,
            });
            tokio::time::sleep(self.config.reconnect_delay()).await;
        }
    }

    /// One connection. `Ok` carries the disconnect reason.
    async fn session(&self) -> Result<String, FeedClosed> {
        let url = &self.config.url;
        let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => return Ok(format!("connect failed: {e}")),
        };
        tracing::info!(url = %url, "Connected to feed");
        self.events
            .emit(DropcartEvent::FeedConnected { url: url.clone() });

        let (mut write, mut read) = ws_stream.split();
        let key = &self.config.key;
        for hello in [auth_message(key), stats_message(key)] {
            if let Err(e) = write.send(Message::Text(hello.to_string())).await {
                return Ok(format!("handshake failed: {e}"));
            }
        }

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => self.dispatcher.dispatch(&text).await?,
                Ok(Message::Ping(_)) => {
                    let pong = ping_message(key).to_string();
                    if let Err(e) = write.send(Message::Text(pong)).await {
                        return Ok(format!("ping reply failed: {e}"));
                    }
                }
                Ok(Message::Close(frame)) => {
                    return Ok(frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string()));
                }
                Ok(_) => {}
                Err(e) => return Ok(format!("read error: {e}")),
            }
        }
        Ok("stream ended".to_string())
    }
}
