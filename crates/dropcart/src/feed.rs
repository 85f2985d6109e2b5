//! Live product feed messages.
//!
//! The monitor pushes JSON envelopes discriminated by `type`. Only
//! `livemonitor` messages on the `shopify` body type carry products the
//! automation engine acts on; site-list and antibot snapshots are kept as
//! side state; every other discriminant is accepted and ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DropcartResult;

/// A product variant as reported by the live feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveVariant {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub available: bool,
    #[serde(default, deserialize_with = "crate::types::flexible_price")]
    pub price: Option<f64>,
}

/// A product as reported by the live feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveProduct {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub variants: Vec<LiveVariant>,
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(default)]
    pub featured_image: Option<String>,
}

impl LiveProduct {
    /// Best image URL for notifications.
    pub fn image(&self) -> Option<String> {
        if let Some(featured) = self.featured_image.as_deref().filter(|s| !s.is_empty()) {
            return Some(absolute(featured));
        }
        match self.images.first()? {
            Value::String(src) => Some(absolute(src)),
            Value::Object(obj) => obj.get("src").and_then(Value::as_str).map(absolute),
            _ => None,
        }
    }

    pub fn first_variant(&self) -> Option<&LiveVariant> {
        self.variants.first()
    }
}

fn absolute(src: &str) -> String {
    if src.starts_with("//") {
        format!("https:{src}")
    } else {
        src.to_string()
    }
}

/// A product observed on a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveProductEvent {
    pub store: String,
    pub channel: String,
    pub event: String,
    pub product: LiveProduct,
}

/// Antibot protection state of one monitored site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteAntibot {
    #[serde(default)]
    pub antibot: bool,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub url: String,
}

/// A full antibot snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntibotSnapshot {
    #[serde(default)]
    pub sites: Vec<SiteAntibot>,
}

impl AntibotSnapshot {
    pub fn is_protected(&self, url: &str) -> bool {
        let url = url.trim_end_matches('/');
        self.sites
            .iter()
            .any(|s| s.antibot && s.url.trim_end_matches('/') == url)
    }
}

/// A decoded feed message.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    LiveProduct(LiveProductEvent),
    SiteList(Map<String, Value>),
    Antibot(AntibotSnapshot),
    Ignored(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    body: Value,
}

#[derive(Deserialize)]
struct LiveBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    payload: LivePayload,
}

#[derive(Default, Deserialize)]
struct LivePayload {
    #[serde(default)]
    store: String,
    #[serde(default)]
    product: LiveProduct,
}

/// Decode one raw feed message.
pub fn parse_feed_message(raw: &str) -> DropcartResult<FeedMessage> {
    let envelope: Envelope = serde_json::from_str(raw)?;

    match envelope.kind.as_str() {
        "livemonitor" => {
            let body: LiveBody = serde_json::from_value(envelope.body)?;
            if body.kind != "shopify" {
                return Ok(FeedMessage::Ignored(format!("livemonitor/{}", body.kind)));
            }
            Ok(FeedMessage::LiveProduct(LiveProductEvent {
                store: body.payload.store,
                channel: body.channel,
                event: body.event,
                product: body.payload.product,
            }))
        }
        "pinConfig" => match envelope.body {
            Value::Object(sites) => Ok(FeedMessage::SiteList(sites)),
            _ => Ok(FeedMessage::SiteList(Map::new())),
        },
        "shopifyAntibot" => Ok(FeedMessage::Antibot(serde_json::from_str(raw)?)),
        other => Ok(FeedMessage::Ignored(other.to_string())),
    }
}
