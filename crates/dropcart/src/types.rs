//! Core data types shared by the checkout driver and the automation engine.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Checkout execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Reload and re-validate every checkout page before advancing.
    #[default]
    Safe,
    /// Skip reloads and fold shipping into payment when the gateway is known.
    Fast,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Safe => write!(f, "Safe"),
            Mode::Fast => write!(f, "Fast"),
        }
    }
}

/// Severity attached to a task status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    #[default]
    Info,
    Important,
    Error,
    Success,
}

/// A storefront the task checks out on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub url: String,
}

impl Site {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Absolute URL for a storefront path such as `/cart/add.js`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base(), path)
    }

    /// Host (and port, when present) of the storefront.
    pub fn host_name(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(parsed) => match (parsed.host_str(), parsed.port()) {
                (Some(host), Some(port)) => format!("{host}:{port}"),
                (Some(host), None) => host.to_string(),
                _ => String::new(),
            },
            Err(_) => self
                .base()
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .to_string(),
        }
    }
}

/// A product snapshot from `products.json` or `/products/{handle}.js`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

/// One purchasable variant of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub option1: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub available: bool,
    #[serde(default, deserialize_with = "flexible_price")]
    pub price: Option<f64>,
}

impl Variant {
    /// A variant that only carries its identifier.
    pub fn stub(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// The size/option label used for size filtering.
    pub fn label(&self) -> &str {
        match self.option1.as_deref() {
            Some(option) if !option.is_empty() => option,
            _ => &self.title,
        }
    }
}

/// Accepts prices encoded either as JSON numbers or numeric strings.
pub(crate) fn flexible_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(D::Error::custom),
        Some(other) => Err(D::Error::custom(format!("unexpected price: {other}"))),
    }
}

/// A postal address as stored in a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    pub post_code: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub state: String,
}

impl Address {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }

    pub fn last_name(&self) -> &str {
        self.name.split_whitespace().last().unwrap_or("")
    }
}

/// Payment card details.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub number: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub cvv: String,
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail = self
            .number
            .get(self.number.len().saturating_sub(4)..)
            .unwrap_or("");
        f.debug_struct("Card")
            .field("number", &format_args!("****{tail}"))
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .finish_non_exhaustive()
    }
}

/// Buyer identity used to fill the checkout forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub shipping: Address,
    #[serde(default)]
    pub billing: Option<Address>,
    pub card: Card,
}

impl Profile {
    /// Whether billing falls back to the shipping address.
    pub fn same_billing(&self) -> bool {
        self.billing.is_none()
    }

    /// The address payment is billed to.
    pub fn billing_address(&self) -> &Address {
        self.billing.as_ref().unwrap_or(&self.shipping)
    }
}

/// Outcome of a checkout attempt, handed to notification sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRecord {
    pub success: bool,
    pub failure_reason: String,
    pub site: String,
    pub mode: String,
    pub product_title: String,
    pub product_size: String,
    pub product_image: String,
    pub profile_name: String,
    pub proxy_list_name: String,
    pub email: String,
    pub order_number: String,
    pub order_link: String,
    pub quantity: String,
}
