//! Shared fixtures for the runtime integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dropcart::{
    Address, AutomationRule, Card, CheckoutRecord, LiveProductEvent, Mode, Profile, Site,
};
use dropcart_runtime::checkout::{CheckoutOptions, CheckoutTask, TaskSettings};
use dropcart_runtime::config::Timings;
use dropcart_runtime::events::EventBus;
use dropcart_runtime::notify::Notifier;

/// Captures everything a task reports.
#[derive(Default)]
pub struct RecordingNotifier {
    pub records: Mutex<Vec<CheckoutRecord>>,
    pub automations: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn records(&self) -> Vec<CheckoutRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn checkout_finished(&self, record: &CheckoutRecord) {
        self.records.lock().unwrap().push(record.clone());
    }

    async fn automation_started(&self, rule: &AutomationRule, event: &LiveProductEvent) {
        self.automations
            .lock()
            .unwrap()
            .push((rule.name.clone(), event.product.title.clone()));
    }
}

pub fn profile() -> Profile {
    Profile {
        name: "main".into(),
        shipping: Address {
            name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            phone: "5125550100".into(),
            line1: "1 Main St".into(),
            post_code: "78701".into(),
            city: "Austin".into(),
            country: "United States".into(),
            state: "TX".into(),
            ..Default::default()
        },
        billing: None,
        card: Card {
            number: "4242424242424242".into(),
            expiry_month: "12".into(),
            expiry_year: "2030".into(),
            cvv: "123".into(),
        },
    }
}

pub fn settings(base: &str, mode: Mode, inputs: &[&str]) -> TaskSettings {
    TaskSettings {
        site: Site::new("Mock", base),
        profile: Arc::new(profile()),
        proxy_list: None,
        mode,
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        sizes: Vec::new(),
        quantity: 1,
    }
}

/// Short timings so retries happen within a test.
pub fn options(base: &str) -> CheckoutOptions {
    CheckoutOptions {
        timings: Timings::uniform(10),
        deposit_url: format!("{base}/sessions"),
    }
}

pub fn task(settings: TaskSettings, base: &str, notifier: Arc<RecordingNotifier>) -> CheckoutTask {
    CheckoutTask::new(settings, options(base), notifier, Arc::new(EventBus::default()))
}

// ── Page fixtures ──

pub fn step_page(step: &str, extra: &str) -> String {
    format!(
        r#"<html><head><script>Shopify.Checkout.step = "{step}";</script></head>
<body><form><input type="hidden" name="authenticity_token" value="tok-{step}">{extra}</form></body></html>"#
    )
}

pub const SHIPPING_RATES: &str = r#"<div><input type="radio" value="shopify-Standard-10.00" name="checkout[shipping_rate][id]"></div>"#;

pub const THANK_YOU: &str = r#"<html><body>
<span class="os-order-number">Order #1001</span>
<span class="product__description__name order-summary__emphasis">Dunk Low</span>
<span class="product__description__variant order-summary__small-text">10</span>
<img class="product-thumbnail__image" src="//cdn.shopify.com/dunk.jpg">
</body></html>"#;

pub const CART_LINE: &str =
    r#"{"variant_id":123456,"product_id":77,"product_title":"Dunk Low","handle":"dunk-low","quantity":1}"#;

pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("operation timed out")
}
