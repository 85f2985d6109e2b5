//! Notification sinks for checkout outcomes and automation matches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dropcart::{AutomationRule, CheckoutRecord, LiveProductEvent};
use serde_json::{json, Value};

/// Receives reportable outcomes. Implementations must not fail the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A checkout succeeded or failed terminally.
    async fn checkout_finished(&self, record: &CheckoutRecord);

    /// An automation rule fired for a live product.
    async fn automation_started(&self, rule: &AutomationRule, event: &LiveProductEvent);
}

/// JSON payload describing a checkout outcome.
pub fn checkout_payload(record: &CheckoutRecord) -> Value {
    json!({
        "kind": if record.success { "checkout_success" } else { "checkout_failure" },
        "record": record,
    })
}

/// JSON payload describing a fired automation rule.
pub fn automation_payload(rule: &AutomationRule, event: &LiveProductEvent) -> Value {
    let store = event.store.trim_end_matches('/');
    json!({
        "kind": "automation_started",
        "automation": rule.name,
        "site": event.store,
        "product": event.product.title,
        "productUrl": format!("{store}/products/{}", event.product.handle),
        "image": event.product.image(),
        "sizes": rule.sizes_label(),
        "quantity": rule.quantity,
        "taskCount": rule.total_task_count,
        "paymentRetries": rule.payment_retries,
        "stopAfterMinutes": rule.stop_after_minutes,
    })
}

/// Logs notifications through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn checkout_finished(&self, record: &CheckoutRecord) {
        if record.success {
            tracing::info!(
                site = %record.site,
                product = %record.product_title,
                size = %record.product_size,
                order = %record.order_number,
                "Successful checkout"
            );
        } else {
            tracing::warn!(
                site = %record.site,
                product = %record.product_title,
                reason = %record.failure_reason,
                "Checkout failed"
            );
        }
    }

    async fn automation_started(&self, rule: &AutomationRule, event: &LiveProductEvent) {
        tracing::info!(
            automation = %rule.name,
            site = %event.store,
            product = %event.product.title,
            sizes = %rule.sizes_label(),
            "Automation started"
        );
    }
}

/// POSTs JSON payloads to a webhook URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }

    async fn post(&self, payload: Value) {
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => tracing::warn!("Webhook rejected ({})", resp.status()),
            Err(e) => tracing::warn!("Webhook failed: {e}"),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn checkout_finished(&self, record: &CheckoutRecord) {
        self.post(checkout_payload(record)).await;
    }

    async fn automation_started(&self, rule: &AutomationRule, event: &LiveProductEvent) {
        self.post(automation_payload(rule, event)).await;
    }
}

/// Fans notifications out to several sinks.
#[derive(Clone, Default)]
pub struct MultiNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    async fn checkout_finished(&self, record: &CheckoutRecord) {
        for sink in &self.sinks {
            sink.checkout_finished(record).await;
        }
    }

    async fn automation_started(&self, rule: &AutomationRule, event: &LiveProductEvent) {
        for sink in &self.sinks {
            sink.automation_started(rule, event).await;
        }
    }
}
