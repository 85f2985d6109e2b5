//! Checkout form bodies.
//!
//! Shopify checkout forms repeat keys (hidden honeypot inputs next to the
//! real ones), so bodies are ordered pair lists rather than maps.

use dropcart::page::shipping_rate_price;
use dropcart::{Address, CheckoutStep, Page, Profile};

/// An ordered form body that keeps repeated keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormBody {
    pairs: Vec<(String, String)>,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    /// All values for a key, in insertion order.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    fn client_details(&mut self) -> &mut Self {
        self.add("checkout[client_details][browser_width]", "1903")
            .add("checkout[client_details][browser_height]", "979")
            .add("checkout[client_details][javascript_enabled]", "1")
            .add("checkout[client_details][color_depth]", "24")
            .add("checkout[client_details][java_enabled]", "false")
            .add("checkout[client_details][browser_tz]", "240")
    }

    fn patch(token: &str, previous: &str, step: &str) -> Self {
        let mut body = Self::new();
        body.add("_method", "patch")
            .add("authenticity_token", token)
            .add("previous_step", previous)
            .add("step", step);
        body
    }
}

/// Contact information and shipping address.
///
/// `page` is the current checkout page; optional fields are only sent when
/// the page renders them.
pub fn contact_form(page: Option<&Page>, profile: &Profile) -> FormBody {
    let token = page.and_then(|p| p.authenticity_token().ok()).unwrap_or_default();
    let has = |field: &str| page.is_some_and(|p| p.has_field(field));
    let address = &profile.shipping;

    let mut body = FormBody::patch(&token, "contact_information", "shipping_method");
    body.add("checkout[email]", &address.email)
        .add("checkout[buyer_accepts_marketing]", "0")
        .add("checkout[buyer_accepts_marketing]", "1");

    for _ in 0..2 {
        body.add("checkout[shipping_address][first_name]", address.first_name())
            .add("checkout[shipping_address][last_name]", address.last_name())
            .add("checkout[shipping_address][address1]", &address.line1)
            .add("checkout[shipping_address][address2]", &address.line2)
            .add("checkout[shipping_address][city]", &address.city)
            .add("checkout[shipping_address][country]", &address.country)
            .add("checkout[shipping_address][province]", &address.state)
            .add("checkout[shipping_address][zip]", &address.post_code)
            .add("checkout[shipping_address][phone]", &address.phone);
    }

    if has("checkout[buyer_accepts_sms]") {
        body.add("checkout[buyer_accepts_sms]", "0");
    }
    if has("checkout[sms_marketing_phone]") {
        body.add("checkout[sms_marketing_phone]", "");
    }
    if has("checkout[pick_up_in_store][selected]") {
        body.add("checkout[pick_up_in_store][selected]", "false");
    }
    if has("checkout[id]") {
        body.add("checkout[id]", "delivery-shipping");
    }
    if has("checkout[buyer_accepts_privacy_policy]") {
        body.add("checkout[buyer_accepts_privacy_policy]", "0")
            .add("checkout[buyer_accepts_privacy_policy]", "on");
    }

    body.client_details();
    body
}

/// Shipping rate selection.
pub fn shipping_form(page: Option<&Page>, rate: &str) -> FormBody {
    let token = page.and_then(|p| p.authenticity_token().ok()).unwrap_or_default();
    let mut body = FormBody::patch(&token, "shipping_method", "payment_method");
    body.add("checkout[shipping_rate][id]", rate);
    body.client_details();
    body
}

/// Inputs to the payment form.
pub struct PaymentDetails<'a> {
    pub page: Option<&'a Page>,
    pub profile: &'a Profile,
    pub session_id: &'a str,
    pub gateway: Option<u64>,
    /// Folded into the payment call on the fast path.
    pub shipping_rate: Option<&'a str>,
    pub total_price: String,
}

fn billing_fields(body: &mut FormBody, address: &Address) {
    // Honeypot copies first, then the real values.
    for field in [
        "first_name", "last_name", "company", "address1", "address2", "city", "country",
        "province", "zip", "phone",
    ] {
        body.add(format!("checkout[billing_address][{field}]"), "");
    }
    body.add("checkout[billing_address][country]", &address.country)
        .add("checkout[billing_address][first_name]", address.first_name())
        .add("checkout[billing_address][last_name]", address.last_name())
        .add("checkout[billing_address][company]", "")
        .add("checkout[billing_address][address1]", &address.line1)
        .add("checkout[billing_address][address2]", &address.line2)
        .add("checkout[billing_address][city]", &address.city)
        .add("checkout[billing_address][province]", &address.state)
        .add("checkout[billing_address][zip]", &address.post_code)
        .add("checkout[billing_address][phone]", &address.phone);
}

/// Final payment submission.
pub fn payment_form(details: &PaymentDetails<'_>) -> FormBody {
    let token = details
        .page
        .and_then(|p| p.authenticity_token().ok())
        .unwrap_or_default();
    let profile = details.profile;

    let mut body = FormBody::patch(&token, "payment_method", "");
    body.add("s", details.session_id);

    if let Some(rate) = details.shipping_rate.filter(|r| !r.is_empty()) {
        body.add("checkout[shipping_rate][id]", rate);
    }

    body.add(
        "checkout[payment_gateway]",
        details.gateway.map(|g| g.to_string()).unwrap_or_default(),
    )
    .add("checkout[credit_card][vault]", "false")
    .add(
        "checkout[different_billing_address]",
        (!profile.same_billing()).to_string(),
    );

    if !profile.same_billing() {
        billing_fields(&mut body, profile.billing_address());
    }

    body.add("checkout[remember_me]", "false")
        .add("checkout[remember_me]", "0")
        .add("checkout[vault_phone]", format!("+1{}", profile.shipping.phone))
        .add("checkout[total_price]", &details.total_price)
        .add("complete", "1");
    body.client_details();
    body
}

/// Amount to submit as `checkout[total_price]`, in minor units.
///
/// On the payment step the page total is authoritative. Earlier steps add
/// the selected shipping rate so shipping can be folded into payment.
pub fn total_payment_price(page: Option<&Page>, rate: Option<&str>, site_url: &str) -> String {
    let Some(price) = page.and_then(|p| p.total_price().ok()) else {
        return "0".to_string();
    };
    if page.is_some_and(|p| p.step() == CheckoutStep::PaymentMethod) {
        return price;
    }

    let Some(rate) = rate else {
        return price;
    };
    let Some(mut rate_price) = shipping_rate_price(rate) else {
        return price;
    };
    let Ok(price_minor) = price.parse::<i64>() else {
        return price;
    };

    // Slam Jam rounds its 28.xx/29.xx rates up to 30 server-side.
    if site_url.to_lowercase().contains("slamjam") && (rate.contains("28") || rate.contains("29")) {
        rate_price = 30.0;
    }

    let total = price_minor + (rate_price * 100.0).round() as i64;
    total.to_string()
}
