//! Checkout page interpretation.
//!
//! A [`Page`] is one HTTP response (final URL plus body). Which checkout
//! step it represents is inferred from URL markers, body markers, the
//! step token Shopify embeds in the page script, and finally the
//! `step`/`previous_step` query parameters, in that order.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::PageError;

/// The checkout step a page represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckoutStep {
    None,
    Contact,
    ShippingMethod,
    CalculatingTaxes,
    PaymentMethod,
    Processing,
    Queue,
    OrderConfirmation,
    Checkpoint,
    Login,
    LoginChallenge,
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Patterns ───────────────────────────────────────────

struct Patterns {
    step_token: Regex,
    authenticity_token: Regex,
    shipping_rate: Regex,
    total_price: Regex,
    gateway_select: Regex,
    gateway_id: Regex,
    notice: Regex,
    product_title: Regex,
    product_size: Regex,
    product_image: Regex,
    shop_id: Regex,
    rate_price: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("page pattern is valid");
        Patterns {
            step_token: re(r#"Shopify\.Checkout\.step\s*=\s*"([^"]*)""#),
            authenticity_token: re(r#"name="authenticity_token" value="([^"]+)""#),
            shipping_rate: re(
                r#"type="radio" value="([^"]+)" name="checkout\[shipping_rate\]\[id\]""#,
            ),
            total_price: re(r#"data-checkout-payment-due-target="(\d+)""#),
            gateway_select: re(r#"data-select-gateway="(\d+)""#),
            gateway_id: re(r"payment_gateway_(\d+)"),
            notice: re(r#"<p class="notice__text">([^<]+)</p>"#),
            product_title: re(
                r#"<span class="product__description__name order-summary__emphasis">([^<]+)</span>"#,
            ),
            product_size: re(
                r#"<span class="product__description__variant order-summary__small-text">([^<]+)</span>"#,
            ),
            product_image: re(r#"class="product-thumbnail__image" src="([^"]+)""#),
            shop_id: re(r"/(\d+)/checkouts/"),
            rate_price: re(r"^.+-.+-([0-9.]+)$"),
        }
    })
}

fn capture(re: &Regex, haystack: &str, field: &'static str) -> Result<String, PageError> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(PageError::NotFound(field))
}

/// Map a raw step token (and the previous step) to a [`CheckoutStep`].
pub fn step_from_params(step: &str, previous: &str, url: &str) -> CheckoutStep {
    if (previous == "payment_method" && step.is_empty()) || url.contains("validate=") {
        return CheckoutStep::PaymentMethod;
    }
    match step {
        "" | "contact_information" => CheckoutStep::Contact,
        "shipping_method" => CheckoutStep::ShippingMethod,
        "payment_method" => CheckoutStep::PaymentMethod,
        _ => CheckoutStep::None,
    }
}

/// Price component of a shipping rate id such as `shopify-Standard-12.05`.
pub fn shipping_rate_price(rate_id: &str) -> Option<f64> {
    patterns()
        .rate_price
        .captures(rate_id)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ── Page ───────────────────────────────────────────────

/// An immutable snapshot of one storefront response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub body: String,
}

impl Page {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    /// A page known only by its location, e.g. a redirect target.
    pub fn location(url: impl Into<String>) -> Self {
        Self::new(url, String::new())
    }

    /// Classify the checkout step this page represents.
    pub fn step(&self) -> CheckoutStep {
        let url = self.url.to_lowercase();

        if url.contains("/throttle") || url.contains("/queue") {
            return CheckoutStep::Queue;
        }
        if url.contains("/thank_you") {
            return CheckoutStep::OrderConfirmation;
        }
        if url.contains("/checkpoint") {
            return CheckoutStep::Checkpoint;
        }
        if url.contains("/challenge") {
            return CheckoutStep::LoginChallenge;
        }
        if url.contains("/account/login") {
            return CheckoutStep::Login;
        }
        if !url.contains("/checkouts/") {
            return CheckoutStep::None;
        }

        if url.contains("/processing") {
            return CheckoutStep::Processing;
        }
        if self.body.to_lowercase().contains("calculating taxes") {
            return CheckoutStep::CalculatingTaxes;
        }

        if let Some(token) = self.step_token() {
            let step = step_from_params(&token, "", &self.url);
            if step != CheckoutStep::None {
                return step;
            }
        }

        let (step, previous) = self.query_steps();
        step_from_params(&step, &previous, &self.url)
    }

    /// The `Shopify.Checkout.step` value embedded in the page script.
    pub fn step_token(&self) -> Option<String> {
        patterns()
            .step_token
            .captures(&self.body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty())
    }

    fn query_steps(&self) -> (String, String) {
        let Ok(parsed) = Url::parse(&self.url) else {
            return (String::new(), String::new());
        };
        let mut step = String::new();
        let mut previous = String::new();
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "step" => step = value.into_owned(),
                "previous_step" => previous = value.into_owned(),
                _ => {}
            }
        }
        (step, previous)
    }

    /// Whether the body mentions a form field (used for optional fields).
    pub fn has_field(&self, name: &str) -> bool {
        self.body.contains(name)
    }

    pub fn authenticity_token(&self) -> Result<String, PageError> {
        capture(&patterns().authenticity_token, &self.body, "authenticity token")
    }

    pub fn shipping_rate_id(&self) -> Result<String, PageError> {
        capture(&patterns().shipping_rate, &self.body, "shipping rate")
    }

    /// Amount due in minor units, as rendered by the page.
    pub fn total_price(&self) -> Result<String, PageError> {
        capture(&patterns().total_price, &self.body, "total price")
    }

    /// Payment gateway id advertised by the body.
    pub fn payment_gateway_id(&self) -> Result<u64, PageError> {
        let raw = capture(&patterns().gateway_select, &self.body, "payment gateway")
            .or_else(|_| capture(&patterns().gateway_id, &self.body, "payment gateway"))?;
        raw.parse().map_err(|_| PageError::Malformed {
            field: "payment gateway",
            value: raw,
        })
    }

    pub fn notice(&self) -> Result<String, PageError> {
        capture(&patterns().notice, &self.body, "notice")
    }

    pub fn product_title(&self) -> Result<String, PageError> {
        capture(&patterns().product_title, &self.body, "product title")
    }

    pub fn product_size(&self) -> Result<String, PageError> {
        capture(&patterns().product_size, &self.body, "product size")
    }

    /// Product thumbnail URL, with protocol-relative URLs made absolute.
    pub fn product_image(&self) -> Result<String, PageError> {
        let src = capture(&patterns().product_image, &self.body, "product image")?;
        if src.starts_with("http") {
            Ok(src)
        } else {
            Ok(format!("https:{src}"))
        }
    }

    /// Shop id from a `/{shop}/checkouts/{token}` URL.
    pub fn shop_id(&self) -> Result<u64, PageError> {
        let raw = capture(&patterns().shop_id, &self.url, "shop id")?;
        raw.parse().map_err(|_| PageError::Malformed {
            field: "shop id",
            value: raw,
        })
    }

    /// Order number from the confirmation page, without the "Order " prefix.
    pub fn order_number(&self) -> Result<String, PageError> {
        let document = Html::parse_document(&self.body);
        let selector = Selector::parse(".os-order-number").expect("order number selector is valid");
        document
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .map(|text| text.trim().replace("Order ", ""))
            .find(|text| !text.is_empty())
            .ok_or(PageError::NotFound("order number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKOUT: &str = "https://shop.example.com/6269065/checkouts/b47d2e820ee2f10b267eca48abe743f0";

    fn at(url: &str) -> Page {
        Page::new(url, "")
    }

    #[test]
    fn test_url_markers_take_priority() {
        assert_eq!(at("https://kith.com/throttle/queue").step(), CheckoutStep::Queue);
        assert_eq!(
            at(&format!("{CHECKOUT}/thank_you")).step(),
            CheckoutStep::OrderConfirmation
        );
        assert_eq!(at("https://kith.com/checkpoint?x=1").step(), CheckoutStep::Checkpoint);
        assert_eq!(at("https://kith.com/challenge").step(), CheckoutStep::LoginChallenge);
        assert_eq!(at("https://kith.com/account/login").step(), CheckoutStep::Login);
        assert_eq!(at("https://kith.com/cart").step(), CheckoutStep::None);
    }

    #[test]
    fn test_checkout_markers() {
        assert_eq!(
            at(&format!("{CHECKOUT}/processing")).step(),
            CheckoutStep::Processing
        );
        let taxes = Page::new(CHECKOUT, "<p>Calculating taxes…</p>");
        assert_eq!(taxes.step(), CheckoutStep::CalculatingTaxes);
    }

    #[test]
    fn test_step_token_beats_query() {
        let page = Page::new(
            format!("{CHECKOUT}?step=contact_information"),
            r#"<script>Shopify.Checkout.step = "shipping_method";</script>"#,
        );
        assert_eq!(page.step(), CheckoutStep::ShippingMethod);
    }

    #[test]
    fn test_query_steps() {
        assert_eq!(at(CHECKOUT).step(), CheckoutStep::Contact);
        assert_eq!(
            at(&format!(
                "{CHECKOUT}?previous_step=contact_information&step=shipping_method"
            ))
            .step(),
            CheckoutStep::ShippingMethod
        );
        assert_eq!(
            at(&format!("{CHECKOUT}?previous_step=shipping_method&step=payment_method")).step(),
            CheckoutStep::PaymentMethod
        );
        assert_eq!(
            at(&format!("{CHECKOUT}?previous_step=payment_method&step=")).step(),
            CheckoutStep::PaymentMethod
        );
        assert_eq!(
            at(&format!("{CHECKOUT}?validate=true")).step(),
            CheckoutStep::PaymentMethod
        );
        assert_eq!(
            at(&format!("{CHECKOUT}?step=review")).step(),
            CheckoutStep::None
        );
    }

    #[test]
    fn test_classification_is_pure() {
        let page = Page::new(
            format!("{CHECKOUT}?step=payment_method"),
            r#"Shopify.Checkout.step = "payment_method";"#,
        );
        let again = page.clone();
        assert_eq!(page.step(), again.step());
        assert_eq!(page.step(), page.step());
    }

    #[test]
    fn test_authenticity_token() {
        let page = Page::new(
            CHECKOUT,
            r#"<input type="hidden" name="_method" value="patch" autocomplete="off" /><input type="hidden" name="authenticity_token" value="l9NDCVavRthdL3SDncpESnrrATdEdnk8" autocomplete="off" />"#,
        );
        assert_eq!(page.authenticity_token().unwrap(), "l9NDCVavRthdL3SDncpESnrrATdEdnk8");
        assert_eq!(
            at(CHECKOUT).authenticity_token(),
            Err(PageError::NotFound("authenticity token"))
        );
    }

    #[test]
    fn test_shipping_rate_and_price() {
        let page = Page::new(
            CHECKOUT,
            r#"<input class="input-radio" type="radio" value="shopify-Advanced%20Shipping%20Rules-1-12.05" name="checkout[shipping_rate][id]" />"#,
        );
        let rate = page.shipping_rate_id().unwrap();
        assert_eq!(rate, "shopify-Advanced%20Shipping%20Rules-1-12.05");
        assert_eq!(shipping_rate_price(&rate), Some(12.05));
        assert_eq!(shipping_rate_price("free"), None);
    }

    #[test]
    fn test_total_price_and_gateway() {
        let page = Page::new(
            CHECKOUT,
            r#"<span class="payment-due__price" data-checkout-payment-due-target="131739"></span><div data-select-gateway="26102467"></div>"#,
        );
        assert_eq!(page.total_price().unwrap(), "131739");
        assert_eq!(page.payment_gateway_id().unwrap(), 26102467);

        let legacy = Page::new(CHECKOUT, r#"<div id="payment_gateway_3919159"></div>"#);
        assert_eq!(legacy.payment_gateway_id().unwrap(), 3919159);
    }

    #[test]
    fn test_notice_text() {
        let page = Page::new(
            CHECKOUT,
            r#"<p class="notice__text">There was a problem processing the payment.</p>"#,
        );
        assert_eq!(page.notice().unwrap(), "There was a problem processing the payment.");
    }

    #[test]
    fn test_product_summary_fields() {
        let page = Page::new(
            CHECKOUT,
            concat!(
                r#"<span class="product__description__name order-summary__emphasis">New Balance M2002RMB</span>"#,
                r#"<span class="product__description__variant order-summary__small-text">11.5</span>"#,
                r#"<img alt="New Balance" class="product-thumbnail__image" src="//cdn.shopify.com/s/files/m2002rmb_small.webp?v=1" />"#,
            ),
        );
        assert_eq!(page.product_title().unwrap(), "New Balance M2002RMB");
        assert_eq!(page.product_size().unwrap(), "11.5");
        assert_eq!(
            page.product_image().unwrap(),
            "https://cdn.shopify.com/s/files/m2002rmb_small.webp?v=1"
        );
    }

    #[test]
    fn test_shop_id() {
        assert_eq!(at(CHECKOUT).shop_id().unwrap(), 6269065);
        assert!(at("https://kith.com/cart").shop_id().is_err());
    }

    #[test]
    fn test_order_number() {
        let page = Page::new(
            format!("{CHECKOUT}/thank_you"),
            "\t   \t<span class=\"os-order-number\">\n\t   Order #SP456201\n\t  </span>",
        );
        assert_eq!(page.order_number().unwrap(), "#SP456201");
        assert!(at(CHECKOUT).order_number().is_err());
    }
}
