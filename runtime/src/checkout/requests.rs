//! Storefront requests for each checkout step.
//!
//! Every method performs one storefront call, updates the session's page
//! and cart state on success and returns a [`StepError`] otherwise. None
//! of them sleep or retry; that is the driver loop's job.

use dropcart::gateway::resolve_gateway;
use dropcart::queue::{poll_request_body, QUEUE_TOKEN_COOKIE};
use dropcart::{CheckoutStep, Page, PollResponse, QueuePoll};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::forms::{contact_form, payment_form, shipping_form, total_payment_price, PaymentDetails};
use super::session::CheckoutSession;
use crate::error::{StepError, StepResult};
use crate::storefront::{HttpResponse, ACCEPT_HTML, ACCEPT_JSON};

#[derive(Deserialize)]
struct CartLine {
    variant_id: u64,
    #[serde(default)]
    product_id: u64,
    #[serde(default)]
    product_title: String,
    #[serde(default)]
    handle: String,
}

#[derive(Deserialize)]
struct CartSummary {
    #[serde(default)]
    item_count: u32,
}

#[derive(Deserialize)]
struct DepositSession {
    id: String,
}

fn ensure(resp: &HttpResponse, operation: &'static str) -> StepResult<()> {
    if resp.is_success() {
        Ok(())
    } else {
        Err(StepError::Status {
            operation,
            status: resp.status,
        })
    }
}

/// `url` without query or fragment.
fn strip_query(mut url: Url) -> String {
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

impl CheckoutSession {
    fn checkout(&self) -> StepResult<String> {
        self.checkout_url.clone().ok_or(StepError::NoCheckout)
    }

    /// GET a page and make it current.
    pub(crate) async fn load_page(&mut self, url: &str) -> StepResult<&Page> {
        let resp = self.client.get(url, ACCEPT_HTML).await?;
        ensure(&resp, "get checkout page")?;
        Ok(self.push_page(resp.page()))
    }

    pub(crate) async fn load_checkout_page(&mut self) -> StepResult<&Page> {
        let checkout = self.checkout()?;
        self.load_page(&checkout).await
    }

    // ── Cart ──────────────────────────────────────────────

    pub(crate) async fn add_to_cart(&mut self, variant: u64) -> StepResult<()> {
        let site = &self.shared.settings.site;
        let form = [
            ("form_type".to_string(), "product".to_string()),
            ("utf8".to_string(), "✓".to_string()),
            ("id".to_string(), variant.to_string()),
            ("quantity".to_string(), self.shared.settings.quantity.to_string()),
        ];
        let referer = site.endpoint("/collections/all");
        let resp = self
            .client
            .post_form(&site.endpoint("/cart/add.js"), &form, ACCEPT_JSON, Some(&referer))
            .await?;
        ensure(&resp, "add to cart")?;

        let line: CartLine = serde_json::from_str(&resp.body)?;
        if line.variant_id != variant {
            return Err(StepError::Unexpected(format!(
                "variant {variant} was not added to the cart"
            )));
        }

        let product = self.product.get_or_insert_with(Default::default);
        if product.id == 0 {
            product.id = line.product_id;
            product.title = line.product_title;
            product.handle = line.handle;
        }
        self.variant_in_cart = Some(variant);
        Ok(())
    }

    pub(crate) async fn clear_cart(&mut self) -> StepResult<()> {
        let site = &self.shared.settings.site;
        let resp = self
            .client
            .post_form(&site.endpoint("/cart/clear.js"), &[], ACCEPT_JSON, Some(site.base()))
            .await?;
        ensure(&resp, "clear cart")?;

        let summary: CartSummary = serde_json::from_str(&resp.body)?;
        if summary.item_count != 0 {
            return Err(StepError::Unexpected(format!(
                "expected 0 items in cart but got {}",
                summary.item_count
            )));
        }
        self.variant_in_cart = None;
        Ok(())
    }

    // ── Checkout creation ─────────────────────────────────

    /// Start a checkout from the cart. Returns the checkout location when
    /// the storefront hands one out directly.
    pub(crate) async fn create_checkout(&mut self) -> StepResult<Option<String>> {
        let url = self.shared.settings.site.endpoint("/checkout");
        let resp = self.client.get_no_redirect(&url).await?;
        ensure(&resp, "create checkout")?;

        let location = resp.resolved_location().ok_or(StepError::MissingLocation)?;
        if location.as_str().contains("/checkouts/") {
            self.checkout_url = Some(strip_query(location));
        } else {
            // Queue, login or another interstitial.
            self.current_page = Some(Page::location(location.to_string()));
        }
        Ok(self.checkout_url.clone())
    }

    /// Cart permalink: add to cart and start a checkout in one request.
    pub(crate) async fn create_checkout_fast(
        &mut self,
        variant: u64,
    ) -> StepResult<Option<String>> {
        let settings = &self.shared.settings;
        let url = settings
            .site
            .endpoint(&format!("/cart/{variant}:{}", settings.quantity));
        let resp = self.client.get(&url, ACCEPT_HTML).await?;
        ensure(&resp, "create checkout fast")?;

        let page = resp.page();
        let landed = Url::parse(&page.url)?;
        if landed.as_str().contains("/checkouts/") {
            self.checkout_url = Some(strip_query(landed.clone()));
        }
        // An invalid variant redirects to the empty cart.
        if !landed.path().contains("/cart") {
            self.variant_in_cart = Some(variant);
        }
        self.push_page(page);
        Ok(self.checkout_url.clone())
    }

    // ── Checkout steps ────────────────────────────────────

    pub(crate) async fn submit_contact(&mut self) -> StepResult<&Page> {
        let checkout = self.checkout()?;
        let form = contact_form(self.current_page.as_ref(), &self.shared.settings.profile);
        let resp = self
            .client
            .post_form(&checkout, form.pairs(), ACCEPT_HTML, Some(&checkout))
            .await?;
        ensure(&resp, "submit contact info")?;
        Ok(self.push_page(resp.page()))
    }

    pub(crate) async fn fetch_shipping_rate(&mut self) -> StepResult<String> {
        let checkout = self.checkout()?;
        let url = format!("{checkout}/shipping_rates?step=shipping_method");
        let resp = self.client.get(&url, "*/*").await?;
        ensure(&resp, "fetch shipping rate")?;

        resp.page()
            .shipping_rate_id()
            .map_err(|_| StepError::NoShippingRate)
    }

    pub(crate) async fn submit_shipping_rate(&mut self, rate: &str) -> StepResult<&Page> {
        let checkout = self.checkout()?;
        let form = shipping_form(self.current_page.as_ref(), rate);
        let referer = format!("{checkout}?previous_step=contact_information&step=shipping_method");
        let resp = self
            .client
            .post_form(&checkout, form.pairs(), ACCEPT_HTML, Some(&referer))
            .await?;
        ensure(&resp, "submit shipping rate")?;
        Ok(self.push_page(resp.page()))
    }

    /// Reload the payment step. `true` once taxes are done.
    pub(crate) async fn calculate_taxes(&mut self) -> StepResult<bool> {
        let checkout = self.checkout()?;
        let url = format!("{checkout}?previous_step=shipping_method&step=payment_method");
        let page = self.load_page(&url).await?;
        Ok(page.step() != CheckoutStep::CalculatingTaxes)
    }

    // ── Payment ───────────────────────────────────────────

    /// Tokenize the card and return the payment session id.
    pub(crate) async fn payment_session(&self) -> StepResult<String> {
        let settings = &self.shared.settings;
        let card = &settings.profile.card;
        let body = json!({
            "credit_card": {
                "number": card.number,
                "name": settings.profile.billing_address().name,
                "month": card.expiry_month,
                "year": card.expiry_year,
                "verification_value": card.cvv,
            },
            "payment_session_scope": settings.site.host_name(),
        });

        let resp = self
            .client
            .post_json(&self.shared.options.deposit_url, &body, None)
            .await?;
        ensure(&resp, "fetch payment token")?;

        let session: DepositSession = serde_json::from_str(&resp.body)?;
        Ok(session.id)
    }

    /// Submit payment. The fast path also carries the shipping rate.
    pub(crate) async fn submit_payment(
        &mut self,
        fast: bool,
        session_id: &str,
    ) -> StepResult<&Page> {
        let checkout = self.checkout()?;
        let page = self.current_page.as_ref();
        let rate = self.shipping_rate.as_deref();
        let form = payment_form(&PaymentDetails {
            page,
            profile: &self.shared.settings.profile,
            session_id,
            gateway: page.and_then(resolve_gateway),
            shipping_rate: if fast { rate } else { None },
            total_price: total_payment_price(page, rate, &self.shared.settings.site.url),
        });

        let resp = self
            .client
            .post_form(&checkout, form.pairs(), ACCEPT_HTML, Some(&checkout))
            .await?;
        ensure(&resp, "submit payment")?;
        Ok(self.push_page(resp.page()))
    }

    pub(crate) async fn poll_processing(&mut self) -> StepResult<&Page> {
        let checkout = self.checkout()?;
        let url = format!("{checkout}/processing?from_processing_page=1");
        self.load_page(&url).await
    }

    // ── Queue ─────────────────────────────────────────────

    /// Poll the checkout queue. The refreshed token is written back to
    /// the queue cookie.
    pub(crate) async fn poll_queue(&mut self) -> StepResult<QueuePoll> {
        let site = &self.shared.settings.site;
        let base = Url::parse(site.base())?;
        let token = self
            .client
            .cookie(&base, QUEUE_TOKEN_COOKIE)
            .ok_or(StepError::MissingQueueToken)?;

        let resp = self
            .client
            .post_json(&site.endpoint("/queue/poll"), &poll_request_body(&token), Some(site.base()))
            .await?;
        ensure(&resp, "poll queue")?;

        let poll = serde_json::from_str::<PollResponse>(&resp.body)?
            .into_poll()
            .ok_or_else(|| StepError::Unexpected("empty queue poll response".to_string()))?;
        if let Some(token) = poll.token.as_deref().filter(|t| !t.is_empty()) {
            self.client.set_cookie(&base, QUEUE_TOKEN_COOKIE, token);
        }
        Ok(poll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_query() {
        let url = Url::parse("https://kith.com/1/checkouts/abc?key=1#top").unwrap();
        assert_eq!(strip_query(url), "https://kith.com/1/checkouts/abc");
    }

    #[test]
    fn test_ensure_status() {
        let resp = |status| HttpResponse {
            url: String::new(),
            final_url: String::new(),
            status,
            location: None,
            body: String::new(),
        };
        assert!(ensure(&resp(302), "create checkout").is_ok());
        let err = ensure(&resp(422), "add to cart").unwrap_err();
        assert_eq!(err.to_string(), "add to cart failed (422)");
    }
}
