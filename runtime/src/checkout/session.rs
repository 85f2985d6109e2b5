//! The checkout driver loop.
//!
//! One [`CheckoutSession`] per running task. It owns every piece of
//! per-attempt state and is mutated only by its own loop. Each pass walks
//! the checkout from product monitoring to the terminal outcome, skipping
//! the steps the current page says are already done. Failures update the
//! status, back off, and restart the pass.

use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::Utc;
use dropcart::gateway::known_gateway;
use dropcart::{
    CheckoutRecord, CheckoutStep, Mode, Page, PageError, PollTypename, Product, QueueState,
    StatusLevel, Variant,
};

use super::outcome::{evaluate, CheckoutOutcome};
use super::status::CheckoutState;
use super::task::TaskShared;
use crate::error::{ResolveError, StepError};
use crate::events::DropcartEvent;
use crate::storefront::{HttpClient, ProductResolver};

type Pass = ControlFlow<()>;

/// Per-attempt checkout state plus the loop that drives it.
pub struct CheckoutSession {
    pub(crate) shared: Arc<TaskShared>,
    pub(crate) client: HttpClient,
    pub(crate) product: Option<Product>,
    pub(crate) variant: Option<Variant>,
    pub(crate) variant_in_cart: Option<u64>,
    pub(crate) checkout_url: Option<String>,
    pub(crate) current_page: Option<Page>,
    pub(crate) previous_page: Option<Page>,
    pub(crate) shipping_rate: Option<String>,
    pub(crate) queue: QueueState,
    pub(crate) submitted_contact: bool,
    fast_checkout_attempted: bool,
    /// Set once this pass has posted payment.
    payment_submitted: bool,
}

impl CheckoutSession {
    /// Build a session. Picks the next proxy from the task's list.
    pub(crate) fn new(shared: Arc<TaskShared>) -> Result<Self, reqwest::Error> {
        let proxy = shared.settings.proxy_list.as_ref().and_then(|list| list.next());
        match &proxy {
            Some(p) => tracing::info!(task = %shared.id, "Using Proxy: {p}"),
            None => tracing::info!(task = %shared.id, "Using Proxy: Localhost"),
        }

        let client = HttpClient::new(shared.options.timings.request_timeout(), proxy.as_ref())?;
        Ok(Self {
            shared,
            client,
            product: None,
            variant: None,
            variant_in_cart: None,
            checkout_url: None,
            current_page: None,
            previous_page: None,
            shipping_rate: None,
            queue: QueueState::default(),
            submitted_contact: false,
            fast_checkout_attempted: false,
            payment_submitted: false,
        })
    }

    /// Make `page` current, keeping the old one as previous.
    pub(crate) fn push_page(&mut self, page: Page) -> &Page {
        self.previous_page = self.current_page.take();
        self.current_page.insert(page)
    }

    fn step(&self) -> CheckoutStep {
        self.current_page
            .as_ref()
            .map(Page::step)
            .unwrap_or(CheckoutStep::None)
    }

    fn running(&self) -> bool {
        self.shared.is_running()
    }

    fn status(&self, state: CheckoutState, message: &str, level: StatusLevel) {
        self.shared.set_status(state, message, level);
    }

    fn mode(&self) -> Mode {
        self.shared.settings.mode
    }

    fn log_page(&self) {
        if let Some(page) = &self.current_page {
            tracing::debug!(task = %self.shared.id, "Redirected to: {}", page.url);
        }
    }

    /// Report a failed step and back off.
    async fn fail(&self, state: CheckoutState, what: &str, err: impl std::fmt::Display) -> Pass {
        tracing::debug!(task = %self.shared.id, "{what}: {err}");
        self.status(state, &format!("Error {what} ({err})"), StatusLevel::Error);
        self.shared.pause(self.shared.options.timings.retry_delay()).await;
        ControlFlow::Break(())
    }

    // ── Driver ────────────────────────────────────────────

    /// Drive the checkout until it finishes or the task is stopped.
    pub async fn run(mut self) {
        let settings = &self.shared.settings;
        self.shared.events.emit(DropcartEvent::TaskStarted {
            task: self.shared.id.clone(),
            site: settings.site.name.clone(),
            mode: settings.mode.to_string(),
        });

        while self.running() {
            let _ = self.pass().await;
        }

        self.reset();
        if !self.shared.status().state.is_terminal() {
            self.status(CheckoutState::Stopped, "Stopped", StatusLevel::Info);
        }
        tracing::info!(task = %self.shared.id, "Task Stopped");
        self.shared.events.emit(DropcartEvent::TaskStopped {
            task: self.shared.id.clone(),
        });
    }

    /// One walk through the checkout.
    async fn pass(&mut self) -> Pass {
        self.payment_submitted = false;
        self.flow_monitor().await?;
        self.flow_add_to_cart().await?;
        self.flow_create_checkout().await?;
        self.flow_queue().await?;

        match self.step() {
            CheckoutStep::Checkpoint => {
                return self.finish(
                    CheckoutState::Error,
                    "Waiting For Checkpoint Captcha (Not Supported)",
                    StatusLevel::Error,
                );
            }
            CheckoutStep::Login | CheckoutStep::LoginChallenge => {
                return self.finish(
                    CheckoutState::Error,
                    "Account Required (Not Supported)",
                    StatusLevel::Error,
                );
            }
            _ => {}
        }

        if self.checkout_url.is_none() {
            return self.flow_dead_end().await;
        }

        if self.mode() == Mode::Safe {
            self.flow_load_checkout_page().await?;
        }

        self.flow_submit_contact().await?;
        self.flow_fetch_shipping_rate().await?;

        let gateway = self
            .current_page
            .as_ref()
            .and_then(|p| p.shop_id().ok())
            .and_then(known_gateway);
        if self.mode() == Mode::Safe || gateway.is_none() {
            self.flow_submit_shipping_rate().await?;
        }

        self.flow_calculate_taxes().await?;
        self.flow_submit_payment(self.mode() == Mode::Fast && gateway.is_some())
            .await?;
        self.flow_process_order().await?;
        self.flow_outcome().await?;
        self.flow_retry().await
    }

    fn finish(&self, state: CheckoutState, message: &str, level: StatusLevel) -> Pass {
        self.status(state, message, level);
        self.shared.stop();
        ControlFlow::Break(())
    }

    fn guard(&self) -> Pass {
        if self.running() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }

    fn reset(&mut self) {
        self.product = None;
        self.variant = None;
        self.variant_in_cart = None;
        self.checkout_url = None;
        self.current_page = None;
        self.previous_page = None;
        self.shipping_rate = None;
        self.queue.clear();
        self.submitted_contact = false;
        self.fast_checkout_attempted = false;
        self.payment_submitted = false;
    }

    // ── Flows ─────────────────────────────────────────────

    async fn flow_monitor(&mut self) -> Pass {
        while self.variant.is_none() {
            self.guard()?;
            self.status(CheckoutState::Monitoring, "Monitoring", StatusLevel::Info);

            let settings = &self.shared.settings;
            let resolver = ProductResolver::new(&self.client, &settings.site);
            match resolver.resolve(&settings.inputs, &settings.sizes).await {
                Ok(resolved) => {
                    let title = resolved.product.as_ref().map(|p| p.title.as_str()).unwrap_or("");
                    tracing::info!(
                        task = %self.shared.id,
                        "Product Found: {} | {} ({})",
                        title,
                        resolved.variant.label(),
                        resolved.variant.id
                    );
                    self.product = resolved.product;
                    self.variant = Some(resolved.variant);
                }
                Err(ResolveError::NotFound) => {
                    self.status(CheckoutState::Monitoring, "Product Not Found", StatusLevel::Info);
                    self.shared.pause(self.shared.options.timings.not_found_delay()).await;
                }
                Err(e) => {
                    tracing::debug!(task = %self.shared.id, "Monitoring failed: {e}");
                    self.status(
                        CheckoutState::Monitoring,
                        &format!("Error Monitoring Product ({e})"),
                        StatusLevel::Error,
                    );
                    self.shared.pause(self.shared.options.timings.retry_delay()).await;
                }
            }
        }
        self.guard()
    }

    async fn flow_add_to_cart(&mut self) -> Pass {
        self.guard()?;
        let Some(variant) = self.variant.as_ref().map(|v| v.id) else {
            return ControlFlow::Break(());
        };
        if self.variant_in_cart == Some(variant) {
            return ControlFlow::Continue(());
        }

        if self.mode() == Mode::Fast
            && !self.fast_checkout_attempted
            && self.checkout_url.is_none()
            && self.current_page.is_none()
        {
            self.fast_checkout_attempted = true;
            self.status(
                CheckoutState::CreatingCheckout,
                "Creating Checkout (Fast)",
                StatusLevel::Info,
            );
            match self.create_checkout_fast(variant).await {
                Ok(_) => {
                    self.log_page();
                    if self.variant_in_cart == Some(variant) {
                        return ControlFlow::Continue(());
                    }
                }
                Err(e) => {
                    return self
                        .fail(CheckoutState::CreatingCheckout, "Creating Checkout - Fast", e)
                        .await
                }
            }
        }

        if let Some(previous) = self.variant_in_cart {
            tracing::info!(task = %self.shared.id, "Clearing {previous} from cart");
            if let Err(e) = self.clear_cart().await {
                return self.fail(CheckoutState::AddingToCart, "Clearing Cart", e).await;
            }
        }

        self.status(CheckoutState::AddingToCart, "Adding To Cart", StatusLevel::Info);
        match self.add_to_cart(variant).await {
            Ok(()) => {
                let title = self.product.as_ref().map(|p| p.title.as_str()).unwrap_or("");
                tracing::info!(task = %self.shared.id, "Item added to cart: {title} ({variant})");
                ControlFlow::Continue(())
            }
            Err(e) => self.fail(CheckoutState::AddingToCart, "Adding To Cart", e).await,
        }
    }

    async fn flow_create_checkout(&mut self) -> Pass {
        self.guard()?;
        if self.checkout_url.is_some() || self.current_page.is_some() {
            return ControlFlow::Continue(());
        }

        self.status(CheckoutState::CreatingCheckout, "Creating Checkout", StatusLevel::Info);
        match self.create_checkout().await {
            Ok(Some(url)) => {
                tracing::info!(task = %self.shared.id, "Checkout session created: {url}");
                ControlFlow::Continue(())
            }
            Ok(None) => {
                self.log_page();
                ControlFlow::Continue(())
            }
            Err(e) => self.fail(CheckoutState::CreatingCheckout, "Creating Checkout", e).await,
        }
    }

    async fn flow_queue(&mut self) -> Pass {
        while self.step() == CheckoutStep::Queue {
            self.guard()?;

            if let Some(wait) = self.queue.wait_time(Utc::now()) {
                self.shared.pause(wait).await;
                continue;
            }

            self.status(CheckoutState::Queue, "Polling Queue", StatusLevel::Info);
            let poll = match self.poll_queue().await {
                Ok(poll) => poll,
                Err(e) => {
                    tracing::debug!(task = %self.shared.id, "Queue poll failed: {e}");
                    self.shared.pause(self.shared.options.timings.retry_delay()).await;
                    continue;
                }
            };

            let kind = poll.kind();
            let eta = poll.queue_eta_seconds;
            self.queue.record(poll);

            match kind {
                PollTypename::Continue => {
                    tracing::info!(task = %self.shared.id, "Still In Queue | ETA: {eta:?}");
                    self.shared.pause(self.shared.options.timings.queue_poll_interval()).await;
                }
                PollTypename::Complete => {
                    tracing::info!(task = %self.shared.id, "Queue completed!");
                    let target = self
                        .previous_page
                        .as_ref()
                        .map(|p| p.url.clone())
                        .or_else(|| self.checkout_url.clone());

                    let Some(url) = target else {
                        self.current_page = None;
                        self.previous_page = None;
                        self.queue.clear();
                        return ControlFlow::Continue(());
                    };

                    self.guard()?;
                    self.status(
                        CheckoutState::LoadingCheckoutPage,
                        "Fetching Checkout Page",
                        StatusLevel::Info,
                    );
                    if let Err(e) = self.load_page(&url).await {
                        let _ = self
                            .fail(CheckoutState::LoadingCheckoutPage, "Fetching Checkout Page", e)
                            .await;
                        continue;
                    }
                    self.queue.clear();
                    self.log_page();
                }
                PollTypename::Unknown => {
                    tracing::warn!(task = %self.shared.id, "Unknown queue poll response");
                    self.shared.pause(self.shared.options.timings.queue_poll_interval()).await;
                }
            }
        }
        self.guard()
    }

    /// No checkout session: whatever page we hold is a dead end.
    async fn flow_dead_end(&mut self) -> Pass {
        if let Some(page) = self.current_page.take() {
            tracing::info!(task = %self.shared.id, "Dropping non-checkout page: {}", page.url);
        }
        self.previous_page = None;
        self.shared.pause(self.shared.options.timings.retry_delay()).await;
        ControlFlow::Break(())
    }

    async fn flow_load_checkout_page(&mut self) -> Pass {
        self.guard()?;
        self.status(
            CheckoutState::LoadingCheckoutPage,
            "Fetching Checkout Page",
            StatusLevel::Info,
        );
        match self.load_checkout_page().await {
            Ok(_) => {
                self.log_page();
                ControlFlow::Continue(())
            }
            Err(e) => {
                self.fail(CheckoutState::LoadingCheckoutPage, "Fetching Checkout Page", e)
                    .await
            }
        }
    }

    async fn flow_submit_contact(&mut self) -> Pass {
        self.guard()?;
        let force = self.mode() == Mode::Fast && !self.submitted_contact;
        if !force && self.step() != CheckoutStep::Contact {
            return ControlFlow::Continue(());
        }

        self.status(CheckoutState::SubmittingContact, "Submitting Contact Info", StatusLevel::Info);
        match self.submit_contact().await {
            Ok(_) => {
                self.submitted_contact = true;
                self.log_page();
                ControlFlow::Continue(())
            }
            Err(e) => {
                self.fail(CheckoutState::SubmittingContact, "Submitting Contact Info", e)
                    .await
            }
        }
    }

    async fn flow_fetch_shipping_rate(&mut self) -> Pass {
        if self.step() != CheckoutStep::ShippingMethod {
            return self.guard();
        }

        while self.shipping_rate.is_none() {
            self.guard()?;
            self.status(
                CheckoutState::FetchingShippingRate,
                "Fetching Shipping Rate",
                StatusLevel::Info,
            );
            match self.fetch_shipping_rate().await {
                Ok(rate) => {
                    tracing::info!(task = %self.shared.id, "Fetched shipping rate: {rate}");
                    self.shipping_rate = Some(rate);
                }
                Err(StepError::NoShippingRate) => {
                    self.status(
                        CheckoutState::FetchingShippingRate,
                        "No Shipping Rate Available",
                        StatusLevel::Info,
                    );
                    self.shared
                        .pause(self.shared.options.timings.shipping_poll_interval())
                        .await;
                }
                Err(e) => {
                    let _ = self
                        .fail(CheckoutState::FetchingShippingRate, "Fetching Shipping Rate", e)
                        .await;
                }
            }
        }
        self.guard()
    }

    async fn flow_submit_shipping_rate(&mut self) -> Pass {
        self.guard()?;
        if self.step() != CheckoutStep::ShippingMethod {
            return ControlFlow::Continue(());
        }
        let Some(rate) = self.shipping_rate.clone() else {
            return ControlFlow::Continue(());
        };

        self.status(
            CheckoutState::SubmittingShippingRate,
            "Submitting Shipping Rate",
            StatusLevel::Info,
        );
        match self.submit_shipping_rate(&rate).await {
            Ok(_) => {
                self.log_page();
                ControlFlow::Continue(())
            }
            Err(e) => {
                self.fail(CheckoutState::SubmittingShippingRate, "Submitting Shipping Rate", e)
                    .await
            }
        }
    }

    async fn flow_calculate_taxes(&mut self) -> Pass {
        while self.step() == CheckoutStep::CalculatingTaxes {
            self.guard()?;
            self.status(CheckoutState::CalculatingTaxes, "Calculating Taxes", StatusLevel::Info);
            match self.calculate_taxes().await {
                Ok(true) => {
                    tracing::info!(task = %self.shared.id, "Finished calculating taxes!");
                    self.log_page();
                }
                Ok(false) => {
                    tracing::debug!(task = %self.shared.id, "Still calculating taxes");
                    self.shared.pause(self.shared.options.timings.tax_poll_interval()).await;
                }
                Err(e) => {
                    let _ = self
                        .fail(CheckoutState::CalculatingTaxes, "Calculating Taxes", e)
                        .await;
                }
            }
        }
        self.guard()
    }

    async fn flow_submit_payment(&mut self, fast: bool) -> Pass {
        self.guard()?;
        if fast {
            if self.shipping_rate.is_none() {
                return ControlFlow::Continue(());
            }
        } else if self.step() != CheckoutStep::PaymentMethod {
            return ControlFlow::Continue(());
        }

        self.status(CheckoutState::SubmittingPayment, "Fetching Payment Token", StatusLevel::Info);
        let session_id = match self.payment_session().await {
            Ok(id) => id,
            Err(e) => {
                return self
                    .fail(CheckoutState::SubmittingPayment, "Fetching Payment Token", e)
                    .await
            }
        };

        self.guard()?;
        self.status(CheckoutState::SubmittingPayment, "Submitting Payment", StatusLevel::Info);
        match self.submit_payment(fast, &session_id).await {
            Ok(_) => {
                self.payment_submitted = true;
                self.log_page();
                ControlFlow::Continue(())
            }
            Err(e) => {
                self.fail(CheckoutState::SubmittingPayment, "Submitting Payment", e)
                    .await
            }
        }
    }

    async fn flow_process_order(&mut self) -> Pass {
        while self.step() == CheckoutStep::Processing {
            self.guard()?;
            self.status(CheckoutState::Processing, "Processing Order", StatusLevel::Important);
            match self.poll_processing().await {
                Ok(page) => {
                    if page.step() == CheckoutStep::Processing {
                        self.shared
                            .pause(self.shared.options.timings.processing_poll_interval())
                            .await;
                    } else {
                        self.log_page();
                    }
                }
                Err(e) => {
                    let _ = self
                        .fail(CheckoutState::Processing, "Processing Order", e)
                        .await;
                }
            }
        }
        self.guard()
    }

    async fn flow_outcome(&mut self) -> Pass {
        let Some(page) = self.current_page.as_ref() else {
            return ControlFlow::Continue(());
        };
        let outcome = match evaluate(page) {
            Some(outcome) => outcome,
            // Payment went back to the payment step with nothing to show.
            None if self.payment_submitted && page.step() == CheckoutStep::PaymentMethod => {
                CheckoutOutcome::PaymentError(page.body.clone())
            }
            None => return ControlFlow::Continue(()),
        };

        if outcome.emits_record() {
            self.report(&outcome).await;
        }

        let (state, message, level) = match &outcome {
            CheckoutOutcome::Success => (CheckoutState::Success, "Checked Out!", StatusLevel::Success),
            CheckoutOutcome::OutOfStock => (
                CheckoutState::OutOfStock,
                "Payment Failed - Out of Stock",
                StatusLevel::Info,
            ),
            CheckoutOutcome::PriceMismatch(_) => (
                CheckoutState::Error,
                "Payment Failed - Incorrect Order Total",
                StatusLevel::Error,
            ),
            CheckoutOutcome::Declined(notice) => {
                tracing::info!(task = %self.shared.id, "Payment Declined - {notice}");
                (CheckoutState::Declined, "Payment Declined", StatusLevel::Error)
            }
            CheckoutOutcome::PaymentError(notice) => {
                tracing::info!(task = %self.shared.id, "Payment Error - {notice}");
                (CheckoutState::Error, "Payment Error", StatusLevel::Error)
            }
        };

        if outcome.is_fatal() {
            return self.finish(state, message, level);
        }
        self.status(state, message, level);
        self.shared.pause(self.shared.options.timings.retry_delay()).await;
        ControlFlow::Break(())
    }

    /// The pass ended short of an outcome. Back off, and reload a checkout
    /// page we cannot place.
    async fn flow_retry(&mut self) -> Pass {
        self.guard()?;
        let step = self.step();
        tracing::debug!(task = %self.shared.id, ?step, "Checkout pass ended without an outcome");
        self.shared.pause(self.shared.options.timings.retry_delay()).await;
        if self.current_page.is_none() || step != CheckoutStep::None {
            return self.guard();
        }

        self.guard()?;
        tracing::debug!(task = %self.shared.id, "Unrecognized checkout step, reloading");
        if let Err(e) = self.load_checkout_page().await {
            tracing::debug!(task = %self.shared.id, "Reload failed: {e}");
        }
        ControlFlow::Continue(())
    }

    // ── Reporting ─────────────────────────────────────────

    /// Outcome record for the current page.
    pub(crate) fn record(&self, outcome: &CheckoutOutcome) -> CheckoutRecord {
        let success = *outcome == CheckoutOutcome::Success;
        let settings = &self.shared.settings;
        let page = self.current_page.as_ref();
        let field = |extract: fn(&Page) -> Result<String, PageError>| {
            page.and_then(|p| extract(p).ok())
                .unwrap_or_else(|| "None".to_string())
        };

        let (failure_reason, order_number, order_link) = if success {
            (
                "None".to_string(),
                field(Page::order_number),
                page.map(|p| p.url.clone()).unwrap_or_default(),
            )
        } else {
            (
                outcome.notice().map(str::to_string).unwrap_or_else(|| field(Page::notice)),
                "None".to_string(),
                String::new(),
            )
        };

        CheckoutRecord {
            success,
            failure_reason,
            site: settings.site.name.clone(),
            mode: settings.mode.to_string(),
            product_title: field(Page::product_title),
            product_size: field(Page::product_size),
            product_image: field(Page::product_image),
            profile_name: settings.profile.name.clone(),
            proxy_list_name: settings
                .proxy_list
                .as_ref()
                .map(|l| l.name().to_string())
                .unwrap_or_else(|| "None".to_string()),
            email: settings.profile.shipping.email.clone(),
            order_number,
            order_link,
            quantity: settings.quantity.to_string(),
        }
    }

    async fn report(&self, outcome: &CheckoutOutcome) {
        let record = self.record(outcome);
        self.shared.notifier.checkout_finished(&record).await;
        self.shared.events.emit(DropcartEvent::CheckoutFinished {
            task: self.shared.id.clone(),
            record,
        });
    }
}
