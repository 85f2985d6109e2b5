//! Terminal outcome classification after a payment attempt.

use dropcart::{CheckoutStep, Page};

/// Notice phrases that mean the card was declined.
const DECLINE_PHRASES: &[&str] = &[
    "issue processing",
    "problem processing",
    "declined",
    "insufficient",
];

/// How a payment attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Order confirmed.
    Success,
    /// Item sold out during checkout; keep trying.
    OutOfStock,
    /// The server total no longer matches what was submitted.
    PriceMismatch(String),
    /// The payment processor declined the card.
    Declined(String),
    /// Any other rejection.
    PaymentError(String),
}

impl CheckoutOutcome {
    /// Whether the task should stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CheckoutOutcome::OutOfStock)
    }

    /// Whether a checkout record is sent for this outcome.
    pub fn emits_record(&self) -> bool {
        !matches!(
            self,
            CheckoutOutcome::OutOfStock | CheckoutOutcome::PriceMismatch(_)
        )
    }

    /// The storefront's explanation, when there is one.
    pub fn notice(&self) -> Option<&str> {
        match self {
            CheckoutOutcome::PriceMismatch(notice)
            | CheckoutOutcome::Declined(notice)
            | CheckoutOutcome::PaymentError(notice) => Some(notice),
            CheckoutOutcome::Success | CheckoutOutcome::OutOfStock => None,
        }
    }
}

/// Classify the page reached after payment, if it is terminal.
pub fn evaluate(page: &Page) -> Option<CheckoutOutcome> {
    let step = page.step();
    if step == CheckoutStep::OrderConfirmation {
        return Some(CheckoutOutcome::Success);
    }
    if page.url.contains("stock_problems") {
        return Some(CheckoutOutcome::OutOfStock);
    }
    if step != CheckoutStep::PaymentMethod {
        return None;
    }

    let notice = page.notice().unwrap_or_else(|_| page.body.clone());
    let lowered = notice.to_lowercase();

    if lowered.contains("order total has changed") {
        return Some(CheckoutOutcome::PriceMismatch(notice));
    }
    if DECLINE_PHRASES.iter().any(|p| lowered.contains(p)) {
        return Some(CheckoutOutcome::Declined(notice));
    }
    // A plain payment page with nothing to report is not an outcome yet.
    if page.notice().is_err() && !is_rejection(&page.url) {
        return None;
    }
    Some(CheckoutOutcome::PaymentError(notice))
}

/// The storefront sent a payment submit back to the payment step.
fn is_rejection(url: &str) -> bool {
    url.contains("validate=") || url.contains("previous_step=payment_method")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKOUT: &str = "https://shop.example.com/6269065/checkouts/abc";

    fn rejected(notice: &str) -> Page {
        Page::new(
            format!("{CHECKOUT}?previous_step=payment_method&step="),
            format!(r#"<p class="notice__text">{notice}</p>"#),
        )
    }

    #[test]
    fn test_thank_you_is_success() {
        let page = Page::location(format!("{CHECKOUT}/thank_you"));
        assert_eq!(evaluate(&page), Some(CheckoutOutcome::Success));
    }

    #[test]
    fn test_insufficient_funds_is_declined() {
        let outcome = evaluate(&rejected("Your card was declined. Insufficient funds.")).unwrap();
        assert!(matches!(outcome, CheckoutOutcome::Declined(_)));
        assert!(outcome.is_fatal());
        assert!(outcome.emits_record());
    }

    #[test]
    fn test_problem_processing_is_declined() {
        let outcome = evaluate(&rejected(
            "There was a problem processing the payment. Try refreshing this page.",
        ));
        assert!(matches!(outcome, Some(CheckoutOutcome::Declined(_))));
    }

    #[test]
    fn test_price_change_is_fatal_without_record() {
        let outcome = evaluate(&rejected("Your order total has changed.")).unwrap();
        assert!(matches!(outcome, CheckoutOutcome::PriceMismatch(_)));
        assert!(outcome.is_fatal());
        assert!(!outcome.emits_record());
    }

    #[test]
    fn test_stock_problems_keep_running() {
        let page = Page::location(format!("{CHECKOUT}/stock_problems"));
        let outcome = evaluate(&page).unwrap();
        assert_eq!(outcome, CheckoutOutcome::OutOfStock);
        assert!(!outcome.is_fatal());
    }

    #[test]
    fn test_unknown_notice_is_payment_error() {
        let outcome = evaluate(&rejected("Please review your address.")).unwrap();
        assert_eq!(
            outcome,
            CheckoutOutcome::PaymentError("Please review your address.".into())
        );
    }

    #[test]
    fn test_validate_without_notice_uses_body() {
        let page = Page::new(format!("{CHECKOUT}?validate=true"), "Card number is invalid");
        assert_eq!(
            evaluate(&page),
            Some(CheckoutOutcome::PaymentError("Card number is invalid".into()))
        );
    }

    #[test]
    fn test_bounced_payment_without_notice_uses_body() {
        let page = Page::new(
            format!("{CHECKOUT}?previous_step=payment_method&step="),
            "<div>Something went wrong</div>",
        );
        let outcome = evaluate(&page).unwrap();
        assert_eq!(
            outcome,
            CheckoutOutcome::PaymentError("<div>Something went wrong</div>".into())
        );
        assert!(outcome.is_fatal());
        assert!(outcome.emits_record());
    }

    #[test]
    fn test_in_progress_pages_are_not_outcomes() {
        assert_eq!(evaluate(&Page::location(CHECKOUT)), None);
        assert_eq!(
            evaluate(&Page::location(format!("{CHECKOUT}?step=payment_method"))),
            None
        );
        assert_eq!(
            evaluate(&Page::location(format!(
                "{CHECKOUT}?previous_step=shipping_method&step=payment_method"
            ))),
            None
        );
        assert_eq!(evaluate(&Page::location(format!("{CHECKOUT}/processing"))), None);
    }
}
