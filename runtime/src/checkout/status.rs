//! Task states and the status shown for each task.

use std::fmt;

use dropcart::StatusLevel;
use serde::{Deserialize, Serialize};

/// Where a checkout task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckoutState {
    Idle,
    Monitoring,
    AddingToCart,
    CreatingCheckout,
    Queue,
    LoadingCheckoutPage,
    SubmittingContact,
    FetchingShippingRate,
    SubmittingShippingRate,
    CalculatingTaxes,
    SubmittingPayment,
    Processing,
    Declined,
    OutOfStock,
    Success,
    Error,
    Stopped,
}

impl CheckoutState {
    /// States that end the task.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CheckoutState::Declined
                | CheckoutState::Success
                | CheckoutState::Error
                | CheckoutState::Stopped
        )
    }
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The latest status of a task. Each update replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: CheckoutState,
    pub message: String,
    pub level: StatusLevel,
}

impl TaskStatus {
    pub fn new(state: CheckoutState, message: impl Into<String>, level: StatusLevel) -> Self {
        Self {
            state,
            message: message.into(),
            level,
        }
    }

    pub fn idle() -> Self {
        Self::new(CheckoutState::Idle, "Idle", StatusLevel::Info)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::idle()
    }
}
