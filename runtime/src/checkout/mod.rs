//! Checkout tasks: the driver loop, its HTTP steps and outcome handling.

pub mod forms;
pub mod outcome;
mod requests;
pub mod session;
pub mod status;
pub mod task;

pub use outcome::{evaluate, CheckoutOutcome};
pub use session::CheckoutSession;
pub use status::{CheckoutState, TaskStatus};
pub use task::{CheckoutOptions, CheckoutTask, TaskSettings};
