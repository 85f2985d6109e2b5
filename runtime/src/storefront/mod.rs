//! Storefront access: the per-task HTTP client and product resolution.

pub mod http_client;
pub mod resolver;

pub use http_client::{HttpClient, HttpResponse, ACCEPT_HTML, ACCEPT_JSON};
pub use resolver::{ProductResolver, Resolved};
