//! HTTP client for the Flame API and the dashboard state it drives.

pub mod api;
pub mod dashboard;

pub use api::ApiClient;
pub use dashboard::{Dashboard, Notification};
