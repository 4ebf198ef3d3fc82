//! Browser-backed [`InteractionProvider`](autofetch_session::InteractionProvider)
//! speaking the W3C WebDriver protocol.

pub mod chrome;
pub mod client;
pub mod error;
mod provider;

pub use chrome::ChromeOptions;
pub use client::{Locator, WireClient};
pub use error::DriverError;
pub use provider::{WebDriverConfig, WebDriverProvider, CONTAINER_SELECTORS, TRIGGER_SELECTORS};
