//! HTTP listeners: the settings page and the separate reboot page.
//!
//! Both are optional conveniences; a listener that cannot bind keeps
//! retrying in the background and never stops the displays.

mod listener;
mod reboot;
mod server;
pub mod templates;

pub use listener::{RetryPolicy, ServerHandle, ServerStatus, start_server, start_server_with_retry};
pub use reboot::reboot_router;
pub use server::ConfigServer;
