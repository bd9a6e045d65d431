//! Browser automation.
//!
//! [`BrowserDriver`] and [`BrowserSession`] are the only code that talks to a
//! browser. [`SessionManager`] keeps one session alive for the whole process
//! and leases its page to one caller at a time.

mod chrome;
mod config;
mod driver;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use chrome::{ChromeDriver, ChromeSession};
pub use config::BrowserConfig;
pub use driver::{BrowserDriver, BrowserSession};
pub use session::{PageLease, SessionManager, SessionState};
