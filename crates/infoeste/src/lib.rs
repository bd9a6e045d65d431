//! Browser-driven extraction of the Infoeste course and talk schedule.
//!
//! The pipeline is: [`browser::SessionManager`] keeps one browser alive,
//! [`page::CoursePage`] reveals the listing and snapshots it into
//! [`dom::ListingSnapshot`], [`validate`] and [`extract`] work on that
//! snapshot, and [`service::EventsService`] caches the result.

pub mod browser;
pub mod cache;
pub mod config;
pub mod dom;
pub mod error;
pub mod export;
pub mod extract;
pub mod page;
pub mod server;
pub mod service;
pub mod types;
pub mod validate;

pub use error::ScrapeError;
pub use service::EventsService;
pub use types::{Course, Event, ScrapedEvents, ValidationReport};
