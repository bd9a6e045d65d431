//! Orchestrates a scrape: cache, page, validation, extraction.

use crate::browser::{BrowserDriver, SessionManager};
use crate::cache::{CacheStats, ResultCache, EVENTS_CACHE_KEY};
use crate::error::ScrapeError;
use crate::extract::extract_events;
use crate::page::{CoursePage, PageContract};
use crate::types::{Event, ScrapedEvents, ValidationReport};
use crate::validate::validate;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Serves the event listing, scraping it at most once per cache window.
pub struct EventsService<D: BrowserDriver> {
    session: Arc<SessionManager<D>>,
    contract: PageContract,
    cache: ResultCache<String, ScrapedEvents>,
    /// Collapses concurrent cache misses into one scrape. Holds the error of
    /// the last scrape, if it failed.
    scrape_lock: tokio::sync::Mutex<Option<ScrapeError>>,
    /// Number of finished scrapes; a caller that sees it change while queued
    /// on `scrape_lock` takes that scrape's outcome
    scrapes_finished: AtomicU64,
    validate_before_extract: bool,
}

impl<D: BrowserDriver> EventsService<D> {
    pub fn new(session: Arc<SessionManager<D>>, contract: PageContract, cache_ttl: Duration) -> Self {
        Self {
            session,
            contract,
            cache: ResultCache::new(cache_ttl),
            scrape_lock: tokio::sync::Mutex::new(None),
            scrapes_finished: AtomicU64::new(0),
            validate_before_extract: false,
        }
    }

    /// Runs the structure validator on every scrape and refuses to extract
    /// from a listing that fails it.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_before_extract = enabled;
        self
    }

    pub fn session(&self) -> &SessionManager<D> {
        &self.session
    }

    pub async fn get_events(&self) -> Result<Vec<Event>, ScrapeError> {
        Ok(self.get_events_snapshot().await?.events)
    }

    /// Like [`Self::get_events`], with the time the events were scraped.
    pub async fn get_events_snapshot(&self) -> Result<ScrapedEvents, ScrapeError> {
        let correlation_id = generate_correlation_id();

        if let Some(cached) = self.cache.get(EVENTS_CACHE_KEY) {
            info!(correlation_id = %correlation_id, "Returning cached events");
            return Ok(cached);
        }

        let seen = self.scrapes_finished.load(Ordering::Acquire);
        let mut last_failure = self.scrape_lock.lock().await;

        // Double-check cache after acquiring lock
        if let Some(cached) = self.cache.get(EVENTS_CACHE_KEY) {
            info!(
                correlation_id = %correlation_id,
                "Returning cached events (post-lock)"
            );
            return Ok(cached);
        }

        // The scrape we queued behind failed; don't repeat it right away
        if self.scrapes_finished.load(Ordering::Acquire) != seen {
            if let Some(e) = last_failure.as_ref() {
                info!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "Returning error of the scrape that just finished"
                );
                return Err(e.clone());
            }
        }

        info!(correlation_id = %correlation_id, url = %self.contract.url, "Scraping events");
        let start = Instant::now();
        let result = self.scrape(&correlation_id).await;

        match &result {
            Ok(scraped) => {
                self.cache
                    .set(EVENTS_CACHE_KEY.to_string(), scraped.clone());
                info!(
                    correlation_id = %correlation_id,
                    events = scraped.events.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Events scraped"
                );
            }
            Err(e) => {
                error!(
                    correlation_id = %correlation_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Scrape failed"
                );
            }
        }

        *last_failure = result.as_ref().err().cloned();
        self.scrapes_finished.fetch_add(1, Ordering::Release);
        result
    }

    /// Drops the cached events and scrapes again.
    pub async fn refresh_events(&self) -> Result<ScrapedEvents, ScrapeError> {
        info!("Manual refresh requested");
        self.invalidate_cache();
        self.get_events_snapshot().await
    }

    async fn scrape(&self, correlation_id: &str) -> Result<ScrapedEvents, ScrapeError> {
        let page = CoursePage::open(self.session.as_ref(), &self.contract).await?;
        page.prepare().await?;

        let Some(listing) = page.read_listing().await? else {
            return Err(ScrapeError::StructureInvalid {
                errors: validate(None).errors,
            });
        };

        if self.validate_before_extract {
            let report = validate(Some(&listing));
            if !report.is_valid {
                warn!(
                    correlation_id = %correlation_id,
                    violations = report.errors.len(),
                    "Listing failed validation; not extracting"
                );
                return Err(ScrapeError::StructureInvalid {
                    errors: report.errors,
                });
            }
        }

        let events = extract_events(&listing);
        if events.is_empty() {
            return Err(ScrapeError::ExtractionEmpty);
        }

        Ok(ScrapedEvents::now(events))
    }

    /// Checks the live listing against the expected structure.
    ///
    /// Nothing is extracted or cached. Session and navigation failures are
    /// errors; anything after the page has loaded becomes part of the report.
    pub async fn check_health(&self) -> Result<ValidationReport, ScrapeError> {
        let correlation_id = generate_correlation_id();
        info!(correlation_id = %correlation_id, "Running structure check");

        let page = CoursePage::open(self.session.as_ref(), &self.contract).await?;

        if let Err(e) = page.prepare().await {
            warn!(correlation_id = %correlation_id, error = %e, "Category selection failed");
            return Ok(ValidationReport::from_errors(vec![format!(
                "Category selection failed: {e}"
            )]));
        }

        let report = match page.read_listing().await {
            Ok(listing) => validate(listing.as_ref()),
            Err(e) => ValidationReport::aborted(e),
        };

        if report.is_valid {
            info!(correlation_id = %correlation_id, "Structure check passed");
        } else {
            warn!(
                correlation_id = %correlation_id,
                violations = report.errors.len(),
                "Structure check failed"
            );
        }
        Ok(report)
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate(EVENTS_CACHE_KEY);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Closes the browser. Further scrapes fail with `SessionUnavailable`.
    pub async fn shutdown(&self) {
        self.session.cleanup().await;
    }
}

/// Generates a unique correlation ID for request tracing.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}
