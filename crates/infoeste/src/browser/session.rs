//! Lifecycle of the single long-lived browser session.
//!
//! ```text
//! Uninitialized -> Initializing -> Ready -> Closing -> Closed
//!        ^              |
//!        +--- failure --+
//! ```
//!
//! Concurrent start-ups collapse into one launch. Callers that lose the race
//! wait on a watch channel, bounded by `startup_wait_timeout`, and receive the
//! winner's error if the launch fails.
//!
//! A session whose browser connection drops goes back to `Uninitialized`,
//! so the next caller launches a fresh one.

use super::config::BrowserConfig;
use super::driver::{BrowserDriver, BrowserSession};
use crate::error::ScrapeError;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Extra time given to a blocking browser call beyond its own timeout, so the
/// browser's error is reported rather than ours.
const BLOCKING_GRACE: Duration = Duration::from_secs(2);

/// Start-up result broadcast to waiting callers; `None` while in flight.
type StartupOutcome = Option<Result<(), ScrapeError>>;

enum Phase<S> {
    Uninitialized,
    Initializing(watch::Receiver<StartupOutcome>),
    Ready(Arc<S>),
    Closing,
    Closed,
}

/// Observable lifecycle state of a [`SessionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Closing,
    Closed,
}

/// Owns exactly one browser session and its page.
pub struct SessionManager<D: BrowserDriver> {
    driver: Arc<D>,
    config: BrowserConfig,
    phase: Mutex<Phase<D::Session>>,
    /// Last URL navigated to successfully; a repeat visit reloads instead
    last_url: Mutex<Option<String>>,
    /// Serializes use of the single page
    page: tokio::sync::Mutex<()>,
}

/// Exclusive access to the live page, held while a caller drives it.
pub struct PageLease<'a, D: BrowserDriver> {
    manager: &'a SessionManager<D>,
    session: Arc<D::Session>,
    _guard: tokio::sync::MutexGuard<'a, ()>,
}

enum Step<'a, D: BrowserDriver> {
    Launch(StartupTicket<'a, D>),
    Wait(watch::Receiver<StartupOutcome>),
}

/// Held by the caller performing start-up. If that caller is dropped before
/// finishing, the manager falls back to `Uninitialized` and the closed
/// channel wakes waiters so one of them can retry.
struct StartupTicket<'a, D: BrowserDriver> {
    manager: &'a SessionManager<D>,
    tx: Option<watch::Sender<StartupOutcome>>,
}

impl<D: BrowserDriver> StartupTicket<'_, D> {
    fn notify(mut self, outcome: Result<(), ScrapeError>) {
        if let Some(tx) = self.tx.take() {
            // No receivers left is fine
            let _ = tx.send(Some(outcome));
        }
    }
}

impl<D: BrowserDriver> Drop for StartupTicket<'_, D> {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            warn!("Browser start-up abandoned before completion");
            let mut phase = self.manager.lock_phase();
            if matches!(*phase, Phase::Initializing(_)) {
                *phase = Phase::Uninitialized;
            }
        }
    }
}

impl<D: BrowserDriver> SessionManager<D> {
    pub fn new(driver: D, config: BrowserConfig) -> Self {
        Self {
            driver: Arc::new(driver),
            config,
            phase: Mutex::new(Phase::Uninitialized),
            last_url: Mutex::new(None),
            page: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase<D::Session>> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_last_url(&self) -> MutexGuard<'_, Option<String>> {
        self.last_url.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        match *self.lock_phase() {
            Phase::Uninitialized => SessionState::Uninitialized,
            Phase::Initializing(_) => SessionState::Initializing,
            Phase::Ready(_) => SessionState::Ready,
            Phase::Closing => SessionState::Closing,
            Phase::Closed => SessionState::Closed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Returns the live session, starting it if needed.
    ///
    /// Only one caller launches the browser; the others wait for its outcome.
    pub async fn ensure_ready(&self) -> Result<Arc<D::Session>, ScrapeError> {
        loop {
            let step = {
                let mut phase = self.lock_phase();
                match &*phase {
                    Phase::Ready(session) => return Ok(Arc::clone(session)),
                    Phase::Closing | Phase::Closed => return Err(shut_down()),
                    Phase::Initializing(rx) => Step::Wait(rx.clone()),
                    Phase::Uninitialized => {
                        let (tx, rx) = watch::channel(None);
                        *phase = Phase::Initializing(rx);
                        Step::Launch(StartupTicket {
                            manager: self,
                            tx: Some(tx),
                        })
                    }
                }
            };

            match step {
                Step::Launch(ticket) => return self.start(ticket).await,
                Step::Wait(rx) => self.wait_for_startup(rx).await?,
            }
        }
    }

    async fn wait_for_startup(
        &self,
        mut rx: watch::Receiver<StartupOutcome>,
    ) -> Result<(), ScrapeError> {
        debug!("Browser start-up in progress, waiting");
        let timeout = self.config.startup_wait_timeout;

        let outcome = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Err(_) => {
                return Err(ScrapeError::SessionUnavailable {
                    message: format!(
                        "Timed out after {:.1}s waiting for browser start-up",
                        timeout.as_secs_f64()
                    ),
                })
            }
            // Winner went away; the caller loops and may become the new winner
            Ok(Err(_)) => None,
            Ok(Ok(outcome)) => outcome.clone(),
        };

        match outcome {
            Some(Err(e)) => Err(e),
            _ => Ok(()),
        }
    }

    async fn start(&self, ticket: StartupTicket<'_, D>) -> Result<Arc<D::Session>, ScrapeError> {
        info!("Starting browser session");
        let started = Instant::now();

        let driver = Arc::clone(&self.driver);
        let config = self.config.clone();
        let launch = tokio::task::spawn_blocking(move || driver.launch(&config));

        // A launch that outlives the timeout finishes in the background and its
        // session is dropped with the detached task
        let launched = match tokio::time::timeout(self.config.launch_timeout, launch).await {
            Err(_) => Err(ScrapeError::SessionUnavailable {
                message: format!(
                    "Browser launch timed out after {:.1}s",
                    self.config.launch_timeout.as_secs_f64()
                ),
            }),
            Ok(Err(join_error)) => Err(ScrapeError::SessionUnavailable {
                message: format!("Browser launch task failed: {join_error}"),
            }),
            Ok(Ok(result)) => result,
        };

        let result = match launched {
            Ok(session) => {
                let session = Arc::new(session);
                if self.install(&session) {
                    info!(
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Browser session ready"
                    );
                    Ok(session)
                } else {
                    warn!("Browser started after shutdown began; closing it");
                    self.close_session(session).await;
                    Err(shut_down())
                }
            }
            Err(e) => {
                error!(error = %e, "Browser start-up failed");
                let mut phase = self.lock_phase();
                if matches!(*phase, Phase::Initializing(_)) {
                    *phase = Phase::Uninitialized;
                }
                Err(e)
            }
        };

        ticket.notify(result.as_ref().map(|_| ()).map_err(Clone::clone));
        result
    }

    /// Moves `Initializing` to `Ready`. False if shutdown started meanwhile.
    fn install(&self, session: &Arc<D::Session>) -> bool {
        let mut phase = self.lock_phase();
        if matches!(*phase, Phase::Initializing(_)) {
            *phase = Phase::Ready(Arc::clone(session));
            true
        } else {
            false
        }
    }

    fn forget_url(&self) {
        self.lock_last_url().take();
    }

    /// Opens `url` on the page and returns exclusive access to it.
    ///
    /// A repeat of the last successful URL reloads the page instead, which
    /// also resets the upstream page's client-side selection state.
    pub async fn navigate_to(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<PageLease<'_, D>, ScrapeError> {
        let session = self.ensure_ready().await?;
        let guard = self.page.lock().await;

        let reload = self.lock_last_url().as_deref() == Some(url);
        let result = if reload {
            debug!(url, "Revisiting last URL, reloading");
            run_blocking(&session, "reloading page", timeout, move |s| {
                s.reload(timeout)
            })
            .await
        } else {
            info!(url, "Navigating");
            let target = url.to_string();
            run_blocking(&session, "navigating", timeout, move |s| {
                s.navigate(&target, timeout)
            })
            .await
        };

        match self.check_connection(&session, result).await {
            Ok(()) => {
                *self.lock_last_url() = Some(url.to_string());
                Ok(PageLease {
                    manager: self,
                    session,
                    _guard: guard,
                })
            }
            Err(e) => {
                // Next attempt starts from a fresh navigation
                self.forget_url();
                warn!(url, error = %e, "Navigation failed");
                Err(e)
            }
        }
    }

    /// Passes `result` through, discarding `session` first when it reports
    /// that the browser is gone.
    async fn check_connection<T>(
        &self,
        session: &Arc<D::Session>,
        result: Result<T, ScrapeError>,
    ) -> Result<T, ScrapeError> {
        if let Err(ScrapeError::SessionUnavailable { .. }) = &result {
            self.discard(session).await;
        }
        result
    }

    /// Drops `session` if it is still the live one and closes it.
    async fn discard(&self, session: &Arc<D::Session>) {
        let live = {
            let mut phase = self.lock_phase();
            let live = matches!(&*phase, Phase::Ready(current) if Arc::ptr_eq(current, session));
            if live {
                *phase = Phase::Uninitialized;
            }
            live
        };

        if live {
            warn!("Browser session lost; the next request starts a new one");
            self.forget_url();
            self.close_session(Arc::clone(session)).await;
        }
    }

    /// Closes the page and then the browser.
    ///
    /// Runs once; later calls return immediately. Close failures are logged,
    /// and a close that exceeds `close_timeout` is abandoned.
    pub async fn cleanup(&self) {
        let session = {
            let mut phase = self.lock_phase();
            match std::mem::replace(&mut *phase, Phase::Closing) {
                Phase::Closing => return,
                Phase::Closed => {
                    *phase = Phase::Closed;
                    debug!("Browser session already closed");
                    return;
                }
                Phase::Ready(session) => Some(session),
                Phase::Uninitialized | Phase::Initializing(_) => None,
            }
        };

        info!("Closing browser session");
        if let Some(session) = session {
            self.close_session(session).await;
        }

        self.forget_url();
        *self.lock_phase() = Phase::Closed;
        info!("Browser session closed");
    }

    async fn close_session(&self, session: Arc<D::Session>) {
        let close = tokio::task::spawn_blocking(move || {
            if let Err(e) = session.close_page() {
                warn!(error = %e, "Failed to close page");
            }
            if let Err(e) = session.close() {
                warn!(error = %e, "Failed to close browser");
            }
        });

        match tokio::time::timeout(self.config.close_timeout, close).await {
            Err(_) => warn!(
                timeout_secs = self.config.close_timeout.as_secs_f64(),
                "Browser close timed out; abandoning it"
            ),
            Ok(Err(join_error)) => warn!(error = %join_error, "Browser close task failed"),
            Ok(Ok(())) => {}
        }
    }
}

impl<D: BrowserDriver> PageLease<'_, D> {
    /// Evaluates a script in the page.
    pub async fn evaluate(
        &self,
        script: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, ScrapeError> {
        let script = script.to_string();
        let result = run_blocking(&self.session, "evaluating script", timeout, move |s| {
            s.evaluate(&script)
        })
        .await;
        self.manager.check_connection(&self.session, result).await
    }

    /// Evaluates a script that returns a JSON string and decodes it.
    pub async fn evaluate_json<T: DeserializeOwned>(
        &self,
        script: &str,
        timeout: Duration,
    ) -> Result<T, ScrapeError> {
        match self.evaluate(script, timeout).await? {
            serde_json::Value::String(raw) => Ok(serde_json::from_str(&raw)?),
            other => Err(ScrapeError::Script {
                message: format!("Expected a JSON string from the page, got {other}"),
            }),
        }
    }

    pub async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), ScrapeError> {
        let target = selector.to_string();
        let result = run_blocking(&self.session, "waiting for selector", timeout, move |s| {
            s.wait_for_selector(&target, timeout)
        })
        .await;
        self.manager.check_connection(&self.session, result).await
    }
}

/// Runs a blocking browser call on the blocking pool, bounded by `timeout`.
async fn run_blocking<S, T, F>(
    session: &Arc<S>,
    operation: &str,
    timeout: Duration,
    call: F,
) -> Result<T, ScrapeError>
where
    S: BrowserSession,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, ScrapeError> + Send + 'static,
{
    let session = Arc::clone(session);
    let task = tokio::task::spawn_blocking(move || call(session.as_ref()));

    match tokio::time::timeout(timeout + BLOCKING_GRACE, task).await {
        Err(_) => Err(ScrapeError::timeout(operation, timeout)),
        Ok(Err(join_error)) => Err(ScrapeError::SessionUnavailable {
            message: format!("{operation} failed: {join_error}"),
        }),
        Ok(Ok(result)) => result,
    }
}

fn shut_down() -> ScrapeError {
    ScrapeError::SessionUnavailable {
        message: "Session manager has been shut down".to_string(),
    }
}
