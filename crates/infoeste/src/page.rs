//! The upstream course page and the steps needed to reveal its listing.
//!
//! The listing lives in an iframe and only shows the courses of the
//! participant category picked in a `<select>`. Picking a category posts the
//! frame back, so after changing it we wait for the frame to reload before
//! reading anything.

use crate::browser::{BrowserDriver, PageLease, SessionManager};
use crate::dom::{snapshot_script, ListingSnapshot, LISTING_SELECTOR};
use crate::error::ScrapeError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_URL: &str = "https://www.unoeste.br/semanas/2025/37infoeste/CursosPalestras";

/// Property set on the frame's window before selecting a category. A fresh
/// document after the post-back no longer has it.
const RELOAD_MARKER: &str = "__infoesteCategoryMarker";

/// Where the listing is and how long each step may take.
#[derive(Debug, Clone)]
pub struct PageContract {
    pub url: String,
    pub frame_selector: String,
    pub category_selector: String,
    /// Option value of the participant category whose courses are listed
    pub category_value: String,
    pub navigation_timeout: Duration,
    pub frame_timeout: Duration,
    pub category_timeout: Duration,
    /// Time allowed for the frame to reload after a category change
    pub settle_timeout: Duration,
    pub listing_timeout: Duration,
    pub script_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for PageContract {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            frame_selector: "#iframeAtividades".to_string(),
            category_selector: "#ddlCat".to_string(),
            category_value: "4384".to_string(),
            navigation_timeout: Duration::from_secs(30),
            frame_timeout: Duration::from_secs(10),
            category_timeout: Duration::from_secs(10),
            settle_timeout: Duration::from_secs(15),
            listing_timeout: Duration::from_secs(10),
            script_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// The course page, loaded and leased to the caller.
pub struct CoursePage<'a, D: BrowserDriver> {
    lease: PageLease<'a, D>,
    contract: &'a PageContract,
}

impl<'a, D: BrowserDriver> CoursePage<'a, D> {
    /// Navigates (or reloads) the upstream page.
    pub async fn open(
        session: &'a SessionManager<D>,
        contract: &'a PageContract,
    ) -> Result<Self, ScrapeError> {
        let lease = session
            .navigate_to(&contract.url, contract.navigation_timeout)
            .await?;
        Ok(Self { lease, contract })
    }

    /// Waits for the frame, then selects the participant category.
    pub async fn prepare(&self) -> Result<(), ScrapeError> {
        self.wait_for_frame().await?;
        self.select_category().await
    }

    pub async fn wait_for_frame(&self) -> Result<(), ScrapeError> {
        let contract = self.contract;
        self.lease
            .wait_for_selector(&contract.frame_selector, contract.frame_timeout)
            .await
    }

    pub async fn select_category(&self) -> Result<(), ScrapeError> {
        let contract = self.contract;

        let present = presence_script(&contract.frame_selector, &contract.category_selector);
        if !self.poll(&present, contract.category_timeout).await {
            return Err(ScrapeError::PageNotReady {
                message: format!(
                    "element {} not found in frame {}",
                    contract.category_selector, contract.frame_selector
                ),
            });
        }

        let selected = self
            .lease
            .evaluate(&self.select_script(), contract.script_timeout)
            .await?;
        if selected != serde_json::Value::Bool(true) {
            return Err(ScrapeError::PageNotReady {
                message: format!(
                    "option {} not available in {}",
                    contract.category_value, contract.category_selector
                ),
            });
        }

        if !self.poll(&self.settle_script(), contract.settle_timeout).await {
            return Err(ScrapeError::timeout(
                format!(
                    "waiting for the listing to reload after selecting category {}",
                    contract.category_value
                ),
                contract.settle_timeout,
            ));
        }

        info!(category = %contract.category_value, "Category selected");
        Ok(())
    }

    /// Reads the listing; `None` when its container never appeared.
    pub async fn read_listing(&self) -> Result<Option<ListingSnapshot>, ScrapeError> {
        let contract = self.contract;

        let present = presence_script(&contract.frame_selector, LISTING_SELECTOR);
        if !self.poll(&present, contract.listing_timeout).await {
            warn!(
                timeout_secs = contract.listing_timeout.as_secs_f64(),
                "Listing container did not appear"
            );
        }

        let script = snapshot_script(Some(&contract.frame_selector));
        let snapshot: Option<ListingSnapshot> = self
            .lease
            .evaluate_json(&script, contract.script_timeout)
            .await?;

        if let Some(listing) = &snapshot {
            debug!(
                groups = listing.groups.len(),
                rows = listing.row_count(),
                "Listing snapshot taken"
            );
        }
        Ok(snapshot)
    }

    /// Evaluates `script` until it returns `true` or `timeout` elapses.
    ///
    /// Evaluation errors count as "not yet": the frame document is replaced
    /// while it reloads.
    async fn poll(&self, script: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.lease.evaluate(script, self.contract.script_timeout).await {
                Ok(serde_json::Value::Bool(true)) => return true,
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Page check failed, retrying"),
            }

            if Instant::now() + self.contract.poll_interval > deadline {
                return false;
            }
            tokio::time::sleep(self.contract.poll_interval).await;
        }
    }

    fn select_script(&self) -> String {
        let contract = self.contract;
        let frame = js_string(&contract.frame_selector);
        let select = js_string(&contract.category_selector);
        let value = js_string(&contract.category_value);

        format!(
            r#"(() => {{
    const frame = document.querySelector({frame});
    const win = frame && frame.contentWindow;
    if (!win) {{
        throw new Error('frame ' + {frame} + ' is not accessible');
    }}
    const select = win.document.querySelector({select});
    if (!select || !Array.from(select.options).some((o) => o.value === {value})) {{
        return false;
    }}
    win.{RELOAD_MARKER} = true;
    select.value = {value};
    select.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#
        )
    }

    fn settle_script(&self) -> String {
        let frame = js_string(&self.contract.frame_selector);

        format!(
            r#"(() => {{
    const frame = document.querySelector({frame});
    if (!frame || !frame.contentWindow) {{
        return false;
    }}
    try {{
        const win = frame.contentWindow;
        return win.{RELOAD_MARKER} !== true && win.document.readyState === 'complete';
    }} catch (e) {{
        return false;
    }}
}})()"#
        )
    }
}

/// True once `selector` matches inside the frame's document.
fn presence_script(frame_selector: &str, selector: &str) -> String {
    let frame = js_string(frame_selector);
    let selector = js_string(selector);

    format!(
        r#"(() => {{
    const frame = document.querySelector({frame});
    const doc = frame && frame.contentDocument;
    return !!(doc && doc.querySelector({selector}));
}})()"#
    )
}

fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeBrowser, FakeDriver};
    use crate::browser::BrowserConfig;
    use crate::dom::fixtures::LISTING_PAGE;
    use std::sync::Arc;

    fn fast_contract() -> PageContract {
        PageContract {
            frame_timeout: Duration::from_millis(100),
            category_timeout: Duration::from_millis(100),
            settle_timeout: Duration::from_millis(100),
            listing_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            ..PageContract::default()
        }
    }

    fn session(browser: &Arc<FakeBrowser>) -> SessionManager<FakeDriver> {
        SessionManager::new(FakeDriver(Arc::clone(browser)), BrowserConfig::default())
    }

    #[tokio::test]
    async fn test_reads_listing_after_selecting_category() {
        let browser = FakeBrowser::new();
        browser.set_listing_html(LISTING_PAGE);
        let session = session(&browser);
        let contract = fast_contract();

        let page = CoursePage::open(&session, &contract).await.unwrap();
        page.prepare().await.unwrap();
        let listing = page.read_listing().await.unwrap().unwrap();

        assert_eq!(listing.groups.len(), 2);
        assert_eq!(browser.navigations(), vec![DEFAULT_URL]);
    }

    #[tokio::test]
    async fn test_missing_category_option() {
        let browser = FakeBrowser::new();
        browser.remove("\"4384\"");
        let session = session(&browser);
        let contract = fast_contract();

        let page = CoursePage::open(&session, &contract).await.unwrap();
        let err = page.prepare().await.unwrap_err();

        assert_eq!(
            err,
            ScrapeError::PageNotReady {
                message: "option 4384 not available in #ddlCat".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_category_selector() {
        let browser = FakeBrowser::new();
        browser.remove("#ddlCat");
        let session = session(&browser);
        let contract = fast_contract();

        let page = CoursePage::open(&session, &contract).await.unwrap();
        let err = page.select_category().await.unwrap_err();

        assert!(err.to_string().contains("#ddlCat not found in frame"));
    }

    #[tokio::test]
    async fn test_missing_frame_times_out() {
        let browser = FakeBrowser::new();
        browser.remove("#iframeAtividades");
        let session = session(&browser);
        let contract = fast_contract();

        let page = CoursePage::open(&session, &contract).await.unwrap();
        let err = page.prepare().await.unwrap_err();

        assert!(matches!(err, ScrapeError::NavigationTimeout { .. }));
    }

    #[tokio::test]
    async fn test_absent_listing_reads_as_none() {
        let browser = FakeBrowser::new();
        browser.remove("#listaHorarios");
        let session = session(&browser);
        let contract = fast_contract();

        let page = CoursePage::open(&session, &contract).await.unwrap();
        assert_eq!(page.read_listing().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_undecodable_snapshot() {
        let browser = FakeBrowser::new();
        browser.set_listing_json("{\"groups\": 7}");
        let session = session(&browser);
        let contract = fast_contract();

        let page = CoursePage::open(&session, &contract).await.unwrap();
        let err = page.read_listing().await.unwrap_err();

        assert!(matches!(err, ScrapeError::Script { .. }));
    }

    #[test]
    fn test_scripts_quote_selectors() {
        let script = presence_script("#iframeAtividades", "#ddl'Cat");
        assert!(script.contains(r##"document.querySelector("#iframeAtividades")"##));
        assert!(script.contains(r##"doc.querySelector("#ddl'Cat")"##));
    }
}
