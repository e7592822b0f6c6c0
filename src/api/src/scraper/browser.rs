//! Browser automation using chromiumoxide.
//!
//! Racecards are only reachable by clicking through the site's menus, so the
//! navigator replays those clicks in headless Chrome and returns the rendered
//! markup.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as ChromeBrowser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use regex::Regex;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::FetchError;

static RACECARD_MENU: LazyLock<Regex> = LazyLock::new(|| Regex::new("出馬表").unwrap());
static SHOW_ALL_RACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("全てのレースを表示").unwrap());
/// Venue announcement such as "5回中山8日"
static VENUE_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+回.+?\d+日").unwrap());

const RACE_LIST_SELECTOR: &str = "ul.syutsuba_unit_list";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Rendered racecard of one venue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenuePage {
    /// Announcement text of the venue link
    pub label: String,
    pub html: String,
}

/// Browser-driven page retrieval.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Racecard of the venue whose menu link mentions `venue`.
    async fn racecard_for_venue(&self, venue: &str) -> Result<String, FetchError>;

    /// Racecards of every announced venue, in menu order.
    async fn all_racecards(&self) -> Result<Vec<VenuePage>, FetchError>;

    /// Markup of `url` after scripts have run.
    async fn render(&self, url: &str) -> Result<String, FetchError>;
}

/// One headless Chrome process
pub struct Browser {
    browser: ChromeBrowser,
    handle: tokio::task::JoinHandle<()>,
    step_timeout: Duration,
}

impl Browser {
    /// Launch a new browser instance
    pub async fn launch(config: &ScraperConfig) -> Result<Self, FetchError> {
        let step_timeout = Duration::from_millis(config.navigation_timeout_ms);

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", config.user_agent))
            .window_size(1920, 1080)
            .request_timeout(step_timeout);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(FetchError::BrowserConfig)?;

        let (browser, mut handler) =
            ChromeBrowser::launch(browser_config)
                .await
                .map_err(|source| FetchError::Browser {
                    context: "launch".to_string(),
                    source,
                })?;

        // Handler must keep running for the browser to work
        let handle = tokio::spawn(async move {
            loop {
                match handler.next().await {
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => continue,
                    None => break,
                }
            }
        });

        Ok(Self {
            browser,
            handle,
            step_timeout,
        })
    }

    /// Run one CDP step under the navigation timeout.
    async fn step<T>(
        &self,
        context: &str,
        fut: impl Future<Output = Result<T, CdpError>>,
    ) -> Result<T, FetchError> {
        match tokio::time::timeout(self.step_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(FetchError::Browser {
                context: context.to_string(),
                source,
            }),
            Err(_) => Err(FetchError::Timeout {
                context: context.to_string(),
                after: self.step_timeout,
            }),
        }
    }

    /// Open a new tab on `url`.
    pub async fn open(&self, url: &str) -> Result<Page, FetchError> {
        let page = self.step("open page", self.browser.new_page(url)).await?;
        // Best effort; new_page usually returns after load already
        let _ = tokio::time::timeout(self.step_timeout, page.wait_for_navigation()).await;
        Ok(page)
    }

    /// Visible texts of every link on the page.
    pub async fn link_texts(&self, page: &Page) -> Result<Vec<String>, FetchError> {
        let links = self.step("list links", page.find_elements("a")).await?;
        let mut texts = Vec::with_capacity(links.len());
        for link in links {
            if let Ok(Some(text)) = link.inner_text().await {
                let text = text.trim().to_string();
                if !text.is_empty() {
                    texts.push(text);
                }
            }
        }
        Ok(texts)
    }

    /// Click the first link whose visible text matches `pattern`, then let
    /// the next page settle.
    pub async fn click_link(&self, page: &Page, pattern: &Regex) -> Result<(), FetchError> {
        let links = self.step("list links", page.find_elements("a")).await?;
        for link in links {
            let Ok(Some(text)) = link.inner_text().await else {
                continue;
            };
            if !pattern.is_match(text.trim()) {
                continue;
            }
            debug!(link = text.trim(), "Clicking");
            self.step("click link", link.click()).await?;
            let _ = tokio::time::timeout(self.step_timeout, page.wait_for_navigation()).await;
            return Ok(());
        }

        let current = page.url().await.ok().flatten().unwrap_or_default();
        Err(FetchError::LinkNotFound {
            pattern: pattern.as_str().to_string(),
            page: current,
        })
    }

    /// Poll until `selector` matches an element.
    pub async fn wait_for_selector(&self, page: &Page, selector: &str) -> Result<(), FetchError> {
        let deadline = Instant::now() + self.step_timeout;
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(FetchError::Timeout {
                    context: format!("wait for {selector}"),
                    after: self.step_timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn content(&self, page: &Page) -> Result<String, FetchError> {
        self.step("read content", page.content()).await
    }

    pub async fn close_page(page: Page) {
        if let Err(e) = page.close().await {
            debug!(error = %e, "Page close error");
        }
    }

    /// Close the browser
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "Browser close error");
        }
        let _ = self.browser.wait().await;
        self.handle.abort();
    }
}

/// Link texts that announce a venue, duplicates removed.
pub fn venue_labels(texts: &[String]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for text in texts {
        let text = text.trim();
        let is_venue = VENUE_LINK.is_match(text) && !text.contains("WIN5") && !text.contains("重賞");
        if is_venue && !labels.iter().any(|l| l == text) {
            labels.push(text.to_string());
        }
    }
    labels
}

/// Pattern matching a venue link from the first word of its announcement.
pub fn venue_pattern(label: &str) -> Result<Regex, FetchError> {
    let head = label.split_whitespace().next().unwrap_or(label);
    literal_pattern(head)
}

fn literal_pattern(text: &str) -> Result<Regex, FetchError> {
    Regex::new(&regex::escape(text)).map_err(|_| FetchError::LinkNotFound {
        pattern: text.to_string(),
        page: String::new(),
    })
}

/// Visit each venue in turn. A failure aborts the batch until one venue
/// has succeeded; after that failed venues are skipped.
pub async fn collect_venue_pages<F, Fut>(
    labels: Vec<String>,
    mut visit: F,
) -> Result<Vec<VenuePage>, FetchError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String, FetchError>>,
{
    let mut pages = Vec::with_capacity(labels.len());
    for label in labels {
        match visit(label.clone()).await {
            Ok(html) => pages.push(VenuePage { label, html }),
            Err(e) if pages.is_empty() => return Err(e),
            Err(e) => warn!(venue = %label, error = %e, "Skipping venue"),
        }
    }
    Ok(pages)
}

/// [`Navigator`] that launches Chrome for each call
pub struct BrowserNavigator {
    config: ScraperConfig,
}

impl BrowserNavigator {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }

    /// Entry page → racecard menu → venue → all races, on a fresh tab.
    async fn venue_racecard(&self, session: &Browser, venue: &Regex) -> Result<String, FetchError> {
        let page = session.open(&self.config.entry_url).await?;
        let result = async {
            session.click_link(&page, &RACECARD_MENU).await?;
            session.click_link(&page, venue).await?;
            session.click_link(&page, &SHOW_ALL_RACES).await?;
            session.wait_for_selector(&page, RACE_LIST_SELECTOR).await?;
            session.content(&page).await
        }
        .await;
        Browser::close_page(page).await;
        result
    }

    async fn announced_venues(&self, session: &Browser) -> Result<Vec<String>, FetchError> {
        let page = session.open(&self.config.entry_url).await?;
        let result = async {
            session.click_link(&page, &RACECARD_MENU).await?;
            session.link_texts(&page).await
        }
        .await;
        Browser::close_page(page).await;
        Ok(venue_labels(&result?))
    }
}

#[async_trait]
impl Navigator for BrowserNavigator {
    async fn racecard_for_venue(&self, venue: &str) -> Result<String, FetchError> {
        info!(venue, "Navigating to venue racecard");
        let pattern = literal_pattern(venue)?;
        let session = Browser::launch(&self.config).await?;
        let result = self.venue_racecard(&session, &pattern).await;
        session.close().await;
        result
    }

    async fn all_racecards(&self) -> Result<Vec<VenuePage>, FetchError> {
        let session = Browser::launch(&self.config).await?;
        let result = async {
            let labels = self.announced_venues(&session).await?;
            if labels.is_empty() {
                return Err(FetchError::NoVenues);
            }
            info!(count = labels.len(), "Venues announced");

            let session = &session;
            collect_venue_pages(labels, |label| async move {
                info!(venue = %label, "Navigating to venue racecard");
                let pattern = venue_pattern(&label)?;
                self.venue_racecard(session, &pattern).await
            })
            .await
        }
        .await;
        session.close().await;
        result
    }

    async fn render(&self, url: &str) -> Result<String, FetchError> {
        let session = Browser::launch(&self.config).await?;
        let result = async {
            let page = session.open(url).await?;
            let html = session.content(&page).await;
            Browser::close_page(page).await;
            html
        }
        .await;
        session.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_venue_labels_filters_announcements() {
        let links = texts(&[
            "出馬表",
            "5回中山8日 12月22日（日曜）",
            "5回京都8日",
            "WIN5 5回中山8日",
            "重賞 5回中山8日 有馬記念",
            "5回中山8日 12月22日（日曜）",
            "オッズ",
        ]);
        assert_eq!(
            venue_labels(&links),
            vec!["5回中山8日 12月22日（日曜）", "5回京都8日"]
        );
    }

    #[test]
    fn test_venue_pattern_uses_first_word_literally() {
        let pattern = venue_pattern("5回中山8日 12月22日（日曜）").unwrap();
        assert_eq!(pattern.as_str(), "5回中山8日");
        assert!(pattern.is_match("5回中山8日"));
        assert!(!pattern.is_match("5回京都8日"));

        // Regex metacharacters are taken literally
        let pattern = venue_pattern("中山(1)").unwrap();
        assert!(pattern.is_match("中山(1)"));
        assert!(!pattern.is_match("中山1"));
    }

    fn labels() -> Vec<String> {
        texts(&["中山", "京都", "中京"])
    }

    fn timeout() -> FetchError {
        FetchError::Timeout {
            context: "test".to_string(),
            after: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_collect_skips_failures_after_first_success() {
        let pages = collect_venue_pages(labels(), |label| async move {
            if label == "京都" {
                Err(timeout())
            } else {
                Ok(format!("<html>{label}</html>"))
            }
        })
        .await
        .unwrap();

        let got: Vec<_> = pages.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(got, vec!["中山", "中京"]);
        assert_eq!(pages[1].html, "<html>中京</html>");
    }

    #[tokio::test]
    async fn test_collect_aborts_when_first_venue_fails() {
        let mut calls = 0;
        let result = collect_venue_pages(labels(), |_| {
            calls += 1;
            async { Err::<String, _>(timeout()) }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Timeout { .. })));
        assert_eq!(calls, 1);
    }
}
