//! Scrape orchestration: guard → fetch → parse → merge → enrich.

use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::browser::{BrowserNavigator, Navigator};
use super::fetch::{read_html_file, HttpFetcher, PageSource};
use super::parsers::{HorseDetail, HorseParser, JockeyDetail, JockeyParser, RaceCardParser};
use super::race_data::RaceData;
use crate::config::{AppConfig, GuardConfig};
use crate::error::{FetchError, ScrapeError};
use crate::guard::{is_scrape_window_ok, site_now};

/// What to scrape and how
#[derive(Debug, Clone, Default)]
pub struct ScrapeRequest {
    /// Day key the caller will read; aliased when the page lacks it
    pub target_day: Option<String>,
    pub url: Option<String>,
    /// Local markup; the configured default when unset
    pub html_path: Option<PathBuf>,
    /// Ignore the maintenance window
    pub allow_partial: bool,
    pub venue: Option<String>,
    pub use_browser: bool,
    pub all_venues: bool,
    pub fetch_horse_detail: bool,
    pub fetch_jockey_detail: bool,
}

/// Where the racecard markup comes from
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source<'a> {
    AllVenues,
    Url(&'a str),
    Browser(&'a str),
    File(PathBuf),
}

impl ScrapeRequest {
    /// Pick exactly one source: all venues, then URL, then browser, then file.
    fn source<'a>(&'a self, default_html: &Path) -> Result<Source<'a>, ScrapeError> {
        if self.all_venues {
            return Ok(Source::AllVenues);
        }
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(Source::Url(url));
        }
        if self.use_browser {
            return match self.venue.as_deref().filter(|v| !v.is_empty()) {
                Some(venue) => Ok(Source::Browser(venue)),
                None => Err(ScrapeError::abort(
                    "venue keyword is required for browser navigation",
                )),
            };
        }
        let path = self
            .html_path
            .clone()
            .unwrap_or_else(|| default_html.to_path_buf());
        Ok(Source::File(path))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Guard,
    Fetch,
    Parse,
    Merge,
    EnrichHorse,
    EnrichJockey,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Guard => "guard",
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Merge => "merge",
            Stage::EnrichHorse => "enrich_horse",
            Stage::EnrichJockey => "enrich_jockey",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Runs one scrape per call; holds no state between calls.
pub struct RaceScraper {
    http: Arc<dyn PageSource>,
    navigator: Arc<dyn Navigator>,
    guard: GuardConfig,
    default_html: PathBuf,
}

impl RaceScraper {
    pub fn new(
        http: Arc<dyn PageSource>,
        navigator: Arc<dyn Navigator>,
        guard: GuardConfig,
        default_html: PathBuf,
    ) -> Self {
        Self {
            http,
            navigator,
            guard,
            default_html,
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            Arc::new(HttpFetcher::new(&config.scraper)?),
            Arc::new(BrowserNavigator::new(config.scraper.clone())),
            config.guard.clone(),
            PathBuf::from(&config.output.default_html),
        ))
    }

    /// Scrape using the site's current time for the maintenance check.
    pub async fn scrape(&self, req: &ScrapeRequest) -> Result<RaceData, ScrapeError> {
        self.scrape_at(req, site_now(&self.guard)).await
    }

    pub async fn scrape_at(
        &self,
        req: &ScrapeRequest,
        now: DateTime<FixedOffset>,
    ) -> Result<RaceData, ScrapeError> {
        info!(stage = %Stage::Guard, %now, allow_partial = req.allow_partial);
        if !req.allow_partial && !is_scrape_window_ok(now, &self.guard) {
            return Err(ScrapeError::abort(
                "Scraping halted: site likely updating (maintenance window)",
            ));
        }

        let source = req.source(&self.default_html)?;
        let mut data = match source {
            Source::AllVenues => self.scrape_all_venues().await?,
            other => {
                info!(stage = %Stage::Fetch, source = ?other);
                let html = self.fetch_racecard(other).await?;
                info!(stage = %Stage::Parse, bytes = html.len());
                RaceCardParser::parse(&html)?
            }
        };

        if let Some(day) = req.target_day.as_deref().filter(|d| !d.is_empty()) {
            data.alias_day(day)?;
        }

        if req.fetch_horse_detail {
            info!(stage = %Stage::EnrichHorse);
            self.enrich_horses(&mut data, req.use_browser).await;
        }
        if req.fetch_jockey_detail {
            info!(stage = %Stage::EnrichJockey);
            self.enrich_jockeys(&mut data, req.use_browser).await;
        }

        info!(
            stage = %Stage::Done,
            venues = data.venues.len(),
            horses = data.horses().count()
        );
        Ok(data)
    }

    async fn fetch_racecard(&self, source: Source<'_>) -> Result<String, ScrapeError> {
        match source {
            Source::Url(url) => Ok(self.http.fetch(url).await?),
            Source::Browser(venue) => Ok(self.navigator.racecard_for_venue(venue).await?),
            Source::File(path) => {
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(ScrapeError::abort(format!(
                        "HTML file not found: {}",
                        path.display()
                    )));
                }
                Ok(read_html_file(&path).await?)
            }
            Source::AllVenues => Err(ScrapeError::Unexpected(anyhow::anyhow!(
                "all-venue scrapes are not a single racecard"
            ))),
        }
    }

    async fn scrape_all_venues(&self) -> Result<RaceData, ScrapeError> {
        info!(stage = %Stage::Fetch, source = "all_venues");
        let pages = self.navigator.all_racecards().await?;

        let mut merged: Option<RaceData> = None;
        for page in pages {
            info!(stage = %Stage::Parse, venue = %page.label);
            let mut data = RaceCardParser::parse(&page.html)?;
            for venue in &mut data.venues {
                venue.session = page.label.clone();
                if venue.name.is_empty() {
                    venue.name = page.label.clone();
                }
            }

            merged = Some(match merged.take() {
                None => data,
                Some(mut acc) => {
                    debug!(stage = %Stage::Merge, venue = %page.label);
                    acc.merge(data);
                    acc
                }
            });
        }

        merged.ok_or_else(|| ScrapeError::abort("No venue data fetched"))
    }

    /// Fetch a horse page statically, rendering it in the browser when the
    /// static copy carries no pedigree or history.
    async fn horse_detail(&self, url: &str, use_browser: bool) -> Result<HorseDetail, FetchError> {
        let detail = HorseParser::parse(&self.http.fetch(url).await?);
        if use_browser && detail.lacks_pedigree_and_history() {
            debug!(url, "Static horse page empty, rendering");
            return Ok(HorseParser::parse(&self.navigator.render(url).await?));
        }
        Ok(detail)
    }

    async fn jockey_detail(&self, url: &str, use_browser: bool) -> Result<JockeyDetail, FetchError> {
        let detail = JockeyParser::parse(&self.http.fetch(url).await?);
        if use_browser && detail.is_sparse() {
            debug!(url, "Static jockey page empty, rendering");
            return Ok(JockeyParser::parse(&self.navigator.render(url).await?));
        }
        Ok(detail)
    }

    async fn enrich_horses(&self, data: &mut RaceData, use_browser: bool) {
        for horse in data.horses_mut() {
            if horse.detail_url.is_empty() {
                continue;
            }
            match self.horse_detail(&horse.detail_url, use_browser).await {
                Ok(detail) => horse.merge_detail(detail),
                Err(e) => {
                    warn!(horse = %horse.name, error = %e, "Horse detail failed");
                    horse.detail_error.get_or_insert_with(|| e.to_string());
                }
            }
        }
    }

    /// Fetch each jockey once and share the result across their rides.
    async fn enrich_jockeys(&self, data: &mut RaceData, use_browser: bool) {
        for horse in data.horses_mut() {
            horse.jockey_detail = None;
        }

        let mut targets: Vec<(String, String)> = Vec::new();
        for horse in data.horses() {
            if horse.jockey.is_empty() || horse.jockey_url.is_empty() {
                continue;
            }
            if !targets.iter().any(|(name, _)| *name == horse.jockey) {
                targets.push((horse.jockey.clone(), horse.jockey_url.clone()));
            }
        }

        let mut details: HashMap<String, JockeyDetail> = HashMap::new();
        for (name, url) in targets {
            match self.jockey_detail(&url, use_browser).await {
                Ok(detail) => {
                    details.insert(name, detail);
                }
                Err(e) => warn!(jockey = %name, error = %e, "Jockey detail failed"),
            }
        }

        for horse in data.horses_mut() {
            horse.jockey_detail = details.get(&horse.jockey).cloned();
        }
    }
}
