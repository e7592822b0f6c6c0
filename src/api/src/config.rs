//! Configuration for the racecard API.

use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Fetch and browser-navigation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Page the browser starts every navigation from
    #[serde(default = "default_entry_url")]
    pub entry_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Static fetch timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Per-step browser timeout
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Chrome binary; chromiumoxide auto-detects when unset
    #[serde(default)]
    pub chrome_executable: Option<String>,
}

fn default_entry_url() -> String {
    "https://www.jra.go.jp/".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_navigation_timeout_ms() -> u64 {
    15_000
}

fn default_headless() -> bool {
    true
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            entry_url: default_entry_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            headless: default_headless(),
            chrome_executable: None,
        }
    }
}

/// Maintenance window during which the source site is updating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Days counted from Monday = 0
    #[serde(default = "default_blocked_weekdays")]
    pub blocked_weekdays: Vec<u32>,
    #[serde(default = "default_block_start_hour")]
    pub block_start_hour: u32,
    /// Exclusive
    #[serde(default = "default_block_end_hour")]
    pub block_end_hour: u32,
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_blocked_weekdays() -> Vec<u32> {
    vec![1, 2, 3]
}

fn default_block_start_hour() -> u32 {
    16
}

fn default_block_end_hour() -> u32 {
    17
}

fn default_utc_offset_hours() -> i32 {
    9
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            blocked_weekdays: default_blocked_weekdays(),
            block_start_hour: default_block_start_hour(),
            block_end_hour: default_block_end_hour(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

/// Where the published JSON documents go
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_race_json")]
    pub race_json: String,
    #[serde(default = "default_horse_json")]
    pub horse_json: String,
    #[serde(default = "default_jockey_json")]
    pub jockey_json: String,
    /// Markup read when no URL or browser source is requested
    #[serde(default = "default_html_path")]
    pub default_html: String,
}

fn default_race_json() -> String {
    "public/server/RaceTest.json".to_string()
}

fn default_horse_json() -> String {
    "public/server/HorseTest.json".to_string()
}

fn default_jockey_json() -> String {
    "public/server/JockeyTest.json".to_string()
}

fn default_html_path() -> String {
    "html.txt".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            race_json: default_race_json(),
            horse_json: default_horse_json(),
            jockey_json: default_jockey_json(),
            default_html: default_html_path(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (RACECARD_SERVER__PORT, etc.)
            .add_source(
                config::Environment::with_prefix("RACECARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
