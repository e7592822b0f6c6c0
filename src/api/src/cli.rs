//! CLI commands for racecard-api.
//!
//! Supports API server mode and one-shot scraping to files or stdout.

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::output::{write_json_atomic, OutputDocuments};
use crate::scraper::{RaceScraper, ScrapeRequest};

#[derive(Parser)]
#[command(name = "racecard-api")]
#[command(version, about = "JRA racecard scraper: JSON API and CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value_t = 5000)]
        port: u16,
    },

    /// Scrape once and write the JSON documents
    Scrape(ScrapeArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct ScrapeArgs {
    /// URL to fetch the racecard from
    #[arg(long)]
    pub url: Option<String>,

    /// Local racecard HTML to read
    #[arg(long, value_name = "FILE")]
    pub html: Option<PathBuf>,

    /// Day key to make available, e.g. "saturday"
    #[arg(long)]
    pub target_day: Option<String>,

    /// Skip the maintenance-window check
    #[arg(long)]
    pub allow_partial: bool,

    /// Venue keyword to click when navigating, e.g. 中山
    #[arg(long)]
    pub venue: Option<String>,

    /// Navigate the site in a headless browser
    #[arg(long)]
    pub playwright: bool,

    /// Scrape every announced venue via the browser
    #[arg(long)]
    pub all_venues: bool,

    /// Enrich horses from their detail pages
    #[arg(long)]
    pub fetch_horse_detail: bool,

    /// Enrich jockeys from their detail pages
    #[arg(long)]
    pub fetch_jockey_detail: bool,

    /// Race document path; printed to stdout when omitted
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Horse roster path
    #[arg(long, value_name = "FILE")]
    pub horses: Option<PathBuf>,

    /// Jockey roster path
    #[arg(long, value_name = "FILE")]
    pub jockeys: Option<PathBuf>,
}

impl From<&ScrapeArgs> for ScrapeRequest {
    fn from(args: &ScrapeArgs) -> Self {
        Self {
            target_day: args.target_day.clone(),
            url: args.url.clone(),
            html_path: args.html.clone(),
            allow_partial: args.allow_partial,
            venue: args.venue.clone(),
            use_browser: args.playwright,
            all_venues: args.all_venues,
            fetch_horse_detail: args.fetch_horse_detail,
            fetch_jockey_detail: args.fetch_jockey_detail,
        }
    }
}

/// Run a one-shot scrape.
pub async fn run_scrape(args: ScrapeArgs) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let scraper = RaceScraper::from_config(&config)?;

    let data = scraper.scrape(&ScrapeRequest::from(&args)).await?;
    eprintln!(
        "Scraped {} venues, {} horses",
        data.venues.len(),
        data.horses().count()
    );

    // No timestamp outside the server
    let documents = OutputDocuments::build(&data, None)?;
    write_documents(&documents, &args, &mut std::io::stdout().lock())
}

fn write_documents(
    documents: &OutputDocuments,
    args: &ScrapeArgs,
    stdout: &mut impl Write,
) -> anyhow::Result<()> {
    let targets: [(Option<&Path>, &[u8]); 3] = [
        (args.out.as_deref(), documents.race.as_slice()),
        (args.horses.as_deref(), documents.horses.as_slice()),
        (args.jockeys.as_deref(), documents.jockeys.as_slice()),
    ];
    for (path, bytes) in targets {
        if let Some(path) = path {
            write_json_atomic(path, bytes)?;
            eprintln!("Wrote {}", path.display());
        }
    }

    if args.out.is_none() {
        stdout.write_all(&documents.race)?;
        writeln!(stdout)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn documents() -> OutputDocuments {
        OutputDocuments {
            race: b"{\"venues\": []}".to_vec(),
            horses: b"{\"horses\": []}".to_vec(),
            jockeys: b"{\"jockeys\": []}".to_vec(),
        }
    }

    #[test]
    fn test_scrape_flags_map_to_request() {
        let cli = Cli::parse_from([
            "racecard-api",
            "scrape",
            "--html",
            "card.html",
            "--target-day",
            "sunday",
            "--playwright",
            "--venue",
            "中山",
            "--fetch-horse-detail",
        ]);
        let Commands::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        let req = ScrapeRequest::from(&args);
        assert_eq!(req.html_path, Some(PathBuf::from("card.html")));
        assert_eq!(req.target_day.as_deref(), Some("sunday"));
        assert!(req.use_browser);
        assert!(req.fetch_horse_detail);
        assert!(!req.fetch_jockey_detail);
        assert!(!req.allow_partial);
    }

    #[test]
    fn test_race_document_goes_to_stdout_without_out() {
        let dir = tempfile::tempdir().unwrap();
        let args = ScrapeArgs {
            horses: Some(dir.path().join("HorseTest.json")),
            ..Default::default()
        };
        let mut stdout = Vec::new();
        write_documents(&documents(), &args, &mut stdout).unwrap();

        assert_eq!(stdout, b"{\"venues\": []}\n");
        assert_eq!(
            std::fs::read(dir.path().join("HorseTest.json")).unwrap(),
            b"{\"horses\": []}"
        );
        assert!(!dir.path().join("JockeyTest.json").exists());
    }

    #[test]
    fn test_out_suppresses_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/RaceTest.json");
        let args = ScrapeArgs {
            out: Some(out.clone()),
            ..Default::default()
        };
        let mut stdout = Vec::new();
        write_documents(&documents(), &args, &mut stdout).unwrap();

        assert!(stdout.is_empty());
        assert_eq!(std::fs::read(out).unwrap(), b"{\"venues\": []}");
    }
}
