//! Published JSON documents and their atomic persistence.
//!
//! Three documents are derived from one scrape: the race document (with
//! fields private to the scraper removed), the horse roster and the jockey
//! roster. All three are serialised before anything touches the disk.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::OutputConfig;
use crate::scraper::parsers::{Horse, JockeyDetail, PastRace};
use crate::scraper::race_data::RaceData;

/// Horse keys used only while scraping
pub const PRIVATE_HORSE_FIELDS: [&str; 3] = ["odds", "detail_url", "jockey_url"];

/// `2024-12-21T09:30:00+09:00`
pub fn timestamp(now: DateTime<FixedOffset>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Race document as published: the scraped data plus `generated_at`,
/// private horse fields removed.
pub fn race_document(data: &RaceData, generated_at: Option<&str>) -> serde_json::Result<Value> {
    let mut doc = serde_json::to_value(data)?;
    if let Value::Object(map) = &mut doc {
        map.insert(
            "generated_at".to_string(),
            generated_at.map_or(Value::Null, |t| Value::String(t.to_string())),
        );
    }
    Ok(sanitize_race_document(doc))
}

/// Remove [`PRIVATE_HORSE_FIELDS`] from every horse in both the flat and
/// per-day views. Idempotent.
pub fn sanitize_race_document(mut doc: Value) -> Value {
    if let Some(venues) = doc.get_mut("venues") {
        strip_private_fields(venues);
    }
    if let Some(Value::Object(days)) = doc.get_mut("days") {
        for day in days.values_mut() {
            if let Some(venues) = day.get_mut("venues") {
                strip_private_fields(venues);
            }
        }
    }
    doc
}

fn strip_private_fields(venues: &mut Value) {
    for venue in venues.as_array_mut().into_iter().flatten() {
        let races = venue.get_mut("races").and_then(Value::as_array_mut);
        for race in races.into_iter().flatten() {
            let horses = race.get_mut("horses").and_then(Value::as_array_mut);
            for horse in horses.into_iter().flatten() {
                if let Some(fields) = horse.as_object_mut() {
                    for key in PRIVATE_HORSE_FIELDS {
                        fields.remove(key);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HorseEntry<'a> {
    pub name: &'a str,
    pub serei: &'a str,
    pub trainer: &'a str,
    pub father: &'a str,
    pub mother: &'a str,
    pub birthday: &'a str,
    pub color: &'a str,
    #[serde(rename = "pastRaces")]
    pub past_races: &'a [PastRace],
}

impl<'a> From<&'a Horse> for HorseEntry<'a> {
    fn from(horse: &'a Horse) -> Self {
        Self {
            name: &horse.name,
            serei: &horse.sex_age,
            trainer: &horse.trainer,
            father: &horse.sire,
            mother: &horse.dam,
            birthday: &horse.birth_date,
            color: &horse.coat_color,
            past_races: &horse.past_races,
        }
    }
}

/// Every horse of the flat venue view, in order
#[derive(Debug, Serialize)]
pub struct HorseRoster<'a> {
    pub horses: Vec<HorseEntry<'a>>,
}

impl<'a> HorseRoster<'a> {
    pub fn build(data: &'a RaceData) -> Self {
        Self {
            horses: data.horses().map(HorseEntry::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JockeyEntry {
    pub name: String,
    #[serde(flatten)]
    pub detail: JockeyDetail,
}

/// One entry per jockey name, in order of first appearance
#[derive(Debug, Serialize)]
pub struct JockeyRoster {
    pub jockeys: Vec<JockeyEntry>,
}

impl JockeyRoster {
    pub fn build(data: &RaceData) -> Self {
        let mut jockeys: Vec<JockeyEntry> = Vec::new();
        for horse in data.horses() {
            if horse.jockey.is_empty() || jockeys.iter().any(|j| j.name == horse.jockey) {
                continue;
            }
            jockeys.push(JockeyEntry {
                name: horse.jockey.clone(),
                detail: horse.jockey_detail.clone().unwrap_or_default(),
            });
        }
        Self { jockeys }
    }
}

/// The three documents, serialised and ready to write
#[derive(Debug, Clone)]
pub struct OutputDocuments {
    pub race: Vec<u8>,
    pub horses: Vec<u8>,
    pub jockeys: Vec<u8>,
}

impl OutputDocuments {
    pub fn build(data: &RaceData, generated_at: Option<&str>) -> serde_json::Result<Self> {
        Ok(Self {
            race: serde_json::to_vec_pretty(&race_document(data, generated_at)?)?,
            horses: serde_json::to_vec_pretty(&HorseRoster::build(data))?,
            jockeys: serde_json::to_vec_pretty(&JockeyRoster::build(data))?,
        })
    }

    /// Write all three documents; returns the race document's path.
    ///
    /// Every document is staged next to its target before any target is
    /// replaced. If staging fails, the staged copies are removed and the
    /// published files stay as they were.
    pub fn persist(&self, config: &OutputConfig) -> io::Result<PathBuf> {
        let targets: [(PathBuf, &[u8]); 3] = [
            (PathBuf::from(&config.race_json), self.race.as_slice()),
            (PathBuf::from(&config.horse_json), self.horses.as_slice()),
            (PathBuf::from(&config.jockey_json), self.jockeys.as_slice()),
        ];

        let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(targets.len());
        for (path, bytes) in &targets {
            match stage_json(path, bytes) {
                Ok(tmp) => staged.push((tmp, path.as_path())),
                Err(e) => {
                    for (tmp, _) in &staged {
                        let _ = fs::remove_file(tmp);
                    }
                    return Err(e);
                }
            }
        }
        for (tmp, path) in staged {
            fs::rename(tmp, path)?;
        }
        Ok(PathBuf::from(&config.race_json))
    }
}

/// Write to `<path>.tmp`, flush to disk, then rename over `path`.
///
/// Readers see either the previous file or the complete new one.
pub fn write_json_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = stage_json(path, bytes)?;
    fs::rename(&tmp, path)
}

/// Write `bytes` to `<path>.tmp` and flush it; returns the staged path.
fn stage_json(path: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(tmp)
}
