//! Racecard (syutsuba) parser for jra.go.jp.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Serialize, Serializer};
use std::sync::LazyLock;

use super::horse::{HorseDetail, PastRace};
use super::jockey::JockeyDetail;
use super::lookup::select_text;
use crate::error::ParseError;
use crate::scraper::race_data::{RaceData, VenueBlock};
use crate::scraper::{resolve_action, resolve_href};

/// Entry in a race
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Horse {
    #[serde(rename = "num")]
    pub number: String,
    #[serde(rename = "waku")]
    pub post_position: String,
    #[serde(rename = "waku_color")]
    pub post_color: String,
    pub name: String,
    #[serde(rename = "serei")]
    pub sex_age: String,
    /// Carried weight, "kg" stripped
    pub weight: String,
    pub jockey: String,
    pub jockey_url: String,
    pub trainer: String,
    pub odds: String,
    #[serde(rename = "bataiju")]
    pub body_weight: String,
    pub detail_url: String,
    // Filled from the horse detail page
    #[serde(rename = "father")]
    pub sire: String,
    #[serde(rename = "mother")]
    pub dam: String,
    #[serde(rename = "birthday")]
    pub birth_date: String,
    #[serde(rename = "color")]
    pub coat_color: String,
    #[serde(rename = "pastRaces")]
    pub past_races: Vec<PastRace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_error: Option<String>,
    /// Filled from the jockey detail page; published through the jockey roster
    #[serde(skip)]
    pub jockey_detail: Option<JockeyDetail>,
}

impl Horse {
    /// Copy detail-page values onto this horse, keeping existing values
    /// wherever the detail page had nothing.
    pub fn merge_detail(&mut self, detail: HorseDetail) {
        overwrite_if_present(&mut self.sire, detail.sire);
        overwrite_if_present(&mut self.dam, detail.dam);
        overwrite_if_present(&mut self.trainer, detail.trainer);
        overwrite_if_present(&mut self.birth_date, detail.birth_date);
        overwrite_if_present(&mut self.coat_color, detail.coat_color);
        overwrite_if_present(&mut self.sex_age, detail.sex_age);
        if !detail.past_races.is_empty() {
            self.past_races = detail.past_races;
        }
    }
}

fn overwrite_if_present(slot: &mut String, value: String) {
    if !value.is_empty() {
        *slot = value;
    }
}

/// Track surface
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Surface {
    Turf,
    Dirt,
    /// Unrecognised course text, kept verbatim
    Other(String),
    #[default]
    Unknown,
}

impl Surface {
    pub fn from_course_text(text: &str) -> Self {
        if text.contains('芝') {
            Surface::Turf
        } else if text.contains("ダート") || text.contains("ﾀﾞｰﾄ") {
            Surface::Dirt
        } else if text.is_empty() {
            Surface::Unknown
        } else {
            Surface::Other(text.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Surface::Turf => "芝",
            Surface::Dirt => "ダート",
            Surface::Other(text) => text,
            Surface::Unknown => "",
        }
    }
}

impl Serialize for Surface {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One race and its entries
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Race {
    /// `{venue}-{NN}`, or the venue alone when the number is unknown
    pub race_id: String,
    pub race_number: u32,
    pub start_time: String,
    pub title: String,
    /// Digits only
    pub course_distance: String,
    pub surface: Surface,
    pub horses: Vec<Horse>,
}

/// Header values of a race block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderField {
    Date,
    StartTime,
    Title,
    Course,
}

const HEADER_FIELDS: &[(HeaderField, &str)] = &[
    (HeaderField::Date, ".race_header .date_line .date"),
    (HeaderField::StartTime, ".race_header .date_line .time strong"),
    (HeaderField::Title, ".race_title .race_name"),
    (HeaderField::Course, ".race_title .type .course"),
];

/// Plain-text cells of an entry row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowField {
    Number,
    Name,
    SexAge,
    Weight,
    Jockey,
    Trainer,
    Odds,
    BodyWeight,
}

const ROW_FIELDS: &[(RowField, &str)] = &[
    (RowField::Number, "td.num"),
    (RowField::Name, "td.horse"),
    (RowField::SexAge, "td.age"),
    (RowField::Weight, "td.weight"),
    (RowField::Jockey, "td.jockey"),
    (RowField::Trainer, "td.trainer"),
    (RowField::Odds, "td.odds"),
    (RowField::BodyWeight, "td.h_weight"),
];

fn compile<F: Copy>(table: &[(F, &str)]) -> Vec<(F, Selector)> {
    table
        .iter()
        .map(|&(field, css)| (field, Selector::parse(css).unwrap()))
        .collect()
}

static HEADER_SELECTORS: LazyLock<Vec<(HeaderField, Selector)>> =
    LazyLock::new(|| compile(HEADER_FIELDS));
static ROW_SELECTORS: LazyLock<Vec<(RowField, Selector)>> =
    LazyLock::new(|| compile(ROW_FIELDS));

static RACE_ITEMS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("ul.syutsuba_unit_list li[id^='syutsuba_']").unwrap()
});
static DATE_LINE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".race_header .date_line").unwrap());
static ROWS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody tr").unwrap());
static WAKU: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td.waku").unwrap());
static WAKU_IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td.waku img").unwrap());
static HORSE_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td.horse a").unwrap());
static JOCKEY_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.jockey a").unwrap());

static RACE_NUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"syutsuba_(\d+)R").unwrap());
static WAKU_ALT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"枠(\d+)(\D*)").unwrap());
static DISTANCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([\d,]+)").unwrap());
static VENUE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"回(.+?)(\d+)日").unwrap());
static BASE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{4}年\d{1,2}月\d{1,2}日（[^）]+）)").unwrap());
static WEEKDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[（(]([月火水木金土日])(?:曜日?)?[）)]").unwrap());

/// Weekday characters and their day keys, checked in this order
const WEEKDAY_KEYS: &[(char, &str)] = &[
    ('土', "saturday"),
    ('日', "sunday"),
    ('月', "monday"),
    ('火', "tuesday"),
    ('水', "wednesday"),
    ('木', "thursday"),
    ('金', "friday"),
];

pub const UNKNOWN_DAY: &str = "unknown";

/// Parser for racecard pages
pub struct RaceCardParser;

impl RaceCardParser {
    /// Parse a racecard page into a single-day, single-venue [`RaceData`].
    pub fn parse(html: &str) -> Result<RaceData, ParseError> {
        let document = Html::parse_document(html);
        let items: Vec<ElementRef<'_>> = document.select(&RACE_ITEMS).collect();
        let Some(first) = items.first() else {
            return Err(ParseError::StructureNotFound("syutsuba_unit_list"));
        };

        let races: Vec<Race> = items.iter().map(|li| Self::parse_race(*li)).collect();

        let date_text = Self::header_text(*first, HeaderField::Date);
        let venue = extract_venue(&date_text);
        let date_line = select_text(*first, &DATE_LINE);
        let venue_label = if date_line.is_empty() {
            date_text.clone()
        } else {
            date_line
        };
        let session = if venue_label.is_empty() {
            venue.clone()
        } else {
            venue_label.clone()
        };

        Ok(RaceData::single(
            extract_base_date(&date_text),
            weekday_key(&date_text),
            date_text,
            VenueBlock {
                name: venue,
                label: venue_label,
                session,
                races,
            },
        ))
    }

    fn header_text(li: ElementRef<'_>, field: HeaderField) -> String {
        HEADER_SELECTORS
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, selector)| select_text(li, selector))
            .unwrap_or_default()
    }

    fn parse_race(li: ElementRef<'_>) -> Race {
        let race_number = li
            .value()
            .attr("id")
            .and_then(|id| RACE_NUM_RE.captures(id))
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(0);

        let date_text = Self::header_text(li, HeaderField::Date);
        let course_text = Self::header_text(li, HeaderField::Course);
        let (course_distance, surface) = parse_course(&course_text);

        let mut venue = extract_venue(&date_text);
        if venue.is_empty() {
            venue = "unknown".to_string();
        }
        let race_id = if race_number > 0 {
            format!("{}-{:02}", venue, race_number)
        } else {
            venue
        };

        let horses = li.select(&ROWS).filter_map(Self::parse_entry_row).collect();

        Race {
            race_id,
            race_number,
            start_time: Self::header_text(li, HeaderField::StartTime),
            title: Self::header_text(li, HeaderField::Title),
            course_distance,
            surface,
            horses,
        }
    }

    fn parse_entry_row(row: ElementRef<'_>) -> Option<Horse> {
        let mut horse = Horse::default();
        for (field, selector) in ROW_SELECTORS.iter() {
            *row_slot(&mut horse, *field) = select_text(row, selector);
        }
        // Header and spacer rows have no horse name
        if horse.name.is_empty() {
            return None;
        }

        horse.weight = clean_kg(&horse.weight);
        horse.body_weight = horse.body_weight.trim().to_string();

        let waku_text = select_text(row, &WAKU);
        let waku_alt = row
            .select(&WAKU_IMG)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .unwrap_or("");
        let (alt_number, alt_color) = parse_waku_alt(waku_alt);
        horse.post_position = if waku_text.is_empty() {
            alt_number
        } else {
            waku_text
        };
        horse.post_color = alt_color;

        horse.detail_url = link_target(row, &HORSE_LINK);
        horse.jockey_url = link_target(row, &JOCKEY_LINK);

        Some(horse)
    }
}

fn row_slot(horse: &mut Horse, field: RowField) -> &mut String {
    match field {
        RowField::Number => &mut horse.number,
        RowField::Name => &mut horse.name,
        RowField::SexAge => &mut horse.sex_age,
        RowField::Weight => &mut horse.weight,
        RowField::Jockey => &mut horse.jockey,
        RowField::Trainer => &mut horse.trainer,
        RowField::Odds => &mut horse.odds,
        RowField::BodyWeight => &mut horse.body_weight,
    }
}

/// Absolute URL behind a link, from `href` or its `doAction` onclick.
fn link_target(row: ElementRef<'_>, selector: &Selector) -> String {
    let Some(link) = row.select(selector).next() else {
        return String::new();
    };
    let href = match link.value().attr("href").unwrap_or("") {
        "#" => "",
        other => other,
    };
    let resolved = resolve_href(href);
    if !resolved.is_empty() {
        return resolved;
    }
    resolve_action(link.value().attr("onclick").unwrap_or(""))
}

/// `"枠3赤"` → `("3", "赤")`
fn parse_waku_alt(alt: &str) -> (String, String) {
    match WAKU_ALT_RE.captures(alt) {
        Some(caps) => (caps[1].to_string(), caps[2].trim().to_string()),
        None => (String::new(), String::new()),
    }
}

/// Distance digits and surface from text such as `"2,000メートル（芝・右）"`.
pub fn parse_course(text: &str) -> (String, Surface) {
    let distance = DISTANCE_RE
        .captures(text)
        .map(|caps| caps[1].replace(',', ""))
        .unwrap_or_default();
    (distance, Surface::from_course_text(text))
}

/// Venue name from a date line such as `"2024年12月21日（土曜）5回中山7日"`.
pub fn extract_venue(text: &str) -> String {
    VENUE_RE
        .captures(text)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

/// `YYYY年M月D日（曜）` prefix of a date line, else the whole text.
pub fn extract_base_date(text: &str) -> String {
    BASE_DATE_RE
        .captures(text)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| text.to_string())
}

/// Day key for a date line.
///
/// The weekday in parentheses wins; otherwise the first weekday character
/// found anywhere in the text, checked Saturday first.
pub fn weekday_key(text: &str) -> &'static str {
    let lookup = |c: char| {
        WEEKDAY_KEYS
            .iter()
            .find(|(k, _)| *k == c)
            .map(|(_, key)| *key)
    };
    if let Some(key) = WEEKDAY_RE
        .captures(text)
        .and_then(|caps| caps[1].chars().next())
        .and_then(lookup)
    {
        return key;
    }
    WEEKDAY_KEYS
        .iter()
        .find(|(c, _)| text.contains(*c))
        .map(|(_, key)| *key)
        .unwrap_or(UNKNOWN_DAY)
}

fn clean_kg(text: &str) -> String {
    text.replace("kg", "").replace("ＫＧ", "").trim().to_string()
}
