//! Horse detail page parser for jra.go.jp.

use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::lookup::{
    cell_at, column_index, find_table_by_headers, lookup_labeled_value, page_text, table_rows,
};

/// Past race record, kept as the page shows it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PastRace {
    pub date: String,
    pub venue: String,
    pub title: String,
    pub distance: String,
    pub track: String,
    #[serde(rename = "total")]
    pub field_size: String,
    pub popularity: String,
    pub rank: String,
    pub jockey: String,
    pub weight: String,
    #[serde(rename = "bataiju")]
    pub body_weight: String,
    pub time: String,
    pub winner: String,
}

/// Values found on a horse detail page. Empty means "not found".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HorseDetail {
    pub sire: String,
    pub dam: String,
    pub trainer: String,
    pub birth_date: String,
    pub coat_color: String,
    pub sex_age: String,
    pub past_races: Vec<PastRace>,
}

impl HorseDetail {
    /// Nothing that identifies the horse's background was found.
    pub fn lacks_pedigree_and_history(&self) -> bool {
        self.sire.is_empty() && self.past_races.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileField {
    Sire,
    Dam,
    Trainer,
    BirthDate,
    CoatColor,
    SexAge,
}

/// Label texts for each profile value, tried in order
const PROFILE_LABELS: &[(ProfileField, &[&str])] = &[
    (ProfileField::Sire, &["父", "父馬"]),
    (ProfileField::Dam, &["母", "母馬"]),
    (ProfileField::Trainer, &["調教師"]),
    (ProfileField::BirthDate, &["生年月日"]),
    (ProfileField::CoatColor, &["毛色"]),
    (ProfileField::SexAge, &["性齢", "性別・年齢"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryColumn {
    Date,
    Venue,
    Title,
    Distance,
    Track,
    FieldSize,
    Popularity,
    Rank,
    Jockey,
    Weight,
    BodyWeight,
    Time,
    Winner,
}

/// A table is the race history when its header row mentions one of these
const HISTORY_TABLE_KEYWORDS: &[&str] = &["年月日", "レース名", "距離"];

/// Header keywords for each history column
const HISTORY_COLUMNS: &[(HistoryColumn, &[&str])] = &[
    (HistoryColumn::Date, &["年月日"]),
    (HistoryColumn::Venue, &["場"]),
    (HistoryColumn::Title, &["レース名"]),
    (HistoryColumn::Distance, &["距離"]),
    (HistoryColumn::Track, &["馬場"]),
    (HistoryColumn::FieldSize, &["頭数"]),
    (HistoryColumn::Popularity, &["人気"]),
    (HistoryColumn::Rank, &["着順"]),
    (HistoryColumn::Jockey, &["騎手"]),
    (HistoryColumn::Weight, &["負担"]),
    (HistoryColumn::BodyWeight, &["馬体重"]),
    (HistoryColumn::Time, &["タイム"]),
    (HistoryColumn::Winner, &["1着", "１着", "着馬", "RT"]),
];

static BIRTH_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"生年月日[:：]?\s*(\d{4}年\d{1,2}月\d{1,2}日)").unwrap());

/// Parser for horse detail pages
pub struct HorseParser;

impl HorseParser {
    /// Parse a horse detail page. Missing values stay empty.
    pub fn parse(html: &str) -> HorseDetail {
        let document = Html::parse_document(html);
        let mut detail = HorseDetail::default();

        for (field, labels) in PROFILE_LABELS {
            *profile_slot(&mut detail, *field) = lookup_labeled_value(&document, labels);
        }

        if detail.birth_date.is_empty() {
            if let Some(caps) = BIRTH_DATE_RE.captures(&page_text(&document)) {
                detail.birth_date = caps[1].to_string();
            }
        }

        detail.past_races = Self::parse_past_races(&document);
        detail
    }

    fn parse_past_races(document: &Html) -> Vec<PastRace> {
        let Some((table, headers)) = find_table_by_headers(document, HISTORY_TABLE_KEYWORDS)
        else {
            return Vec::new();
        };

        let columns: Vec<(HistoryColumn, Option<usize>)> = HISTORY_COLUMNS
            .iter()
            .map(|(column, keywords)| (*column, column_index(&headers, keywords)))
            .collect();

        table_rows(table)
            .into_iter()
            .filter(|cells| !cells.is_empty() && *cells != headers)
            .map(|cells| {
                let mut race = PastRace::default();
                for (column, idx) in &columns {
                    *history_slot(&mut race, *column) = cell_at(&cells, *idx);
                }
                race
            })
            .collect()
    }
}

fn profile_slot(detail: &mut HorseDetail, field: ProfileField) -> &mut String {
    match field {
        ProfileField::Sire => &mut detail.sire,
        ProfileField::Dam => &mut detail.dam,
        ProfileField::Trainer => &mut detail.trainer,
        ProfileField::BirthDate => &mut detail.birth_date,
        ProfileField::CoatColor => &mut detail.coat_color,
        ProfileField::SexAge => &mut detail.sex_age,
    }
}

fn history_slot(race: &mut PastRace, column: HistoryColumn) -> &mut String {
    match column {
        HistoryColumn::Date => &mut race.date,
        HistoryColumn::Venue => &mut race.venue,
        HistoryColumn::Title => &mut race.title,
        HistoryColumn::Distance => &mut race.distance,
        HistoryColumn::Track => &mut race.track,
        HistoryColumn::FieldSize => &mut race.field_size,
        HistoryColumn::Popularity => &mut race.popularity,
        HistoryColumn::Rank => &mut race.rank,
        HistoryColumn::Jockey => &mut race.jockey,
        HistoryColumn::Weight => &mut race.weight,
        HistoryColumn::BodyWeight => &mut race.body_weight,
        HistoryColumn::Time => &mut race.time,
        HistoryColumn::Winner => &mut race.winner,
    }
}
