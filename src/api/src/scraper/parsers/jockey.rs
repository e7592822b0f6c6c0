//! Jockey detail page parser for jra.go.jp.

use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::lookup::{extract_stats_table, lookup_labeled_value, page_text, StatsTable};

/// Performance record as found on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatsRecord {
    Table(StatsTable),
    /// Inline text when the page has no table
    Summary(String),
}

/// Jockey profile data
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JockeyDetail {
    #[serde(rename = "birthday")]
    pub birth_date: String,
    pub height: String,
    pub weight: String,
    pub first_license: String,
    pub stats_current: Option<StatsRecord>,
    pub stats_total: Option<StatsRecord>,
}

impl JockeyDetail {
    /// Neither a birth date nor current-season stats were found.
    pub fn is_sparse(&self) -> bool {
        self.birth_date.is_empty() && self.stats_current.is_none()
    }
}

/// Aggregate-only labels left out of stats tables
const STATS_EXCLUDED: &[&str] = &["地方", "海外", "総合計"];
const CURRENT_STATS_ID: &str = "year_record";
const TOTAL_STATS_ID: &str = "total_record";

const BIRTH_LABELS: &[&str] = &["生年月日", "生れ"];
const HEIGHT_LABELS: &[&str] = &["身長", "身長(cm)"];
const WEIGHT_LABELS: &[&str] = &["体重", "体重(kg)"];
const LICENSE_LABELS: &[&str] = &["初免許年", "初騎乗年", "免許年"];

static BIRTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}年\d{1,2}月\d{1,2}日)").unwrap());
static HEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"身長[:：]?\s*([0-9]+\.?[0-9]*)").unwrap());
static WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"体重[:：]?\s*([0-9]+\.?[0-9]*)").unwrap());
static LICENSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:初免許年|免許年|初騎乗年)[:：]?\s*([0-9]{4})").unwrap());
static CURRENT_SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"本年成績[:：]?\s*(\S+)").unwrap());
static TOTAL_SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:累計成績|通算成績)[:：]?\s*(\S+)").unwrap());

/// Parser for jockey detail pages
pub struct JockeyParser;

impl JockeyParser {
    /// Parse a jockey detail page. Missing values stay empty.
    pub fn parse(html: &str) -> JockeyDetail {
        let document = Html::parse_document(html);

        let mut detail = JockeyDetail {
            birth_date: lookup_labeled_value(&document, BIRTH_LABELS),
            height: lookup_labeled_value(&document, HEIGHT_LABELS),
            weight: lookup_labeled_value(&document, WEIGHT_LABELS),
            first_license: lookup_labeled_value(&document, LICENSE_LABELS),
            stats_current: extract_stats_table(&document, CURRENT_STATS_ID, STATS_EXCLUDED)
                .map(StatsRecord::Table),
            stats_total: extract_stats_table(&document, TOTAL_STATS_ID, STATS_EXCLUDED)
                .map(StatsRecord::Table),
        };

        // Markup differs between pages; fall back to the page text
        let text = page_text(&document);
        fill_from_text(&mut detail.birth_date, &BIRTH_RE, &text);
        fill_from_text(&mut detail.height, &HEIGHT_RE, &text);
        fill_from_text(&mut detail.weight, &WEIGHT_RE, &text);
        fill_from_text(&mut detail.first_license, &LICENSE_RE, &text);
        if detail.stats_current.is_none() {
            detail.stats_current = first_capture(&CURRENT_SUMMARY_RE, &text).map(StatsRecord::Summary);
        }
        if detail.stats_total.is_none() {
            detail.stats_total = first_capture(&TOTAL_SUMMARY_RE, &text).map(StatsRecord::Summary);
        }

        detail
    }
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|caps| caps[1].to_string())
}

fn fill_from_text(slot: &mut String, re: &Regex, text: &str) {
    if slot.is_empty() {
        if let Some(value) = first_capture(re, text) {
            *slot = value;
        }
    }
}
