//! DOM lookups shared by the detail-page parsers.
//!
//! Detail pages are inconsistent: the same value can sit in a `th`/`td`
//! table or a `dt`/`dd` list, and history/stats tables move their columns
//! around. These helpers locate values by label and columns by header
//! keyword instead of by position.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static TH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
static THEAD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("thead").unwrap());
static TBODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody").unwrap());

/// Column headers plus rows of cells, as shown on the page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Text of an element with every fragment trimmed and concatenated.
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

/// Text of the first match of `selector` under `element`, or empty.
pub fn select_text(element: ElementRef<'_>, selector: &Selector) -> String {
    element.select(selector).next().map(text_of).unwrap_or_default()
}

/// Whole-page text, fragments trimmed and joined by single spaces.
pub fn page_text(document: &Html) -> String {
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Value next to the first heading (`th` or `dt`) containing one of `labels`.
///
/// Labels are tried in order. For each label only the first heading that
/// contains it is considered; its value is the next `td` (for `th`) or `dd`
/// (for `dt`) in document order. Returns an empty string when nothing matches.
pub fn lookup_labeled_value(document: &Html, labels: &[&str]) -> String {
    let elements: Vec<ElementRef<'_>> = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .collect();

    for label in labels {
        let heading = elements.iter().position(|el| {
            matches!(el.value().name(), "th" | "dt") && el.text().collect::<String>().contains(label)
        });
        let Some(pos) = heading else {
            continue;
        };

        let value_tag = if elements[pos].value().name() == "th" {
            "td"
        } else {
            "dd"
        };
        if let Some(value) = elements[pos + 1..]
            .iter()
            .find(|el| el.value().name() == value_tag)
        {
            return text_of(*value);
        }
    }

    String::new()
}

/// Index of the first header containing any of `keywords`.
pub fn column_index(headers: &[String], keywords: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| keywords.iter().any(|kw| h.contains(kw)))
}

/// Cell `idx` of a row, or empty when the column is unknown or the row is short.
pub fn cell_at(cells: &[String], idx: Option<usize>) -> String {
    idx.and_then(|i| cells.get(i)).cloned().unwrap_or_default()
}

/// Header cells of `table`: its `thead` row, else the first row made up
/// only of `th` cells. Label/value rows (`th` then `td`) are not headers.
pub fn header_row(table: ElementRef<'_>) -> Vec<String> {
    if let Some(thead) = table.select(&THEAD).next() {
        return thead.select(&TH).map(text_of).collect();
    }
    table
        .select(&TR)
        .map(|tr| tr.select(&CELL).collect::<Vec<_>>())
        .find(|cells| !cells.is_empty() && cells.iter().all(|c| c.value().name() == "th"))
        .map(|cells| cells.into_iter().map(text_of).collect())
        .unwrap_or_default()
}

/// First table whose header row mentions any of `keywords`, with that row.
pub fn find_table_by_headers<'a>(
    document: &'a Html,
    keywords: &[&str],
) -> Option<(ElementRef<'a>, Vec<String>)> {
    document.select(&TABLE).find_map(|table| {
        let headers = header_row(table);
        let hit = headers
            .iter()
            .any(|h| keywords.iter().any(|kw| h.contains(kw)));
        hit.then_some((table, headers))
    })
}

/// Cell texts of every row in `table`, header rows included.
pub fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    table
        .select(&TR)
        .map(|tr| tr.select(&CELL).map(text_of).collect())
        .collect()
}

/// Stats table inside `div#{container_id}`.
///
/// Headers come from [`header_row`], minus the `excluded` aggregate columns;
/// those columns are cut from every body row too. Body rows are dropped when
/// their first cell is empty, excluded or repeats the first header, or when
/// the whole row repeats the header row.
pub fn extract_stats_table(
    document: &Html,
    container_id: &str,
    excluded: &[&str],
) -> Option<StatsTable> {
    let selector = Selector::parse(&format!("div#{container_id} table")).ok()?;
    let table = document.select(&selector).next()?;

    let raw_headers = header_row(table);
    let header_label = raw_headers.first().cloned().unwrap_or_default();
    let dropped: Vec<usize> = raw_headers
        .iter()
        .enumerate()
        .filter(|(_, h)| excluded.contains(&h.as_str()))
        .map(|(i, _)| i)
        .collect();
    let keep_columns = |cells: Vec<String>| -> Vec<String> {
        cells
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !dropped.contains(i))
            .map(|(_, cell)| cell)
            .collect()
    };
    let headers = keep_columns(raw_headers);

    let candidates: Vec<ElementRef<'_>> = match table.select(&TBODY).next() {
        Some(tbody) => tbody.select(&TR).collect(),
        None => table.select(&TR).collect(),
    };

    let rows = candidates
        .into_iter()
        .filter(|tr| !inside_thead(*tr))
        .map(|tr| keep_columns(tr.select(&CELL).map(text_of).collect()))
        .filter(|cells| match cells.first() {
            None => false,
            Some(first) => {
                !first.is_empty()
                    && !excluded.contains(&first.as_str())
                    && !(!header_label.is_empty() && *first == header_label)
                    && !(!headers.is_empty() && *cells == headers)
            }
        })
        .collect();

    Some(StatsTable { headers, rows })
}

fn inside_thead(row: ElementRef<'_>) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|el| el.value().name() == "thead")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_th_and_dt() {
        let html = Html::parse_document(
            r#"<table><tr><th>生年月日</th><td> 2019年3月1日 </td></tr></table>
               <dl><dt>毛色</dt><dd>鹿毛</dd></dl>"#,
        );
        assert_eq!(lookup_labeled_value(&html, &["生年月日"]), "2019年3月1日");
        assert_eq!(lookup_labeled_value(&html, &["毛色"]), "鹿毛");
        assert_eq!(lookup_labeled_value(&html, &["馬主"]), "");
    }

    #[test]
    fn test_lookup_tries_labels_in_order() {
        let html = Html::parse_document(
            r#"<dl><dt>父馬</dt><dd>キタサンブラック</dd></dl>"#,
        );
        assert_eq!(lookup_labeled_value(&html, &["父母", "父馬"]), "キタサンブラック");
    }

    #[test]
    fn test_column_index_first_match() {
        let headers: Vec<String> = ["年月日", "場", "レース名", "馬場"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(column_index(&headers, &["場"]), Some(1));
        assert_eq!(column_index(&headers, &["馬場"]), Some(3));
        assert_eq!(column_index(&headers, &["タイム"]), None);
    }

    #[test]
    fn test_cell_at_out_of_range() {
        let cells = vec!["a".to_string()];
        assert_eq!(cell_at(&cells, Some(0)), "a");
        assert_eq!(cell_at(&cells, Some(3)), "");
        assert_eq!(cell_at(&cells, None), "");
    }

    #[test]
    fn test_stats_table_without_thead_uses_first_row() {
        let html = Html::parse_document(
            r#"<div id="rec"><table>
                 <tr><th>年度</th><th>1着</th><th>総合計</th></tr>
                 <tr><td>2025</td><td>10</td><td>99</td></tr>
               </table></div>"#,
        );
        let table = extract_stats_table(&html, "rec", &["総合計"]).unwrap();
        // html5ever wraps both rows in an implied tbody; the header copy is dropped
        assert_eq!(table.headers, vec!["年度", "1着"]);
        assert_eq!(table.rows, vec![vec!["2025", "10"]]);
    }

    #[test]
    fn test_header_row_ignores_label_value_rows() {
        let html = Html::parse_document(
            r#"<table id="profile"><tr><th>生年月日</th><td>2017年3月10日</td></tr></table>
               <table id="history">
                 <tr><th>年月日</th><th>レース名</th></tr>
                 <tr><td>2021年12月26日</td><td>有馬記念</td></tr>
               </table>"#,
        );
        let (table, headers) = find_table_by_headers(&html, &["年月日"]).unwrap();
        assert_eq!(table.value().id(), Some("history"));
        assert_eq!(headers, vec!["年月日", "レース名"]);

        let profile = html
            .select(&Selector::parse("#profile").unwrap())
            .next()
            .unwrap();
        assert!(header_row(profile).is_empty());
    }

    #[test]
    fn test_stats_table_missing() {
        let html = Html::parse_document("<div id='other'><table></table></div>");
        assert!(extract_stats_table(&html, "rec", &[]).is_none());
    }
}
