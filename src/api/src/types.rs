//! Request and response types for the racecard API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::scraper::ScrapeRequest;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of `POST /api/update/race`; every field is optional.
///
/// Fields are read independently: a flag of the wrong type is judged by
/// truthiness and a non-string text field is ignored, so one odd value never
/// discards the rest of the body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateRequest {
    /// Day key such as "saturday"
    #[serde(deserialize_with = "lenient_text")]
    pub target: Option<String>,
    /// Venue keyword such as "中山"
    #[serde(deserialize_with = "lenient_text")]
    pub venue: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub url: Option<String>,
    /// Navigate with the browser
    #[serde(deserialize_with = "lenient_flag")]
    pub playwright: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub allow_partial: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub all_venues: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub fetch_horse_detail: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub fetch_jockey_detail: bool,
}

/// Truthiness of any JSON value: null, false, 0, "" and empty containers are false.
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    })
}

/// Strings pass through; anything else reads as absent.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

impl From<UpdateRequest> for ScrapeRequest {
    fn from(req: UpdateRequest) -> Self {
        Self {
            target_day: req.target,
            url: req.url,
            html_path: None,
            allow_partial: req.allow_partial,
            venue: req.venue,
            use_browser: req.playwright,
            all_venues: req.all_venues,
            fetch_horse_detail: req.fetch_horse_detail,
            fetch_jockey_detail: req.fetch_jockey_detail,
        }
    }
}

/// Outcome of an update request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UpdateResponse {
    Ok {
        written_to: String,
        generated_at: String,
    },
    /// Expected, retry-later condition; nothing was written
    Aborted { reason: String },
    Busy { message: String },
    Error { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_request_defaults() {
        let req: UpdateRequest = serde_json::from_str("{}").unwrap();
        assert!(req.target.is_none());
        assert!(!req.playwright);

        let req: UpdateRequest =
            serde_json::from_str(r#"{"target": "saturday", "venue": "中山", "playwright": true}"#)
                .unwrap();
        let scrape = ScrapeRequest::from(req);
        assert_eq!(scrape.target_day.as_deref(), Some("saturday"));
        assert_eq!(scrape.venue.as_deref(), Some("中山"));
        assert!(scrape.use_browser);
        assert!(!scrape.all_venues);
    }

    #[test]
    fn test_odd_flag_values_keep_the_rest_of_the_body() {
        let req: UpdateRequest = serde_json::from_slice(
            br#"{"url": "https://card", "playwright": null, "allow_partial": "true",
                 "all_venues": 0, "fetch_horse_detail": 1, "venue": 5}"#,
        )
        .unwrap();
        assert_eq!(req.url.as_deref(), Some("https://card"));
        assert!(!req.playwright);
        assert!(req.allow_partial);
        assert!(!req.all_venues);
        assert!(req.fetch_horse_detail);
        assert!(req.venue.is_none());

        let req: UpdateRequest =
            serde_json::from_str(r#"{"target": null, "fetch_jockey_detail": []}"#).unwrap();
        assert!(req.target.is_none());
        assert!(!req.fetch_jockey_detail);
    }

    #[test]
    fn test_response_is_tagged_by_status() {
        let ok = UpdateResponse::Ok {
            written_to: "public/server/RaceTest.json".to_string(),
            generated_at: "2024-12-21T09:30:00+09:00".to_string(),
        };
        assert_eq!(
            serde_json::to_value(ok).unwrap(),
            json!({"status": "ok", "written_to": "public/server/RaceTest.json",
                   "generated_at": "2024-12-21T09:30:00+09:00"})
        );
        assert_eq!(
            serde_json::to_value(UpdateResponse::Busy {
                message: "Update already running".to_string()
            })
            .unwrap(),
            json!({"status": "busy", "message": "Update already running"})
        );
    }
}
