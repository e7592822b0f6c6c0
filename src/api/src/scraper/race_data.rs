//! Scraped race data: day blocks, venue blocks and their JSON shape.
//!
//! Races are stored once, in the flat `venues` list. Day blocks refer to
//! venues by index, so both views always describe the same races.

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::sync::Arc;

use super::parsers::{Horse, Race, Surface};
use crate::error::ScrapeError;

/// Races held at one track on one day
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VenueBlock {
    pub name: String,
    /// Date line as printed on the racecard
    pub label: String,
    /// Display label for the flat view; the venue announcement text when
    /// every venue is scraped
    pub session: String,
    pub races: Vec<Race>,
}

/// Venue blocks sharing a weekday label
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DayBlock {
    pub date: String,
    /// Indices into [`RaceData::venues`]
    pub venues: Vec<usize>,
}

/// Everything one scrape produced
#[derive(Debug, Clone, Default)]
pub struct RaceData {
    pub date: String,
    days: Vec<(String, Arc<DayBlock>)>,
    pub venues: Vec<VenueBlock>,
}

impl RaceData {
    /// One day holding one venue, as parsed from a single racecard page.
    pub fn single(
        date: String,
        day_key: &str,
        day_date: String,
        venue: VenueBlock,
    ) -> Self {
        Self {
            date,
            days: vec![(
                day_key.to_string(),
                Arc::new(DayBlock {
                    date: day_date,
                    venues: vec![0],
                }),
            )],
            venues: vec![venue],
        }
    }

    pub fn day(&self, key: &str) -> Option<&Arc<DayBlock>> {
        self.days.iter().find(|(k, _)| k == key).map(|(_, day)| day)
    }

    /// Day keys in insertion order
    pub fn day_keys(&self) -> impl Iterator<Item = &str> {
        self.days.iter().map(|(k, _)| k.as_str())
    }

    pub fn day_venues<'a>(&'a self, day: &'a DayBlock) -> impl Iterator<Item = &'a VenueBlock> {
        day.venues.iter().filter_map(|&i| self.venues.get(i))
    }

    /// Fold another scrape into this one.
    ///
    /// Days new to `self` are added; venues of an existing day are appended
    /// to it. All of `other`'s venues are appended to the flat list in order.
    pub fn merge(&mut self, other: RaceData) {
        let offset = self.venues.len();
        for (key, day) in other.days {
            let shifted = day.venues.iter().map(|i| i + offset);
            match self.days.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => Arc::make_mut(existing).venues.extend(shifted),
                None => {
                    let block = DayBlock {
                        date: day.date.clone(),
                        venues: shifted.collect(),
                    };
                    self.days.push((key, Arc::new(block)));
                }
            }
        }
        self.venues.extend(other.venues);
    }

    /// Make `key` available, sharing the first day's block when the page
    /// never mentioned that day.
    pub fn alias_day(&mut self, key: &str) -> Result<(), ScrapeError> {
        if self.day(key).is_some() {
            return Ok(());
        }
        let Some((_, first)) = self.days.first() else {
            return Err(ScrapeError::abort(format!(
                "no day parsed; cannot serve requested day {key}"
            )));
        };
        let shared = Arc::clone(first);
        self.days.push((key.to_string(), shared));
        Ok(())
    }

    pub fn horses(&self) -> impl Iterator<Item = &Horse> {
        self.venues
            .iter()
            .flat_map(|v| v.races.iter())
            .flat_map(|r| r.horses.iter())
    }

    pub fn horses_mut(&mut self) -> impl Iterator<Item = &mut Horse> {
        self.venues
            .iter_mut()
            .flat_map(|v| v.races.iter_mut())
            .flat_map(|r| r.horses.iter_mut())
    }
}

#[derive(Serialize)]
struct DayView<'a> {
    date: &'a str,
    venues: Vec<DayVenueView<'a>>,
}

#[derive(Serialize)]
struct DayVenueView<'a> {
    venue: &'a str,
    venue_label: &'a str,
    races: Vec<DayRaceView<'a>>,
}

#[derive(Serialize)]
struct DayRaceView<'a> {
    race_id: &'a str,
    race_number: u32,
    start_time: &'a str,
    title: &'a str,
    course_distance: &'a str,
    surface: &'a Surface,
    horses: &'a [Horse],
}

#[derive(Serialize)]
struct VenueView<'a> {
    name: &'a str,
    session: &'a str,
    races: Vec<RaceView<'a>>,
}

#[derive(Serialize)]
struct RaceView<'a> {
    id: &'a str,
    #[serde(rename = "raceNum")]
    race_num: u32,
    time: &'a str,
    title: &'a str,
    status: &'static str,
    course_distance: &'a str,
    surface: &'a Surface,
    horses: &'a [Horse],
}

impl<'a> DayView<'a> {
    fn new(data: &'a RaceData, day: &'a DayBlock) -> Self {
        let venues = data
            .day_venues(day)
            .map(|v| DayVenueView {
                venue: &v.name,
                venue_label: &v.label,
                races: v
                    .races
                    .iter()
                    .map(|r| DayRaceView {
                        race_id: &r.race_id,
                        race_number: r.race_number,
                        start_time: &r.start_time,
                        title: &r.title,
                        course_distance: &r.course_distance,
                        surface: &r.surface,
                        horses: &r.horses,
                    })
                    .collect(),
            })
            .collect();
        Self {
            date: &day.date,
            venues,
        }
    }
}

impl<'a> VenueView<'a> {
    fn new(venue: &'a VenueBlock) -> Self {
        Self {
            name: &venue.name,
            session: &venue.session,
            races: venue
                .races
                .iter()
                .map(|r| RaceView {
                    id: &r.race_id,
                    race_num: r.race_number,
                    time: &r.start_time,
                    title: &r.title,
                    status: "upcoming",
                    course_distance: &r.course_distance,
                    surface: &r.surface,
                    horses: &r.horses,
                })
                .collect(),
        }
    }
}

struct DaysView<'a>(&'a RaceData);

impl Serialize for DaysView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.0
                .days
                .iter()
                .map(|(key, day)| (key, DayView::new(self.0, day))),
        )
    }
}

impl Serialize for RaceData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let venues: Vec<VenueView<'_>> = self.venues.iter().map(VenueView::new).collect();
        let mut state = serializer.serialize_struct("RaceData", 3)?;
        state.serialize_field("date", &self.date)?;
        state.serialize_field("days", &DaysView(self))?;
        state.serialize_field("venues", &venues)?;
        state.end()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn venue_data(day_key: &str, venue: &str, races: usize) -> RaceData {
        let races = (1..=races as u32)
            .map(|n| Race {
                race_id: format!("{venue}-{n:02}"),
                race_number: n,
                horses: vec![Horse {
                    name: format!("{venue}{n}"),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .collect();
        RaceData::single(
            "2024年12月21日（土）".to_string(),
            day_key,
            format!("{day_key} {venue}"),
            VenueBlock {
                name: venue.to_string(),
                label: format!("{venue} label"),
                session: venue.to_string(),
                races,
            },
        )
    }

    fn venue_names(data: &RaceData) -> Vec<&str> {
        data.venues.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_merge_adds_new_day_and_extends_existing() {
        let mut data = venue_data("saturday", "中山", 2);
        data.merge(venue_data("saturday", "京都", 1));
        data.merge(venue_data("sunday", "中京", 1));

        assert_eq!(venue_names(&data), vec!["中山", "京都", "中京"]);
        assert_eq!(data.day_keys().collect::<Vec<_>>(), vec!["saturday", "sunday"]);

        let saturday = data.day("saturday").unwrap();
        let names: Vec<_> = data.day_venues(saturday).map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["中山", "京都"]);

        let sunday = data.day("sunday").unwrap();
        assert_eq!(sunday.venues, vec![2]);
        assert_eq!(data.date, "2024年12月21日（土）");
    }

    #[test]
    fn test_merge_is_associative_over_venue_order() {
        let a = || venue_data("saturday", "中山", 1);
        let b = || venue_data("sunday", "京都", 2);
        let c = || venue_data("saturday", "中京", 1);

        let mut left = a();
        left.merge(b());
        left.merge(c());

        let mut bc = b();
        bc.merge(c());
        let mut right = a();
        right.merge(bc);

        assert_eq!(left.venues, right.venues);
        assert_eq!(venue_names(&left), vec!["中山", "京都", "中京"]);
        let days = |d: &RaceData| -> Vec<(String, Vec<String>)> {
            d.day_keys()
                .map(|k| {
                    let day = d.day(k).unwrap();
                    let names = d.day_venues(day).map(|v| v.name.clone()).collect();
                    (k.to_string(), names)
                })
                .collect()
        };
        // Day keys may be ordered differently, membership is the same
        let mut l = days(&left);
        let mut r = days(&right);
        l.sort();
        r.sort();
        assert_eq!(l, r);
    }

    #[test]
    fn test_alias_day_shares_first_block() {
        let mut data = venue_data("saturday", "中山", 1);
        data.merge(venue_data("sunday", "京都", 1));
        data.alias_day("monday").unwrap();

        let first = data.day("saturday").unwrap();
        let alias = data.day("monday").unwrap();
        assert!(Arc::ptr_eq(first, alias));

        // Present keys are left alone
        data.alias_day("sunday").unwrap();
        assert_eq!(data.day_keys().count(), 3);
    }

    #[test]
    fn test_alias_day_without_days_aborts() {
        let mut data = RaceData::default();
        let err = data.alias_day("saturday").unwrap_err();
        assert!(err.is_abort());
    }

    #[test]
    fn test_every_day_race_is_in_flat_view() {
        let mut data = venue_data("saturday", "中山", 3);
        data.merge(venue_data("sunday", "京都", 2));
        let flat: Vec<&str> = data
            .venues
            .iter()
            .flat_map(|v| v.races.iter().map(|r| r.race_id.as_str()))
            .collect();
        let mut by_day: Vec<&str> = data
            .day_keys()
            .filter_map(|k| data.day(k))
            .flat_map(|d| data.day_venues(d))
            .flat_map(|v| v.races.iter().map(|r| r.race_id.as_str()))
            .collect();
        by_day.sort();
        let mut flat_sorted = flat.clone();
        flat_sorted.sort();
        assert_eq!(by_day, flat_sorted);
    }

    #[test]
    fn test_json_shape() {
        let data = venue_data("saturday", "中山", 1);
        let json = serde_json::to_value(&data).unwrap();

        let day_race = &json["days"]["saturday"]["venues"][0]["races"][0];
        assert_eq!(json["days"]["saturday"]["venues"][0]["venue"], "中山");
        assert_eq!(json["days"]["saturday"]["venues"][0]["venue_label"], "中山 label");
        assert_eq!(day_race["race_id"], "中山-01");
        assert_eq!(day_race["race_number"], 1);

        let flat = &json["venues"][0];
        assert_eq!(flat["name"], "中山");
        assert_eq!(flat["session"], "中山");
        assert_eq!(flat["races"][0]["id"], "中山-01");
        assert_eq!(flat["races"][0]["raceNum"], 1);
        assert_eq!(flat["races"][0]["status"], "upcoming");
        assert_eq!(flat["races"][0]["horses"][0]["name"], "中山1");
        assert!(flat["races"][0]["horses"][0]["pastRaces"].is_array());
    }
}
