//! HTML parsers for jra.go.jp racecard and detail pages.

pub mod horse;
pub mod jockey;
pub mod lookup;
pub mod race_card;

pub use horse::{HorseDetail, HorseParser, PastRace};
pub use jockey::{JockeyDetail, JockeyParser, StatsRecord};
pub use race_card::{Horse, Race, RaceCardParser, Surface};
