//! Turning raw provider records into display-ready forecast entries.

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;

use crate::{
    error::WeatherError,
    model::{ForecastResponse, RawDay},
};

/// One day of forecast, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastEntry {
    pub date: NaiveDate,
    /// Short day label, e.g. "Thu 16 Oct".
    pub label: String,
    pub summary: String,
    pub emoji: String,
    pub min_c: f64,
    pub max_c: f64,
}

impl ForecastEntry {
    /// Build an entry, placing the record on the calendar of a city that is
    /// `utc_offset_secs` away from UTC.
    pub fn from_raw(raw: &RawDay, utc_offset_secs: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_secs).unwrap_or_else(|| Utc.fix());
        let date = raw.time.with_timezone(&offset).date_naive();

        Self {
            date,
            label: date.format("%a %d %b").to_string(),
            summary: raw.description.clone(),
            emoji: raw.condition.emoji().to_string(),
            min_c: raw.min_c,
            max_c: raw.max_c,
        }
    }

    /// Key under which adjacent entries are considered the same day.
    pub fn dedup_key(&self) -> NaiveDate {
        self.date
    }
}

/// Map every raw record to an entry, collapsing runs of entries that share a
/// [`ForecastEntry::dedup_key`] into their first element.
///
/// Only adjacent duplicates are merged; order is preserved.
pub fn entries_from_response(response: &ForecastResponse) -> Vec<ForecastEntry> {
    let mut entries: Vec<ForecastEntry> = response
        .list
        .iter()
        .map(|raw| ForecastEntry::from_raw(raw, response.utc_offset_secs))
        .collect();

    entries.dedup_by_key(|entry| entry.dedup_key());
    entries
}

/// Outcome of one forecast fetch, after transformation.
#[derive(Debug)]
pub enum FetchResult {
    Success(Vec<ForecastEntry>),
    Failure(WeatherError),
}

impl FetchResult {
    pub fn from_fetch(fetched: Result<ForecastResponse, WeatherError>) -> Self {
        match fetched {
            Ok(response) => FetchResult::Success(entries_from_response(&response)),
            Err(err) => FetchResult::Failure(err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success(_))
    }
}

/// What a consumer renders for the current search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineState {
    pub city: String,
    pub emoji: String,
    pub entries: Vec<ForecastEntry>,
}

impl PipelineState {
    /// State for `city` once its fetch has settled. Failures clear the emoji
    /// and entries but keep the city.
    pub fn settled(city: impl Into<String>, result: &FetchResult) -> Self {
        let city = city.into();
        match result {
            FetchResult::Success(entries) => Self {
                city,
                emoji: entries.first().map(|e| e.emoji.clone()).unwrap_or_default(),
                entries: entries.clone(),
            },
            FetchResult::Failure(_) => Self {
                city,
                emoji: String::new(),
                entries: Vec::new(),
            },
        }
    }
}
