use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalised weather condition shared by all providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Clear,
    MostlyClear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    Sleet,
    Snow,
    Thunderstorm,
    Unknown,
}

impl Condition {
    pub fn emoji(&self) -> &'static str {
        match self {
            Condition::Clear => "☀️",
            Condition::MostlyClear => "🌤️",
            Condition::PartlyCloudy => "⛅",
            Condition::Cloudy => "☁️",
            Condition::Fog => "🌫️",
            Condition::Drizzle => "🌦️",
            Condition::Rain => "🌧️",
            Condition::Sleet => "🌨️",
            Condition::Snow => "❄️",
            Condition::Thunderstorm => "⛈️",
            Condition::Unknown => "❔",
        }
    }
}

/// One raw forecast record as returned by a provider, before any
/// presentation concerns are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDay {
    pub time: DateTime<Utc>,
    pub min_c: f64,
    pub max_c: f64,
    pub condition: Condition,
    pub description: String,
}

/// Raw forecast for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub city: String,
    /// Offset of the city's local time from UTC, in seconds.
    pub utc_offset_secs: i32,
    pub list: Vec<RawDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub location_name: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub condition: Condition,
    pub description: String,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    pub observation_time: DateTime<Utc>,
}
