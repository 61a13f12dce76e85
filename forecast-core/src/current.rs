use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::WeatherError, model::CurrentWeather, provider::WeatherProvider};

/// Current conditions for a city, shaped for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentWeatherView {
    pub location: String,
    pub emoji: String,
    pub summary: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    pub observed_at: DateTime<Utc>,
}

impl CurrentWeatherView {
    /// Fetch current conditions for `city` from the same provider the
    /// forecast search uses.
    pub async fn load(provider: &dyn WeatherProvider, city: &str) -> Result<Self, WeatherError> {
        let current = provider.current_weather(city).await?;
        Ok(Self::from(current))
    }
}

impl From<CurrentWeather> for CurrentWeatherView {
    fn from(current: CurrentWeather) -> Self {
        Self {
            location: current.location_name,
            emoji: current.condition.emoji().to_string(),
            summary: current.description,
            temperature_c: current.temperature_c,
            feels_like_c: current.feels_like_c,
            humidity_pct: current.humidity_pct,
            wind_speed_mps: current.wind_speed_mps,
            observed_at: current.observation_time,
        }
    }
}
