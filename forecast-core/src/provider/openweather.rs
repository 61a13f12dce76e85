use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{
    error::{WeatherError, truncate_body},
    model::{Condition, CurrentWeather, ForecastResponse, RawDay},
};

use super::{ProviderId, WeatherProvider};

const PROVIDER: ProviderId = ProviderId::OpenWeather;
const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: Client::new(),
        }
    }

    async fn get(&self, url: &str, city: &str) -> Result<String, WeatherError> {
        let res = self
            .http
            .get(url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|source| WeatherError::Network { provider: PROVIDER, source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| WeatherError::Network { provider: PROVIDER, source })?;

        if status == StatusCode::NOT_FOUND {
            return Err(WeatherError::CityNotFound {
                provider: PROVIDER,
                city: city.to_string(),
            });
        }

        if !status.is_success() {
            return Err(WeatherError::Status {
                provider: PROVIDER,
                status,
                body: truncate_body(&body),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    async fn daily_forecast(&self, city: &str) -> Result<ForecastResponse, WeatherError> {
        let body = self.get(FORECAST_URL, city).await?;
        parse_forecast(&body)
    }

    async fn current_weather(&self, city: &str) -> Result<CurrentWeather, WeatherError> {
        let body = self.get(CURRENT_URL, city).await?;
        parse_current(&body)
    }
}

/// Parse the body of a 5-day / 3-hour forecast response.
pub fn parse_forecast(body: &str) -> Result<ForecastResponse, WeatherError> {
    let parsed: OwForecastResponse = serde_json::from_str(body)
        .map_err(|source| WeatherError::Decode { provider: PROVIDER, source })?;

    let list = parsed
        .list
        .into_iter()
        .map(|entry| {
            let (condition, description) = first_condition(&entry.weather);
            RawDay {
                time: unix_to_utc(entry.dt).unwrap_or_else(Utc::now),
                min_c: entry.main.temp_min,
                max_c: entry.main.temp_max,
                condition,
                description,
            }
        })
        .collect();

    Ok(ForecastResponse {
        city: parsed.city.name,
        utc_offset_secs: parsed.city.timezone,
        list,
    })
}

pub fn parse_current(body: &str) -> Result<CurrentWeather, WeatherError> {
    let parsed: OwCurrentResponse = serde_json::from_str(body)
        .map_err(|source| WeatherError::Decode { provider: PROVIDER, source })?;

    let (condition, description) = first_condition(&parsed.weather);

    Ok(CurrentWeather {
        location_name: parsed.name,
        temperature_c: parsed.main.temp,
        feels_like_c: parsed.main.feels_like,
        condition,
        description,
        humidity_pct: parsed.main.humidity,
        wind_speed_mps: parsed.wind.speed,
        observation_time: unix_to_utc(parsed.dt).unwrap_or_else(Utc::now),
    })
}

/// Map an OpenWeather condition id (https://openweathermap.org/weather-conditions).
fn condition_from_id(id: u16) -> Condition {
    match id {
        200..=299 => Condition::Thunderstorm,
        300..=399 => Condition::Drizzle,
        511 | 611..=616 => Condition::Sleet,
        500..=599 => Condition::Rain,
        600..=699 => Condition::Snow,
        700..=799 => Condition::Fog,
        800 => Condition::Clear,
        801 => Condition::MostlyClear,
        802 => Condition::PartlyCloudy,
        803 | 804 => Condition::Cloudy,
        _ => Condition::Unknown,
    }
}

fn first_condition(weather: &[OwWeather]) -> (Condition, String) {
    weather
        .first()
        .map(|w| (condition_from_id(w.id), w.description.clone()))
        .unwrap_or_else(|| (Condition::Unknown, "Unknown".to_string()))
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: u16,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    name: String,
    #[serde(default)]
    timezone: i32,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: OwCity,
    list: Vec<OwForecastEntry>,
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}
