use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::{WeatherError, truncate_body},
    model::{Condition, CurrentWeather, ForecastResponse, RawDay},
};

use super::{ProviderId, WeatherProvider};

const PROVIDER: ProviderId = ProviderId::WeatherApi;
const CURRENT_URL: &str = "http://api.weatherapi.com/v1/current.json";
const FORECAST_URL: &str = "http://api.weatherapi.com/v1/forecast.json";

/// Days of forecast available on the free plan.
const FORECAST_DAYS: &str = "3";

/// WeatherAPI error code for "No matching location found".
const NO_MATCHING_LOCATION: u32 = 1006;

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String) -> Self {
        Self { api_key, http: Client::new() }
    }

    async fn get(&self, url: &str, city: &str, extra: &[(&str, &str)]) -> Result<String, WeatherError> {
        let res = self
            .http
            .get(url)
            .query(&[("key", self.api_key.as_str()), ("q", city)])
            .query(extra)
            .send()
            .await
            .map_err(|source| WeatherError::Network { provider: PROVIDER, source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| WeatherError::Network { provider: PROVIDER, source })?;

        if !status.is_success() {
            if error_code(&body) == Some(NO_MATCHING_LOCATION) {
                return Err(WeatherError::CityNotFound {
                    provider: PROVIDER,
                    city: city.to_string(),
                });
            }

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
impl WeatherProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    async fn daily_forecast(&self, city: &str) -> Result<ForecastResponse, WeatherError> {
        let body = self
            .get(FORECAST_URL, city, &[("days", FORECAST_DAYS), ("aqi", "no"), ("alerts", "no")])
            .await?;
        parse_forecast(&body)
    }

    async fn current_weather(&self, city: &str) -> Result<CurrentWeather, WeatherError> {
        let body = self.get(CURRENT_URL, city, &[]).await?;
        parse_current(&body)
    }
}

/// Parse the body of a `forecast.json` response.
///
/// WeatherAPI already reports one record per local calendar day; `date_epoch`
/// is midnight UTC of that date, so records carry a zero UTC offset.
pub fn parse_forecast(body: &str) -> Result<ForecastResponse, WeatherError> {
    let parsed: WaForecastResponse = serde_json::from_str(body)
        .map_err(|source| WeatherError::Decode { provider: PROVIDER, source })?;

    let list = parsed
        .forecast
        .forecastday
        .into_iter()
        .map(|day| RawDay {
            time: unix_to_utc(day.date_epoch).unwrap_or_else(Utc::now),
            min_c: day.day.mintemp_c,
            max_c: day.day.maxtemp_c,
            condition: condition_from_code(day.day.condition.code),
            description: day.day.condition.text,
        })
        .collect();

    Ok(ForecastResponse {
        city: parsed.location.name,
        utc_offset_secs: 0,
        list,
    })
}

pub fn parse_current(body: &str) -> Result<CurrentWeather, WeatherError> {
    let parsed: WaResponse = serde_json::from_str(body)
        .map_err(|source| WeatherError::Decode { provider: PROVIDER, source })?;

    let ts = parsed.current.last_updated_epoch.or(parsed.location.localtime_epoch);
    let observation_time = ts.and_then(unix_to_utc).unwrap_or_else(Utc::now);

    Ok(CurrentWeather {
        location_name: format!("{}, {}", parsed.location.name, parsed.location.country),
        temperature_c: parsed.current.temp_c,
        feels_like_c: parsed.current.feelslike_c,
        condition: condition_from_code(parsed.current.condition.code),
        description: parsed.current.condition.text,
        humidity_pct: parsed.current.humidity,
        wind_speed_mps: parsed.current.wind_kph / 3.6,
        observation_time,
    })
}

/// Map a WeatherAPI condition code (https://www.weatherapi.com/docs/weather_conditions.json).
fn condition_from_code(code: u16) -> Condition {
    match code {
        1000 => Condition::Clear,
        1003 => Condition::PartlyCloudy,
        1006 | 1009 => Condition::Cloudy,
        1030 | 1135 | 1147 => Condition::Fog,
        1150 | 1153 | 1168 | 1171 => Condition::Drizzle,
        1063 | 1180..=1195 | 1240..=1246 => Condition::Rain,
        1069 | 1072 | 1198 | 1201 | 1204..=1207 | 1237 | 1249..=1252 | 1261 | 1264 => Condition::Sleet,
        1066 | 1114 | 1117 | 1210..=1225 | 1255..=1258 => Condition::Snow,
        1087 | 1273..=1282 => Condition::Thunderstorm,
        _ => Condition::Unknown,
    }
}

fn error_code(body: &str) -> Option<u32> {
    serde_json::from_str::<WaErrorResponse>(body).ok().map(|e| e.error.code)
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
    country: String,
    localtime_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
    code: u16,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    feelslike_c: f64,
    humidity: u8,
    wind_kph: f64,
    condition: WaCondition,
    last_updated_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    location: WaLocation,
    current: WaCurrent,
}

#[derive(Debug, Deserialize)]
struct WaDay {
    maxtemp_c: f64,
    mintemp_c: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    date_epoch: i64,
    day: WaDay,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    location: WaLocation,
    forecast: WaForecast,
}

#[derive(Debug, Deserialize)]
struct WaErrorBody {
    code: u32,
}

#[derive(Debug, Deserialize)]
struct WaErrorResponse {
    error: WaErrorBody,
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORECAST_JSON: &str = r#"{
        "location": { "name": "London", "country": "United Kingdom", "localtime_epoch": 1760605200 },
        "current": {},
        "forecast": {
            "forecastday": [
                {
                    "date": "2025-10-16",
                    "date_epoch": 1760572800,
                    "day": { "maxtemp_c": 16.1, "mintemp_c": 9.4, "condition": { "text": "Sunny", "code": 1000 } }
                },
                {
                    "date": "2025-10-17",
                    "date_epoch": 1760659200,
                    "day": { "maxtemp_c": 13.0, "mintemp_c": 8.2, "condition": { "text": "Patchy rain nearby", "code": 1063 } }
                }
            ]
        }
    }"#;

    const CURRENT_JSON: &str = r#"{
        "location": { "name": "London", "country": "United Kingdom", "localtime_epoch": 1760605200 },
        "current": {
            "last_updated_epoch": 1760604300,
            "temp_c": 12.0,
            "feelslike_c": 10.5,
            "humidity": 77,
            "wind_kph": 18.0,
            "condition": { "text": "Overcast", "code": 1009 }
        }
    }"#;

    #[test]
    fn parses_forecast_days() {
        let forecast = parse_forecast(FORECAST_JSON).expect("valid forecast");

        assert_eq!(forecast.city, "London");
        assert_eq!(forecast.utc_offset_secs, 0);
        assert_eq!(forecast.list.len(), 2);
        assert_eq!(forecast.list[0].condition, Condition::Clear);
        assert_eq!(forecast.list[0].max_c, 16.1);
        assert_eq!(forecast.list[1].condition, Condition::Rain);
        assert_eq!(forecast.list[1].description, "Patchy rain nearby");
    }

    #[test]
    fn parses_current_weather_and_converts_wind() {
        let current = parse_current(CURRENT_JSON).expect("valid current weather");

        assert_eq!(current.location_name, "London, United Kingdom");
        assert_eq!(current.condition, Condition::Cloudy);
        assert_eq!(current.observation_time.timestamp(), 1760604300);
        assert!((current.wind_speed_mps - 5.0).abs() < 1e-9);
    }

    #[test]
    fn recognises_unknown_location_error() {
        let body = r#"{"error":{"code":1006,"message":"No matching location found."}}"#;
        assert_eq!(error_code(body), Some(NO_MATCHING_LOCATION));
        assert_eq!(error_code("not json"), None);
    }

    #[test]
    fn condition_codes_map_to_groups() {
        assert_eq!(condition_from_code(1003), Condition::PartlyCloudy);
        assert_eq!(condition_from_code(1135), Condition::Fog);
        assert_eq!(condition_from_code(1153), Condition::Drizzle);
        assert_eq!(condition_from_code(1207), Condition::Sleet);
        assert_eq!(condition_from_code(1219), Condition::Snow);
        assert_eq!(condition_from_code(1276), Condition::Thunderstorm);
    }
}
