//! Core library for the `forecast` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over weather providers
//! - Turning raw provider records into daily forecast entries
//! - The debounced, latest-wins search pipeline that binds typed city text
//!   to a forecast
//!
//! It is used by `forecast-cli`, but any front end that can push query text
//! and render a [`PipelineState`] can drive it.

pub mod config;
pub mod current;
pub mod error;
pub mod forecast;
pub mod model;
pub mod pipeline;
pub mod provider;

pub use config::{Config, ProviderConfig, SearchSettings};
pub use current::CurrentWeatherView;
pub use error::WeatherError;
pub use forecast::{FetchResult, ForecastEntry, PipelineState, entries_from_response};
pub use model::{Condition, CurrentWeather, ForecastResponse, RawDay};
pub use pipeline::{Observer, PipelineConfig, QueryInput, SearchPipeline};
pub use provider::{ProviderId, WeatherProvider};
