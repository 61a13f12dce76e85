use reqwest::StatusCode;
use thiserror::Error;

use crate::provider::ProviderId;

/// Failure of a single weather fetch.
///
/// Produced by providers; the search pipeline turns it into a
/// [`FetchResult::Failure`](crate::forecast::FetchResult) instead of
/// propagating it.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Failed to send request to {provider}: {source}")]
    Network {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} request failed with status {status}: {body}")]
    Status {
        provider: ProviderId,
        status: StatusCode,
        body: String,
    },

    #[error("City '{city}' was not found by {provider}")]
    CityNotFound { provider: ProviderId, city: String },

    #[error("Failed to parse {provider} response: {source}")]
    Decode {
        provider: ProviderId,
        #[source]
        source: serde_json::Error,
    },
}

impl WeatherError {
    pub fn provider(&self) -> ProviderId {
        match self {
            WeatherError::Network { provider, .. }
            | WeatherError::Status { provider, .. }
            | WeatherError::CityNotFound { provider, .. }
            | WeatherError::Decode { provider, .. } => *provider,
        }
    }
}

/// Keep error messages readable when a provider sends back a whole HTML page.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }

    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
