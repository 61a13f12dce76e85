use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use forecast_core::{
    Config, CurrentWeatherView, FetchResult, PipelineState, ProviderId, WeatherProvider,
    entries_from_response,
    provider::{default_provider_from_config, provider_from_config},
};
use inquire::{Confirm, Password, PasswordDisplayMode};

use crate::{render, search};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "forecast", version, about = "City forecast search")]
pub struct Cli {
    /// Read and write this config file instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log more (-v debug, -vv trace). Overrides RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Show the daily forecast for a city.
    Daily {
        city: String,

        /// Provider to use instead of the configured default.
        #[arg(long)]
        provider: Option<String>,
    },

    /// Show current conditions for a city.
    Now {
        city: String,

        /// Provider to use instead of the configured default.
        #[arg(long)]
        provider: Option<String>,
    },

    /// Live search: every line read from stdin is the new content of the
    /// search field.
    Search {
        /// Provider to use instead of the configured default.
        #[arg(long)]
        provider: Option<String>,

        /// Override the configured debounce window.
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };
        let mut config = Config::load_from(&config_path)?;

        match self.command {
            Command::Configure { provider } => {
                let id = ProviderId::try_from(provider.as_str())?;
                if configure(&mut config, id)? {
                    config.save_to(&config_path)?;
                    println!("Saved {id} credentials to {}", config_path.display());
                }
            }
            Command::Daily { city, provider } => {
                let provider = resolve_provider(&config, provider.as_deref())?;
                let forecast = provider
                    .daily_forecast(&city)
                    .await
                    .with_context(|| format!("Failed to fetch forecast for '{city}'"))?;

                let result = FetchResult::Success(entries_from_response(&forecast));
                print!("{}", render::state(&PipelineState::settled(city, &result)));
            }
            Command::Now { city, provider } => {
                let provider = resolve_provider(&config, provider.as_deref())?;
                let view = CurrentWeatherView::load(provider.as_ref(), &city)
                    .await
                    .with_context(|| format!("Failed to fetch current weather for '{city}'"))?;

                print!("{}", render::current(&view));
            }
            Command::Search { provider, debounce_ms } => {
                let provider = resolve_provider(&config, provider.as_deref())?;
                let mut pipeline_config = config.pipeline_config();
                if let Some(ms) = debounce_ms {
                    pipeline_config.debounce = Duration::from_millis(ms);
                }

                search::run(provider, pipeline_config).await?;
            }
        }

        Ok(())
    }
}

fn resolve_provider(
    config: &Config,
    provider: Option<&str>,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    match provider {
        Some(name) => provider_from_config(ProviderId::try_from(name)?, config),
        None => default_provider_from_config(config),
    }
}

/// Prompt for the API key of `id`. Returns whether the config changed.
fn configure(config: &mut Config, id: ProviderId) -> anyhow::Result<bool> {
    if config.is_provider_configured(id) {
        let replace = Confirm::new(&format!("An API key for {id} is already stored. Replace it?"))
            .with_default(false)
            .prompt()?;
        if !replace {
            return Ok(false);
        }
    }

    let api_key = Password::new(&format!("{id} API key:"))
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()?;
    let api_key = api_key.trim();
    if api_key.is_empty() {
        bail!("API key for '{id}' must not be empty");
    }

    let previous_default = config.default_provider_id().ok();
    config.upsert_provider_api_key(id, api_key.to_string());

    if let Some(current) = previous_default.filter(|current| *current != id) {
        let make_default = Confirm::new(&format!(
            "Default provider is {current}. Make {id} the default instead?"
        ))
        .with_default(false)
        .prompt()?;
        if make_default {
            config.set_default_provider(id);
        }
    }

    Ok(true)
}
