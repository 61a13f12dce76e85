use std::fmt::Write;

use chrono::Local;
use forecast_core::{CurrentWeatherView, PipelineState};

pub fn state(state: &PipelineState) -> String {
    if state.entries.is_empty() {
        return format!("{}: no forecast available\n", state.city);
    }

    let mut out = format!("{} {}\n", state.emoji, state.city);
    for entry in &state.entries {
        let _ = writeln!(
            out,
            "  {:<10} {}  {:>5.1}°C / {:>5.1}°C  {}",
            entry.label, entry.emoji, entry.min_c, entry.max_c, entry.summary
        );
    }
    out
}

pub fn current(view: &CurrentWeatherView) -> String {
    let observed = view.observed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");

    format!(
        "{} {}\n  {:.1}°C (feels like {:.1}°C), {}\n  humidity {}%, wind {:.1} m/s\n  observed {}\n",
        view.emoji,
        view.location,
        view.temperature_c,
        view.feels_like_c,
        view.summary,
        view.humidity_pct,
        view.wind_speed_mps,
        observed,
    )
}
