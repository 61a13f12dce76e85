use std::{io::Write, sync::Arc, time::Duration};

use anyhow::Context;
use forecast_core::{PipelineConfig, PipelineState, SearchPipeline, WeatherProvider};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::watch,
};
use tracing::{debug, warn};

use crate::render;

/// How long to wait for the last query's forecast once stdin is closed.
const FETCH_GRACE: Duration = Duration::from_secs(10);

/// Feed stdin lines into a search pipeline and print every published state.
pub async fn run(provider: Arc<dyn WeatherProvider>, config: PipelineConfig) -> anyhow::Result<()> {
    eprintln!("Type a city and press Enter. Ctrl-D quits.");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    drive(provider, config, stdin, &mut stdout).await
}

/// Every line of `input` is the new content of the search field. Once the
/// input ends, the forecast of the last non-empty query is still awaited.
async fn drive<R, W>(
    provider: Arc<dyn WeatherProvider>,
    config: PipelineConfig,
    input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let (pipeline, mut updates) = SearchPipeline::watch(provider, config);
    let mut lines = input.lines();
    let mut pending: Option<String> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("Failed to read from stdin")? {
                Some(line) => {
                    let query = line.trim();
                    if !query.is_empty() {
                        pending = Some(query.to_string());
                    }
                    pipeline.submit(query);
                }
                None => break,
            },
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                publish(&mut updates, &mut pending, out)?;
            }
        }
    }

    if let Some(query) = pending.clone() {
        debug!(query = %query, "input closed, waiting for the last forecast");
        let last = async {
            while pending.is_some() {
                if updates.changed().await.is_err() {
                    break;
                }
                publish(&mut updates, &mut pending, &mut *out)?;
            }
            anyhow::Ok(())
        };

        match tokio::time::timeout(config.debounce + FETCH_GRACE, last).await {
            Ok(result) => result?,
            Err(_) => warn!(query = %query, "gave up waiting for the last forecast"),
        }
    }

    pipeline.shutdown().await;
    Ok(())
}

/// Print the latest state. It answers the pending query once its city matches.
fn publish<W: Write>(
    updates: &mut watch::Receiver<PipelineState>,
    pending: &mut Option<String>,
    out: &mut W,
) -> anyhow::Result<()> {
    let state = updates.borrow_and_update().clone();
    if pending.as_deref() == Some(state.city.as_str()) {
        *pending = None;
    }

    write!(out, "{}", render::state(&state)).context("Failed to write to stdout")?;
    out.flush().context("Failed to write to stdout")
}
