//! Debounced, latest-wins forecast search.
//!
//! Query text flows through two tasks:
//!
//! - the debounce task drops empty queries and forwards a query only once no
//!   newer one has arrived for [`PipelineConfig::debounce`];
//! - the coordinator starts one fetch per forwarded query, tags it with a
//!   sequence number, and publishes only the completion of the most recently
//!   started fetch. Late completions of superseded fetches are discarded.
//!
//! The coordinator is the only place the [`Observer`] is called from, so
//! consumers never see concurrent updates.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    task::{JoinHandle, JoinSet},
    time::{Instant, sleep_until},
};
use tracing::{debug, warn};

use crate::{
    forecast::{FetchResult, PipelineState},
    provider::WeatherProvider,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Quiet period required before a query is fetched.
    pub debounce: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { debounce: DEFAULT_DEBOUNCE }
    }
}

/// Receives every settled update of a pipeline.
pub trait Observer<T>: Send + 'static {
    fn notify(&mut self, value: &T);
}

impl<T, F> Observer<T> for F
where
    F: FnMut(&T) + Send + 'static,
{
    fn notify(&mut self, value: &T) {
        self(value)
    }
}

/// Cloneable handle for feeding query text into a running pipeline.
#[derive(Debug, Clone)]
pub struct QueryInput {
    tx: mpsc::UnboundedSender<String>,
}

impl QueryInput {
    /// Push the current text of the search field. Returns `false` once the
    /// pipeline has been shut down.
    pub fn submit(&self, query: impl Into<String>) -> bool {
        self.tx.send(query.into()).is_ok()
    }
}

/// A running search pipeline. Dropping it tears the pipeline down.
#[derive(Debug)]
pub struct SearchPipeline {
    input: QueryInput,
    tasks: Vec<JoinHandle<()>>,
}

impl SearchPipeline {
    /// Start the pipeline on the current tokio runtime.
    pub fn spawn<O>(provider: Arc<dyn WeatherProvider>, config: PipelineConfig, observer: O) -> Self
    where
        O: Observer<PipelineState>,
    {
        let (query_tx, query_rx) = mpsc::unbounded_channel();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();

        let debounce = tokio::spawn(debounce_queries(query_rx, settled_tx, config.debounce));
        let coordinator = tokio::spawn(run_fetches(provider, settled_rx, observer));

        Self {
            input: QueryInput { tx: query_tx },
            tasks: vec![debounce, coordinator],
        }
    }

    /// Start the pipeline publishing into a watch channel, which always holds
    /// the latest settled state.
    pub fn watch(
        provider: Arc<dyn WeatherProvider>,
        config: PipelineConfig,
    ) -> (Self, watch::Receiver<PipelineState>) {
        let (tx, rx) = watch::channel(PipelineState::default());
        let pipeline = Self::spawn(provider, config, move |state: &PipelineState| {
            tx.send_replace(state.clone());
        });
        (pipeline, rx)
    }

    pub fn input(&self) -> QueryInput {
        self.input.clone()
    }

    pub fn submit(&self, query: impl Into<String>) -> bool {
        self.input.submit(query)
    }

    /// Stop both pipeline tasks and wait for them to finish. In-flight
    /// fetches are owned by the coordinator and go down with it.
    pub async fn shutdown(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "search pipeline task failed");
                }
            }
        }
        debug!("search pipeline shut down");
    }
}

impl Drop for SearchPipeline {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

async fn debounce_queries(
    mut raw: mpsc::UnboundedReceiver<String>,
    settled: mpsc::UnboundedSender<String>,
    window: Duration,
) {
    let mut pending: Option<(String, Instant)> = None;

    loop {
        let next = match pending.as_ref().map(|(_, deadline)| *deadline) {
            None => raw.recv().await,
            Some(deadline) => tokio::select! {
                next = raw.recv() => next,
                () = sleep_until(deadline) => {
                    if let Some((query, _)) = pending.take() {
                        debug!(query = %query, "query settled");
                        if settled.send(query).is_err() {
                            break;
                        }
                    }
                    continue;
                }
            },
        };

        match next {
            // Empty text never starts or restarts the window.
            Some(query) if query.is_empty() => {}
            Some(query) => {
                if let Some((superseded, _)) = pending.replace((query, Instant::now() + window)) {
                    debug!(query = %superseded, "query superseded before settling");
                }
            }
            None => break,
        }
    }
}

async fn run_fetches<O>(
    provider: Arc<dyn WeatherProvider>,
    mut settled: mpsc::UnboundedReceiver<String>,
    mut observer: O,
) where
    O: Observer<PipelineState>,
{
    let mut latest: u64 = 0;
    let mut fetches: JoinSet<(u64, String, FetchResult)> = JoinSet::new();
    let mut input_open = true;

    loop {
        tokio::select! {
            query = settled.recv(), if input_open => match query {
                Some(city) => {
                    latest += 1;
                    let seq = latest;
                    debug!(seq, city = %city, provider = %provider.id(), "starting forecast fetch");

                    let provider = Arc::clone(&provider);
                    fetches.spawn(async move {
                        let result = FetchResult::from_fetch(provider.daily_forecast(&city).await);
                        (seq, city, result)
                    });
                }
                None => input_open = false,
            },
            Some(joined) = fetches.join_next(), if !fetches.is_empty() => match joined {
                Ok((seq, city, result)) => {
                    if seq != latest {
                        debug!(seq, latest, city = %city, "discarding superseded forecast");
                        continue;
                    }

                    debug!(seq, city = %city, success = result.is_success(), "forecast fetch settled");
                    if let FetchResult::Failure(err) = &result {
                        warn!(city = %city, provider = %err.provider(), error = %err, "forecast fetch failed");
                    }

                    observer.notify(&PipelineState::settled(city, &result));
                }
                Err(err) => warn!(error = %err, "forecast fetch task failed"),
            },
            else => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::WeatherError,
        model::{Condition, CurrentWeather, ForecastResponse, RawDay},
        provider::ProviderId,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
    };
    use tokio::time::sleep;

    const DAY: i64 = 86_400;
    const START: i64 = 1_760_616_000;

    #[derive(Debug, Default)]
    struct ScriptedProvider {
        calls: Mutex<Vec<String>>,
        delays: HashMap<String, Duration>,
        unknown: HashSet<String>,
        broken: HashSet<String>,
    }

    impl ScriptedProvider {
        fn with_delay(mut self, city: &str, delay: Duration) -> Self {
            self.delays.insert(city.to_string(), delay);
            self
        }

        fn with_broken(mut self, city: &str) -> Self {
            self.broken.insert(city.to_string());
            self
        }

        fn with_unknown(mut self, city: &str) -> Self {
            self.unknown.insert(city.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WeatherProvider for ScriptedProvider {
        fn id(&self) -> ProviderId {
            ProviderId::OpenWeather
        }

        async fn daily_forecast(&self, city: &str) -> Result<ForecastResponse, WeatherError> {
            self.calls.lock().unwrap().push(city.to_string());

            if let Some(delay) = self.delays.get(city) {
                sleep(*delay).await;
            }

            if self.broken.contains(city) {
                panic!("provider blew up for {city}");
            }

            if self.unknown.contains(city) {
                return Err(WeatherError::CityNotFound {
                    provider: ProviderId::OpenWeather,
                    city: city.to_string(),
                });
            }

            let conditions = [Condition::Rain, Condition::Cloudy, Condition::Clear];
            let list = conditions
                .iter()
                .enumerate()
                .map(|(i, condition)| RawDay {
                    time: DateTime::<Utc>::from_timestamp(START + i as i64 * DAY, 0).unwrap(),
                    min_c: 5.0 + i as f64,
                    max_c: 12.0 + i as f64,
                    condition: *condition,
                    description: format!("{city} day {i}"),
                })
                .collect();

            Ok(ForecastResponse {
                city: city.to_string(),
                utc_offset_secs: 0,
                list,
            })
        }

        async fn current_weather(&self, _city: &str) -> Result<CurrentWeather, WeatherError> {
            unimplemented!("not used by the search pipeline")
        }
    }

    type States = Arc<Mutex<Vec<PipelineState>>>;

    fn start(provider: &Arc<ScriptedProvider>) -> (SearchPipeline, States) {
        let states: States = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let pipeline = SearchPipeline::spawn(
            provider.clone(),
            PipelineConfig::default(),
            move |state: &PipelineState| sink.lock().unwrap().push(state.clone()),
        );
        (pipeline, states)
    }

    fn cities(states: &States) -> Vec<String> {
        states.lock().unwrap().iter().map(|s| s.city.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queries_never_fetch() {
        let provider = Arc::new(ScriptedProvider::default());
        let (pipeline, states) = start(&provider);

        pipeline.submit("");
        sleep(Duration::from_millis(100)).await;
        pipeline.submit("");
        sleep(Duration::from_secs(2)).await;

        assert!(provider.calls().is_empty());
        assert!(states.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_fetches_only_the_last_query() {
        let provider = Arc::new(ScriptedProvider::default());
        let (pipeline, states) = start(&provider);

        for query in ["P", "Pa", "Par", "Pari", "Paris"] {
            pipeline.submit(query);
            sleep(Duration::from_millis(100)).await;
        }
        sleep(Duration::from_secs(2)).await;

        assert_eq!(provider.calls(), vec!["Paris"]);
        assert_eq!(cities(&states), vec!["Paris"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_query_does_not_restart_the_window() {
        let provider = Arc::new(ScriptedProvider::default());
        let (pipeline, _states) = start(&provider);

        pipeline.submit("Paris");
        sleep(Duration::from_millis(300)).await;
        pipeline.submit("");
        sleep(Duration::from_millis(150)).await;
        assert!(provider.calls().is_empty());

        sleep(Duration::from_millis(150)).await;
        assert_eq!(provider.calls(), vec!["Paris"]);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_fetch_is_never_published() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .with_delay("Slow", Duration::from_secs(2))
                .with_delay("Fast", Duration::from_millis(100)),
        );
        let (pipeline, states) = start(&provider);

        pipeline.submit("Slow");
        sleep(Duration::from_millis(600)).await;
        assert_eq!(provider.calls(), vec!["Slow"]);

        pipeline.submit("Fast");
        sleep(Duration::from_secs(5)).await;

        assert_eq!(provider.calls(), vec!["Slow", "Fast"]);
        assert_eq!(cities(&states), vec!["Fast"]);
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_fetch_resolving_first_is_still_dropped() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .with_delay("Berlin", Duration::from_millis(800))
                .with_delay("Rome", Duration::from_secs(2)),
        );
        let (pipeline, states) = start(&provider);

        // Berlin is fetched from 500ms to 1300ms, Rome from 1100ms to 3100ms.
        pipeline.submit("Berlin");
        sleep(Duration::from_millis(600)).await;
        pipeline.submit("Rome");

        sleep(Duration::from_millis(900)).await;
        assert_eq!(provider.calls(), vec!["Berlin", "Rome"]);
        assert!(states.lock().unwrap().is_empty());

        sleep(Duration::from_secs(3)).await;
        assert_eq!(cities(&states), vec!["Rome"]);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_fetch_is_ignored() {
        let provider = Arc::new(ScriptedProvider::default().with_broken("Boom"));
        let (pipeline, states) = start(&provider);

        pipeline.submit("Boom");
        sleep(Duration::from_secs(1)).await;
        assert_eq!(provider.calls(), vec!["Boom"]);
        assert!(states.lock().unwrap().is_empty());

        pipeline.submit("Paris");
        sleep(Duration::from_secs(1)).await;

        assert_eq!(cities(&states), vec!["Paris"]);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_queries_publish_in_order() {
        let provider = Arc::new(ScriptedProvider::default());
        let (pipeline, states) = start(&provider);

        pipeline.submit("Paris");
        sleep(Duration::from_secs(1)).await;
        pipeline.submit("London");
        sleep(Duration::from_secs(1)).await;

        assert_eq!(cities(&states), vec!["Paris", "London"]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_query_fetches_again() {
        let provider = Arc::new(ScriptedProvider::default());
        let (pipeline, states) = start(&provider);

        pipeline.submit("Paris");
        sleep(Duration::from_secs(1)).await;
        pipeline.submit("Paris");
        sleep(Duration::from_secs(1)).await;

        assert_eq!(provider.calls(), vec!["Paris", "Paris"]);
        assert_eq!(states.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_clears_state_and_pipeline_keeps_running() {
        let provider = Arc::new(ScriptedProvider::default().with_unknown("Nowhere"));
        let (pipeline, states) = start(&provider);

        pipeline.submit("Nowhere");
        sleep(Duration::from_secs(1)).await;
        pipeline.submit("Paris");
        sleep(Duration::from_secs(1)).await;

        let states = states.lock().unwrap();
        assert_eq!(states.len(), 2);

        assert_eq!(states[0].city, "Nowhere");
        assert_eq!(states[0].emoji, "");
        assert!(states[0].entries.is_empty());

        assert_eq!(states[1].city, "Paris");
        assert_eq!(states[1].entries.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_publishes_latest_state() {
        let provider = Arc::new(ScriptedProvider::default());
        let (pipeline, mut rx) = SearchPipeline::watch(provider.clone(), PipelineConfig::default());

        pipeline.submit("Paris");
        rx.changed().await.expect("pipeline is running");

        let state = rx.borrow().clone();
        assert_eq!(state.city, "Paris");
        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.emoji, Condition::Rain.emoji());
        assert_eq!(state.entries[0].summary, "Paris day 0");
    }

    #[tokio::test(start_paused = true)]
    async fn custom_debounce_window_is_honoured() {
        let provider = Arc::new(ScriptedProvider::default());
        let config = PipelineConfig { debounce: Duration::from_millis(50) };
        let (pipeline, _rx) = SearchPipeline::watch(provider.clone(), config);

        pipeline.submit("Paris");
        sleep(Duration::from_millis(60)).await;

        assert_eq!(provider.calls(), vec!["Paris"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_the_input() {
        let provider = Arc::new(ScriptedProvider::default());
        let (pipeline, _states) = start(&provider);
        let input = pipeline.input();
        assert!(input.submit("Paris"));

        pipeline.shutdown().await;

        assert!(!input.submit("London"));
        sleep(Duration::from_secs(1)).await;
        assert!(provider.calls().is_empty());
    }
}
