//! Background pollers that publish into a [`SharedSummary`].
//!
//! A [`Producer`] owns one task running the cycle
//! `Idle -> Polling -> Idle -> ... -> Stopped`:
//! 1. Snapshot the config and ask the [`Source`] for its [`PollSettings`]
//! 2. Disabled: publish [`Reading::Disabled`] and wait one tick
//! 3. Enabled and due: fetch, publish `Ready` or `Unavailable`, record the time
//! 4. Wait one tick and repeat
//!
//! Fetch errors never leave the producer; they become [`Reading::Unavailable`].

use crate::config::{Config, ConfigStore};
use crate::error::FetchError;
use crate::summary::{Reading, SharedSummary};
use crate::task::{JOIN_TIMEOUT, JoinOutcome, TaskHandle, stop_slot};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Interval between checks of the enable flag and the refresh deadline.
pub const POLL_TICK: Duration = Duration::from_secs(5);

/// Per-cycle settings a source reads from its own config section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub enabled: bool,
    /// Minimum time between fetches.
    pub refresh: Duration,
}

/// The external fetch/compute behind a producer.
#[async_trait]
pub trait Source: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Short name used in logs and task names.
    fn name(&self) -> &'static str;

    fn settings(&self, config: &Config) -> PollSettings;

    /// Perform one fetch. Runs without any shared lock held.
    async fn fetch(&self, config: &Config) -> Result<Self::Output, FetchError>;
}

/// Where a producer is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Idle,
    Polling,
    Stopped,
}

impl ProducerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ProducerState::Polling,
            2 => ProducerState::Stopped,
            _ => ProducerState::Idle,
        }
    }
}

#[derive(Debug, Default)]
struct StateCell(AtomicU8);

impl StateCell {
    fn set(&self, state: ProducerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> ProducerState {
        ProducerState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// A polling task publishing the latest value of one [`Source`].
pub struct Producer<S: Source> {
    source: Arc<S>,
    store: Arc<ConfigStore>,
    summary: SharedSummary<S::Output>,
    state: Arc<StateCell>,
    tick: Duration,
    task: Mutex<Option<TaskHandle>>,
}

impl<S: Source> Producer<S> {
    pub fn new(source: S, store: Arc<ConfigStore>) -> Self {
        Self {
            source: Arc::new(source),
            store,
            summary: SharedSummary::new(),
            state: Arc::new(StateCell::default()),
            tick: POLL_TICK,
            task: Mutex::new(None),
        }
    }

    /// Override the check interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Reader handle for consumers.
    pub fn summary(&self) -> SharedSummary<S::Output> {
        self.summary.clone()
    }

    pub fn reading(&self) -> Reading<S::Output> {
        self.summary.get()
    }

    pub fn state(&self) -> ProducerState {
        self.state.get()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Spawn the polling task. A no-op while the task is alive.
    pub fn start(&self) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Producer {} still running, not starting another", self.source.name());
            return;
        }

        let source = Arc::clone(&self.source);
        let store = Arc::clone(&self.store);
        let summary = self.summary.clone();
        let state = Arc::clone(&self.state);
        let tick = self.tick;

        state.set(ProducerState::Idle);
        info!("Starting {} producer", source.name());
        *slot = Some(TaskHandle::spawn(
            format!("producer:{}", source.name()),
            move |mut stop| async move {
                let mut last_fetch: Option<Instant> = None;
                while !stop.is_stopped() {
                    let config = store.snapshot();
                    let settings = source.settings(&config);

                    if !settings.enabled {
                        summary.publish(Reading::Disabled);
                    } else if last_fetch.is_none_or(|at| at.elapsed() >= settings.refresh) {
                        state.set(ProducerState::Polling);
                        let reading = match source.fetch(&config).await {
                            Ok(value) => Reading::Ready(value),
                            Err(e) => {
                                warn!("{} fetch failed: {}", source.name(), e);
                                Reading::Unavailable
                            }
                        };
                        summary.publish(reading);
                        last_fetch = Some(Instant::now());
                        state.set(ProducerState::Idle);
                    }

                    if stop.sleep(tick).await {
                        break;
                    }
                }
                state.set(ProducerState::Stopped);
            },
        ));
    }

    /// Request cancellation and join with a bounded wait.
    ///
    /// A task that overruns the wait stays registered and keeps its state
    /// until it reaches its next stop check; `start` will not run a second
    /// loop beside it.
    pub async fn stop(&self) -> Option<JoinOutcome> {
        let outcome = stop_slot(&self.task, JOIN_TIMEOUT).await?;
        if outcome != JoinOutcome::TimedOut {
            self.state.set(ProducerState::Stopped);
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Counting {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Source for Counting {
        type Output = u32;

        fn name(&self) -> &'static str {
            "counting"
        }

        fn settings(&self, _config: &Config) -> PollSettings {
            PollSettings {
                enabled: true,
                refresh: Duration::ZERO,
            }
        }

        async fn fetch(&self, _config: &Config) -> Result<u32, FetchError> {
            Ok(self.calls.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    /// Fetches slower than the stop timeout.
    struct Sluggish {
        calls: Arc<AtomicU32>,
        delay: Duration,
    }

    #[async_trait]
    impl Source for Sluggish {
        type Output = u32;

        fn name(&self) -> &'static str {
            "sluggish"
        }

        fn settings(&self, _config: &Config) -> PollSettings {
            PollSettings {
                enabled: true,
                refresh: Duration::from_secs(3600),
            }
        }

        async fn fetch(&self, _config: &Config) -> Result<u32, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            Ok(n)
        }
    }

    fn store() -> Arc<ConfigStore> {
        Arc::new(ConfigStore::new("unused.json", Config::default()))
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let calls = Arc::new(AtomicU32::new(0));
        let producer = Producer::new(
            Counting {
                calls: Arc::clone(&calls),
            },
            store(),
        )
        .with_tick(Duration::from_secs(3600));

        producer.start();
        producer.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One task, one immediate fetch, then parked on the long tick.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(producer.reading(), Reading::Ready(1));
        assert_eq!(producer.stop().await, Some(JoinOutcome::Finished));
        assert_eq!(producer.state(), ProducerState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let producer = Producer::new(
            Counting {
                calls: Arc::new(AtomicU32::new(0)),
            },
            store(),
        );
        assert_eq!(producer.stop().await, None);
        assert_eq!(producer.state(), ProducerState::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let calls = Arc::new(AtomicU32::new(0));
        let producer = Producer::new(
            Counting {
                calls: Arc::clone(&calls),
            },
            store(),
        )
        .with_tick(Duration::from_secs(3600));

        producer.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        producer.stop().await;
        producer.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        producer.stop().await;
    }

    #[tokio::test]
    async fn test_timed_out_stop_blocks_second_loop() {
        let calls = Arc::new(AtomicU32::new(0));
        let producer = Producer::new(
            Sluggish {
                calls: Arc::clone(&calls),
                delay: JOIN_TIMEOUT + Duration::from_millis(500),
            },
            store(),
        )
        .with_tick(Duration::from_millis(10));

        producer.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(producer.state(), ProducerState::Polling);

        // Stuck in fetch past the join timeout: still counted as alive.
        assert_eq!(producer.stop().await, Some(JoinOutcome::TimedOut));
        assert_eq!(producer.state(), ProducerState::Polling);

        producer.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The old loop winds down on its own once the fetch returns.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(producer.state(), ProducerState::Stopped);
        assert_eq!(producer.reading(), Reading::Ready(1));

        producer.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(producer.state(), ProducerState::Polling);
        assert_eq!(producer.stop().await, Some(JoinOutcome::TimedOut));
    }
}
