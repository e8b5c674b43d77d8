use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::FetchError;
use crate::fetcher::SnapshotSource;
use crate::metrics::PollMetrics;
use crate::snapshot::{ChangeSet, Snapshot};
use crate::sync::dispatcher::{DispatchReport, dispatch};
use crate::sync::registry::SubscriberRegistry;

/// Whether a poll is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
}

/// Result of one guarded poll attempt.
#[derive(Debug)]
pub enum PollOutcome {
    /// Snapshot fetched, stored as latest and dispatched
    Dispatched {
        changes: ChangeSet,
        report: DispatchReport,
    },

    /// Another poll was still in flight; nothing was issued
    Skipped,

    /// Fetch failed; the previous snapshot is kept
    Failed(FetchError),

    /// The scheduler was stopped while the fetch was in flight; the
    /// result was dropped without dispatching
    Discarded,
}

struct Shared {
    source: Arc<dyn SnapshotSource>,
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<PollMetrics>,

    /// `epoch + 1` of the poll in flight, 0 when Idle. Holding the epoch
    /// lets a restarted scheduler supersede a poll left over from before
    /// `stop()` instead of waiting for it.
    polling: AtomicU64,

    /// Bumped by `stop()`. A poll only dispatches if the epoch it was
    /// issued under is still current when its fetch resolves.
    epoch: AtomicU64,

    /// Held while storing and dispatching a snapshot, so passes never
    /// interleave even when a stale poll overlaps a fresh one.
    pass: Mutex<()>,

    latest: RwLock<Option<Arc<Snapshot>>>,
    last_changes: RwLock<ChangeSet>,

    /// Log change summaries at info instead of debug
    verbose: AtomicBool,
}

/// Clears the in-flight flag when the poll finishes, however it ends.
struct InFlight {
    shared: Arc<Shared>,
    epoch: u64,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        // A superseded poll must not clear the flag of its successor
        let _ = self
            .shared
            .polling
            .compare_exchange(self.epoch + 1, 0, Ordering::AcqRel, Ordering::Acquire);
    }
}

impl Shared {
    /// Attempts the Idle -> Polling transition. A poll issued before the
    /// last `stop()` does not count as in flight.
    fn try_begin(self: &Arc<Self>) -> Option<InFlight> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let mut current = self.polling.load(Ordering::Acquire);

        loop {
            if current == epoch + 1 {
                PollMetrics::incr(&self.metrics.ticks_skipped);
                log::debug!("poll still in flight, skipping tick");
                return None;
            }
            match self
                .polling
                .compare_exchange(current, epoch + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(0) => break,
                Ok(_) => {
                    log::debug!("superseding a poll issued before stop");
                    break;
                }
                Err(actual) => current = actual,
            }
        }

        Some(InFlight {
            shared: self.clone(),
            epoch,
        })
    }

    /// Fetch, then store and dispatch. Polling lasts until `guard` drops,
    /// so two passes can never interleave.
    async fn run(&self, guard: InFlight) -> PollOutcome {
        PollMetrics::incr(&self.metrics.polls_started);

        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                match &e {
                    FetchError::Transport { .. } => PollMetrics::incr(&self.metrics.transport_errors),
                    FetchError::Decode { .. } => PollMetrics::incr(&self.metrics.decode_errors),
                }
                log::warn!("[{}] keeping previous snapshot: {e}", e.error_code());
                return PollOutcome::Failed(e);
            }
        };

        let pass = self.pass.lock().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::Acquire) != guard.epoch {
            PollMetrics::incr(&self.metrics.results_discarded);
            log::debug!("scheduler stopped during fetch, dropping snapshot");
            return PollOutcome::Discarded;
        }

        PollMetrics::incr(&self.metrics.polls_succeeded);

        let snapshot = Arc::new(snapshot);
        let changes = {
            let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
            let changes = snapshot.changes_since(latest.as_deref());
            *latest = Some(snapshot.clone());
            changes
        };
        *self.last_changes.write().unwrap_or_else(PoisonError::into_inner) = changes.clone();

        if self.verbose.load(Ordering::Relaxed) {
            log::info!("snapshot: {changes}");
        } else {
            log::debug!("snapshot: {changes}");
        }

        let report = dispatch(&snapshot, &self.registry);
        PollMetrics::add(&self.metrics.callbacks_invoked, report.invoked);
        PollMetrics::add(&self.metrics.callback_errors, report.failures.len());

        drop(pass);
        drop(guard);
        PollOutcome::Dispatched { changes, report }
    }
}

/// Drives the poll cycle: fetch immediately on start, then once per
/// interval, dispatching every successful snapshot to the registry.
///
/// OVERLAP POLICY:
/// - A tick that fires while a poll is in flight is skipped (counted in
///   `ticks_skipped`), so fetches never pile up and snapshots are always
///   dispatched in issue order
///
/// STOPPING:
/// - `stop()` cancels the repeating timer only
/// - A fetch already in flight runs to completion, but its snapshot is
///   dropped instead of dispatched
/// - `start()` after `stop()` polls right away even if that stale fetch
///   has not resolved yet
///
/// Must be started from within a tokio runtime.
pub struct PollScheduler {
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl PollScheduler {
    pub fn new(source: Arc<dyn SnapshotSource>, registry: Arc<SubscriberRegistry>) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                registry,
                metrics: Arc::new(PollMetrics::default()),
                polling: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                pass: Mutex::new(()),
                latest: RwLock::new(None),
                last_changes: RwLock::new(ChangeSet::default()),
                verbose: AtomicBool::new(false),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Logs per-poll change summaries at info level.
    pub fn set_verbose(&self, verbose: bool) {
        self.shared.verbose.store(verbose, Ordering::Relaxed);
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.shared.registry
    }

    pub fn metrics(&self) -> Arc<PollMetrics> {
        self.shared.metrics.clone()
    }

    pub fn state(&self) -> PollState {
        if self.shared.polling.load(Ordering::Acquire) != 0 {
            PollState::Polling
        } else {
            PollState::Idle
        }
    }

    /// Last successfully fetched snapshot, if any.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.shared
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// What changed in the most recent successful poll.
    pub fn last_changes(&self) -> ChangeSet {
        self.shared
            .last_changes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Performs one guarded poll cycle and waits for it.
    pub async fn poll_once(&self) -> PollOutcome {
        match self.shared.try_begin() {
            Some(guard) => self.shared.run(guard).await,
            None => PollOutcome::Skipped,
        }
    }

    /// Starts polling: one attempt right away, then one per `interval`.
    ///
    /// Calling `start` while already running restarts the timer with the
    /// new interval. A poll still in flight from the running scheduler
    /// keeps its slot, so the restarted timer's first tick may be skipped.
    pub fn start(&self, interval: Duration) {
        let interval = interval.max(Duration::from_millis(1));
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = timer.take() {
            old.abort();
        }

        log::info!(
            "polling {} every {}ms",
            self.shared.source.describe(),
            interval.as_millis()
        );

        let shared = self.shared.clone();
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // First tick completes immediately
                ticker.tick().await;

                let Some(guard) = shared.try_begin() else {
                    continue;
                };

                // Each poll runs in its own task so that cancelling the
                // timer never cancels a fetch mid-flight.
                let shared = shared.clone();
                tokio::spawn(async move {
                    shared.run(guard).await;
                });
            }
        }));
    }

    /// Cancels the repeating timer. An in-flight fetch is allowed to
    /// finish but will not dispatch.
    pub fn stop(&self) {
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = timer {
            handle.abort();
            log::info!("polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::sleep;

    use crate::snapshot::{SystemSection, Tracked};

    /// Scripted source: pops a queued response per call (or returns an
    /// empty snapshot), optionally after a delay.
    #[derive(Default)]
    struct ScriptedSource {
        delay: Duration,
        responses: Mutex<VecDeque<Result<Snapshot, FetchError>>>,
        calls: AtomicUsize,
        completed: AtomicUsize,
    }

    impl ScriptedSource {
        fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                ..Self::default()
            })
        }

        fn push(&self, response: Result<Snapshot, FetchError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl SnapshotSource for ScriptedSource {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn fetch(&self) -> Result<Snapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Snapshot::default()))
        }
    }

    fn status_snapshot(status: &str) -> Snapshot {
        Snapshot {
            system: SystemSection {
                status: Some(Tracked {
                    value: status.to_string(),
                    timestamp: None,
                }),
                ..SystemSection::default()
            },
            ..Snapshot::default()
        }
    }

    fn counting_registry() -> (Arc<SubscriberRegistry>, Arc<AtomicUsize>) {
        let registry = Arc::new(SubscriberRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        registry.on_section("system-overview", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (registry, hits)
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_immediately_then_every_interval() {
        let source = ScriptedSource::with_delay(Duration::ZERO);
        let (registry, hits) = counting_registry();
        let scheduler = PollScheduler::new(source.clone(), registry);

        scheduler.start(Duration::from_millis(1000));
        assert!(scheduler.is_running());

        sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn skips_ticks_while_polling() {
        let source = ScriptedSource::with_delay(Duration::from_millis(2500));
        let (registry, _) = counting_registry();
        let scheduler = PollScheduler::new(source.clone(), registry);

        scheduler.start(Duration::from_millis(1000));

        sleep(Duration::from_millis(2900)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(scheduler.metrics().ticks_skipped.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.state(), PollState::Idle);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(scheduler.state(), PollState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_fetch_finish_but_drops_result() {
        let source = ScriptedSource::with_delay(Duration::from_millis(500));
        let (registry, hits) = counting_registry();
        let scheduler = PollScheduler::new(source.clone(), registry);

        scheduler.start(Duration::from_millis(1000));
        sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.state(), PollState::Polling);

        scheduler.stop();
        assert!(!scheduler.is_running());

        sleep(Duration::from_millis(3000)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(source.completed.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(scheduler.latest().is_none());
        assert_eq!(scheduler.metrics().results_discarded.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), PollState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_polls_immediately() {
        let source = ScriptedSource::with_delay(Duration::from_millis(500));
        let (registry, hits) = counting_registry();
        let scheduler = PollScheduler::new(source.clone(), registry);

        scheduler.start(Duration::from_millis(1000));
        sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls(), 1);

        // The first fetch is still in flight when polling restarts
        scheduler.stop();
        scheduler.start(Duration::from_millis(1000));
        assert!(scheduler.is_running());

        sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(scheduler.metrics().ticks_skipped.load(Ordering::SeqCst), 0);

        // t=500: stale fetch resolves and is dropped; t=600: fresh one
        // dispatches; t=1100: next tick
        sleep(Duration::from_millis(1000)).await;
        assert_eq!(scheduler.metrics().results_discarded.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(scheduler.latest().is_some());
        assert_eq!(source.calls(), 3);
        assert_eq!(scheduler.state(), PollState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_replaces_the_timer() {
        let source = ScriptedSource::with_delay(Duration::ZERO);
        let (registry, hits) = counting_registry();
        let scheduler = PollScheduler::new(source.clone(), registry);

        scheduler.start(Duration::from_millis(1000));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 1);

        // Ticks at 10, 310, 610, 910; the old timer would have fired at 1000
        scheduler.start(Duration::from_millis(300));
        sleep(Duration::from_millis(1040)).await;
        assert_eq!(source.calls(), 5);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(scheduler.metrics().results_discarded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_snapshot() {
        let source = ScriptedSource::with_delay(Duration::ZERO);
        source.push(Ok(status_snapshot("running")));
        source.push(Err(FetchError::Transport {
            url: "scripted".to_string(),
            reason: "HTTP 502 Bad Gateway".to_string(),
        }));
        source.push(Err(FetchError::Decode {
            url: "scripted".to_string(),
            source: serde_json::from_str::<Snapshot>("42").unwrap_err(),
        }));
        let (registry, hits) = counting_registry();
        let scheduler = PollScheduler::new(source.clone(), registry);

        assert!(matches!(scheduler.poll_once().await, PollOutcome::Dispatched { .. }));
        assert!(matches!(scheduler.poll_once().await, PollOutcome::Failed(FetchError::Transport { .. })));
        assert!(matches!(scheduler.poll_once().await, PollOutcome::Failed(FetchError::Decode { .. })));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let latest = scheduler.latest().unwrap();
        assert_eq!(latest.system.status.as_ref().unwrap().value, "running");

        let metrics = scheduler.metrics();
        assert_eq!(metrics.polls_started.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.polls_succeeded.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.transport_errors.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.decode_errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn each_poll_replaces_the_snapshot() {
        let source = ScriptedSource::with_delay(Duration::ZERO);
        source.push(Ok(status_snapshot("starting")));
        source.push(Ok(status_snapshot("starting")));
        source.push(Ok(status_snapshot("running")));
        let (registry, _) = counting_registry();
        let scheduler = PollScheduler::new(source, registry);

        scheduler.poll_once().await;
        let first = scheduler.latest().unwrap();
        assert!(scheduler.last_changes().system);

        let PollOutcome::Dispatched { changes, .. } = scheduler.poll_once().await else {
            panic!("expected dispatch");
        };
        assert!(changes.is_empty());
        assert!(!Arc::ptr_eq(&first, &scheduler.latest().unwrap()));

        scheduler.poll_once().await;
        assert!(scheduler.last_changes().system);
        assert_eq!(first.system.status.as_ref().unwrap().value, "starting");
        assert_eq!(
            scheduler.latest().unwrap().system.status.as_ref().unwrap().value,
            "running"
        );
    }

    #[tokio::test]
    async fn dispatch_failures_are_counted() {
        let source = ScriptedSource::with_delay(Duration::ZERO);
        let registry = Arc::new(SubscriberRegistry::new());
        registry.on_section("broken", |_| anyhow::bail!("no data"));
        registry.on_workflow("1", |_, _| Ok(()));
        let scheduler = PollScheduler::new(source, registry);

        let PollOutcome::Dispatched { report, .. } = scheduler.poll_once().await else {
            panic!("expected dispatch");
        };
        assert_eq!(report.invoked, 2);
        assert_eq!(report.failures.len(), 1);

        let metrics = scheduler.metrics();
        assert_eq!(metrics.callbacks_invoked.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.callback_errors.load(Ordering::SeqCst), 1);
    }
}
