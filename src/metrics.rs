use std::sync::atomic::{AtomicUsize, Ordering};

/// Runtime counters for one poll scheduler.
///
/// Purpose:
/// - Track poll outcomes (success / transport / decode)
/// - Track overlap protection (skipped ticks, discarded results)
/// - Track subscriber health (invocations / failures)
///
/// Design:
/// - Lock-free (Atomics)
/// - Owned by the scheduler and shared via `Arc`, not a global,
///   so independent schedulers (and tests) never share counters
#[derive(Debug, Default)]
pub struct PollMetrics {
    // Poll cycle
    pub polls_started: AtomicUsize,
    pub polls_succeeded: AtomicUsize,
    pub transport_errors: AtomicUsize,
    pub decode_errors: AtomicUsize,

    // Overlap guard
    pub ticks_skipped: AtomicUsize,
    pub results_discarded: AtomicUsize,

    // Dispatch
    pub callbacks_invoked: AtomicUsize,
    pub callback_errors: AtomicUsize,
}

impl PollMetrics {
    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// One-line summary, in the `[METRICS] key=value ...` format.
    pub fn report_line(&self) -> String {
        format!(
            "[METRICS] polls={} ok={} transport_err={} decode_err={} skipped={} discarded={} callbacks={} callback_err={}",
            self.polls_started.load(Ordering::Relaxed),
            self.polls_succeeded.load(Ordering::Relaxed),
            self.transport_errors.load(Ordering::Relaxed),
            self.decode_errors.load(Ordering::Relaxed),
            self.ticks_skipped.load(Ordering::Relaxed),
            self.results_discarded.load(Ordering::Relaxed),
            self.callbacks_invoked.load(Ordering::Relaxed),
            self.callback_errors.load(Ordering::Relaxed),
        )
    }
}
