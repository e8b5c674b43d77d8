// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:   Configuration structs loaded from JSON
// - error:    Fetch and subscriber error types
// - snapshot: Strongly typed monitor snapshot and change detection
// - util:     Timestamp parsing and duration formatting
// - metrics:  Poll / dispatch counters
// - fetcher:  Snapshot sources (HTTP backend)
// - sync:     Subscriber registry, dispatcher and poll scheduler
// - panels:   Console renderers for the dashboard panels
//
pub mod config;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod panels;
pub mod snapshot;
pub mod sync;
pub mod util;

pub use error::{CallbackError, FetchError};
pub use fetcher::{HttpFetcher, SnapshotSource};
pub use snapshot::{ChangeSet, Snapshot};
pub use sync::{PollOutcome, PollScheduler, SubscriberRegistry, Subscription, SubscriptionKey};
