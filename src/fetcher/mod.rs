//! Snapshot sources.
//!
//! The scheduler talks to the backend exclusively through the
//! `SnapshotSource` trait; `HttpFetcher` is the production source.

pub mod http;

pub use http::HttpFetcher;

use crate::error::FetchError;
use crate::snapshot::Snapshot;

/// One network round-trip that yields a full snapshot.
///
/// CONTRACT:
/// - Exactly one request per call; no retries
/// - Non-2xx status and connection failures are `FetchError::Transport`
/// - Bodies that do not decode as a `Snapshot` are `FetchError::Decode`
/// - No side effects beyond the request itself
///
/// THREAD SAFETY:
/// - Must be Send + Sync; the scheduler shares one instance across
///   its spawned poll tasks
///
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Where snapshots come from, for log lines.
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<Snapshot, FetchError>;
}
