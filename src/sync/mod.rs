//! Snapshot synchronization layer
//!
//! This module groups the logic responsible for:
//! - Keeping the subscriber registry (key -> view callback)
//! - Dispatching each snapshot to every subscriber, with isolation
//! - Driving the poll cycle (fetch, store, dispatch)
//!
//! It sits between:
//! - Snapshot sources (HTTP backend, test doubles)
//! - View renderers (console panels, or any caller-provided callback)
//!
//! Design notes:
//! - Presentation logic MUST NOT live here
//! - Nothing in this module is global; callers construct a registry and
//!   a scheduler and pass them around as `Arc` handles
pub mod dispatcher;
pub mod registry;
pub mod scheduler;

pub use dispatcher::{DispatchReport, dispatch};
pub use registry::{SubscriberRegistry, Subscription, SubscriptionKey};
pub use scheduler::{PollOutcome, PollScheduler, PollState};
