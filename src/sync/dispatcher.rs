use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::CallbackError;
use crate::snapshot::Snapshot;
use crate::sync::registry::{SubscriberRegistry, Subscription};

/// Outcome of one dispatch pass.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Number of callbacks invoked (including failed ones)
    pub invoked: usize,

    /// One entry per callback that returned an error or panicked
    pub failures: Vec<CallbackError>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs one dispatch pass: every subscriber, in registration order,
/// exactly once.
///
/// ROUTING:
/// - Workflow subscriptions are called with `(id, snapshot)`
/// - Section subscriptions are called with `(snapshot)`
///
/// ISOLATION:
/// - An `Err` or a panic from one subscriber is logged with its key and
///   recorded in the report; the pass continues with the next one
/// - The snapshot shape is not validated here; `Snapshot` decoding
///   already normalizes missing sections to empty values
///
/// Subscribers registered while the pass runs are not invoked until the
/// next pass.
pub fn dispatch(snapshot: &Snapshot, registry: &SubscriberRegistry) -> DispatchReport {
    let mut report = DispatchReport::default();

    for subscription in registry.entries() {
        report.invoked += 1;
        if let Err(e) = invoke(&subscription, snapshot) {
            log::error!("{e}");
            report.failures.push(e);
        }
    }

    report
}

fn invoke(subscription: &Subscription, snapshot: &Snapshot) -> Result<(), CallbackError> {
    let outcome = catch_unwind(AssertUnwindSafe(|| match subscription {
        Subscription::Section { callback, .. } => callback(snapshot),
        Subscription::Workflow { id, callback } => callback(id, snapshot),
    }));

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(cause)) => Err(CallbackError::Failed {
            key: subscription.key().to_string(),
            cause,
        }),
        Err(payload) => Err(CallbackError::Panicked {
            key: subscription.key().to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
