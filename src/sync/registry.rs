use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::snapshot::Snapshot;

/// Legacy string prefix that marks a per-workflow subscription.
pub const WORKFLOW_PREFIX: &str = "workflow-";

/// Callback for a named section panel: receives the full snapshot.
pub type SectionCallback = Arc<dyn Fn(&Snapshot) -> anyhow::Result<()> + Send + Sync>;

/// Callback for a per-workflow panel: receives the workflow id and the
/// full snapshot.
pub type WorkflowCallback = Arc<dyn Fn(&str, &Snapshot) -> anyhow::Result<()> + Send + Sync>;

/// Identifies which view a subscriber renders.
///
/// The string form used on the wire and in logs is kept:
/// `workflow-<id>` is a workflow key, anything else is a section name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriptionKey {
    Section(String),
    Workflow(String),
}

impl SubscriptionKey {
    /// Key for a named section. A name carrying the workflow prefix is
    /// the string form of a workflow key and yields `Workflow`, so the
    /// tagged key and its string form always agree.
    pub fn section(name: impl AsRef<str>) -> Self {
        Self::parse(name.as_ref())
    }

    pub fn workflow(id: impl Into<String>) -> Self {
        Self::Workflow(id.into())
    }

    /// Parses the string form. Never fails: any key without the
    /// workflow prefix is a section.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(WORKFLOW_PREFIX) {
            Some(id) => Self::Workflow(id.to_string()),
            None => Self::Section(raw.to_string()),
        }
    }
}

impl From<&str> for SubscriptionKey {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Section(name) => f.write_str(name),
            Self::Workflow(id) => write!(f, "{WORKFLOW_PREFIX}{id}"),
        }
    }
}

/// A registered subscriber. The variant binds the key kind to the
/// callback shape, so a workflow key is always called with its id.
#[derive(Clone)]
pub enum Subscription {
    Section { name: String, callback: SectionCallback },
    Workflow { id: String, callback: WorkflowCallback },
}

impl Subscription {
    /// Section subscriber. If `name` is really a `workflow-<id>` key the
    /// subscription becomes a workflow one whose callback ignores the id.
    pub fn section<F>(name: impl AsRef<str>, f: F) -> Self
    where
        F: Fn(&Snapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Section {
            name: name.as_ref().to_string(),
            callback: Arc::new(f),
        }
        .canonical()
    }

    pub fn workflow<F>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str, &Snapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Workflow {
            id: id.into(),
            callback: Arc::new(f),
        }
    }

    pub fn key(&self) -> SubscriptionKey {
        match self {
            Self::Section { name, .. } => SubscriptionKey::Section(name.clone()),
            Self::Workflow { id, .. } => SubscriptionKey::Workflow(id.clone()),
        }
    }

    /// Rewrites a section whose name has the workflow prefix into the
    /// workflow subscription it denotes.
    fn canonical(self) -> Self {
        match self {
            Self::Section { name, callback } => match SubscriptionKey::parse(&name) {
                SubscriptionKey::Workflow(id) => {
                    log::debug!("section name {name} is a workflow key");
                    Self::Workflow {
                        id,
                        callback: Arc::new(move |_: &str, snap: &Snapshot| callback(snap)),
                    }
                }
                SubscriptionKey::Section(_) => Self::Section { name, callback },
            },
            workflow => workflow,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscription").field(&self.key().to_string()).finish()
    }
}

#[derive(Default)]
struct Inner {
    /// Registration sequence -> subscription; iteration order is
    /// registration order.
    entries: BTreeMap<u64, Subscription>,
    index: HashMap<SubscriptionKey, u64>,
    next_seq: u64,
}

/// Shared mapping from subscription key to callback.
///
/// GUARANTEES:
/// - Keys are unique; re-registering overwrites in place and keeps the
///   original position
/// - `entries()` returns a copy, so a dispatch pass never observes
///   registrations made while it runs and never holds the lock while
///   calling subscribers
///
/// Constructed explicitly and shared as `Arc<SubscriberRegistry>`.
#[derive(Default)]
pub struct SubscriberRegistry {
    inner: RwLock<Inner>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` under the string form of a key. Never fails.
    ///
    /// The key is parsed once here: `workflow-<id>` subscribers are
    /// called with `Some(id)`, section subscribers with `None`.
    pub fn register<F>(&self, key: &str, f: F)
    where
        F: Fn(Option<&str>, &Snapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let subscription = match SubscriptionKey::parse(key) {
            SubscriptionKey::Workflow(id) => Subscription::workflow(id, move |id, snap| f(Some(id), snap)),
            SubscriptionKey::Section(name) => Subscription::section(name, move |snap| f(None, snap)),
        };
        self.insert(subscription);
    }

    /// Inserts or overwrites a subscription. Never fails.
    pub fn insert(&self, subscription: Subscription) {
        let subscription = subscription.canonical();
        let key = subscription.key();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(&seq) = inner.index.get(&key) {
            log::debug!("replacing subscriber {key}");
            inner.entries.insert(seq, subscription);
            return;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(seq, subscription);
        inner.index.insert(key, seq);
    }

    pub fn on_section<F>(&self, name: impl AsRef<str>, f: F)
    where
        F: Fn(&Snapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert(Subscription::section(name, f));
    }

    pub fn on_workflow<F>(&self, id: impl Into<String>, f: F)
    where
        F: Fn(&str, &Snapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert(Subscription::workflow(id, f));
    }

    /// Removes a subscription. Returns false if the key was not present.
    pub fn unregister(&self, key: &SubscriptionKey) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match inner.index.remove(key) {
            Some(seq) => {
                inner.entries.remove(&seq);
                true
            }
            None => false,
        }
    }

    /// Ordered copy of the current subscriptions for one dispatch pass.
    pub fn entries(&self) -> Vec<Subscription> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.values().map(Subscription::key).collect()
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Snapshot) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn key_parsing_and_display() {
        assert_eq!(SubscriptionKey::parse("workflow-7"), SubscriptionKey::workflow("7"));
        assert_eq!(SubscriptionKey::parse("system-overview"), SubscriptionKey::section("system-overview"));
        // Prefix only: empty workflow id, still a workflow key
        assert_eq!(SubscriptionKey::parse("workflow-"), SubscriptionKey::workflow(""));
        assert_eq!(SubscriptionKey::workflow("abc-1").to_string(), "workflow-abc-1");
        assert_eq!(SubscriptionKey::from("chat-history").to_string(), "chat-history");
    }

    #[test]
    fn entries_follow_registration_order() {
        let registry = SubscriberRegistry::new();
        registry.on_section("b", noop);
        registry.on_workflow("1", |_, _| Ok(()));
        registry.on_section("a", noop);

        let keys: Vec<String> = registry.keys().iter().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["b", "workflow-1", "a"]);
    }

    #[test]
    fn re_registering_overwrites_in_place() {
        let registry = SubscriberRegistry::new();
        registry.on_section("first", noop);
        registry.on_section("second", noop);
        registry.on_section("first", |_| anyhow::bail!("replaced"));

        assert_eq!(registry.len(), 2);
        let entries = registry.entries();
        assert_eq!(entries[0].key(), SubscriptionKey::section("first"));
        let Subscription::Section { callback, .. } = &entries[0] else {
            panic!("expected section subscription");
        };
        assert!(callback(&Snapshot::default()).is_err());
    }

    #[test]
    fn unregister_removes_and_is_noop_when_absent() {
        let registry = SubscriberRegistry::new();
        registry.on_workflow("7", |_, _| Ok(()));
        registry.on_section("chat-history", noop);

        assert!(registry.unregister(&SubscriptionKey::workflow("7")));
        assert!(!registry.unregister(&SubscriptionKey::workflow("7")));
        assert!(!registry.contains(&SubscriptionKey::workflow("7")));
        assert_eq!(registry.len(), 1);

        // Re-registering after removal appends at the end
        registry.on_workflow("7", |_, _| Ok(()));
        assert_eq!(registry.keys().last(), Some(&SubscriptionKey::workflow("7")));
    }

    #[test]
    fn section_name_cannot_shadow_workflow_key() {
        let registry = SubscriberRegistry::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let s = seen.clone();
        registry.on_workflow("7", move |id, _| {
            s.lock().unwrap().push(format!("workflow:{id}"));
            Ok(())
        });
        let s = seen.clone();
        registry.on_section("workflow-7", move |_| {
            s.lock().unwrap().push("section".to_string());
            Ok(())
        });

        // One key, overwritten in place
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.keys(), vec![SubscriptionKey::workflow("7")]);
        assert_eq!(SubscriptionKey::section("workflow-7"), SubscriptionKey::workflow("7"));

        // A hand-built section variant is normalized the same way
        registry.insert(Subscription::Section {
            name: "workflow-8".to_string(),
            callback: Arc::new(noop),
        });
        assert!(registry.contains(&SubscriptionKey::workflow("8")));
        assert_eq!(registry.len(), 2);

        for subscription in registry.entries() {
            let Subscription::Workflow { id, callback } = subscription else {
                panic!("expected workflow subscription");
            };
            callback(&id, &Snapshot::default()).unwrap();
        }
        assert_eq!(*seen.lock().unwrap(), vec!["section"]);
    }

    #[test]
    fn string_keys_route_on_parse() {
        let registry = SubscriberRegistry::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for key in ["system-overview", "workflow-7"] {
            let s = seen.clone();
            registry.register(key, move |id, _| {
                s.lock().unwrap().push(id.map(str::to_string));
                Ok(())
            });
        }

        assert_eq!(
            registry.keys(),
            vec![SubscriptionKey::section("system-overview"), SubscriptionKey::workflow("7")]
        );
        for subscription in registry.entries() {
            match subscription {
                Subscription::Section { callback, .. } => callback(&Snapshot::default()).unwrap(),
                Subscription::Workflow { id, callback } => callback(&id, &Snapshot::default()).unwrap(),
            }
        }
        assert_eq!(*seen.lock().unwrap(), vec![None, Some("7".to_string())]);

        // The string form and the typed form address the same entry
        registry.on_workflow("7", |_, _| Ok(()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn entries_is_a_stable_copy() {
        let registry = SubscriberRegistry::new();
        registry.on_section("a", noop);

        let pass = registry.entries();
        registry.on_section("b", noop);

        assert_eq!(pass.len(), 1);
        assert_eq!(registry.entries().len(), 2);
        assert!(!registry.is_empty());
    }
}
