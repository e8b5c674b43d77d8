use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One full-state payload returned by a single poll of the backend.
///
/// The backend groups its monitor data into three sections:
/// - `system`:    process status and workflow overview lists
/// - `chat`:      conversation history and the last input analysis
/// - `workflows`: per-workflow execution logs and node results
///
/// DESIGN NOTES:
/// - Every field decodes to an empty value when absent (or `null`), so
///   subscribers never need to re-check the shape of the tree. A `null`
///   map value (`"workflows": {"7": null}`) becomes an empty record.
/// - A field that is present with the wrong JSON type is a decode error.
/// - Unknown fields are ignored; the backend may grow new keys freely.
/// - A Snapshot is never mutated after decoding. The scheduler shares it
///   as `Arc<Snapshot>` and replaces it wholesale on the next poll.
///
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Snapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub system: SystemSection,

    #[serde(deserialize_with = "null_as_default")]
    pub chat: ChatSection,

    /// Workflow id -> workflow record
    #[serde(deserialize_with = "null_values")]
    pub workflows: BTreeMap<String, WorkflowRecord>,
}

// ------------------------------------------------------------
// Tracked value
// ------------------------------------------------------------
//
// The backend stores every monitored field as
// `{ "value": ..., "timestamp": "<iso8601>" }`.
//
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct Tracked<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: T,

    /// ISO-8601 time the backend recorded the value.
    #[serde(default)]
    pub timestamp: Option<String>,
}

// ------------------------------------------------------------
// System section
// ------------------------------------------------------------
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SystemSection {
    /// Backend status, e.g. "running"
    pub status: Option<Tracked<String>>,

    /// ISO-8601 time the backend started
    pub start_time: Option<Tracked<String>>,

    pub workflows_overview: Option<Tracked<WorkflowsOverview>>,
}

/// Aggregated workflow id lists maintained by the backend.
///
/// Lists are kept in the order the backend appended to them, so the
/// last element of `completed_workflows` is the most recently finished.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct WorkflowsOverview {
    #[serde(deserialize_with = "null_as_default")]
    pub all_workflows: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub active_workflows: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub completed_workflows: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub failed_workflows: Vec<String>,
}

// ------------------------------------------------------------
// Chat section
// ------------------------------------------------------------
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ChatSection {
    /// Full system-wide message history
    pub system_history: Option<Tracked<Vec<ChatMessage>>>,

    /// Free-form analysis of the most recent user input
    pub process_user_input: Option<Tracked<Value>>,

    /// Short window of recent messages
    pub recent_history: Option<Tracked<Vec<ChatMessage>>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ChatMessage {
    /// "user", "assistant", "system", ...
    #[serde(deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    pub timestamp: Option<String>,
}

// ------------------------------------------------------------
// Workflow records
// ------------------------------------------------------------
//
// One record per workflow id. `execution_log` is ordered oldest
// first; the last entry carries the workflow's current status.
//
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct WorkflowRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub execution_log: Vec<Tracked<LogEntry>>,

    /// Node type (e.g. "svg", "narrative") -> result produced by that node
    #[serde(deserialize_with = "null_values")]
    pub node_results: BTreeMap<String, NodeResult>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LogEntry {
    /// "processing", "completed", "failed", ...
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub node: String,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct NodeResult {
    /// Typed content; shape depends on the node type
    pub content: Value,
}

impl Snapshot {
    /// Decodes a snapshot from a raw JSON body.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn workflow(&self, id: &str) -> Option<&WorkflowRecord> {
        self.workflows.get(id)
    }

    /// Returns the workflow overview, or `None` if the backend has not
    /// published one yet.
    pub fn overview(&self) -> Option<&WorkflowsOverview> {
        self.system.workflows_overview.as_ref().map(|t| &t.value)
    }

    /// Computes which logical areas differ from `previous`.
    ///
    /// With no previous snapshot every non-empty area counts as changed
    /// and every workflow as added.
    pub fn changes_since(&self, previous: Option<&Snapshot>) -> ChangeSet {
        let Some(prev) = previous else {
            return ChangeSet {
                system: self.system != SystemSection::default(),
                chat: self.chat != ChatSection::default(),
                workflows_added: self.workflows.keys().cloned().collect(),
                ..ChangeSet::default()
            };
        };

        let mut changes = ChangeSet {
            system: self.system != prev.system,
            chat: self.chat != prev.chat,
            ..ChangeSet::default()
        };

        for (id, record) in &self.workflows {
            match prev.workflows.get(id) {
                None => changes.workflows_added.push(id.clone()),
                Some(old) if old != record => changes.workflows_updated.push(id.clone()),
                Some(_) => {}
            }
        }
        changes.workflows_removed = prev
            .workflows
            .keys()
            .filter(|id| !self.workflows.contains_key(*id))
            .cloned()
            .collect();

        changes
    }
}

impl WorkflowRecord {
    pub fn first_entry(&self) -> Option<&Tracked<LogEntry>> {
        self.execution_log.first()
    }

    pub fn last_entry(&self) -> Option<&Tracked<LogEntry>> {
        self.execution_log.last()
    }

    /// Current status: the status of the most recent log entry.
    pub fn status(&self) -> Option<&str> {
        self.last_entry().map(|e| e.value.status.as_str())
    }
}

/// Summary of what differs between two consecutive snapshots.
///
/// Workflow id lists are sorted (they come from ordered maps).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub system: bool,
    pub chat: bool,
    pub workflows_added: Vec<String>,
    pub workflows_updated: Vec<String>,
    pub workflows_removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        !self.system
            && !self.chat
            && self.workflows_added.is_empty()
            && self.workflows_updated.is_empty()
            && self.workflows_removed.is_empty()
    }
}

impl std::fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "no changes");
        }
        write!(
            f,
            "system={} chat={} added={:?} updated={:?} removed={:?}",
            self.system,
            self.chat,
            self.workflows_added,
            self.workflows_updated,
            self.workflows_removed,
        )
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Like `null_as_default` for a whole map, and also for each of its
/// values: `{"7": null}` decodes to an empty record under "7".
fn null_values<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let map: Option<BTreeMap<String, Option<T>>> = Option::deserialize(deserializer)?;
    Ok(map
        .unwrap_or_default()
        .into_iter()
        .map(|(id, value)| (id, value.unwrap_or_default()))
        .collect())
}
