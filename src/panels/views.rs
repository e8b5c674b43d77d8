//! View models for the dashboard panels.
//!
//! Pure functions from a `Snapshot` to plain data. Every function
//! degrades to `None` / an empty list when the data it needs is absent;
//! none of them fail.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::snapshot::{ChatMessage, Snapshot, WorkflowRecord};
use crate::util::{format_clock, format_execution_time, format_running_time, parse_timestamp, span_between};

/// Status badge colour, mirroring the web dashboard's classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Badge {
    Primary,
    Success,
    Danger,
    Secondary,
}

impl Badge {
    pub fn for_status(status: &str) -> Self {
        match status {
            "processing" => Badge::Primary,
            "completed" => Badge::Success,
            "failed" => Badge::Danger,
            _ => Badge::Secondary,
        }
    }
}

// ------------------------------------------------------------
// System overview
// ------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemOverview {
    pub status: String,
    pub running_time: String,
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    /// Comma-separated active ids, or "--"
    pub active_ids: String,
}

/// `None` until the backend has published both status and start time.
pub fn system_overview(snap: &Snapshot, now: DateTime<Utc>) -> Option<SystemOverview> {
    let status = snap.system.status.as_ref()?.value.clone();
    let started = parse_timestamp(&snap.system.start_time.as_ref()?.value)?;

    let overview = snap.overview().cloned().unwrap_or_default();
    let active_ids = if overview.active_workflows.is_empty() {
        "--".to_string()
    } else {
        overview.active_workflows.join(", ")
    };

    Some(SystemOverview {
        status,
        running_time: format_running_time(now - started),
        total: overview.all_workflows.len(),
        active: overview.active_workflows.len(),
        completed: overview.completed_workflows.len(),
        failed: overview.failed_workflows.len(),
        active_ids,
    })
}

// ------------------------------------------------------------
// Chat
// ------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatLine {
    pub role: String,
    pub content: String,
    pub time: Option<String>,
}

impl From<&ChatMessage> for ChatLine {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.clone(),
            content: msg.content.clone(),
            time: msg.timestamp.as_deref().map(format_clock),
        }
    }
}

pub fn chat_history(snap: &Snapshot) -> Vec<ChatLine> {
    snap.chat
        .system_history
        .as_ref()
        .map(|h| h.value.iter().map(ChatLine::from).collect())
        .unwrap_or_default()
}

pub fn recent_history(snap: &Snapshot) -> Vec<ChatLine> {
    snap.chat
        .recent_history
        .as_ref()
        .map(|h| h.value.iter().map(ChatLine::from).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputAnalysis {
    /// Pretty-printed analysis object
    pub body: String,
    pub time: Option<String>,
}

pub fn user_input_analysis(snap: &Snapshot) -> Option<InputAnalysis> {
    let tracked = snap.chat.process_user_input.as_ref()?;
    if tracked.value.is_null() {
        return None;
    }
    Some(InputAnalysis {
        body: serde_json::to_string_pretty(&tracked.value).unwrap_or_else(|_| tracked.value.to_string()),
        time: tracked.timestamp.as_deref().map(format_clock),
    })
}

// ------------------------------------------------------------
// Workflows
// ------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub time: String,
    pub status: String,
    pub node: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultCard {
    pub node_type: String,
    /// Enlarged content shown on demand
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowPanel {
    pub id: String,
    pub status: String,
    pub badge: Badge,
    pub log: Vec<LogLine>,
    pub results: Vec<ResultCard>,
}

/// Status shown for a workflow with no log entries yet.
const UNKNOWN_STATUS: &str = "unknown";

pub fn workflow_panel(id: &str, snap: &Snapshot) -> Option<WorkflowPanel> {
    snap.workflow(id).map(|record| build_panel(id, record))
}

fn build_panel(id: &str, record: &WorkflowRecord) -> WorkflowPanel {
    let status = record.status().unwrap_or(UNKNOWN_STATUS).to_string();
    WorkflowPanel {
        id: id.to_string(),
        badge: Badge::for_status(&status),
        status,
        log: record
            .execution_log
            .iter()
            .map(|entry| LogLine {
                time: entry.timestamp.as_deref().map(format_clock).unwrap_or_default(),
                status: entry.value.status.clone(),
                node: entry.value.node.clone(),
                message: entry.value.message.clone(),
            })
            .collect(),
        results: record
            .node_results
            .iter()
            .map(|(node_type, result)| ResultCard {
                node_type: node_type.clone(),
                content: node_content_display(node_type, &result.content),
            })
            .collect(),
    }
}

/// Text shown when a result card is enlarged.
///
/// SVG nodes may carry a list of documents; they are joined with
/// newlines. Strings are shown verbatim, anything else as pretty JSON.
pub fn node_content_display(node_type: &str, content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) if node_type == "svg" => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedWorkflow {
    pub execution_time: String,
    pub panel: WorkflowPanel,
}

/// The most recently completed workflow (last id in the completed list).
pub fn latest_completed(snap: &Snapshot) -> Option<CompletedWorkflow> {
    let id = snap.overview()?.completed_workflows.last()?;
    let record = snap.workflow(id)?;

    let execution_time = match (record.first_entry(), record.last_entry()) {
        (Some(first), Some(last)) => first
            .timestamp
            .as_deref()
            .zip(last.timestamp.as_deref())
            .and_then(|(start, end)| span_between(start, end))
            .map(format_execution_time),
        _ => None,
    }
    .unwrap_or_else(|| "--".to_string());

    Some(CompletedWorkflow {
        execution_time,
        panel: build_panel(id, record),
    })
}

/// Display name for a workflow, derived from its first node.
pub fn workflow_kind(first_node: &str) -> String {
    match first_node {
        "workflow" => "standard workflow",
        "narrative" => "narrative generation",
        "parallel" => "parallel processing",
        "analysis" => "data analysis",
        other => other,
    }
    .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub badge: Badge,
    pub started: String,
}

/// Every known workflow, newest first by first log timestamp.
///
/// Workflows listed in the overview but missing from `workflows`, or
/// without a parseable start, sort last.
pub fn history_rows(snap: &Snapshot) -> Vec<HistoryRow> {
    let Some(overview) = snap.overview() else {
        return Vec::new();
    };

    let mut rows: Vec<(Option<DateTime<Utc>>, HistoryRow)> = overview
        .all_workflows
        .iter()
        .map(|id| {
            let record = snap.workflow(id);
            let first = record.and_then(WorkflowRecord::first_entry);
            let started_raw = first.and_then(|e| e.timestamp.as_deref());
            let status = record
                .and_then(WorkflowRecord::status)
                .unwrap_or(UNKNOWN_STATUS)
                .to_string();

            let row = HistoryRow {
                id: id.clone(),
                kind: first.map(|e| workflow_kind(&e.value.node)).unwrap_or_default(),
                badge: Badge::for_status(&status),
                status,
                started: started_raw.map(format_clock).unwrap_or_default(),
            };
            (started_raw.and_then(parse_timestamp), row)
        })
        .collect();

    // None < Some, so reversing the natural order puts missing starts last
    rows.sort_by(|a, b| b.0.cmp(&a.0));
    rows.into_iter().map(|(_, row)| row).collect()
}

/// Active workflows besides the first one, with their current status.
///
/// The first active id is the workflow the main panel already follows.
pub fn other_active(snap: &Snapshot) -> Vec<(String, String)> {
    let Some(overview) = snap.overview() else {
        return Vec::new();
    };
    overview
        .active_workflows
        .iter()
        .skip(1)
        .filter_map(|id| {
            let status = snap.workflow(id)?.status().unwrap_or(UNKNOWN_STATUS);
            Some((id.clone(), status.to_string()))
        })
        .collect()
}
