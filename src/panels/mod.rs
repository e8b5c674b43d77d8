//! Console renderers for the dashboard panels.
//!
//! Each panel is a subscriber: it turns the snapshot into a view model
//! (see `views`) and prints it through the `log` facade. A panel only
//! prints when its rendered text differs from the previous pass, so an
//! idle backend stays quiet.

pub mod views;

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;

use crate::snapshot::Snapshot;
use crate::sync::SubscriberRegistry;

/// Section keys used by the built-in panels.
pub const SYSTEM_OVERVIEW: &str = "system-overview";
pub const CHAT_HISTORY: &str = "chat-history";
pub const USER_INPUT: &str = "user-input-analysis";
pub const RECENT_HISTORY: &str = "recent-history";
pub const LATEST_COMPLETED: &str = "latest-completed";
pub const HISTORY_WORKFLOWS: &str = "history-workflows";
pub const OTHER_WORKFLOWS: &str = "other-workflows";

/// Remembers the last text a panel printed.
#[derive(Debug)]
pub struct PanelOutput {
    name: String,
    last: Mutex<Option<String>>,
}

impl PanelOutput {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            last: Mutex::new(None),
        })
    }

    /// Prints `text` if it differs from the last output. Returns whether
    /// anything was printed.
    pub fn show(&self, text: String) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(text.as_str()) {
            return false;
        }
        log::info!("[{}]\n{}", self.name, text);
        *last = Some(text);
        true
    }
}

/// Registers every section panel on `registry`.
pub fn register_console_panels(registry: &SubscriberRegistry) {
    register_section(registry, SYSTEM_OVERVIEW, render_system_overview);
    register_section(registry, CHAT_HISTORY, render_chat_history);
    register_section(registry, USER_INPUT, render_user_input);
    register_section(registry, RECENT_HISTORY, render_recent_history);
    register_section(registry, LATEST_COMPLETED, render_latest_completed);
    register_section(registry, HISTORY_WORKFLOWS, render_history);
    register_section(registry, OTHER_WORKFLOWS, render_other_active);
}

/// Registers a detail panel for one workflow.
pub fn register_workflow_panel(registry: &SubscriberRegistry, id: &str) {
    let out = PanelOutput::new(format!("workflow {id}"));
    registry.on_workflow(id, move |id, snap| {
        out.show(render_workflow(id, snap));
        Ok(())
    });
}

fn register_section(registry: &SubscriberRegistry, name: &str, render: fn(&Snapshot) -> String) {
    let out = PanelOutput::new(name);
    registry.on_section(name, move |snap| {
        out.show(render(snap));
        Ok(())
    });
}

// ------------------------------------------------------------
// Renderers
// ------------------------------------------------------------

fn render_system_overview(snap: &Snapshot) -> String {
    match views::system_overview(snap, Utc::now()) {
        Some(v) => format!(
            "status: {}  uptime: {}\nworkflows: total={} active={} completed={} failed={}\nactive: {}",
            v.status, v.running_time, v.total, v.active, v.completed, v.failed, v.active_ids
        ),
        None => "system status not ready".to_string(),
    }
}

fn render_chat_history(snap: &Snapshot) -> String {
    let lines = views::chat_history(snap);
    if lines.is_empty() {
        return "no messages".to_string();
    }
    render_chat_lines(&lines)
}

fn render_recent_history(snap: &Snapshot) -> String {
    let lines = views::recent_history(snap);
    if lines.is_empty() {
        return "no recent conversation".to_string();
    }
    render_chat_lines(&lines)
}

fn render_chat_lines(lines: &[views::ChatLine]) -> String {
    lines
        .iter()
        .map(|l| match &l.time {
            Some(t) => format!("{t} {}: {}", l.role, l.content),
            None => format!("{}: {}", l.role, l.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_user_input(snap: &Snapshot) -> String {
    match views::user_input_analysis(snap) {
        Some(a) => format!("{}\n{}", a.time.unwrap_or_default(), a.body),
        None => "no input analysed yet".to_string(),
    }
}

fn render_workflow(id: &str, snap: &Snapshot) -> String {
    match views::workflow_panel(id, snap) {
        Some(panel) => render_panel(&panel),
        None => format!("workflow #{id}: waiting for data"),
    }
}

fn render_panel(panel: &views::WorkflowPanel) -> String {
    let mut text = format!("workflow #{} [{}]", panel.id, panel.status);
    for line in &panel.log {
        let _ = write!(text, "\n  {} {:<10} {:<12} {}", line.time, line.status, line.node, line.message);
    }
    for card in &panel.results {
        let _ = write!(text, "\n  result[{}]: {} chars", card.node_type, card.content.len());
    }
    text
}

fn render_latest_completed(snap: &Snapshot) -> String {
    match views::latest_completed(snap) {
        Some(done) => format!("took {}\n{}", done.execution_time, render_panel(&done.panel)),
        None => "no completed workflows".to_string(),
    }
}

fn render_history(snap: &Snapshot) -> String {
    let rows = views::history_rows(snap);
    if rows.is_empty() {
        return "no workflow history".to_string();
    }
    rows.iter()
        .map(|r| format!("{:<10} {:<22} {:<10} {}", r.id, r.kind, r.status, r.started))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_other_active(snap: &Snapshot) -> String {
    let active = views::other_active(snap);
    if active.is_empty() {
        return "no other active workflows".to_string();
    }
    active
        .iter()
        .map(|(id, status)| format!("#{id} {status}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{SubscriptionKey, dispatch};

    #[test]
    fn panel_output_only_prints_changes() {
        let out = PanelOutput::new("test");
        assert!(out.show("a".to_string()));
        assert!(!out.show("a".to_string()));
        assert!(out.show("b".to_string()));
    }

    #[test]
    fn console_panels_survive_an_empty_snapshot() {
        let registry = SubscriberRegistry::new();
        register_console_panels(&registry);
        register_workflow_panel(&registry, "7");

        assert_eq!(registry.len(), 8);
        assert!(registry.contains(&SubscriptionKey::workflow("7")));

        let report = dispatch(&Snapshot::default(), &registry);
        assert_eq!(report.invoked, 8);
        assert!(report.is_clean());
    }

    #[test]
    fn placeholders_for_missing_data() {
        let snap = Snapshot::default();
        assert_eq!(render_system_overview(&snap), "system status not ready");
        assert_eq!(render_workflow("7", &snap), "workflow #7: waiting for data");
        assert_eq!(render_history(&snap), "no workflow history");
        assert_eq!(render_recent_history(&snap), "no recent conversation");
    }
}
