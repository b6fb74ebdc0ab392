use chrono::{DateTime, Local, Utc};
use zeppelin_core::{ActivityEntry, Node, NodeType, StateStore, Summary};

/// Entries shown in the activity feed.
pub const FEED_CAPACITY: usize = 50;

/// At most one selected node, tracked by id and re-resolved every frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: Option<String>,
}

impl Selection {
    pub fn select(&mut self, id: impl Into<String>) {
        self.selected = Some(id.into());
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// The selected node if it still exists in the model.
    pub fn resolve<'a>(&self, store: &'a StateStore) -> Option<&'a Node> {
        self.selected.as_deref().and_then(|id| store.node(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailField {
    pub label: String,
    pub value: String,
}

impl DetailField {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

pub fn detail_fields(node: &Node) -> Vec<DetailField> {
    let mut fields = vec![
        DetailField::new("ID", node.id.as_str()),
        DetailField::new("Type", node.kind.as_str()),
        DetailField::new("State", node.state.as_str()),
    ];
    if let Some(rig) = node.rig.as_deref() {
        fields.push(DetailField::new("Rig", rig));
    }
    for (key, value) in &node.metadata {
        if value.is_empty() {
            continue;
        }
        fields.push(DetailField::new(key.replace('_', " "), value.as_str()));
    }
    fields
}

/// Shell command that inspects the node, for roles that have one.
pub fn terminal_command(node: &Node) -> Option<String> {
    let rig = node.rig.as_deref().unwrap_or_default();
    match node.kind {
        NodeType::Bead => Some(format!("bd show {}", node.label)),
        NodeType::Polecat => Some(format!("gt peek {rig}/polecats/{}", node.label)),
        NodeType::Witness => Some(format!("gt peek {rig}/witness")),
        NodeType::Refinery => Some(format!("gt peek {rig}/refinery")),
        NodeType::Mayor
        | NodeType::Deacon
        | NodeType::Overseer
        | NodeType::Crew
        | NodeType::Convoy
        | NodeType::Unknown => None,
    }
}

pub fn pluralize(count: u32, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Status-bar counts. Convoys only appear while some are active.
pub fn summary_parts(summary: &Summary) -> Vec<String> {
    let mut parts = vec![
        pluralize(summary.rig_count, "rig"),
        pluralize(summary.active_polecats, "polecat"),
        pluralize(summary.open_beads, "bead"),
    ];
    if let Some(convoys) = summary.active_convoys.filter(|&count| count > 0) {
        parts.push(pluralize(convoys, "convoy"));
    }
    parts
}

pub fn activity_glyph(event: &str) -> &'static str {
    match event {
        "bead_closed" => "✓",
        "bead_opened" => "○",
        "bead_hooked" => "⚓",
        "polecat_spawned" => "🐱",
        "polecat_nuked" => "💀",
        "mail_sent" => "✉",
        "merge_complete" => "🔀",
        "escalation" => "🚨",
        "state_change" => "↻",
        _ => "·",
    }
}

/// Wall-clock `HH:MM:SS` in local time, blank when the entry has no timestamp.
pub fn format_time(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp
        .map(|ts| ts.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Most recent feed entries, oldest first so the newest sits at the bottom.
pub fn feed_entries(store: &StateStore) -> &[ActivityEntry] {
    store.recent_activity(FEED_CAPACITY)
}
