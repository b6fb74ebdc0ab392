pub mod sse;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub use store::{Applied, GraphModel, MotionMut, RigGroup, StateStore, ACTIVITY_CAPACITY};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Mayor,
    Deacon,
    Overseer,
    Witness,
    Refinery,
    Polecat,
    Crew,
    Bead,
    Convoy,
    #[serde(other)]
    Unknown,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Mayor => "mayor",
            NodeType::Deacon => "deacon",
            NodeType::Overseer => "overseer",
            NodeType::Witness => "witness",
            NodeType::Refinery => "refinery",
            NodeType::Polecat => "polecat",
            NodeType::Crew => "crew",
            NodeType::Bead => "bead",
            NodeType::Convoy => "convoy",
            NodeType::Unknown => "unknown",
        }
    }

    /// Nominal diameter in layout units. Drives collision radius and shape size.
    pub fn size(&self) -> f64 {
        match self {
            NodeType::Mayor => 48.0,
            NodeType::Deacon => 36.0,
            NodeType::Overseer => 40.0,
            NodeType::Witness => 32.0,
            NodeType::Refinery => 36.0,
            NodeType::Polecat => 24.0,
            NodeType::Crew => 24.0,
            NodeType::Bead => 8.0,
            NodeType::Convoy => 32.0,
            NodeType::Unknown => 24.0,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Working,
    Idle,
    Running,
    Stopped,
    Nuked,
    Spawning,
    Unassigned,
    Hooked,
    InProgress,
    InRefinery,
    Merged,
    Closed,
    Rejected,
    Escalated,
    #[serde(other)]
    Other,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Working => "working",
            NodeState::Idle => "idle",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
            NodeState::Nuked => "nuked",
            NodeState::Spawning => "spawning",
            NodeState::Unassigned => "unassigned",
            NodeState::Hooked => "hooked",
            NodeState::InProgress => "in_progress",
            NodeState::InRefinery => "in_refinery",
            NodeState::Merged => "merged",
            NodeState::Closed => "closed",
            NodeState::Rejected => "rejected",
            NodeState::Escalated => "escalated",
            NodeState::Other => "other",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation-only physics state. Never part of the wire format.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Motion {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub fx: Option<f64>,
    pub fy: Option<f64>,
    pub placed: bool,
}

impl Motion {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            placed: true,
            ..Self::default()
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.fx.is_some() || self.fy.is_some()
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub state: NodeState,
    #[serde(
        default,
        deserialize_with = "deserialize_non_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub rig: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(
        default,
        deserialize_with = "deserialize_nullable_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip)]
    pub motion: Motion,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeType, state: NodeState) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            kind,
            state,
            rig: None,
            metadata: BTreeMap::new(),
            motion: Motion::default(),
        }
    }

    pub fn with_rig(mut self, rig: impl Into<String>) -> Self {
        self.rig = Some(rig.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Partial node carried by `nodes_updated`. Present fields overwrite, absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NodeUpdate {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<NodeType>,
    #[serde(default)]
    pub state: Option<NodeState>,
    #[serde(default, deserialize_with = "deserialize_present_rig")]
    pub rig: Option<Option<String>>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "deserialize_present_map")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl NodeUpdate {
    pub fn merge_into(&self, node: &mut Node) {
        if let Some(kind) = self.kind {
            node.kind = kind;
        }
        if let Some(state) = self.state {
            node.state = state;
        }
        if let Some(rig) = &self.rig {
            node.rig = rig.clone();
        }
        if let Some(label) = &self.label {
            node.label = label.clone();
        }
        if let Some(metadata) = &self.metadata {
            node.metadata = metadata.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_nullable_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub metadata: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(kind: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: source.into(),
            target: target.into(),
            label: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Identity key used by `edges_removed`: `type:source:target`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.kind, self.source, self.target)
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event: String,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub agent: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub detail: Option<String>,
}

impl ActivityEntry {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            event: event.into(),
            agent: None,
            detail: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    #[serde(default)]
    pub rig_count: u32,
    #[serde(default)]
    pub active_polecats: u32,
    #[serde(default)]
    pub open_beads: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_convoys: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub nodes: Vec<Node>,
    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub edges: Vec<Edge>,
    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub activity: Vec<ActivityEntry>,
    #[serde(default)]
    pub summary: Summary,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Diff {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub nodes_added: Vec<Node>,
    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub nodes_removed: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub nodes_updated: Vec<NodeUpdate>,
    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub edges_added: Vec<Edge>,
    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub edges_removed: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub activity_append: Vec<ActivityEntry>,
    #[serde(default)]
    pub summary: Option<Summary>,
}

/// Envelope of one pushed message. Unknown `type` values decode to `Unknown`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Snapshot(Snapshot),
    Diff(Diff),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message decode failed: {0}")]
    Decode(String),
}

pub fn decode_message(raw: &str) -> Result<StreamMessage, MessageError> {
    serde_json::from_str(raw).map_err(|err| MessageError::Decode(err.to_string()))
}

/// Empty strings on the wire mean "absent" (the server omits or blanks optional text).
fn deserialize_non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn deserialize_present_rig<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_non_empty(deserializer).map(Some)
}

fn deserialize_present_map<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_nullable_map(deserializer).map(Some)
}

fn deserialize_nullable_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<BTreeMap<String, String>> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

fn deserialize_nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_envelope_decodes_wire_shape() {
        let message = decode_message(
            r#"{
                "type": "snapshot",
                "timestamp": "2026-02-07T21:00:00Z",
                "nodes": [
                    {"id": "mayor", "type": "mayor", "state": "running", "label": "Mayor"},
                    {"id": "r1/polecats/p1", "type": "polecat", "state": "working", "rig": "r1",
                     "label": "p1", "metadata": {"hooked_bead": "gt-12"}}
                ],
                "edges": [{"source": "mayor", "target": "r1/polecats/p1", "type": "assignment"}],
                "activity": [{"timestamp": "2026-02-07T20:59:00Z", "event": "polecat_spawned",
                              "agent": "r1/polecats/p1", "detail": ""}],
                "summary": {"rig_count": 1, "active_polecats": 1, "open_beads": 3}
            }"#,
        )
        .expect("decode snapshot");

        let StreamMessage::Snapshot(snapshot) = message else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.nodes[1].kind, NodeType::Polecat);
        assert_eq!(snapshot.nodes[1].rig.as_deref(), Some("r1"));
        assert_eq!(
            snapshot.nodes[1].metadata.get("hooked_bead").map(String::as_str),
            Some("gt-12")
        );
        assert_eq!(snapshot.edges[0].key(), "assignment:mayor:r1/polecats/p1");
        assert_eq!(snapshot.activity[0].detail, None);
        assert_eq!(snapshot.summary.open_beads, 3);
    }

    #[test]
    fn diff_envelope_tolerates_null_and_missing_lists() {
        let message = decode_message(
            r#"{"type":"diff","timestamp":"2026-02-07T21:00:05Z","nodes_added":null,
                "nodes_updated":[{"id":"r1/polecats/p1","state":"idle","rig":null}]}"#,
        )
        .expect("decode diff");

        let StreamMessage::Diff(diff) = message else {
            panic!("expected diff");
        };
        assert!(diff.nodes_added.is_empty());
        assert!(diff.edges_removed.is_empty());
        assert!(diff.summary.is_none());
        let update = &diff.nodes_updated[0];
        assert_eq!(update.state, Some(NodeState::Idle));
        assert_eq!(update.rig, Some(None));
        assert_eq!(update.label, None);
        assert_eq!(update.metadata, None);
    }

    #[test]
    fn unrecognized_envelope_type_is_not_an_error() {
        let message = decode_message(r#"{"type":"heartbeat","seq":4}"#).expect("decode");
        assert_eq!(message, StreamMessage::Unknown);
    }

    #[test]
    fn malformed_json_reports_decode_error() {
        let result = decode_message("{\"type\":\"snapshot\"");
        assert!(matches!(result, Err(MessageError::Decode(_))));
    }

    #[test]
    fn unknown_node_type_and_state_fall_back() {
        let node: Node = serde_json::from_str(
            r#"{"id":"x","type":"zeppelin","state":"levitating","label":"x"}"#,
        )
        .expect("decode node");
        assert_eq!(node.kind, NodeType::Unknown);
        assert_eq!(node.state, NodeState::Other);
        assert_eq!(node.kind.size(), 24.0);
    }

    #[test]
    fn update_merges_only_present_fields() {
        let mut node = Node::new("r1/p1", NodeType::Polecat, NodeState::Idle)
            .with_rig("r1")
            .with_label("p1");
        node.motion = Motion::at(10.0, 20.0);

        let update: NodeUpdate =
            serde_json::from_str(r#"{"id":"r1/p1","state":"working"}"#).expect("decode update");
        update.merge_into(&mut node);

        assert_eq!(node.state, NodeState::Working);
        assert_eq!(node.rig.as_deref(), Some("r1"));
        assert_eq!(node.label, "p1");
        assert_eq!(node.motion.position(), (10.0, 20.0));
    }

    #[test]
    fn motion_is_not_serialized() {
        let mut node = Node::new("mayor", NodeType::Mayor, NodeState::Running);
        node.motion = Motion::at(5.0, 6.0);
        let value = serde_json::to_value(&node).expect("encode");
        assert!(value.get("motion").is_none());
        assert_eq!(value["type"], "mayor");
    }
}
