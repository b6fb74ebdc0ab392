use crate::{ActivityEntry, Diff, Edge, Motion, Node, NodeType, Snapshot, StreamMessage, Summary};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const ACTIVITY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphModel {
    pub timestamp: Option<DateTime<Utc>>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub activity: Vec<ActivityEntry>,
    pub summary: Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Snapshot,
    Diff,
    /// A diff arrived before any snapshot and was dropped.
    Cold,
    /// Envelope type the client does not handle.
    Ignored,
}

impl Applied {
    pub fn changed(&self) -> bool {
        matches!(self, Applied::Snapshot | Applied::Diff)
    }
}

/// Mutable view of one node's presentation state next to its read-only identity.
pub struct MotionMut<'a> {
    pub id: &'a str,
    pub kind: NodeType,
    pub rig: Option<&'a str>,
    pub motion: &'a mut Motion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigGroup<'a> {
    pub name: &'a str,
    pub members: Vec<&'a str>,
}

/// Sole owner of the canonical graph model.
#[derive(Debug, Default)]
pub struct StateStore {
    model: Option<GraphModel>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_snapshot(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&GraphModel> {
        self.model.as_ref()
    }

    pub fn apply(&mut self, message: StreamMessage) -> Applied {
        match message {
            StreamMessage::Snapshot(snapshot) => {
                self.apply_snapshot(snapshot);
                Applied::Snapshot
            }
            StreamMessage::Diff(diff) => {
                if self.apply_diff(diff) {
                    Applied::Diff
                } else {
                    Applied::Cold
                }
            }
            StreamMessage::Unknown => Applied::Ignored,
        }
    }

    /// Replaces the whole model. Surviving ids keep their motion so the layout stays put.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        let previous: HashMap<String, Motion> = self
            .model
            .take()
            .map(|model| {
                model
                    .nodes
                    .into_iter()
                    .map(|node| (node.id, node.motion))
                    .collect()
            })
            .unwrap_or_default();

        let mut nodes: Vec<Node> = Vec::with_capacity(snapshot.nodes.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(snapshot.nodes.len());
        for mut node in snapshot.nodes {
            if let Some(motion) = previous.get(&node.id) {
                node.motion = *motion;
            }
            match index.get(&node.id) {
                Some(&slot) => nodes[slot] = node,
                None => {
                    index.insert(node.id.clone(), nodes.len());
                    nodes.push(node);
                }
            }
        }

        let mut edges: Vec<Edge> = Vec::with_capacity(snapshot.edges.len());
        for edge in snapshot.edges {
            upsert_edge(&mut edges, edge);
        }

        let mut activity = snapshot.activity;
        truncate_activity(&mut activity);

        debug!(
            event = "snapshot_applied",
            nodes = nodes.len(),
            edges = edges.len(),
            activity = activity.len()
        );

        self.model = Some(GraphModel {
            timestamp: snapshot.timestamp,
            nodes,
            edges,
            activity,
            summary: snapshot.summary,
        });
    }

    /// Applies one diff in place. Returns `false` (and changes nothing) before the first snapshot.
    pub fn apply_diff(&mut self, diff: Diff) -> bool {
        let Some(model) = self.model.as_mut() else {
            debug!(event = "diff_dropped", reason = "no_snapshot");
            return false;
        };

        if !diff.nodes_removed.is_empty() {
            let removed: HashSet<&str> = diff.nodes_removed.iter().map(String::as_str).collect();
            model.nodes.retain(|node| !removed.contains(node.id.as_str()));
        }

        for node in diff.nodes_added {
            match model.nodes.iter().position(|existing| existing.id == node.id) {
                Some(slot) => model.nodes[slot] = node,
                None => model.nodes.push(node),
            }
        }

        let mut skipped_updates = 0usize;
        for update in &diff.nodes_updated {
            match model.nodes.iter_mut().find(|node| node.id == update.id) {
                Some(node) => update.merge_into(node),
                None => skipped_updates += 1,
            }
        }

        if !diff.edges_removed.is_empty() {
            let removed: HashSet<&str> = diff.edges_removed.iter().map(String::as_str).collect();
            model
                .edges
                .retain(|edge| !removed.contains(edge.key().as_str()));
        }

        for edge in diff.edges_added {
            upsert_edge(&mut model.edges, edge);
        }

        if !diff.activity_append.is_empty() {
            model.activity.extend(diff.activity_append);
            truncate_activity(&mut model.activity);
        }

        if let Some(summary) = diff.summary {
            model.summary = summary;
        }

        model.timestamp = diff.timestamp;

        debug!(
            event = "diff_applied",
            nodes = model.nodes.len(),
            edges = model.edges.len(),
            removed = diff.nodes_removed.len(),
            updated = diff.nodes_updated.len(),
            skipped_updates
        );
        true
    }

    pub fn nodes(&self) -> &[Node] {
        self.model
            .as_ref()
            .map(|model| model.nodes.as_slice())
            .unwrap_or(&[])
    }

    pub fn edges(&self) -> &[Edge] {
        self.model
            .as_ref()
            .map(|model| model.edges.as_slice())
            .unwrap_or(&[])
    }

    pub fn activity(&self) -> &[ActivityEntry] {
        self.model
            .as_ref()
            .map(|model| model.activity.as_slice())
            .unwrap_or(&[])
    }

    /// The last `count` activity entries, oldest first.
    pub fn recent_activity(&self, count: usize) -> &[ActivityEntry] {
        let activity = self.activity();
        &activity[activity.len().saturating_sub(count)..]
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.model.as_ref().map(|model| &model.summary)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.model.as_ref().and_then(|model| model.timestamp)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes().iter().find(|node| node.id == id)
    }

    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes().iter().map(|node| node.id.as_str()).collect()
    }

    /// Edges whose two endpoints are present. Dangling edges stay stored but are never drawn.
    pub fn resolved_edges(&self) -> Vec<&Edge> {
        let ids = self.node_ids();
        self.edges()
            .iter()
            .filter(|edge| ids.contains(edge.source.as_str()) && ids.contains(edge.target.as_str()))
            .collect()
    }

    /// Distinct rigs in order of first appearance, with their member ids.
    pub fn rigs(&self) -> Vec<RigGroup<'_>> {
        let mut groups: Vec<RigGroup<'_>> = Vec::new();
        for node in self.nodes() {
            let Some(rig) = node.rig.as_deref() else {
                continue;
            };
            match groups.iter_mut().find(|group| group.name == rig) {
                Some(group) => group.members.push(node.id.as_str()),
                None => groups.push(RigGroup {
                    name: rig,
                    members: vec![node.id.as_str()],
                }),
            }
        }
        groups
    }

    pub fn motions_mut(&mut self) -> impl Iterator<Item = MotionMut<'_>> {
        self.model
            .iter_mut()
            .flat_map(|model| model.nodes.iter_mut())
            .map(|node| {
                let Node {
                    id,
                    kind,
                    rig,
                    motion,
                    ..
                } = node;
                MotionMut {
                    id: id.as_str(),
                    kind: *kind,
                    rig: rig.as_deref(),
                    motion,
                }
            })
    }
}

/// Keeps edge keys unique: a repeated key replaces the earlier edge in place.
fn upsert_edge(edges: &mut Vec<Edge>, edge: Edge) {
    let key = edge.key();
    match edges.iter().position(|existing| existing.key() == key) {
        Some(slot) => edges[slot] = edge,
        None => edges.push(edge),
    }
}

fn truncate_activity(activity: &mut Vec<ActivityEntry>) {
    if activity.len() > ACTIVITY_CAPACITY {
        let excess = activity.len() - ACTIVITY_CAPACITY;
        activity.drain(..excess);
    }
}
