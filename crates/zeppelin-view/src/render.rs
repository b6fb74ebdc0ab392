//! Reconciliation between the canonical model and what is on screen.
//!
//! The coordinator keeps one sprite per live node plus short-lived exit sprites and
//! fire-and-forget effects. Everything here is driven by explicit `Instant`s so the
//! timelines are deterministic under test.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;
use zeppelin_core::{ActivityEntry, Edge, NodeState, NodeType, StateStore};

pub const SPAWN_FADE: Duration = Duration::from_millis(600);
pub const SPAWN_RING: Duration = Duration::from_millis(600);
pub const REMOVAL: Duration = Duration::from_millis(800);
pub const PARTICLE: Duration = Duration::from_millis(800);
pub const MERGE_PULSE: Duration = Duration::from_millis(500);

pub const RIG_PADDING: f64 = 40.0;
pub const CONVOY_HEIGHT: f64 = 14.0;
pub const PARTICLE_RADIUS: f64 = 4.0;
const SPAWN_RING_RADIUS: f64 = 30.0;
const PULSE_START_RADIUS: f64 = 18.0;
const PULSE_END_RADIUS: f64 = 60.0;
const REMOVED_SCALE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Hexagon,
    Diamond,
    Circle,
    RoundedRect,
    Pill,
}

pub fn shape_for(kind: NodeType) -> Shape {
    match kind {
        NodeType::Mayor | NodeType::Deacon => Shape::Hexagon,
        NodeType::Overseer => Shape::Diamond,
        NodeType::Witness | NodeType::Polecat | NodeType::Bead | NodeType::Unknown => {
            Shape::Circle
        }
        NodeType::Refinery | NodeType::Crew => Shape::RoundedRect,
        NodeType::Convoy => Shape::Pill,
    }
}

/// Animated state classes derived from `(type, state)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisualClasses {
    pub breathing: bool,
    pub pulse_hooked: bool,
}

impl VisualClasses {
    pub fn of(kind: NodeType, state: NodeState) -> Self {
        let breathing = match (kind, state) {
            (NodeType::Polecat, NodeState::Working) => true,
            (
                NodeType::Witness | NodeType::Refinery | NodeType::Mayor | NodeType::Deacon,
                NodeState::Running,
            ) => true,
            _ => false,
        };
        Self {
            breathing,
            pulse_hooked: kind == NodeType::Bead && state == NodeState::Hooked,
        }
    }
}

pub fn edge_heartbeat(edge: &Edge) -> bool {
    edge.kind == "monitoring"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    started: Instant,
    duration: Duration,
}

impl Transition {
    pub fn new(started: Instant, duration: Duration) -> Self {
        Self { started, duration }
    }

    /// Linear progress in `0.0..=1.0`.
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub fn finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.duration
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub id: String,
    pub kind: NodeType,
    pub state: NodeState,
    pub label: String,
    pub position: (f64, f64),
    pub shape: Shape,
    pub classes: VisualClasses,
    fade_in: Option<Transition>,
    ring: Option<Transition>,
}

impl Sprite {
    pub fn size(&self) -> f64 {
        self.kind.size()
    }

    pub fn opacity(&self, now: Instant) -> f64 {
        self.fade_in
            .map(|fade| fade.progress(now))
            .unwrap_or(1.0)
    }

    /// Spawn ring `(radius, opacity)` while it plays.
    pub fn ring(&self, now: Instant) -> Option<(f64, f64)> {
        let ring = self.ring?;
        if ring.finished(now) {
            return None;
        }
        let p = ring.progress(now);
        Some((SPAWN_RING_RADIUS * p, 0.8 * (1.0 - p)))
    }
}

/// Last picture of a removed node while it shrinks away.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitingSprite {
    pub sprite: Sprite,
    transition: Transition,
}

impl ExitingSprite {
    pub fn opacity(&self, now: Instant) -> f64 {
        1.0 - self.transition.progress(now)
    }

    pub fn scale(&self, now: Instant) -> f64 {
        1.0 - (1.0 - REMOVED_SCALE) * self.transition.progress(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectKind {
    Particle { from: (f64, f64), to: (f64, f64) },
    Pulse { at: (f64, f64) },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Effect {
    pub kind: EffectKind,
    transition: Transition,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectFrame {
    pub position: (f64, f64),
    pub radius: f64,
    pub opacity: f64,
}

impl Effect {
    pub fn frame(&self, now: Instant) -> EffectFrame {
        let p = self.transition.progress(now);
        match self.kind {
            EffectKind::Particle { from, to } => EffectFrame {
                position: (from.0 + (to.0 - from.0) * p, from.1 + (to.1 - from.1) * p),
                radius: PARTICLE_RADIUS,
                opacity: 0.9 * (1.0 - p),
            },
            EffectKind::Pulse { at } => EffectFrame {
                position: at,
                radius: PULSE_START_RADIUS + (PULSE_END_RADIUS - PULSE_START_RADIUS) * p,
                opacity: 0.8 * (1.0 - p),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub spawned: Vec<String>,
    pub persisted: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RigBox {
    pub name: String,
    pub min: (f64, f64),
    pub max: (f64, f64),
}

/// Padded bounding box of each rig's member positions, in rig order.
pub fn rig_boxes(store: &StateStore) -> Vec<RigBox> {
    let positions: HashMap<&str, (f64, f64)> = store
        .nodes()
        .iter()
        .map(|node| (node.id.as_str(), node.motion.position()))
        .collect();
    store
        .rigs()
        .into_iter()
        .filter_map(|rig| {
            let mut points = rig.members.iter().filter_map(|id| positions.get(id));
            let first = *points.next()?;
            let (min, max) = points.fold((first, first), |(min, max), &(x, y)| {
                ((min.0.min(x), min.1.min(y)), (max.0.max(x), max.1.max(y)))
            });
            Some(RigBox {
                name: rig.name.to_string(),
                min: (min.0 - RIG_PADDING, min.1 - RIG_PADDING),
                max: (max.0 + RIG_PADDING, max.1 + RIG_PADDING),
            })
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct RenderCoordinator {
    sprites: Vec<Sprite>,
    exiting: Vec<ExitingSprite>,
    effects: Vec<Effect>,
    known: Option<HashSet<String>>,
}

impl RenderCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    pub fn sprite(&self, id: &str) -> Option<&Sprite> {
        self.sprites.iter().find(|sprite| sprite.id == id)
    }

    pub fn exiting(&self) -> &[ExitingSprite] {
        &self.exiting
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Diffs the model's node ids against the previous sync. The very first sync spawns
    /// nothing so the initial picture appears without an entry animation.
    pub fn sync(&mut self, store: &StateStore, now: Instant) -> Reconciliation {
        let previous = self.known.take();
        let animate = previous.is_some();
        let previous = previous.unwrap_or_default();
        let current: HashSet<String> = store.nodes().iter().map(|node| node.id.clone()).collect();

        let mut reconciliation = Reconciliation::default();
        let draw_order: Vec<String> = self.sprites.iter().map(|sprite| sprite.id.clone()).collect();
        let mut old: HashMap<String, Sprite> = self
            .sprites
            .drain(..)
            .map(|sprite| (sprite.id.clone(), sprite))
            .collect();

        for node in store.nodes() {
            let existing = old.remove(&node.id);
            let spawned = animate && !previous.contains(&node.id);
            let (fade_in, ring) = match (&existing, spawned) {
                (Some(sprite), false) => (sprite.fade_in, sprite.ring),
                (_, true) => (
                    Some(Transition::new(now, SPAWN_FADE)),
                    (node.kind == NodeType::Polecat).then(|| Transition::new(now, SPAWN_RING)),
                ),
                (None, false) => (None, None),
            };
            if spawned {
                reconciliation.spawned.push(node.id.clone());
            } else {
                reconciliation.persisted.push(node.id.clone());
            }
            self.sprites.push(Sprite {
                id: node.id.clone(),
                kind: node.kind,
                state: node.state,
                label: node.label.clone(),
                position: node.motion.position(),
                shape: shape_for(node.kind),
                classes: VisualClasses::of(node.kind, node.state),
                fade_in,
                ring,
            });
        }

        // Whatever was known but is gone now, in previous draw order.
        for id in draw_order {
            if current.contains(&id) {
                continue;
            }
            let Some(sprite) = old.remove(&id) else {
                continue;
            };
            reconciliation.removed.push(sprite.id.clone());
            self.exiting.retain(|exiting| exiting.sprite.id != sprite.id);
            self.exiting.push(ExitingSprite {
                sprite,
                transition: Transition::new(now, REMOVAL),
            });
        }

        debug!(
            event = "render_sync",
            spawned = reconciliation.spawned.len(),
            persisted = reconciliation.persisted.len(),
            removed = reconciliation.removed.len()
        );
        self.known = Some(current);
        reconciliation
    }

    /// Copies positions from the model and drops finished transitions and effects.
    pub fn tick(&mut self, store: &StateStore, now: Instant) {
        let positions: HashMap<&str, (f64, f64)> = store
            .nodes()
            .iter()
            .map(|node| (node.id.as_str(), node.motion.position()))
            .collect();
        for sprite in &mut self.sprites {
            if let Some(position) = positions.get(sprite.id.as_str()) {
                sprite.position = *position;
            }
            if sprite.fade_in.is_some_and(|fade| fade.finished(now)) {
                sprite.fade_in = None;
            }
            if sprite.ring.is_some_and(|ring| ring.finished(now)) {
                sprite.ring = None;
            }
        }
        self.exiting
            .retain(|exiting| !exiting.transition.finished(now));
        self.effects.retain(|effect| !effect.transition.finished(now));
    }

    /// Fires the one-shot effect an activity entry calls for, if any.
    pub fn trigger(&mut self, entry: &ActivityEntry, store: &StateStore, now: Instant) {
        let position = |id: &str| store.node(id).map(|node| node.motion.position());
        let kind = match entry.event.as_str() {
            "merge_complete" => {
                let Some(rig) = entry
                    .agent
                    .as_deref()
                    .and_then(|agent| agent.split('/').next())
                    .filter(|rig| !rig.is_empty())
                else {
                    return;
                };
                let Some(at) = position(&format!("{rig}/refinery")) else {
                    return;
                };
                EffectKind::Pulse { at }
            }
            "mail_sent" => {
                let sender = entry.agent.as_deref().map(|id| id.trim_end_matches('/'));
                let recipient = entry.detail.as_deref().map(|id| id.trim_end_matches('/'));
                let (Some(from), Some(to)) = (sender.and_then(position), recipient.and_then(position))
                else {
                    return;
                };
                EffectKind::Particle { from, to }
            }
            _ => return,
        };
        self.effects.push(Effect {
            kind,
            transition: Transition::new(
                now,
                match kind {
                    EffectKind::Particle { .. } => PARTICLE,
                    EffectKind::Pulse { .. } => MERGE_PULSE,
                },
            ),
        });
    }
}
