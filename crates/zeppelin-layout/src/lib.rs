pub mod forces;

use forces::{advance, build_links, Body, ForceConfig, Forces};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::debug;
use zeppelin_core::StateStore;

/// Radial step for seeding unplaced nodes on a sunflower spiral.
const SEED_RADIUS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Centroid for rig `index` of `count`, evenly spaced on a circle around the centre.
    pub fn rig_centroid(&self, index: usize, count: usize, radius_ratio: f64) -> (f64, f64) {
        let (cx, cy) = self.center();
        let radius = self.width.min(self.height) * radius_ratio;
        let angle = 2.0 * PI * index as f64 / count.max(1) as f64;
        (cx + radius * angle.cos(), cy + radius * angle.sin())
    }
}

/// Continuously running force simulation over the store's nodes.
///
/// The engine keeps no copy of node identity: each tick derives bodies, links and rig clusters
/// from the store and writes positions back through [`StateStore::motions_mut`].
pub struct LayoutEngine {
    config: ForceConfig,
    viewport: Viewport,
    alpha: f64,
    alpha_target: f64,
    rng: StdRng,
}

impl LayoutEngine {
    pub fn new(viewport: Viewport) -> Self {
        Self::with_rng(viewport, StdRng::from_entropy())
    }

    pub fn with_seed(viewport: Viewport, seed: u64) -> Self {
        Self::with_rng(viewport, StdRng::seed_from_u64(seed))
    }

    fn with_rng(viewport: Viewport, rng: StdRng) -> Self {
        Self {
            config: ForceConfig::default(),
            viewport,
            alpha: 1.0,
            alpha_target: 0.0,
            rng,
        }
    }

    pub fn config(&self) -> &ForceConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Registers the current node set: seeds positions for new nodes and reheats.
    pub fn sync(&mut self, store: &mut StateStore) {
        let centroids = self.centroids(store);
        let anchors: Vec<Option<usize>> = cluster_indices(store);
        let (cx, cy) = self.viewport.center();
        let golden = PI * (3.0 - 5f64.sqrt());

        let mut seeded = 0usize;
        for (idx, (entry, cluster)) in store.motions_mut().zip(anchors).enumerate() {
            if entry.motion.placed {
                continue;
            }
            let (ax, ay) = cluster
                .and_then(|c| centroids.get(c).copied())
                .unwrap_or((cx, cy));
            let radius = SEED_RADIUS * (0.5 + idx as f64).sqrt();
            let angle = idx as f64 * golden;
            entry.motion.x = ax + radius * angle.cos();
            entry.motion.y = ay + radius * angle.sin();
            entry.motion.vx = 0.0;
            entry.motion.vy = 0.0;
            entry.motion.placed = true;
            seeded += 1;
        }

        if !store.nodes().iter().any(|node| node.motion.is_pinned()) {
            self.alpha_target = 0.0;
        }
        self.alpha = self.config.sync_alpha;
        debug!(event = "layout_sync", nodes = store.nodes().len(), seeded);
    }

    /// Advances the simulation one step. Reheats slightly when it has gone quiet so the
    /// graph never freezes.
    pub fn tick(&mut self, store: &mut StateStore) {
        if self.alpha < self.config.energy_floor {
            let drift = self.config.drift;
            for entry in store.motions_mut() {
                if entry.motion.is_pinned() {
                    continue;
                }
                entry.motion.vx += (self.rng.gen::<f64>() - 0.5) * drift;
                entry.motion.vy += (self.rng.gen::<f64>() - 0.5) * drift;
            }
            self.alpha = self.config.reheat_alpha;
        }

        self.alpha += (self.alpha_target - self.alpha) * self.config.alpha_decay;

        let centroids = self.centroids(store);
        let clusters = cluster_indices(store);
        let links = resolved_links(store);

        let mut bodies: Vec<Body> = store
            .nodes()
            .iter()
            .zip(clusters)
            .map(|(node, cluster)| Body {
                x: node.motion.x,
                y: node.motion.y,
                vx: node.motion.vx,
                vy: node.motion.vy,
                fx: node.motion.fx,
                fy: node.motion.fy,
                radius: node.kind.size() + self.config.collide_padding,
                cluster,
            })
            .collect();

        let forces = Forces {
            config: &self.config,
            center: self.viewport.center(),
            centroids: &centroids,
        };
        advance(&mut bodies, &links, &forces, self.alpha, &mut self.rng);

        for (entry, body) in store.motions_mut().zip(bodies) {
            entry.motion.x = body.x;
            entry.motion.y = body.y;
            entry.motion.vx = body.vx;
            entry.motion.vy = body.vy;
        }
    }

    /// Pins `id` at its current position and keeps the simulation warm while dragging.
    pub fn drag_start(&mut self, store: &mut StateStore, id: &str) -> bool {
        let Some(entry) = store.motions_mut().find(|entry| entry.id == id) else {
            return false;
        };
        entry.motion.fx = Some(entry.motion.x);
        entry.motion.fy = Some(entry.motion.y);
        self.alpha_target = self.config.drag_alpha_target;
        if self.alpha < self.alpha_target {
            self.alpha = self.alpha_target;
        }
        true
    }

    pub fn drag_to(&mut self, store: &mut StateStore, id: &str, x: f64, y: f64) {
        if let Some(entry) = store.motions_mut().find(|entry| entry.id == id) {
            entry.motion.fx = Some(x);
            entry.motion.fy = Some(y);
        }
    }

    /// Releases the pin. The simulation cools again once no node is held.
    pub fn drag_end(&mut self, store: &mut StateStore, id: &str) {
        if let Some(entry) = store.motions_mut().find(|entry| entry.id == id) {
            entry.motion.fx = None;
            entry.motion.fy = None;
        }
        if !store.nodes().iter().any(|node| node.motion.is_pinned()) {
            self.alpha_target = 0.0;
        }
    }

    pub fn resize(&mut self, viewport: Viewport) {
        if viewport == self.viewport {
            return;
        }
        debug!(
            event = "layout_resize",
            width = viewport.width,
            height = viewport.height
        );
        self.viewport = viewport;
        self.alpha = self.config.resize_alpha;
    }

    fn centroids(&self, store: &StateStore) -> Vec<(f64, f64)> {
        let count = store.rigs().len();
        (0..count)
            .map(|idx| {
                self.viewport
                    .rig_centroid(idx, count, self.config.cluster_radius_ratio)
            })
            .collect()
    }
}

/// Rig index (in first-appearance order) for each node, aligned with `store.nodes()`.
fn cluster_indices(store: &StateStore) -> Vec<Option<usize>> {
    let mut order: HashMap<&str, usize> = HashMap::new();
    for (idx, rig) in store.rigs().iter().enumerate() {
        order.insert(rig.name, idx);
    }
    store
        .nodes()
        .iter()
        .map(|node| node.rig.as_deref().and_then(|rig| order.get(rig).copied()))
        .collect()
}

fn resolved_links(store: &StateStore) -> Vec<forces::Link> {
    let index: HashMap<&str, usize> = store
        .nodes()
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.id.as_str(), idx))
        .collect();
    let pairs: Vec<(usize, usize)> = store
        .resolved_edges()
        .into_iter()
        .filter_map(|edge| {
            Some((
                *index.get(edge.source.as_str())?,
                *index.get(edge.target.as_str())?,
            ))
        })
        .collect();
    build_links(index.len(), &pairs)
}
