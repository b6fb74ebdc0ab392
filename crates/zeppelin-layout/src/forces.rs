//! Pure simulation step over an owned array of bodies.
//!
//! Force order and integration follow the classic velocity-Verlet style used by
//! force-directed browsers: every force adds to velocities (centering moves positions
//! directly), then velocities decay and positions integrate. Pinned bodies snap to their pin.

use rand::Rng;

/// Below this squared distance the many-body force is softened.
const DISTANCE_MIN2: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceConfig {
    pub charge_strength: f64,
    pub link_distance: f64,
    pub link_strength: f64,
    pub collide_padding: f64,
    pub collide_strength: f64,
    pub cluster_strength: f64,
    /// Rig centroids sit on a circle of `ratio * min(width, height)` around the centre.
    pub cluster_radius_ratio: f64,
    pub velocity_decay: f64,
    pub alpha_decay: f64,
    pub sync_alpha: f64,
    pub resize_alpha: f64,
    pub drag_alpha_target: f64,
    pub energy_floor: f64,
    pub reheat_alpha: f64,
    /// Full width of the uniform velocity kick applied when the layout goes quiet.
    pub drift: f64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            charge_strength: -200.0,
            link_distance: 120.0,
            link_strength: 0.3,
            collide_padding: 10.0,
            collide_strength: 1.0,
            cluster_strength: 0.15,
            cluster_radius_ratio: 0.25,
            velocity_decay: 0.4,
            alpha_decay: 1.0 - 0.001f64.powf(1.0 / 300.0),
            sync_alpha: 0.3,
            resize_alpha: 0.1,
            drag_alpha_target: 0.3,
            energy_floor: 0.01,
            reheat_alpha: 0.005,
            drift: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub fx: Option<f64>,
    pub fy: Option<f64>,
    pub radius: f64,
    pub cluster: Option<usize>,
}

impl Body {
    pub fn at(x: f64, y: f64, radius: f64) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            fx: None,
            fy: None,
            radius,
            cluster: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub source: usize,
    pub target: usize,
    /// Share of the correction applied to the target, `deg(source) / (deg(source) + deg(target))`.
    pub bias: f64,
}

/// Builds links from endpoint index pairs, computing degree bias. Self-loops are dropped.
pub fn build_links(body_count: usize, pairs: &[(usize, usize)]) -> Vec<Link> {
    let mut degree = vec![0usize; body_count];
    for &(source, target) in pairs {
        if source == target || source >= body_count || target >= body_count {
            continue;
        }
        degree[source] += 1;
        degree[target] += 1;
    }
    pairs
        .iter()
        .filter(|(source, target)| source != target && *source < body_count && *target < body_count)
        .map(|&(source, target)| Link {
            source,
            target,
            bias: degree[source] as f64 / (degree[source] + degree[target]) as f64,
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct Forces<'a> {
    pub config: &'a ForceConfig,
    pub center: (f64, f64),
    pub centroids: &'a [(f64, f64)],
}

/// One simulation step at the given `alpha`.
pub fn advance<R: Rng>(
    bodies: &mut [Body],
    links: &[Link],
    forces: &Forces<'_>,
    alpha: f64,
    rng: &mut R,
) {
    if bodies.is_empty() {
        return;
    }
    apply_charge(bodies, forces.config.charge_strength, alpha, rng);
    apply_center(bodies, forces.center);
    apply_collide(bodies, forces.config.collide_strength, rng);
    apply_links(bodies, links, forces.config, alpha, rng);
    apply_cluster(bodies, forces.centroids, forces.config.cluster_strength, alpha);
    integrate(bodies, forces.config.velocity_decay);
}

fn jiggle<R: Rng>(rng: &mut R) -> f64 {
    (rng.gen::<f64>() - 0.5) * 1e-6
}

fn apply_charge<R: Rng>(bodies: &mut [Body], strength: f64, alpha: f64, rng: &mut R) {
    for i in 0..bodies.len() {
        let (xi, yi) = (bodies[i].x, bodies[i].y);
        let (mut ax, mut ay) = (0.0, 0.0);
        for (j, other) in bodies.iter().enumerate() {
            if i == j {
                continue;
            }
            let mut dx = other.x - xi;
            let mut dy = other.y - yi;
            if dx == 0.0 {
                dx = jiggle(rng);
            }
            if dy == 0.0 {
                dy = jiggle(rng);
            }
            let mut l = dx * dx + dy * dy;
            if l < DISTANCE_MIN2 {
                l = (DISTANCE_MIN2 * l).sqrt();
            }
            let w = strength * alpha / l;
            ax += dx * w;
            ay += dy * w;
        }
        bodies[i].vx += ax;
        bodies[i].vy += ay;
    }
}

fn apply_center(bodies: &mut [Body], center: (f64, f64)) {
    let n = bodies.len() as f64;
    let (sx, sy) = bodies
        .iter()
        .fold((0.0, 0.0), |(sx, sy), body| (sx + body.x, sy + body.y));
    let shift_x = sx / n - center.0;
    let shift_y = sy / n - center.1;
    for body in bodies.iter_mut() {
        body.x -= shift_x;
        body.y -= shift_y;
    }
}

fn apply_collide<R: Rng>(bodies: &mut [Body], strength: f64, rng: &mut R) {
    for i in 0..bodies.len() {
        let ri = bodies[i].radius;
        let ri2 = ri * ri;
        let xi = bodies[i].x + bodies[i].vx;
        let yi = bodies[i].y + bodies[i].vy;
        for j in (i + 1)..bodies.len() {
            let rj = bodies[j].radius;
            let r = ri + rj;
            let mut x = xi - bodies[j].x - bodies[j].vx;
            let mut y = yi - bodies[j].y - bodies[j].vy;
            let mut l = x * x + y * y;
            if l >= r * r {
                continue;
            }
            if x == 0.0 {
                x = jiggle(rng);
                l += x * x;
            }
            if y == 0.0 {
                y = jiggle(rng);
                l += y * y;
            }
            let d = l.sqrt();
            let k = (r - d) / d * strength;
            x *= k;
            y *= k;
            let rj2 = rj * rj;
            let share = rj2 / (ri2 + rj2);
            bodies[i].vx += x * share;
            bodies[i].vy += y * share;
            bodies[j].vx -= x * (1.0 - share);
            bodies[j].vy -= y * (1.0 - share);
        }
    }
}

fn apply_links<R: Rng>(
    bodies: &mut [Body],
    links: &[Link],
    config: &ForceConfig,
    alpha: f64,
    rng: &mut R,
) {
    for link in links {
        let (s, t) = (link.source, link.target);
        let mut x = bodies[t].x + bodies[t].vx - bodies[s].x - bodies[s].vx;
        let mut y = bodies[t].y + bodies[t].vy - bodies[s].y - bodies[s].vy;
        if x == 0.0 {
            x = jiggle(rng);
        }
        if y == 0.0 {
            y = jiggle(rng);
        }
        let l = (x * x + y * y).sqrt();
        let k = (l - config.link_distance) / l * alpha * config.link_strength;
        x *= k;
        y *= k;
        bodies[t].vx -= x * link.bias;
        bodies[t].vy -= y * link.bias;
        bodies[s].vx += x * (1.0 - link.bias);
        bodies[s].vy += y * (1.0 - link.bias);
    }
}

fn apply_cluster(bodies: &mut [Body], centroids: &[(f64, f64)], strength: f64, alpha: f64) {
    for body in bodies.iter_mut() {
        let Some((cx, cy)) = body.cluster.and_then(|idx| centroids.get(idx).copied()) else {
            continue;
        };
        body.vx += (cx - body.x) * alpha * strength;
        body.vy += (cy - body.y) * alpha * strength;
    }
}

fn integrate(bodies: &mut [Body], velocity_decay: f64) {
    let keep = 1.0 - velocity_decay;
    for body in bodies.iter_mut() {
        match body.fx {
            Some(fx) => {
                body.x = fx;
                body.vx = 0.0;
            }
            None => {
                body.vx *= keep;
                body.x += body.vx;
            }
        }
        match body.fy {
            Some(fy) => {
                body.y = fy;
                body.vy = 0.0;
            }
            None => {
                body.vy *= keep;
                body.y += body.vy;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn forces(config: &ForceConfig) -> Forces<'_> {
        Forces {
            config,
            center: (0.0, 0.0),
            centroids: &[],
        }
    }

    #[test]
    fn link_bias_follows_degree() {
        let links = build_links(3, &[(0, 1), (0, 2), (1, 1)]);
        assert_eq!(links.len(), 2);
        // degree(0) = 2, degree(1) = 1
        assert!((links[0].bias - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn stretched_link_pulls_endpoints_together() {
        let config = ForceConfig {
            charge_strength: 0.0,
            ..ForceConfig::default()
        };
        let mut bodies = vec![Body::at(-200.0, 0.0, 1.0), Body::at(200.0, 0.0, 1.0)];
        let links = build_links(2, &[(0, 1)]);
        let mut rng = StdRng::seed_from_u64(1);

        advance(&mut bodies, &links, &forces(&config), 1.0, &mut rng);

        assert!(bodies[0].vx > 0.0);
        assert!(bodies[1].vx < 0.0);
        assert!(bodies[1].x - bodies[0].x < 400.0);
    }

    #[test]
    fn charge_pushes_bodies_apart() {
        let config = ForceConfig::default();
        let mut bodies = vec![Body::at(-5.0, 0.0, 0.0), Body::at(5.0, 0.0, 0.0)];
        let mut rng = StdRng::seed_from_u64(2);

        advance(&mut bodies, &[], &forces(&config), 1.0, &mut rng);

        assert!(bodies[0].x < -5.0);
        assert!(bodies[1].x > 5.0);
    }

    #[test]
    fn overlapping_bodies_are_separated() {
        let config = ForceConfig {
            charge_strength: 0.0,
            ..ForceConfig::default()
        };
        let mut bodies = vec![Body::at(0.0, 0.0, 20.0), Body::at(10.0, 0.0, 20.0)];
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            advance(&mut bodies, &[], &forces(&config), 0.1, &mut rng);
        }
        assert!(bodies[1].x - bodies[0].x > 30.0);
    }

    #[test]
    fn centering_moves_mean_onto_center() {
        let config = ForceConfig {
            charge_strength: 0.0,
            ..ForceConfig::default()
        };
        let mut bodies = vec![Body::at(100.0, 100.0, 0.0), Body::at(140.0, 100.0, 0.0)];
        let mut rng = StdRng::seed_from_u64(4);
        let forces = Forces {
            config: &config,
            center: (0.0, 0.0),
            centroids: &[],
        };
        advance(&mut bodies, &[], &forces, 0.0, &mut rng);
        assert!((bodies[0].x + bodies[1].x).abs() < 1e-9);
        assert!((bodies[0].y + bodies[1].y).abs() < 1e-9);
    }

    #[test]
    fn pinned_body_snaps_to_pin_and_stops() {
        let config = ForceConfig::default();
        let mut pinned = Body::at(0.0, 0.0, 5.0);
        pinned.vx = 30.0;
        pinned.fx = Some(50.0);
        pinned.fy = Some(-20.0);
        let mut bodies = vec![pinned, Body::at(10.0, 0.0, 5.0)];
        let mut rng = StdRng::seed_from_u64(5);

        advance(&mut bodies, &[], &forces(&config), 0.3, &mut rng);

        assert_eq!((bodies[0].x, bodies[0].y), (50.0, -20.0));
        assert_eq!((bodies[0].vx, bodies[0].vy), (0.0, 0.0));
    }

    #[test]
    fn cluster_force_pulls_toward_centroid() {
        let config = ForceConfig {
            charge_strength: 0.0,
            ..ForceConfig::default()
        };
        let mut body = Body::at(0.0, 0.0, 0.0);
        body.cluster = Some(0);
        let mut single = vec![body];
        let centroids = [(100.0, 0.0)];
        let forces = Forces {
            config: &config,
            center: (0.0, 0.0),
            centroids: &centroids,
        };
        let mut rng = StdRng::seed_from_u64(6);
        advance(&mut single, &[], &forces, 1.0, &mut rng);
        assert!(single[0].vx > 0.0);
    }
}
