//! Zoom and pan over the layout plane.
//!
//! Screen space is the canvas measured in layout units (cells times [`crate::app::CELL_WIDTH`]
//! and [`crate::app::CELL_HEIGHT`]); `screen = world * scale + offset`.

use zeppelin_layout::Viewport;

pub const MIN_SCALE: f64 = 0.2;
pub const MAX_SCALE: f64 = 4.0;
/// Scale change per scroll notch or zoom key.
pub const ZOOM_STEP: f64 = 1.2;
/// Margin kept around a rig when zooming onto it.
pub const RIG_FIT_PADDING: f64 = 80.0;
pub const RIG_FIT_MAX_SCALE: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    scale: f64,
    offset: (f64, f64),
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: (0.0, 0.0),
        }
    }
}

impl Camera {
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn to_world(&self, (x, y): (f64, f64)) -> (f64, f64) {
        (
            (x - self.offset.0) / self.scale,
            (y - self.offset.1) / self.scale,
        )
    }

    pub fn to_screen(&self, (x, y): (f64, f64)) -> (f64, f64) {
        (
            x * self.scale + self.offset.0,
            y * self.scale + self.offset.1,
        )
    }

    /// World-space rectangle visible through a viewport, as `(min, max)` corners.
    pub fn visible(&self, viewport: Viewport) -> ((f64, f64), (f64, f64)) {
        (
            self.to_world((0.0, 0.0)),
            self.to_world((viewport.width, viewport.height)),
        )
    }

    /// Multiplies the scale by `factor`, keeping the world point under `anchor` fixed.
    pub fn zoom_at(&mut self, anchor: (f64, f64), factor: f64) {
        let pinned = self.to_world(anchor);
        self.scale = (self.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        self.offset = (
            anchor.0 - pinned.0 * self.scale,
            anchor.1 - pinned.1 * self.scale,
        );
    }

    /// Shifts the view by a screen-space delta.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.offset.0 += dx;
        self.offset.1 += dy;
    }

    /// Frames the world box `min..max` with padding, centred in the viewport.
    pub fn fit(&mut self, min: (f64, f64), max: (f64, f64), viewport: Viewport) {
        let dx = max.0 - min.0 + RIG_FIT_PADDING * 2.0;
        let dy = max.1 - min.1 + RIG_FIT_PADDING * 2.0;
        let scale = (viewport.width / dx)
            .min(viewport.height / dy)
            .min(RIG_FIT_MAX_SCALE)
            .clamp(MIN_SCALE, MAX_SCALE);
        let center = ((min.0 + max.0) / 2.0, (min.1 + max.1) / 2.0);
        let (sx, sy) = viewport.center();
        self.scale = scale;
        self.offset = (sx - center.0 * scale, sy - center.1 * scale);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn zoom_keeps_anchor_in_place_and_clamps() {
        let mut camera = Camera::default();
        let anchor = (300.0, 120.0);
        let before = camera.to_world(anchor);
        camera.zoom_at(anchor, 2.0);
        assert_eq!(camera.scale(), 2.0);
        assert!(close(camera.to_world(anchor), before));
        assert!(close(camera.to_screen(before), anchor));

        for _ in 0..20 {
            camera.zoom_at(anchor, ZOOM_STEP);
        }
        assert_eq!(camera.scale(), MAX_SCALE);
        for _ in 0..40 {
            camera.zoom_at(anchor, 1.0 / ZOOM_STEP);
        }
        assert_eq!(camera.scale(), MIN_SCALE);
    }

    #[test]
    fn pan_moves_the_visible_window() {
        let mut camera = Camera::default();
        camera.pan(50.0, -20.0);
        let (min, max) = camera.visible(Viewport::new(800.0, 400.0));
        assert!(close(min, (-50.0, 20.0)));
        assert!(close(max, (750.0, 420.0)));

        camera.reset();
        assert!(camera.is_identity());
    }

    #[test]
    fn fit_centres_the_box_with_capped_scale() {
        let square = Viewport::new(1000.0, 1000.0);
        let mut camera = Camera::default();
        camera.fit((100.0, 100.0), (140.0, 140.0), square);
        assert_eq!(camera.scale(), RIG_FIT_MAX_SCALE);
        assert!(close(camera.to_screen((120.0, 120.0)), square.center()));

        let viewport = Viewport::new(800.0, 400.0);
        camera.fit((0.0, 0.0), (1440.0, 240.0), viewport);
        assert!((camera.scale() - 0.5).abs() < 1e-9);
        assert!(close(camera.to_screen((720.0, 120.0)), viewport.center()));
    }
}
