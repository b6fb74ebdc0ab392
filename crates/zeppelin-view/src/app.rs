use crate::camera::{Camera, ZOOM_STEP};
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionStatus};
use crate::overlay::Selection;
use crate::render::{rig_boxes, RenderCoordinator, RigBox, RIG_PADDING};
use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::layout::Rect;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};
use zeppelin_core::{decode_message, Applied, StateStore, StreamMessage};
use zeppelin_layout::{LayoutEngine, Viewport};

/// Layout units covered by one terminal cell. Cells are roughly twice as tall as wide.
pub const CELL_WIDTH: f64 = 10.0;
pub const CELL_HEIGHT: f64 = 20.0;

/// Extra grab radius around small nodes, in layout units.
const HIT_SLACK: f64 = 6.0;

/// Two background clicks on the same cell within this window count as a double click.
const DOUBLE_CLICK: Duration = Duration::from_millis(400);

pub struct App {
    pub store: StateStore,
    pub layout: LayoutEngine,
    pub render: RenderCoordinator,
    pub connection: ConnectionManager,
    pub status: watch::Receiver<ConnectionStatus>,
    pub selection: Selection,
    pub hover: Option<String>,
    pub mouse: Option<(u16, u16)>,
    pub canvas: Option<Rect>,
    pub camera: Camera,
    pub started: Instant,
    drag: Option<String>,
    pan_from: Option<(u16, u16)>,
    last_click: Option<(Instant, u16, u16)>,
    snapshot_generation: Option<u64>,
    stale_diff_logged: Option<u64>,
}

impl App {
    pub fn new(connection: ConnectionManager, layout: LayoutEngine) -> Self {
        Self {
            store: StateStore::new(),
            layout,
            render: RenderCoordinator::new(),
            status: connection.subscribe(),
            connection,
            selection: Selection::default(),
            hover: None,
            mouse: None,
            canvas: None,
            camera: Camera::default(),
            started: Instant::now(),
            drag: None,
            pan_from: None,
            last_click: None,
            snapshot_generation: None,
            stale_diff_logged: None,
        }
    }

    pub fn handle_connection_event(&mut self, event: ConnectionEvent, now: Instant) {
        if let Some(data) = self.connection.handle(event) {
            self.handle_message(&data, now);
        }
    }

    /// Decodes and applies one pushed payload, then lets layout and render catch up.
    pub fn handle_message(&mut self, raw: &str, now: Instant) {
        let message = match decode_message(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(event = "message_decode_error", error = %err, bytes = raw.len());
                return;
            }
        };

        let generation = self.connection.generation();
        let appended = match &message {
            StreamMessage::Snapshot(_) => {
                self.snapshot_generation = Some(generation);
                Vec::new()
            }
            StreamMessage::Diff(diff) => {
                if self.store.has_snapshot()
                    && self.snapshot_generation != Some(generation)
                    && self.stale_diff_logged != Some(generation)
                {
                    debug!(event = "diff_before_resnapshot", generation);
                    self.stale_diff_logged = Some(generation);
                }
                diff.activity_append.clone()
            }
            StreamMessage::Unknown => Vec::new(),
        };

        let applied = self.store.apply(message);
        if !applied.changed() {
            if applied == Applied::Ignored {
                debug!(event = "message_ignored");
            }
            return;
        }

        self.layout.sync(&mut self.store);
        self.render.sync(&self.store, now);
        for entry in &appended {
            self.render.trigger(entry, &self.store, now);
        }
    }

    pub fn on_frame(&mut self, now: Instant) {
        self.layout.tick(&mut self.store);
        self.render.tick(&self.store, now);
    }

    /// Records the graph canvas area from the last draw and resizes the layout to match.
    pub fn update_canvas(&mut self, area: Rect) {
        self.canvas = Some(area);
        self.layout.resize(viewport_for(area));
    }

    /// Returns `true` when the app should exit.
    pub fn handle_event(&mut self, event: Event, now: Instant) -> bool {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Mouse(mouse) => {
                self.handle_mouse(mouse, now);
                false
            }
            _ => false,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::Char('q') => true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => true,
            KeyCode::Esc => {
                self.selection.clear();
                false
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.zoom_centre(ZOOM_STEP);
                false
            }
            KeyCode::Char('-') => {
                self.zoom_centre(1.0 / ZOOM_STEP);
                false
            }
            KeyCode::Char('0') => {
                self.camera.reset();
                false
            }
            KeyCode::Char('z') => {
                self.zoom_to_selected_rig();
                false
            }
            _ => false,
        }
    }

    pub fn handle_mouse(&mut self, event: MouseEvent, now: Instant) {
        self.mouse = Some((event.column, event.row));
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.handle_left_click(event.column, event.row, now);
            }
            MouseEventKind::Down(MouseButton::Right | MouseButton::Middle) => {
                self.pan_from = self
                    .screen_at(event.column, event.row)
                    .map(|_| (event.column, event.row));
            }
            MouseEventKind::Drag(MouseButton::Right | MouseButton::Middle) => {
                let Some((column, row)) = self.pan_from else {
                    return;
                };
                self.camera.pan(
                    (f64::from(event.column) - f64::from(column)) * CELL_WIDTH,
                    (f64::from(event.row) - f64::from(row)) * CELL_HEIGHT,
                );
                self.pan_from = Some((event.column, event.row));
            }
            MouseEventKind::Up(MouseButton::Right | MouseButton::Middle) => {
                self.pan_from = None;
            }
            MouseEventKind::ScrollUp | MouseEventKind::ScrollDown => {
                let Some(anchor) = self.screen_at(event.column, event.row) else {
                    return;
                };
                let factor = if event.kind == MouseEventKind::ScrollUp {
                    ZOOM_STEP
                } else {
                    1.0 / ZOOM_STEP
                };
                self.camera.zoom_at(anchor, factor);
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let Some(id) = self.drag.clone() else {
                    return;
                };
                if let Some((x, y)) = self.world_at(event.column, event.row) {
                    self.layout.drag_to(&mut self.store, &id, x, y);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if let Some(id) = self.drag.take() {
                    self.layout.drag_end(&mut self.store, &id);
                }
            }
            MouseEventKind::Moved => {
                self.hover = self
                    .world_at(event.column, event.row)
                    .and_then(|(x, y)| self.node_at(x, y));
            }
            _ => {}
        }
    }

    fn handle_left_click(&mut self, column: u16, row: u16, now: Instant) {
        let Some((x, y)) = self.world_at(column, row) else {
            return;
        };
        match self.node_at(x, y) {
            Some(id) => {
                self.last_click = None;
                if self.layout.drag_start(&mut self.store, &id) {
                    self.drag = Some(id.clone());
                }
                self.selection.select(id);
            }
            None => {
                self.selection.clear();
                let double = matches!(
                    self.last_click,
                    Some((at, c, r)) if c == column
                        && r == row
                        && now.saturating_duration_since(at) <= DOUBLE_CLICK
                );
                if double {
                    self.last_click = None;
                    self.handle_background_double_click(x, y);
                } else {
                    self.last_click = Some((now, column, row));
                }
            }
        }
    }

    /// Zooms onto the rig under the pointer, or back out to the whole plane.
    fn handle_background_double_click(&mut self, x: f64, y: f64) {
        let rig = rig_boxes(&self.store).into_iter().find(|rig| {
            x >= rig.min.0 && x <= rig.max.0 && y >= rig.min.1 && y <= rig.max.1
        });
        match rig {
            Some(rig) => self.zoom_to_rig(&rig),
            None => self.camera.reset(),
        }
    }

    fn zoom_to_selected_rig(&mut self) {
        let Some(name) = self
            .selection
            .resolve(&self.store)
            .and_then(|node| node.rig.clone())
        else {
            return;
        };
        if let Some(rig) = rig_boxes(&self.store)
            .into_iter()
            .find(|rig| rig.name == name)
        {
            self.zoom_to_rig(&rig);
        }
    }

    fn zoom_to_rig(&mut self, rig: &RigBox) {
        let min = (rig.min.0 + RIG_PADDING, rig.min.1 + RIG_PADDING);
        let max = (rig.max.0 - RIG_PADDING, rig.max.1 - RIG_PADDING);
        self.camera.fit(min, max, self.layout.viewport());
    }

    fn zoom_centre(&mut self, factor: f64) {
        let centre = self.layout.viewport().center();
        self.camera.zoom_at(centre, factor);
    }

    /// Layout coordinates under a terminal cell, through the current zoom and pan.
    pub fn world_at(&self, column: u16, row: u16) -> Option<(f64, f64)> {
        self.screen_at(column, row)
            .map(|point| self.camera.to_world(point))
    }

    /// Centre of a terminal cell inside the canvas, in unzoomed canvas units.
    pub fn screen_at(&self, column: u16, row: u16) -> Option<(f64, f64)> {
        let area = self.canvas?;
        let inside = column >= area.x
            && column < area.x.saturating_add(area.width)
            && row >= area.y
            && row < area.y.saturating_add(area.height);
        if !inside {
            return None;
        }
        Some((
            (f64::from(column - area.x) + 0.5) * CELL_WIDTH,
            (f64::from(row - area.y) + 0.5) * CELL_HEIGHT,
        ))
    }

    /// Nearest node whose shape (plus a little slack) covers the point.
    pub fn node_at(&self, x: f64, y: f64) -> Option<String> {
        self.store
            .nodes()
            .iter()
            .filter_map(|node| {
                let (nx, ny) = node.motion.position();
                let distance = ((nx - x).powi(2) + (ny - y).powi(2)).sqrt();
                let reach = node.kind.size() / 2.0
                    + HIT_SLACK.max(CELL_WIDTH / 2.0 / self.camera.scale());
                (distance <= reach).then_some((distance, node.id.as_str()))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, id)| id.to_string())
    }

    /// Node whose links are highlighted: the hovered one, else the selection.
    pub fn focus(&self) -> Option<&str> {
        self.hover
            .as_deref()
            .or_else(|| self.selection.selected_id())
            .filter(|id| self.store.node(id).is_some())
    }
}

pub fn viewport_for(area: Rect) -> Viewport {
    Viewport::new(
        f64::from(area.width.max(1)) * CELL_WIDTH,
        f64::from(area.height.max(1)) * CELL_HEIGHT,
    )
}
