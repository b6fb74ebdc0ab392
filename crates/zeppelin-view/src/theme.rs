use ratatui::style::{Color, Modifier, Style};
use zeppelin_core::{NodeState, NodeType};

pub type Rgb = (u8, u8, u8);

pub const BACKGROUND: Rgb = (10, 10, 15);
pub const TEXT: Rgb = (224, 224, 232);
pub const MUTED: Rgb = (136, 136, 160);
pub const RIG_OUTLINE: Rgb = (52, 52, 78);
pub const PARTICLE: Rgb = (224, 224, 232);
pub const MERGE_PULSE: Rgb = (57, 255, 20);
pub const SPAWN_RING: Rgb = (57, 255, 20);

pub fn rgb(color: Rgb) -> Color {
    Color::Rgb(color.0, color.1, color.2)
}

/// Linear blend from `from` to `to`; `ratio` is clamped to `0.0..=1.0`.
pub fn mix(from: Rgb, to: Rgb, ratio: f64) -> Rgb {
    let ratio = ratio.clamp(0.0, 1.0);
    let channel = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * ratio).round() as u8;
    (
        channel(from.0, to.0),
        channel(from.1, to.1),
        channel(from.2, to.2),
    )
}

/// Terminal cells have no alpha; opacity is rendered as a blend toward the background.
pub fn faded(color: Rgb, opacity: f64) -> Color {
    rgb(mix(BACKGROUND, color, opacity))
}

pub fn state_color(state: NodeState) -> Rgb {
    match state {
        NodeState::Working | NodeState::InProgress => (74, 141, 183),
        NodeState::Idle | NodeState::Unassigned => (68, 68, 85),
        NodeState::Running | NodeState::Spawning | NodeState::Merged | NodeState::Closed => {
            (57, 255, 20)
        }
        NodeState::Nuked => (42, 42, 62),
        NodeState::Stopped | NodeState::Rejected => (255, 51, 68),
        NodeState::Hooked => (240, 192, 64),
        NodeState::InRefinery => (232, 93, 38),
        NodeState::Escalated => (204, 68, 255),
        NodeState::Other => MUTED,
    }
}

/// Outline accent per role, used for labels.
pub fn type_color(kind: NodeType) -> Rgb {
    match kind {
        NodeType::Mayor => (240, 192, 64),
        NodeType::Deacon => (204, 68, 255),
        NodeType::Overseer => (255, 140, 90),
        NodeType::Witness => (74, 141, 183),
        NodeType::Refinery => (232, 93, 38),
        NodeType::Polecat | NodeType::Crew => (190, 190, 205),
        NodeType::Bead => MUTED,
        NodeType::Convoy => (120, 200, 200),
        NodeType::Unknown => MUTED,
    }
}

pub fn edge_color(kind: &str) -> Rgb {
    match kind {
        "assignment" => (74, 141, 183),
        "monitoring" => (57, 160, 40),
        _ => (90, 90, 115),
    }
}

pub const PANEL_STYLE: Style = Style::new()
    .fg(Color::Rgb(224, 224, 232))
    .bg(Color::Rgb(18, 18, 28));
pub const BORDER_STYLE: Style = Style::new().fg(Color::Rgb(42, 42, 62));
pub const TITLE_STYLE: Style = Style::new()
    .fg(Color::Rgb(224, 224, 232))
    .add_modifier(Modifier::BOLD);
pub const MUTED_STYLE: Style = Style::new().fg(Color::Rgb(136, 136, 160));
