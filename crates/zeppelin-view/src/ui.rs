use crate::app::{viewport_for, App, CELL_WIDTH};
use crate::connection::ConnectionStatus;
use crate::overlay::{
    activity_glyph, detail_fields, feed_entries, format_time, summary_parts, terminal_command,
};
use crate::render::{edge_heartbeat, rig_boxes, EffectKind, Shape, Sprite, CONVOY_HEIGHT};
use crate::theme::{
    self, edge_color, faded, rgb, state_color, type_color, BORDER_STYLE, MUTED_STYLE, PANEL_STYLE,
    TITLE_STYLE,
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Circle, Context, Line as CanvasLine, Rectangle},
        Block, BorderType, Borders, Clear, Paragraph, Wrap,
    },
    Frame,
};
use std::f64::consts::PI;
use std::time::Instant;
use zeppelin_core::{Node, NodeState, NodeType};

const FEED_HEIGHT: u16 = 9;
const PANEL_WIDTH: u16 = 38;
const LABEL_OFFSET: f64 = 14.0;
const EDGE_OPACITY: f64 = 0.6;
const EDGE_DIMMED: f64 = 0.15;

pub fn render(f: &mut Frame, app: &mut App, now: Instant) {
    let size = f.size();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(FEED_HEIGHT),
        ])
        .split(size);

    let selected = app.selection.resolve(&app.store).is_some();
    let main = if selected {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(20), Constraint::Length(PANEL_WIDTH)])
            .split(rows[1])
    } else {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(20)])
            .split(rows[1])
    };

    let graph_block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(BORDER_STYLE)
        .title(Span::styled(" gas town ", TITLE_STYLE));
    let canvas_area = graph_block.inner(main[0]);
    app.update_canvas(canvas_area);

    let app: &App = app;
    f.render_widget(status_bar(app), rows[0]);
    f.render_widget(graph_block, main[0]);
    render_graph(f, app, canvas_area, now);
    if let Some(node) = app.selection.resolve(&app.store) {
        f.render_widget(detail_panel(node), main[1]);
    }
    f.render_widget(activity_feed(app, rows[2]), rows[2]);
    render_tooltip(f, app, canvas_area);
}

fn status_bar(app: &App) -> Paragraph<'static> {
    let status = *app.status.borrow();
    let status_color = match status {
        ConnectionStatus::Connected => (57, 255, 20),
        ConnectionStatus::Connecting => (240, 192, 64),
        ConnectionStatus::Disconnected => (255, 51, 68),
    };
    let mut spans = vec![
        Span::styled(" ZEPPELIN ", TITLE_STYLE),
        Span::raw(" "),
        Span::styled(status.label(), Style::default().fg(rgb(status_color))),
    ];
    if let Some(summary) = app.store.summary() {
        for part in summary_parts(summary) {
            spans.push(Span::styled("  ·  ", MUTED_STYLE));
            spans.push(Span::styled(part, Style::default().fg(rgb(theme::TEXT))));
        }
    }
    if !app.camera.is_identity() {
        spans.push(Span::styled(
            format!("   zoom {:.1}x  (0 resets)", app.camera.scale()),
            MUTED_STYLE,
        ));
    }
    if let Some(timestamp) = app.store.timestamp() {
        spans.push(Span::styled(
            format!("   updated {}", format_time(Some(timestamp))),
            MUTED_STYLE,
        ));
    }
    Paragraph::new(Line::from(spans)).style(PANEL_STYLE)
}

fn render_graph(f: &mut Frame, app: &App, area: Rect, now: Instant) {
    let t = now.saturating_duration_since(app.started).as_secs_f64();
    let focus = app.focus();
    let scale = app.camera.scale();
    let (min, max) = app.camera.visible(viewport_for(area));
    // Canvas y grows upward; layout y grows downward.
    let flip = |(x, y): (f64, f64)| (x, -y);

    let canvas = Canvas::default()
        .background_color(rgb(theme::BACKGROUND))
        .marker(Marker::Braille)
        .x_bounds([min.0, max.0])
        .y_bounds([-max.1, -min.1])
        .paint(move |ctx| {
            for rig in rig_boxes(&app.store) {
                let (x, y) = flip((rig.min.0, rig.max.1));
                ctx.draw(&Rectangle {
                    x,
                    y,
                    width: rig.max.0 - rig.min.0,
                    height: rig.max.1 - rig.min.1,
                    color: rgb(theme::RIG_OUTLINE),
                });
                let (lx, ly) = flip((rig.min.0 + 8.0, rig.min.1 + 16.0));
                ctx.print(lx, ly, Span::styled(rig.name, MUTED_STYLE));
            }
            ctx.layer();

            for edge in app.store.resolved_edges() {
                let (Some(source), Some(target)) = (
                    app.render.sprite(&edge.source),
                    app.render.sprite(&edge.target),
                ) else {
                    continue;
                };
                let mut opacity = match focus {
                    Some(id) if edge.touches(id) => 1.0,
                    Some(_) => EDGE_DIMMED,
                    None => EDGE_OPACITY,
                };
                if edge_heartbeat(edge) {
                    opacity *= 0.6 + 0.4 * (t * 2.0 * PI / 1.5).sin();
                }
                opacity *= source.opacity(now).min(target.opacity(now));
                let (x1, y1) = flip(source.position);
                let (x2, y2) = flip(target.position);
                ctx.draw(&CanvasLine {
                    x1,
                    y1,
                    x2,
                    y2,
                    color: faded(edge_color(&edge.kind), opacity),
                });
            }
            ctx.layer();

            for effect in app.render.effects() {
                let frame = effect.frame(now);
                let (x, y) = flip(frame.position);
                let color = match effect.kind {
                    EffectKind::Particle { .. } => theme::PARTICLE,
                    EffectKind::Pulse { .. } => theme::MERGE_PULSE,
                };
                ctx.draw(&Circle {
                    x,
                    y,
                    radius: frame.radius,
                    color: faded(color, frame.opacity),
                });
            }
            for sprite in app.render.sprites() {
                if let Some((radius, opacity)) = sprite.ring(now) {
                    let (x, y) = flip(sprite.position);
                    ctx.draw(&Circle {
                        x,
                        y,
                        radius,
                        color: faded(theme::SPAWN_RING, opacity),
                    });
                }
            }
            ctx.layer();

            for exiting in app.render.exiting() {
                let sprite = &exiting.sprite;
                let color = faded(state_color(sprite.state), exiting.opacity(now));
                draw_shape(
                    ctx,
                    sprite.shape,
                    flip(sprite.position),
                    sprite.size() * exiting.scale(now),
                    color,
                );
            }
            for sprite in app.render.sprites() {
                let opacity = sprite.opacity(now) * animation_level(sprite, t);
                let selected = app.selection.selected_id() == Some(sprite.id.as_str());
                let color = faded(state_color(sprite.state), opacity);
                draw_shape(ctx, sprite.shape, flip(sprite.position), sprite.size(), color);
                if selected {
                    draw_shape(
                        ctx,
                        sprite.shape,
                        flip(sprite.position),
                        sprite.size() + 8.0,
                        rgb(theme::TEXT),
                    );
                }
                if sprite.kind != NodeType::Bead {
                    let (x, y) = flip((
                        sprite.position.0,
                        sprite.position.1 + sprite.size() / 2.0 + LABEL_OFFSET,
                    ));
                    let half_width =
                        sprite.label.chars().count() as f64 * CELL_WIDTH / scale / 2.0;
                    let mut style = Style::default().fg(faded(type_color(sprite.kind), opacity));
                    if selected {
                        style = style.add_modifier(Modifier::BOLD);
                    }
                    ctx.print(x - half_width, y, Span::styled(sprite.label.clone(), style));
                }
            }
        });
    f.render_widget(canvas, area);
}

/// Brightness multiplier for the breathing and hooked-pulse animations.
fn animation_level(sprite: &Sprite, t: f64) -> f64 {
    if sprite.classes.breathing {
        0.775 + 0.225 * (t * PI).sin()
    } else if sprite.classes.pulse_hooked {
        0.7 + 0.3 * (t * 2.0 * PI).sin()
    } else {
        1.0
    }
}

fn draw_shape(
    ctx: &mut Context<'_>,
    shape: Shape,
    center: (f64, f64),
    size: f64,
    color: Color,
) {
    let half = size / 2.0;
    match shape {
        Shape::Circle => {
            for radius in [half, half * 0.55] {
                ctx.draw(&Circle {
                    x: center.0,
                    y: center.1,
                    radius,
                    color,
                });
            }
        }
        Shape::Hexagon => {
            polygon(ctx, center, half, 6, PI / 6.0, color);
            polygon(ctx, center, half * 0.55, 6, PI / 6.0, color);
        }
        Shape::Diamond => {
            polygon(ctx, center, half, 4, 0.0, color);
            polygon(ctx, center, half * 0.55, 4, 0.0, color);
        }
        Shape::RoundedRect => {
            for scale in [1.0, 0.55] {
                ctx.draw(&Rectangle {
                    x: center.0 - half * scale,
                    y: center.1 - half * scale,
                    width: size * scale,
                    height: size * scale,
                    color,
                });
            }
        }
        Shape::Pill => {
            ctx.draw(&Rectangle {
                x: center.0 - half,
                y: center.1 - CONVOY_HEIGHT / 2.0,
                width: size,
                height: CONVOY_HEIGHT,
                color,
            });
        }
    }
}

fn polygon(
    ctx: &mut Context<'_>,
    center: (f64, f64),
    radius: f64,
    sides: usize,
    rotation: f64,
    color: Color,
) {
    let vertex = |idx: usize| {
        let angle = rotation + 2.0 * PI * idx as f64 / sides as f64;
        (center.0 + radius * angle.cos(), center.1 + radius * angle.sin())
    };
    for idx in 0..sides {
        let (x1, y1) = vertex(idx);
        let (x2, y2) = vertex((idx + 1) % sides);
        ctx.draw(&CanvasLine {
            x1,
            y1,
            x2,
            y2,
            color,
        });
    }
}

fn detail_panel(node: &Node) -> Paragraph<'static> {
    let mut lines = Vec::new();
    for field in detail_fields(node) {
        lines.push(Line::from(Span::styled(field.label.clone(), MUTED_STYLE)));
        let value_style = if field.label == "State" {
            Style::default()
                .fg(rgb(state_color(node.state)))
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(rgb(theme::TEXT))
        };
        lines.push(Line::from(Span::styled(field.value, value_style)));
        lines.push(Line::default());
    }
    if let Some(command) = terminal_command(node) {
        lines.push(Line::from(Span::styled("Terminal", MUTED_STYLE)));
        lines.push(Line::from(Span::styled(
            command,
            Style::default().fg(rgb(state_color(NodeState::Working))),
        )));
    }

    Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .style(PANEL_STYLE)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(BORDER_STYLE)
                .title(Span::styled(format!(" {} ", node.label), TITLE_STYLE))
                .title_bottom(Span::styled(" esc close ", MUTED_STYLE)),
        )
}

fn activity_feed(app: &App, area: Rect) -> Paragraph<'static> {
    let visible = usize::from(area.height.saturating_sub(2));
    let entries = feed_entries(&app.store);
    let lines: Vec<Line<'static>> = entries[entries.len().saturating_sub(visible)..]
        .iter()
        .map(|entry| {
            Line::from(vec![
                Span::styled(format!("{:>8} ", format_time(entry.timestamp)), MUTED_STYLE),
                Span::styled(
                    format!("{} {:<16} ", activity_glyph(&entry.event), entry.event),
                    Style::default().fg(rgb(theme::TEXT)),
                ),
                Span::styled(
                    format!("{} ", entry.agent.as_deref().unwrap_or_default()),
                    Style::default().fg(rgb(state_color(NodeState::Working))),
                ),
                Span::styled(entry.detail.clone().unwrap_or_default(), MUTED_STYLE),
            ])
        })
        .collect();

    Paragraph::new(lines).style(PANEL_STYLE).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(BORDER_STYLE)
            .title(Span::styled(" activity ", TITLE_STYLE)),
    )
}

/// Small card next to the pointer for the hovered node.
fn render_tooltip(f: &mut Frame, app: &App, canvas: Rect) {
    let (Some(id), Some((column, row))) = (app.hover.as_deref(), app.mouse) else {
        return;
    };
    let Some(node) = app.store.node(id) else {
        return;
    };

    let mut lines = vec![
        Line::from(Span::styled(node.label.clone(), TITLE_STYLE)),
        Line::from(Span::styled(
            match node.rig.as_deref() {
                Some(rig) => format!("{} · {rig}", node.kind),
                None => node.kind.to_string(),
            },
            MUTED_STYLE,
        )),
        Line::from(Span::styled(
            node.state.to_string(),
            Style::default().fg(rgb(state_color(node.state))),
        )),
    ];
    if let Some(bead) = node.metadata.get("hooked_bead").filter(|v| !v.is_empty()) {
        lines.push(Line::from(Span::styled(format!("hook: {bead}"), MUTED_STYLE)));
    }
    if let Some(title) = node.metadata.get("title").filter(|v| !v.is_empty()) {
        lines.push(Line::from(Span::styled(title.clone(), MUTED_STYLE)));
    }

    let content_width = lines.iter().map(Line::width).max().unwrap_or(0) as u16;
    let width = (content_width + 2).min(canvas.width);
    let height = (lines.len() as u16 + 2).min(canvas.height);
    let right = canvas.x + canvas.width;
    let bottom = canvas.y + canvas.height;
    let x = if column + 2 + width <= right {
        column + 2
    } else {
        right.saturating_sub(width)
    };
    let y = if row + height <= bottom {
        row
    } else {
        bottom.saturating_sub(height)
    };
    let area = Rect::new(x, y, width, height);

    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(lines).style(PANEL_STYLE).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(BORDER_STYLE),
        ),
        area,
    );
}
