mod app;
mod camera;
mod connection;
mod overlay;
mod render;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use connection::{ConnectionManager, HttpTransport};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;
use zeppelin_layout::{LayoutEngine, Viewport};

#[derive(Parser, Debug)]
#[command(name = "zeppelin", about = "Live terminal map of a Gas Town workspace")]
struct Args {
    /// Base URL of the state server.
    #[arg(long, env = "ZEPPELIN_URL", default_value = "http://127.0.0.1:7331")]
    url: Url,
    /// Animation frames per second.
    #[arg(
        long,
        env = "ZEPPELIN_FPS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u32).range(1..=120)
    )]
    fps: u32,
    /// Write logs to stderr instead of discarding them.
    #[arg(long, env = "ZEPPELIN_LOG_STDERR")]
    log_stderr: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_stderr);

    let transport = HttpTransport::new(&args.url).context("building event transport")?;
    info!(event = "client_start", url = %transport.url(), fps = args.fps);
    let (connection, events) = ConnectionManager::new(Arc::new(transport));
    let app = app::App::new(connection, LayoutEngine::new(Viewport::new(800.0, 600.0)));

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, app, events, args.fps).await;
    restore_terminal(&mut terminal)?;
    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: app::App,
    mut events: tokio::sync::mpsc::Receiver<connection::ConnectionEvent>,
    fps: u32,
) -> Result<()> {
    let mut input = EventStream::new();
    let mut frames = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    app.connection.connect();
    loop {
        let reconnect_at = app.connection.reconnect_deadline();
        tokio::select! {
            _ = frames.tick() => {
                let now = std::time::Instant::now();
                app.on_frame(now);
                terminal.draw(|frame| ui::render(frame, &mut app, now))?;
            }
            Some(event) = events.recv() => {
                app.handle_connection_event(event, std::time::Instant::now());
            }
            _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(tokio::time::Instant::now)),
                if reconnect_at.is_some() => {
                app.connection.reconnect();
            }
            maybe_event = input.next() => {
                match maybe_event {
                    Some(Ok(event)) => {
                        if app.handle_event(event, std::time::Instant::now()) {
                            break;
                        }
                    }
                    Some(Err(err)) => warn!(event = "terminal_input_error", error = %err),
                    None => break,
                }
            }
        }
    }

    app.connection.shutdown();
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// The UI owns the terminal, so logs are discarded unless explicitly routed to stderr.
fn init_logging(to_stderr: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if to_stderr {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_server() {
        let args = Args::try_parse_from(["zeppelin"]).expect("parse defaults");
        assert_eq!(args.url.as_str(), "http://127.0.0.1:7331/");
        assert_eq!(args.fps, 30);
        assert!(!args.log_stderr);
    }

    #[test]
    fn fps_out_of_range_is_rejected() {
        assert!(Args::try_parse_from(["zeppelin", "--fps", "0"]).is_err());
        let args = Args::try_parse_from(["zeppelin", "--fps", "60", "--log-stderr"]).expect("parse");
        assert_eq!(args.fps, 60);
        assert!(args.log_stderr);
    }
}
