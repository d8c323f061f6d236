mod export;
mod help;
mod input;
mod state;

use crate::cli::Cli;
use crate::engine::api::HttpTransport;
use crate::engine::LocalBackend;
use crate::model::{ControlId, Mode, ShellConfig, ShellEvent};
use crate::orchestrator::extraction::ExtractionClient;
use crate::orchestrator::{self, UiCommand};
use crate::render::{ERROR_MARKER, OK_MARKER, WARN_MARKER};
use crate::session::PaneStatus;
use anyhow::{Context, Result};
use crossterm::{
    event, execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Terminal,
};
use state::{InputMode, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli, cfg: ShellConfig) -> Result<()> {
    // Unbounded channels keep the UI thread from ever blocking on the controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ShellEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let transport = HttpTransport::new(&cfg)?;
    let client = Arc::new(ExtractionClient::new(transport, cfg.persona.clone()));
    let backend = LocalBackend::new(&cfg);

    let mut state = UiState::new(cfg.output_dir.clone());
    if let Some(mode) = args.mode {
        state.session.select_mode(mode);
    }
    if let Some(pdf) = args.pdf.as_deref() {
        state.open_document(pdf);
    }

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(state, event_rx, cmd_tx));

    let res = orchestrator::run_controller(client, backend, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut state: UiState,
    mut event_rx: UnboundedReceiver<ShellEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking; UiState is only ever touched on this thread.
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(ev) = event::read() {
                let action = input::map_event(&ev);
                if state.handle(action, &cmd_tx) {
                    break Ok(());
                }
                // Redraw right away so typing feels immediate.
                terminal.draw(|f| draw(f.area(), f, &state)).ok();
                last_tick = Instant::now();
            }
        }

        if cmd_tx.is_closed() {
            break Err(anyhow::anyhow!("controller stopped"));
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn marker_style(line: &str) -> Style {
    if line.starts_with(OK_MARKER) {
        Style::default().fg(Color::Green)
    } else if line.starts_with(ERROR_MARKER) || line.starts_with("Error: ") {
        Style::default().fg(Color::Red)
    } else if line.starts_with(WARN_MARKER) {
        Style::default().fg(Color::Yellow)
    } else if line.starts_with(crate::session::transcript::PROMPT) {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

/// The last `height` lines of `lines`, skipping `scroll` lines from the bottom.
fn tail<S: AsRef<str>>(lines: &[S], height: usize, scroll: usize) -> Vec<Line<'static>> {
    let end = lines.len().saturating_sub(scroll);
    let start = end.saturating_sub(height);
    lines[start..end]
        .iter()
        .map(|l| {
            let l = l.as_ref();
            Line::from(Span::styled(l.to_string(), marker_style(l)))
        })
        .collect()
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(10),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(area);

    draw_mode_tabs(chunks[0], f, state);
    draw_controls(chunks[1], f, state);

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[2]);
    draw_results(panes[0], f, state);
    draw_outline_log(panes[1], f, state);

    draw_console(chunks[3], f, state);
    draw_input(chunks[4], f, state);
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(
            state.info.clone(),
            Style::default().fg(Color::Gray),
        ))),
        chunks[5],
    );

    if state.show_help {
        help::draw_help(centered(area, 64, 22), f);
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

fn draw_mode_tabs(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let active = state.session.active_mode();
    let selected = Mode::ALL.iter().position(|m| *m == active).unwrap_or(0);
    let tabs = Tabs::new(Mode::ALL.iter().map(|m| m.title()))
        .select(selected)
        .block(Block::default().borders(Borders::ALL).title("Mode (Tab)"))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, area);
}

fn control_key(control: ControlId) -> &'static str {
    match control {
        ControlId::Extract => "F5",
        ControlId::Entities => "F6",
        ControlId::LocalOutline => "F7",
    }
}

fn draw_controls(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let session = &state.session;
    let has_doc = session.document().is_some();
    let mut spans = vec![match session.document() {
        Some(doc) => Span::styled(doc.file_name(), Style::default().fg(Color::White)),
        None => Span::styled(
            "No document (Ctrl-O to open)",
            Style::default().fg(Color::DarkGray),
        ),
    }];

    let controls = session
        .modes()
        .visible_controls()
        .iter()
        .copied()
        .chain(std::iter::once(ControlId::LocalOutline));
    for control in controls {
        let style = if session.is_busy(control) {
            Style::default().fg(Color::Yellow)
        } else if has_doc {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::raw("   "));
        spans.push(Span::styled(
            format!("[{} {}]", control_key(control), session.control_label(control)),
            style,
        ));
    }

    let title = session
        .document()
        .map(|d| d.file_url())
        .unwrap_or_else(|| "Document".into());
    let p = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let pane = state.session.results();
    let (title, color) = match pane.status {
        PaneStatus::Idle => ("Results", Color::Gray),
        PaneStatus::Processing => ("Results (processing)", Color::Yellow),
        PaneStatus::Success => ("Results", Color::Green),
        PaneStatus::Error(_) => ("Results (error)", Color::Red),
    };
    let lines: Vec<Line> = pane
        .lines
        .iter()
        .map(|l| Line::from(Span::styled(l.clone(), marker_style(l))))
        .collect();
    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(title),
    );
    f.render_widget(p, area);
}

fn draw_outline_log(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let log: Vec<&str> = state.session.outline_log().lines().collect();
    let height = area.height.saturating_sub(2) as usize;
    let p = Paragraph::new(tail(&log, height, 0)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Local outline (F7)"),
    );
    f.render_widget(p, area);
}

fn draw_console(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let lines = state.session.transcript().lines();
    let height = area.height.saturating_sub(2) as usize;
    let title = if state.transcript_scroll > 0 {
        format!("Console (scrolled {} lines)", state.transcript_scroll)
    } else {
        "Console".into()
    };
    let p = Paragraph::new(tail(lines, height, state.transcript_scroll))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_input(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let (title, prompt) = match state.input_mode {
        InputMode::Console => ("Command (Enter to run)", crate::session::transcript::PROMPT),
        InputMode::OpenPath => ("Open PDF (Enter to open, Esc to cancel)", "path: "),
    };
    let text = format!("{prompt}{}", state.input);
    let p = Paragraph::new(text.clone())
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
    if !state.show_help {
        let x = area.x + 1 + text.chars().count() as u16;
        f.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
    }
}
