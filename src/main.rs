//! Relay TUI - Actor-based API client
//!
//! Architecture:
//! - UI Layer (Ratatui) - synchronous terminal rendering
//! - App Layer - central state machine processing events
//! - Network Layer (Tokio) - async HTTP execution
//! - Render workers - blocking snapshot formatting

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{prelude::*, widgets::*};
use tokio::sync::mpsc;

use relay_tui::app::{AppActor, AppState};
use relay_tui::config::Config;
use relay_tui::constants::{APP_NAME, APP_VERSION};
use relay_tui::messages::ui_events::key_to_ui_event;
use relay_tui::messages::{NetworkCommand, NetworkResponse, PaneView, RenderState, UiEvent};
use relay_tui::network::{HttpTransport, NetworkActor};
use relay_tui::storage::Workspace;
use relay_tui::ui::{self, highlight_json, pane_body_height, summary_color};
use relay_tui::render::Tab;

/// Terminal cleanup guard
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = Config::dir();
    std::fs::create_dir_all(&config_dir)?;
    let config = Config::load(&config_dir);

    // Initialize logging to file
    let file_appender = tracing_appender::rolling::never(&config_dir, &config.log_file);
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    tracing::info!(version = APP_VERSION, "{} starting", APP_NAME);

    // Workspace: first argument, else the config dir
    let workspace_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir.clone());
    let workspace = match Workspace::load(&workspace_dir) {
        Ok(workspace) => workspace,
        Err(e) => {
            tracing::error!(dir = %workspace_dir.display(), error = %e, "failed to load workspace");
            Workspace::default()
        }
    };

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let _guard = TerminalGuard;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create channels
    let (ui_tx, ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (net_cmd_tx, net_cmd_rx) = mpsc::unbounded_channel::<NetworkCommand>();
    let (net_resp_tx, net_resp_rx) = mpsc::unbounded_channel::<NetworkResponse>();
    let (render_tx, mut render_rx) = mpsc::unbounded_channel::<RenderState>();

    // Spawn network actor
    let transport = Arc::new(HttpTransport::new(config.timeout_secs));
    let network_actor = NetworkActor::new(transport, net_resp_tx);
    tokio::spawn(network_actor.run(net_cmd_rx));

    // Spawn app actor
    let app_actor = AppActor::new(AppState::new(config, workspace), net_cmd_tx, render_tx);
    tokio::spawn(app_actor.run(ui_rx, net_resp_rx));

    let height = terminal.size()?.height;
    let _ = ui_tx.send(UiEvent::Resize(pane_body_height(height)));

    // Run UI loop (synchronous with async polling)
    run_ui_loop(&mut terminal, ui_tx, &mut render_rx).await?;

    tracing::info!("{} stopped", APP_NAME);
    Ok(())
}

/// Run the synchronous UI rendering loop
async fn run_ui_loop(
    terminal: &mut Terminal<impl Backend>,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    render_rx: &mut mpsc::UnboundedReceiver<RenderState>,
) -> anyhow::Result<()> {
    let mut current_state = RenderState::default();

    loop {
        // Draw with current state
        terminal.draw(|f| draw_ui(f, &current_state))?;

        // Poll for events with timeout
        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => {
                    if let Some(event) =
                        key_to_ui_event(key, current_state.show_help, current_state.export.is_some())
                    {
                        if matches!(event, UiEvent::Quit) {
                            let _ = ui_tx.send(event);
                            break;
                        }
                        let _ = ui_tx.send(event);
                    }
                }
                Event::Resize(_, height) => {
                    let _ = ui_tx.send(UiEvent::Resize(pane_body_height(height)));
                }
                _ => {}
            }
        }

        // Check for state updates (non-blocking)
        while let Ok(state) = render_rx.try_recv() {
            current_state = state;
        }
    }

    Ok(())
}

// ============================================================================
// UI Drawing Functions
// ============================================================================

fn draw_ui(f: &mut Frame, state: &RenderState) {
    let area = f.area();

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Environment + status
            Constraint::Min(0),    // Content
            Constraint::Length(1), // Key hints
        ])
        .split(area);

    draw_top_bar(f, state, main_chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(32), Constraint::Min(20)])
        .split(main_chunks[1]);

    draw_sidebar(f, state, body[0]);
    draw_panes(f, state, body[1]);
    draw_footer(f, state, main_chunks[2]);

    // Popups
    if state.show_help {
        draw_help_popup(f, area);
    }

    if let Some(curl) = &state.export {
        draw_export_popup(f, curl, area);
    }
}

fn draw_top_bar(f: &mut Frame, state: &RenderState, area: Rect) {
    let env = state.environment.as_deref().unwrap_or("no environment");
    let loading = if state.is_loading { " [...]" } else { "" };
    let line = Line::from(vec![
        Span::styled(format!(" {} ", APP_NAME), Style::default().fg(Color::Black).bg(Color::Cyan).bold()),
        Span::raw(" "),
        Span::styled(format!(" env: {} ", env), Style::default().fg(Color::Black).bg(Color::Magenta)),
        Span::styled(loading, Style::default().fg(Color::Yellow)),
        Span::raw(format!("  {}", state.status)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn draw_sidebar(f: &mut Frame, state: &RenderState, area: Rect) {
    let (list_area, workflow_area) = match &state.workflow {
        Some(_) => {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(area);
            (chunks[0], Some(chunks[1]))
        }
        None => (area, None),
    };

    let items: Vec<ListItem> = state
        .items
        .iter()
        .map(|label| {
            let mut parts = label.splitn(2, ' ');
            let first = parts.next().unwrap_or_default();
            let rest = parts.next();
            match rest {
                Some(rest) if ui::method_color(first) != Color::White => ListItem::new(Line::from(vec![
                    Span::styled(format!("{:6}", first), Style::default().fg(ui::method_color(first)).bold()),
                    Span::raw(format!(" {}", rest)),
                ])),
                _ => ListItem::new(label.as_str()),
            }
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(format!(" {} (←/→) ", state.section.title())),
        )
        .highlight_style(Style::default().fg(Color::Yellow).bold());

    let mut list_state = ListState::default();
    if !state.items.is_empty() {
        list_state.select(Some(state.selected));
    }
    f.render_stateful_widget(list, list_area, &mut list_state);

    if let (Some(steps), Some(area)) = (&state.workflow, workflow_area) {
        let lines: Vec<Line> = steps
            .lines()
            .map(|line| {
                let color = if line.starts_with('✓') {
                    Color::Green
                } else if line.starts_with('✗') {
                    Color::Red
                } else if line.starts_with('⊘') {
                    Color::DarkGray
                } else {
                    Color::White
                };
                Line::from(Span::styled(line.to_string(), Style::default().fg(color)))
            })
            .collect();
        let widget = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(" Workflow "))
            .wrap(Wrap { trim: false });
        f.render_widget(widget, area);
    }
}

fn draw_panes(f: &mut Frame, state: &RenderState, area: Rect) {
    if state.panes.is_empty() {
        return;
    }
    let share = 100 / state.panes.len() as u16;
    let constraints: Vec<Constraint> = state.panes.iter().map(|_| Constraint::Percentage(share)).collect();
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (pane, chunk) in state.panes.iter().zip(chunks.iter()) {
        draw_pane(f, pane, *chunk);
    }
}

fn draw_pane(f: &mut Frame, pane: &PaneView, area: Rect) {
    let border_style = if pane.focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };

    let pin = if pane.follow_latest { "" } else { " [pinned]" };
    let loading = if pane.loading { " [...]" } else { "" };
    let title = if pane.title.is_empty() {
        String::from(" Response ")
    } else {
        format!(" {}{}{} ", pane.title, pin, loading)
    };
    let summary = Span::styled(
        format!(" {} ", pane.summary),
        Style::default().fg(summary_color(&pane.summary)).bold(),
    );

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(title)
        .title_bottom(Line::from(summary).right_aligned());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);

    f.render_widget(ui::render_tabs(&pane.tabs, pane.active_tab, pane.focused), chunks[0]);

    let lines = match pane.active_tab {
        Tab::Pretty => highlight_json(&pane.body),
        Tab::Diff => pane
            .body
            .lines()
            .map(|line| {
                let color = if line.starts_with("+ ") || line.starts_with("+++") {
                    Color::Green
                } else if line.starts_with("- ") || line.starts_with("---") {
                    Color::Red
                } else {
                    Color::Gray
                };
                Line::from(Span::styled(line.to_string(), Style::default().fg(color)))
            })
            .collect(),
        _ => pane.body.lines().map(|line| Line::from(line.to_string())).collect(),
    };

    let content = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((pane.scroll, 0));
    f.render_widget(content, chunks[1]);
}

fn draw_footer(f: &mut Frame, state: &RenderState, area: Rect) {
    let hints = if state.is_loading {
        " x:cancel | Tab:tab | v:split | p:pin | ?:help | q:quit "
    } else {
        " Enter:run | s:send | c:compare | e:env | Tab:tab | v:split | p:pin | ?:help | q:quit "
    };

    let bar = Paragraph::new(hints).style(Style::default().fg(Color::DarkGray));
    f.render_widget(bar, area);
}

fn draw_help_popup(f: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 70, area);

    let help_text = r#"
 RELAY - Keyboard Shortcuts

 SIDEBAR
   ← / →              Switch section (requests, workflows, history)
   ↑ / ↓              Select item
   Enter              Send request / run workflow / replay history

 REQUEST
   s                  Send selected request
   c                  Compare across environments
   e                  Cycle environment
   x / Ctrl+X         Cancel
   y                  Show as cURL

 PANES
   Tab / Shift+Tab    Next / previous tab
   v                  Split / unsplit
   p                  Pin / unpin focused pane
   f                  Focus other pane
   j / k              Scroll
   [ / ]              Previous / next compare row

 GENERAL
   ?                  Toggle this help
   q / Ctrl+C         Quit

 Press any key to close...
"#;

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Help ")
        .style(Style::default().bg(Color::Black));

    let help = Paragraph::new(help_text).block(block).wrap(Wrap { trim: false });

    f.render_widget(Clear, popup_area);
    f.render_widget(help, popup_area);
}

fn draw_export_popup(f: &mut Frame, curl: &str, area: Rect) {
    let popup_area = centered_rect(80, 40, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" cURL (any key to close) ")
        .style(Style::default().bg(Color::Black));

    let text = Paragraph::new(curl).block(block).wrap(Wrap { trim: false });

    f.render_widget(Clear, popup_area);
    f.render_widget(text, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
