use ratatui::{prelude::*, widgets::*};

use crate::render::Tab;

/// Renders a pane's tab bar
pub fn render_tabs<'a>(tabs: &[Tab], active: Tab, focused: bool) -> Tabs<'a> {
    let titles: Vec<Line> = tabs.iter().map(|t| Line::from(t.title())).collect();
    let selected = tabs.iter().position(|t| *t == active).unwrap_or(0);
    let highlight = if focused {
        Style::default().fg(Color::Yellow).bold()
    } else {
        Style::default().fg(Color::White).bold()
    };

    Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(highlight)
        .divider("|")
}

/// Simple JSON syntax highlighting
pub fn highlight_json(text: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for line in text.lines() {
        let mut spans = Vec::new();
        let mut current = String::new();
        let mut in_string = false;
        let mut is_key = false;

        for c in line.chars() {
            match c {
                '"' => {
                    if in_string {
                        // End of string
                        current.push(c);
                        let color = if is_key { Color::Cyan } else { Color::Green };
                        spans.push(Span::styled(current.clone(), Style::default().fg(color)));
                        current.clear();
                        in_string = false;
                        is_key = false;
                    } else {
                        if !current.is_empty() {
                            spans.push(Span::raw(current.clone()));
                            current.clear();
                        }
                        in_string = true;
                        current.push(c);
                        is_key = line.trim_end().ends_with('{') || line.contains("\":");
                    }
                }
                ':' if !in_string => {
                    flush(&mut spans, &mut current);
                    spans.push(Span::styled(":", Style::default().fg(Color::White)));
                }
                '{' | '}' | '[' | ']' if !in_string => {
                    flush(&mut spans, &mut current);
                    spans.push(Span::styled(c.to_string(), Style::default().fg(Color::Yellow)));
                }
                _ => current.push(c),
            }
        }
        flush(&mut spans, &mut current);
        lines.push(Line::from(spans));
    }

    lines
}

/// Push `current` as a span, coloring bare literals
fn flush(spans: &mut Vec<Span<'static>>, current: &mut String) {
    if current.is_empty() {
        return;
    }
    let word = current.trim().trim_end_matches(',');
    let style = if word == "true" || word == "false" || word == "null" {
        Style::default().fg(Color::Magenta)
    } else if !word.is_empty() && word.parse::<f64>().is_ok() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    spans.push(Span::styled(std::mem::take(current), style));
}

/// Status code color
pub fn status_color(code: u16) -> Color {
    match code {
        200..=299 => Color::Green,
        300..=399 => Color::Cyan,
        400..=499 => Color::Red,
        500..=599 => Color::Magenta,
        _ => Color::Yellow,
    }
}

/// Color for a snapshot summary line such as `200 OK · 12 ms`
pub fn summary_color(summary: &str) -> Color {
    let code = summary
        .split_whitespace()
        .next()
        .and_then(|word| word.parse::<u16>().ok());
    match code {
        Some(code) => status_color(code),
        None if summary.starts_with("Error") => Color::Red,
        None => Color::Gray,
    }
}

/// Method color
pub fn method_color(method: &str) -> Color {
    match method {
        "GET" => Color::Green,
        "POST" => Color::Yellow,
        "PUT" => Color::Blue,
        "PATCH" => Color::Cyan,
        "DELETE" => Color::Red,
        _ => Color::White,
    }
}

/// Rows left for a pane body once the chrome is drawn
pub fn pane_body_height(terminal_height: u16) -> u16 {
    // status bar, footer, pane borders and tab bar
    terminal_height.saturating_sub(6)
}
