//! Drawing dashboard tiles and the status line with ratatui.
//!
//! One layout pixel is one terminal cell, so widget rects map straight
//! onto the dashboard area.

use std::borrow::Cow;

use ratatui::{
    Frame,
    layout::{Alignment, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use haslate_core::{ConnectionState, DashboardStatus, DrawCommand};

use crate::theme;

/// Place a layout rect inside `area`, clipped to it.
pub fn to_area(rect: haslate_core::Rect, area: Rect) -> Option<Rect> {
    let x = u16::try_from(rect.x).ok()?;
    let y = u16::try_from(rect.y).ok()?;
    if x >= area.width || y >= area.height {
        return None;
    }
    let width = u16::try_from(rect.width).unwrap_or(u16::MAX).min(area.width - x);
    let height = u16::try_from(rect.height).unwrap_or(u16::MAX).min(area.height - y);
    Some(Rect::new(area.x + x, area.y + y, width, height))
}

fn level_bar(percent: u8, charging: bool) -> String {
    let filled = usize::from(percent.min(100)).div_ceil(20);
    format!(
        "▕{}{}▏{}",
        "█".repeat(filled),
        "░".repeat(5 - filled),
        if charging { "+" } else { "" }
    )
}

/// Terminal rendering of an icon name.
pub fn icon_glyph(icon: &str) -> Cow<'_, str> {
    let glyph = match icon {
        "lightbulb" => "☀",
        "electric-switch-closed" => "●",
        "electric-switch" => "○",
        "timelapse" => "…",
        "wifi-strength-off-outline" => "✕",
        "wifi-strength-outline" => "▁",
        "wifi-strength-1" => "▂",
        "wifi-strength-2" => "▂▄",
        "wifi-strength-3" => "▂▄▆",
        "wifi-strength-4" => "▂▄▆█",
        "battery-unknown" => "▕?????▏",
        "battery-alert" => "▕!    ▏",
        "battery-charging-outline" => return Cow::Owned(level_bar(0, true)),
        "battery" => return Cow::Owned(level_bar(100, false)),
        "battery-charging" => return Cow::Owned(level_bar(100, true)),
        other => {
            let (rest, charging) = match other.strip_prefix("battery-charging-") {
                Some(rest) => (Some(rest), true),
                None => (other.strip_prefix("battery-"), false),
            };
            return match rest.and_then(|n| n.parse::<u8>().ok()) {
                Some(level) => Cow::Owned(level_bar(level, charging)),
                None => Cow::Borrowed(other),
            };
        }
    };
    Cow::Borrowed(glyph)
}

/// Draw one tile. `area` is the whole dashboard area.
pub fn render_tile(frame: &mut Frame, area: Rect, command: &DrawCommand) {
    let Some(tile) = to_area(command.rect, area) else {
        return;
    };
    let content = &command.content;
    let style = &command.style;

    let mut base = Style::default();
    if let Some(bg) = style.background.as_deref().and_then(|c| c.parse::<Color>().ok()) {
        base = base.bg(bg);
    }
    if content.stale {
        base = base.patch(theme::stale());
    }

    let mut block = Block::default().style(base);
    if style.border_width != Some(0) {
        block = block
            .borders(Borders::ALL)
            .border_style(theme::border_style(content.tone));
    }
    if !content.label.is_empty() {
        block = block.title(Span::styled(content.label.as_str(), theme::label_style()));
    }

    let mut lines = Vec::new();
    if let Some(icon) = &content.icon {
        lines.push(Line::from(Span::styled(
            icon_glyph(icon),
            theme::value_style(content.tone),
        )));
    }
    if !content.value.is_empty() {
        lines.extend(
            content
                .value
                .lines()
                .map(|l| Line::from(Span::styled(l, theme::value_style(content.tone)))),
        );
    }

    frame.render_widget(Clear, tile);
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(block),
        tile,
    );
}

/// What the status line shows.
pub struct StatusLine<'a> {
    pub connection: ConnectionState,
    pub status: &'a DashboardStatus,
    pub page: Option<&'a str>,
}

pub fn render_status(frame: &mut Frame, area: Rect, line: &StatusLine<'_>) {
    let mut spans = vec![
        Span::raw(" "),
        Span::styled(
            format!("● {}", line.connection),
            theme::connection(line.connection),
        ),
    ];
    if let Some(page) = line.page.filter(|p| !p.is_empty()) {
        spans.push(Span::styled(format!("  │ {page}"), theme::label_style()));
    }
    match line.status {
        DashboardStatus::Ok => {}
        DashboardStatus::AuthFailed(message) => spans.push(Span::styled(
            format!("  │ auth failed: {message}"),
            theme::error(),
        )),
        DashboardStatus::ConfigError(message) => spans.push(Span::styled(
            format!("  │ config error: {message}"),
            theme::error(),
        )),
    }
    spans.push(Span::styled(
        "  │ ←/→ page  r reload  q quit",
        theme::key_hint(),
    ));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Full-screen notice while no configuration can be loaded.
pub struct ConfigProblem {
    pub title: &'static str,
    pub detail: String,
    pub hint: &'static str,
}

pub fn render_config_problem(frame: &mut Frame, problem: &ConfigProblem) {
    let area = frame.area();
    let height = area.height.min(6);
    let notice = Rect::new(area.x, area.y + (area.height - height) / 2, area.width, height);

    let lines = vec![
        Line::from(Span::styled(problem.title, theme::error())),
        Line::default(),
        Line::from(Span::styled(problem.detail.as_str(), theme::label_style())),
        Line::default(),
        Line::from(Span::styled(problem.hint, theme::key_hint())),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        notice,
    );
}
