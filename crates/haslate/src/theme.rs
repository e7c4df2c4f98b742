//! Palette and semantic styles for dashboard tiles and the status line.

use ratatui::style::{Color, Modifier, Style};

use haslate_core::{ConnectionState, Tone};

pub const ACCENT: Color = Color::Rgb(128, 255, 234); // #80ffea
pub const ACTIVE: Color = Color::Rgb(241, 250, 140); // #f1fa8c
pub const OK_GREEN: Color = Color::Rgb(80, 250, 123); // #50fa7b
pub const WARN_YELLOW: Color = Color::Rgb(255, 184, 108); // #ffb86c
pub const ERROR_RED: Color = Color::Rgb(255, 99, 99); // #ff6363
pub const TEXT: Color = Color::Rgb(189, 193, 207); // #bdc1cf
pub const MUTED: Color = Color::Rgb(98, 114, 164); // #6272a4

/// Tile value text for a widget tone.
pub fn value_style(tone: Tone) -> Style {
    match tone {
        Tone::Normal => Style::default().fg(TEXT).add_modifier(Modifier::BOLD),
        Tone::Active => Style::default().fg(ACTIVE).add_modifier(Modifier::BOLD),
        Tone::Dimmed => Style::default().fg(MUTED),
    }
}

pub fn label_style() -> Style {
    Style::default().fg(ACCENT)
}

pub fn border_style(tone: Tone) -> Style {
    match tone {
        Tone::Active => Style::default().fg(ACTIVE),
        Tone::Normal | Tone::Dimmed => Style::default().fg(MUTED),
    }
}

/// Overlay for tiles whose data is out of date.
pub fn stale() -> Style {
    Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC)
}

pub fn connection(state: ConnectionState) -> Style {
    let color = match state {
        ConnectionState::Subscribed => OK_GREEN,
        ConnectionState::Connecting
        | ConnectionState::Authenticating
        | ConnectionState::Reconnecting { .. } => WARN_YELLOW,
        ConnectionState::Disconnected => ERROR_RED,
    };
    Style::default().fg(color)
}

pub fn error() -> Style {
    Style::default().fg(ERROR_RED).add_modifier(Modifier::BOLD)
}

pub fn key_hint() -> Style {
    Style::default().fg(MUTED)
}
