//! Colors and status marks for console output

use crossterm::style::Color;

/// Icon and color shown in front of a status line.
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    pub icon: &'static str,
    pub color: Color,
}

impl Mark {
    const fn new(icon: &'static str, color: Color) -> Self {
        Self { icon, color }
    }
}

/// Palette used by [`ConsoleReporter`](super::ConsoleReporter).
#[derive(Debug, Clone)]
pub struct Theme {
    /// Step and package names
    pub name: Color,
    /// Paths, sizes, timings
    pub detail: Color,
    /// Phase titles
    pub header: Color,
    pub running: Mark,
    pub done: Mark,
    pub failed: Mark,
    pub warning: Mark,
    pub info: Mark,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: Color::Cyan,
            detail: Color::DarkGrey,
            header: Color::White,
            running: Mark::new("●", Color::Blue),
            done: Mark::new("✓", Color::Green),
            failed: Mark::new("✗", Color::Red),
            warning: Mark::new("⚠", Color::Yellow),
            info: Mark::new("ℹ", Color::DarkGrey),
        }
    }
}

/// Human-readable byte count.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
