use std::path::PathBuf;

use clap::ValueEnum;
use ratatui::style::Color;

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum SortMode {
    Cpu,
    Mem,
}

impl Default for SortMode {
    fn default() -> Self {
        SortMode::Cpu
    }
}

impl SortMode {
    pub fn toggled(self) -> Self {
        match self {
            SortMode::Cpu => SortMode::Mem,
            SortMode::Mem => SortMode::Cpu,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SortMode::Cpu => "CPU",
            SortMode::Mem => "Memory",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum Theme {
    Slate,
    Mono,
}

impl Default for Theme {
    fn default() -> Self {
        Theme::Slate
    }
}

pub struct Palette {
    pub table_header: Color,
    pub table_border: Color,
    pub text_normal: Color,
    pub text_dim: Color,
    pub highlight_selected: Color,
    pub row_alt: Color,
    pub status_info: Color,
    pub status_warning: Color,
    pub status_error: Color,
    pub search_accent: Color,
}

impl Theme {
    pub fn palette(self) -> Palette {
        match self {
            Theme::Slate => Palette {
                table_header: Color::Cyan,
                table_border: Color::DarkGray,
                text_normal: Color::White,
                text_dim: Color::DarkGray,
                highlight_selected: Color::Rgb(50, 60, 80),
                row_alt: Color::Rgb(24, 26, 32),
                status_info: Color::Green,
                status_warning: Color::Yellow,
                status_error: Color::Red,
                search_accent: Color::Magenta,
            },
            Theme::Mono => Palette {
                table_header: Color::White,
                table_border: Color::Gray,
                text_normal: Color::White,
                text_dim: Color::DarkGray,
                highlight_selected: Color::Rgb(60, 60, 60),
                row_alt: Color::Rgb(20, 20, 20),
                status_info: Color::White,
                status_warning: Color::Gray,
                status_error: Color::White,
                search_accent: Color::White,
            },
        }
    }

    pub fn cpu_color(self, percent: f32) -> Color {
        match self {
            Theme::Mono => Color::White,
            Theme::Slate => {
                if percent >= 75.0 {
                    Color::Red
                } else if percent >= 30.0 {
                    Color::Yellow
                } else {
                    Color::Green
                }
            }
        }
    }

    pub fn mem_color(self, percent: f32) -> Color {
        match self {
            Theme::Mono => Color::White,
            Theme::Slate => {
                if percent >= 20.0 {
                    Color::Red
                } else if percent >= 5.0 {
                    Color::Yellow
                } else {
                    Color::Green
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub theme: Theme,
    pub refresh_rate_ms: u64,
    pub initial_filter: Option<String>,
    pub initial_sort: SortMode,
    pub auto_refresh: bool,
    pub log_file: Option<PathBuf>,
}
