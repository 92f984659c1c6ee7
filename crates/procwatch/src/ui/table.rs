use std::cmp::{max, min};

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::Alignment;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use crate::app::{App, AppMode, StatusLevel};
use crate::sampler::ProcessRecord;

pub const COLUMN_TITLES: [&str; 7] = [
    "PID", "Name", "CPU%", "MEM%", "Status", "Started", "User",
];

pub fn render(frame: &mut Frame, area: Rect, app: &mut App) {
    let search_visible = app.mode() == AppMode::Search || !app.search_text().is_empty();

    let constraints = if search_visible {
        vec![
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(2),
        ]
    } else {
        vec![
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(2),
        ]
    };

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    render_header(frame, layout[0], app);
    if search_visible {
        render_search(frame, layout[1], app);
        render_process_table(frame, layout[2], app);
        render_status(frame, layout[3], app);
    } else {
        render_process_table(frame, layout[1], app);
        render_status(frame, layout[2], app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let palette = app.theme().palette();
    let auto = if app.auto_refresh() { "auto" } else { "paused" };

    let mut spans = vec![
        Span::styled("procwatch", Style::default().fg(palette.table_header)),
        Span::raw(" | "),
        Span::styled(
            format!("{} processes", app.rows().len()),
            Style::default().fg(palette.text_dim),
        ),
        Span::raw(" | "),
        Span::styled(
            format!("sort: {}", app.sort_mode().display_name()),
            Style::default().fg(palette.text_normal),
        ),
        Span::raw(" | "),
        Span::styled(auto, Style::default().fg(palette.text_dim)),
    ];

    if app.is_refreshing() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            "refreshing…",
            Style::default().fg(palette.text_dim),
        ));
    }

    let paragraph = Paragraph::new(Line::from(spans)).alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

fn render_search(frame: &mut Frame, area: Rect, app: &App) {
    let palette = app.theme().palette();
    let mut spans = vec![Span::styled(
        app.search_text().to_string(),
        Style::default().fg(palette.text_normal),
    )];
    if app.mode() == AppMode::Search {
        spans.push(Span::styled(
            "█",
            Style::default().fg(palette.search_accent),
        ));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.search_accent))
        .title(Span::styled(
            " Find ",
            Style::default().fg(palette.search_accent),
        ));

    let paragraph = Paragraph::new(Line::from(spans)).block(block);
    frame.render_widget(paragraph, area);
}

fn render_process_table(frame: &mut Frame, area: Rect, app: &mut App) {
    let palette = app.theme().palette();
    let row_count = app.rows().len();
    let visible_height = area.height.saturating_sub(3) as usize; // borders + header
    let cursor = app.cursor();
    let selected_row = cursor.map(|(row, _)| row);

    let mut offset = app.table_scroll_offset();
    if visible_height > 0 {
        if let Some(selected) = selected_row {
            if selected >= offset + visible_height {
                offset = selected + 1 - visible_height;
            } else if selected < offset {
                offset = selected;
            }
        }
    } else {
        offset = 0;
    }
    app.set_table_scroll_offset(offset);

    let records = app.rows();
    let end = min(offset.saturating_add(visible_height), row_count);
    let displayed = if offset >= end {
        &records[0..0]
    } else {
        &records[offset..end]
    };

    let header_cells = COLUMN_TITLES
        .into_iter()
        .map(|title| Cell::from(title).style(Style::default().fg(palette.table_header)));
    let header = Row::new(header_cells).height(1);

    let rows = displayed.iter().enumerate().map(|(idx, record)| {
        let absolute_index = idx + offset;
        build_row(app, record, absolute_index, cursor)
    });

    let widths = [
        Constraint::Length(8),
        Constraint::Length(22),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(10),
        Constraint::Length(19),
        Constraint::Length(12),
    ];

    let table = Table::new(rows, widths)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.table_border)),
        )
        .header(header)
        .column_spacing(1);

    frame.render_widget(table, area);

    if row_count > visible_height && visible_height > 0 {
        render_scrollbar(
            frame,
            area,
            offset,
            visible_height,
            row_count,
            palette.table_border,
        );
    }
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let palette = app.theme().palette();
    let mut lines = vec![Line::from(""), Line::from("")];

    if let Some((message, level)) = app.status_message() {
        let color = match level {
            StatusLevel::Info => palette.status_info,
            StatusLevel::Warning => palette.status_warning,
            StatusLevel::Error => palette.status_error,
        };
        lines[0] = Line::from(Span::styled(message.clone(), Style::default().fg(color)));
    }

    lines[1] = Line::from(Span::styled(
        hints_for_mode(app.mode()),
        Style::default().fg(palette.text_dim),
    ));

    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(palette.table_border));

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

fn build_row(
    app: &App,
    record: &ProcessRecord,
    absolute_index: usize,
    cursor: Option<(usize, usize)>,
) -> Row<'static> {
    let palette = app.theme().palette();
    let is_selected = cursor.map(|(row, _)| row) == Some(absolute_index);
    let cursor_column = cursor.and_then(|(row, column)| (row == absolute_index).then_some(column));

    let mut style = Style::default().fg(palette.text_normal);
    if absolute_index % 2 == 1 {
        style = style.bg(palette.row_alt);
    }
    if is_selected {
        style = style.bg(palette.highlight_selected);
    }

    let pid = format!("{:>7}", record.pid);
    let name = truncated_with_indicator(record.name.clone(), 22);
    let cpu = format!("{:>5.1}", record.cpu_percent);
    let mem = format!("{:>5.1}", record.mem_percent);
    let state = record.state.label().to_string();
    let started = record
        .started_at
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let owner = truncated(&record.owner, 12);

    let cpu_style = Style::default().fg(app.theme().cpu_color(record.cpu_percent));
    let mem_style = Style::default().fg(app.theme().mem_color(record.mem_percent));

    let cell_style = |index: usize, base: Style| {
        if cursor_column == Some(index) {
            base.add_modifier(Modifier::REVERSED | Modifier::BOLD)
        } else {
            base
        }
    };

    let cells = vec![
        Cell::from(pid).style(cell_style(0, Style::default())),
        Cell::from(name).style(cell_style(1, Style::default())),
        Cell::from(cpu).style(cell_style(2, cpu_style)),
        Cell::from(mem).style(cell_style(3, mem_style)),
        Cell::from(state).style(cell_style(4, Style::default())),
        Cell::from(started).style(cell_style(5, Style::default())),
        Cell::from(owner).style(cell_style(6, Style::default())),
    ];

    Row::new(cells).style(style).height(1)
}

fn render_scrollbar(
    frame: &mut Frame,
    area: Rect,
    offset: usize,
    window: usize,
    total: usize,
    color: Color,
) {
    let scrollbar_area = Rect {
        x: area.x + area.width.saturating_sub(1),
        y: area.y + 1,
        width: 1,
        height: area.height.saturating_sub(2),
    };

    if scrollbar_area.height == 0 {
        return;
    }

    let ratio = window as f32 / total as f32;
    let handle_height = max((scrollbar_area.height as f32 * ratio).round() as u16, 1);
    let max_offset = total.saturating_sub(window);
    let handle_offset = if max_offset == 0 {
        0
    } else {
        ((offset as f32 / max_offset as f32) * (scrollbar_area.height - handle_height) as f32)
            .round() as u16
    };

    let lines: Vec<Line> = (0..scrollbar_area.height)
        .map(|y| {
            let symbol = if y >= handle_offset && y < handle_offset + handle_height {
                "█"
            } else {
                "░"
            };
            Line::from(Span::styled(symbol.to_string(), Style::default().fg(color)))
        })
        .collect();

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, scrollbar_area);
}

fn hints_for_mode(mode: AppMode) -> String {
    match mode {
        AppMode::Normal => {
            "q quit | / find | r refresh | k kill | s sort cpu/mem | a auto-refresh | ↑↓←→ navigate"
                .to_string()
        }
        AppMode::Search => "Esc/Enter done | type to filter live…".to_string(),
    }
}

fn truncated(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        value.to_string()
    } else {
        value.chars().take(max_len).collect()
    }
}

fn truncated_with_indicator(value: String, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        value
    } else {
        value
            .chars()
            .take(max_len.saturating_sub(1))
            .collect::<String>()
            + "…"
    }
}
