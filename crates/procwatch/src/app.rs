use std::io::Stdout;
use std::sync::mpsc::Receiver;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::config::{Config, SortMode, Theme};
use crate::control::ProcessController;
use crate::coordinator::{CycleOutcome, RefreshCoordinator, RefreshState, Trigger};
use crate::event::Event;
use crate::sampler::ProcessSnapshot;
use crate::selection::ResolvedCursor;
use crate::ui;
use crate::view::DisplayList;

/// Number of table columns the cursor can sit on.
pub const TABLE_COLUMNS: usize = 7;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AppMode {
    Normal,
    Search,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Owns everything the screen shows. The displayed rows and cursor are
/// replaced only in `apply_cycle`, in one step, so a partially refreshed
/// table is never rendered.
pub struct App {
    coordinator: RefreshCoordinator,
    controller: ProcessController,
    theme: Theme,

    mode: AppMode,
    rows: DisplayList,
    cursor: Option<(usize, usize)>,
    table_scroll_offset: usize,
    status_message: Option<(String, StatusLevel)>,
    should_quit: bool,
}

impl App {
    pub fn new(
        config: &Config,
        coordinator: RefreshCoordinator,
        controller: ProcessController,
    ) -> Self {
        Self {
            coordinator,
            controller,
            theme: config.theme,
            mode: AppMode::Normal,
            rows: Vec::new(),
            cursor: None,
            table_scroll_offset: 0,
            status_message: None,
            should_quit: false,
        }
    }

    pub fn run(
        mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
        events: Receiver<Event>,
    ) -> Result<()> {
        self.coordinator.trigger_now(Trigger::Startup);

        while !self.should_quit {
            terminal.draw(|frame| ui::render(frame, &mut self))?;
            match events.recv() {
                Ok(event) => self.handle_event(event),
                Err(_) => break,
            }
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Input(key) => self.handle_input(key),
            Event::Tick => self.coordinator.on_tick(),
            Event::SampleDone(outcome) => self.apply_cycle(outcome),
            Event::Resize => {}
            Event::Quit => self.should_quit = true,
        }
    }

    /// Fold a finished cycle into the visible table: rows and cursor swap
    /// together or not at all. A failed cycle leaves the table untouched.
    fn apply_cycle(&mut self, outcome: Result<ProcessSnapshot>) {
        match self.coordinator.complete(outcome) {
            CycleOutcome::Applied { rows, cursor } => {
                self.rows = rows;
                self.cursor = match cursor {
                    ResolvedCursor::Cell { row, column } => Some((row, column)),
                    ResolvedCursor::None => None,
                };
                let max_offset = self.rows.len().saturating_sub(1);
                self.table_scroll_offset = self.table_scroll_offset.min(max_offset);
            }
            CycleOutcome::Failed { error } => {
                self.set_status(StatusLevel::Warning, error);
            }
        }
    }

    fn handle_input(&mut self, key: KeyEvent) {
        match self.mode {
            AppMode::Search => self.handle_search_input(key),
            AppMode::Normal => self.handle_normal_input(key),
        }
    }

    fn handle_normal_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('/') | KeyCode::Char('f') => {
                self.mode = AppMode::Search;
            }
            KeyCode::Char('r') => {
                self.coordinator.trigger_now(Trigger::Manual);
            }
            KeyCode::Char('k') | KeyCode::Delete => self.kill_selected(),
            KeyCode::Char('s') => {
                let mode = self.coordinator.toggle_sort_mode();
                self.set_status(
                    StatusLevel::Info,
                    format!("sorting by {} usage", mode.display_name()),
                );
            }
            KeyCode::Char('a') => {
                let enabled = !self.coordinator.view().auto_refresh;
                self.coordinator.set_auto_refresh(enabled);
                let label = if enabled { "enabled" } else { "disabled" };
                self.set_status(StatusLevel::Info, format!("auto-refresh {label}"));
            }
            KeyCode::Up => self.move_row(-1),
            KeyCode::Down => self.move_row(1),
            KeyCode::Left => self.move_column(-1),
            KeyCode::Right => self.move_column(1),
            KeyCode::Char('g') | KeyCode::Home => self.jump_to(0),
            KeyCode::Char('G') | KeyCode::End => {
                self.jump_to(self.rows.len().saturating_sub(1));
            }
            _ => {}
        }
    }

    fn handle_search_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => {
                self.mode = AppMode::Normal;
            }
            KeyCode::Backspace => {
                let mut text = self.coordinator.view().search_text.clone();
                text.pop();
                self.coordinator.set_search_text(text);
            }
            KeyCode::Char(c)
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT) =>
            {
                let mut text = self.coordinator.view().search_text.clone();
                text.push(c);
                self.coordinator.set_search_text(text);
            }
            _ => {}
        }
    }

    fn kill_selected(&mut self) {
        let Some((row, _)) = self.cursor else {
            self.set_status(StatusLevel::Warning, "no process selected");
            return;
        };
        let Some(record) = self.rows.get(row) else {
            self.set_status(StatusLevel::Warning, "no process selected");
            return;
        };

        let pid = record.pid;
        let name = record.name.clone();
        let outcome = self.controller.terminate(pid, &name);
        let level = if outcome.is_error() {
            StatusLevel::Error
        } else {
            StatusLevel::Info
        };
        self.set_status(level, outcome.describe(pid));

        // Resync immediately so the table reflects the kill.
        self.coordinator.trigger_now(Trigger::PostKill);
    }

    fn move_row(&mut self, delta: i64) {
        if self.rows.is_empty() {
            return;
        }
        let (row, column) = self.cursor.unwrap_or((0, 0));
        let len = self.rows.len() as i64;
        let next = (row as i64 + delta).rem_euclid(len) as usize;
        self.set_cursor(next, column);
    }

    fn move_column(&mut self, delta: i64) {
        if self.rows.is_empty() {
            return;
        }
        let (row, column) = self.cursor.unwrap_or((0, 0));
        let columns = TABLE_COLUMNS as i64;
        let next = (column as i64 + delta).rem_euclid(columns) as usize;
        self.set_cursor(row, next);
    }

    fn jump_to(&mut self, row: usize) {
        if self.rows.is_empty() {
            return;
        }
        let (_, column) = self.cursor.unwrap_or((0, 0));
        self.set_cursor(row, column);
    }

    fn set_cursor(&mut self, row: usize, column: usize) {
        self.cursor = Some((row, column));
        let pid = self.rows.get(row).map(|record| record.pid);
        self.coordinator.record_cursor(row, column, pid);
    }

    fn set_status<T: Into<String>>(&mut self, level: StatusLevel, message: T) {
        self.status_message = Some((message.into(), level));
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn rows(&self) -> &DisplayList {
        &self.rows
    }

    pub fn cursor(&self) -> Option<(usize, usize)> {
        self.cursor
    }

    pub fn search_text(&self) -> &str {
        &self.coordinator.view().search_text
    }

    pub fn sort_mode(&self) -> SortMode {
        self.coordinator.view().sort_mode
    }

    pub fn auto_refresh(&self) -> bool {
        self.coordinator.view().auto_refresh
    }

    pub fn is_refreshing(&self) -> bool {
        self.coordinator.state() == RefreshState::Refreshing
    }

    pub fn status_message(&self) -> Option<&(String, StatusLevel)> {
        self.status_message.as_ref()
    }

    pub fn table_scroll_offset(&self) -> usize {
        self.table_scroll_offset
    }

    pub fn set_table_scroll_offset(&mut self, offset: usize) {
        self.table_scroll_offset = offset;
    }
}
