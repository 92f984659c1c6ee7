use crate::view::DisplayList;

/// Where the user's focus was last cycle. `last_pid` may name a process
/// that has since exited; the tracker treats that as routine.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    pub last_pid: Option<u32>,
    pub last_row: usize,
    pub last_column: usize,
}

/// Cursor coordinate after reconciling against a fresh display list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedCursor {
    Cell { row: usize, column: usize },
    None,
}

impl ResolvedCursor {
    pub fn row(self) -> Option<usize> {
        match self {
            ResolvedCursor::Cell { row, .. } => Some(row),
            ResolvedCursor::None => None,
        }
    }
}

/// Map the previous selection onto the new display list.
///
/// Identity wins over position: if the focused pid is still listed the
/// cursor follows it to its new row. If the process is gone but the old
/// row index still fits, the cursor stays at that index. Otherwise the
/// cursor falls back to row 0, or to no selection on an empty list. The
/// state is updated to the resolved coordinate, so the resolved row is
/// always in bounds and the focused pid is always the one under the
/// cursor.
pub fn reconcile(display: &DisplayList, state: &mut SelectionState) -> ResolvedCursor {
    let resolved = match state.last_pid {
        Some(pid) if display.iter().any(|record| record.pid == pid) => {
            let row = display
                .iter()
                .position(|record| record.pid == pid)
                .unwrap_or(0);
            ResolvedCursor::Cell {
                row,
                column: state.last_column,
            }
        }
        _ if state.last_row < display.len() => ResolvedCursor::Cell {
            row: state.last_row,
            column: state.last_column,
        },
        _ if !display.is_empty() => ResolvedCursor::Cell {
            row: 0,
            column: state.last_column,
        },
        _ => ResolvedCursor::None,
    };

    match resolved {
        ResolvedCursor::Cell { row, column } => {
            state.last_pid = display.get(row).map(|record| record.pid);
            state.last_row = row;
            state.last_column = column;
        }
        ResolvedCursor::None => {
            state.last_pid = None;
            state.last_row = 0;
        }
    }

    resolved
}
