use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workspace::{CursorPosition, WorkspaceObserver};

pub const CONTEXT_HEADER: &str = "[OBSIDIAN_CONTEXT v1]";

const SELECTION_LIMIT: usize = 500;
const TAB_LIMIT: usize = 10;

/// Value snapshot of the host-side editing context. Recomputed on every
/// tracked event; the previous snapshot is simply replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub active_file: Option<String>,
    pub selection: Option<String>,
    pub open_tabs: Vec<String>,
    pub cursor_position: Option<CursorPosition>,
    pub timestamp: DateTime<Utc>,
}

/// Field-wise equality for change detection; the timestamp is deliberately
/// excluded.
impl PartialEq for ContextSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.active_file == other.active_file
            && self.selection == other.selection
            && self.open_tabs == other.open_tabs
            && self.cursor_position == other.cursor_position
    }
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl ContextSnapshot {
    pub fn empty() -> Self {
        Self {
            active_file: None,
            selection: None,
            open_tabs: Vec::new(),
            cursor_position: None,
            timestamp: Utc::now(),
        }
    }

    /// Capture the current editing context from the host workspace. Open tabs
    /// keep their iteration order; duplicates are removed by a seen-set.
    pub fn capture(observer: &dyn WorkspaceObserver) -> Self {
        let mut seen = HashSet::new();
        let mut open_tabs = Vec::new();
        for tab in observer.open_tabs() {
            if seen.insert(tab.clone()) {
                open_tabs.push(tab);
            }
        }
        Self {
            active_file: observer.active_file(),
            selection: observer.selection().filter(|s| !s.is_empty()),
            open_tabs,
            cursor_position: observer.cursor_position(),
            timestamp: Utc::now(),
        }
    }

    /// Format the snapshot as the header-tagged plain-text block the server
    /// receives: active file, 1-based cursor, fenced selection truncated to
    /// 500 characters, and up to 10 open tabs with a summary line.
    pub fn format_context(&self) -> String {
        let mut lines = vec![CONTEXT_HEADER.to_string()];

        if let Some(active_file) = &self.active_file {
            lines.push(format!("Active file: {active_file}"));
        }

        if let Some(cursor) = &self.cursor_position {
            lines.push(format!(
                "Cursor: line {}, col {}",
                cursor.line + 1,
                cursor.column + 1
            ));
        }

        if let Some(selection) = &self.selection {
            let truncated = if selection.chars().count() > SELECTION_LIMIT {
                let head: String = selection.chars().take(SELECTION_LIMIT).collect();
                format!("{head}... (truncated)")
            } else {
                selection.clone()
            };
            lines.push(format!("Selection:\n```\n{truncated}\n```"));
        }

        if !self.open_tabs.is_empty() {
            lines.push(format!("Open tabs ({}):", self.open_tabs.len()));
            for tab in self.open_tabs.iter().take(TAB_LIMIT) {
                lines.push(format!("  - {tab}"));
            }
            if self.open_tabs.len() > TAB_LIMIT {
                lines.push(format!("  ... and {} more", self.open_tabs.len() - TAB_LIMIT));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn sample() -> ContextSnapshot {
        ContextSnapshot {
            active_file: Some("notes/today.md".to_string()),
            selection: Some("selected text".to_string()),
            open_tabs: vec!["notes/today.md".to_string(), "ideas.md".to_string()],
            cursor_position: Some(CursorPosition { line: 4, column: 9 }),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn equality_is_reflexive_and_ignores_timestamp() {
        let a = sample();
        let mut b = a.clone();
        b.timestamp += TimeDelta::seconds(60);
        assert_eq!(a, a);
        assert_eq!(a, b);
    }

    #[test]
    fn any_tracked_field_change_breaks_equality() {
        let base = sample();

        let mut changed = base.clone();
        changed.active_file = Some("other.md".to_string());
        assert_ne!(base, changed);

        let mut changed = base.clone();
        changed.selection = None;
        assert_ne!(base, changed);

        let mut changed = base.clone();
        changed.open_tabs.push("third.md".to_string());
        assert_ne!(base, changed);

        let mut changed = base.clone();
        changed.cursor_position = Some(CursorPosition { line: 4, column: 10 });
        assert_ne!(base, changed);
    }

    #[test]
    fn format_includes_header_and_one_based_cursor() {
        let text = sample().format_context();
        assert!(text.starts_with(CONTEXT_HEADER));
        assert!(text.contains("Active file: notes/today.md"));
        assert!(text.contains("Cursor: line 5, col 10"));
        assert!(text.contains("Open tabs (2):"));
    }

    #[test]
    fn long_selection_is_truncated_with_marker() {
        let mut snapshot = sample();
        snapshot.selection = Some("x".repeat(700));
        let text = snapshot.format_context();
        assert!(text.contains("... (truncated)"));
        assert!(!text.contains(&"x".repeat(501)));
    }

    #[test]
    fn more_than_ten_tabs_get_a_summary_line() {
        let mut snapshot = sample();
        snapshot.open_tabs = (0..13).map(|i| format!("note{i}.md")).collect();
        let text = snapshot.format_context();
        assert!(text.contains("Open tabs (13):"));
        assert!(text.contains("  - note9.md"));
        assert!(!text.contains("  - note10.md"));
        assert!(text.contains("  ... and 3 more"));
    }
}
