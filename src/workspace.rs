use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Editing-session events the host application reports to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceEvent {
    ActiveLeafChange,
    FileOpen,
    LayoutChange,
    EditorChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Zero-based line.
    pub line: u32,
    /// Zero-based column.
    pub column: u32,
}

/// Narrow seam to the host application's workspace: everything the context
/// tracker needs to capture a snapshot, nothing more.
pub trait WorkspaceObserver: Send + Sync + Debug {
    fn active_file(&self) -> Option<String>;
    fn selection(&self) -> Option<String>;
    fn cursor_position(&self) -> Option<CursorPosition>;
    /// Open tab paths in layout iteration order; may contain duplicates.
    fn open_tabs(&self) -> Vec<String>;
}
