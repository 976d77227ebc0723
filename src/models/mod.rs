use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Facts about a source document, computed once from its evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document_id: String,
    pub total_pages: u32,
    pub has_outline: bool,
    pub has_text: bool,
}

/// One bookmark of the document outline, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub title: String,
    /// May be zero or negative in malformed outlines; detection clamps it.
    pub page_number: i64,
    /// Nesting depth, 1 for top-level entries.
    #[serde(default = "default_outline_level")]
    pub level: u32,
}

fn default_outline_level() -> u32 {
    1
}

impl OutlineEntry {
    pub fn top_level(title: impl Into<String>, page_number: i64) -> Self {
        Self {
            title: title.into(),
            page_number,
            level: 1,
        }
    }
}

/// Structural and textual evidence the detector works from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEvidence {
    #[serde(default)]
    pub outline: Vec<OutlineEntry>,
    /// Extracted text per page; index 0 holds page 1.
    #[serde(default)]
    pub page_texts: Vec<String>,
}

impl DocumentEvidence {
    /// Text of a 1-indexed page, if it was extracted.
    pub fn page_text(&self, page: u32) -> Option<&str> {
        let idx = usize::try_from(page).ok()?.checked_sub(1)?;
        self.page_texts.get(idx).map(String::as_str)
    }

    pub fn has_text(&self) -> bool {
        self.page_texts.iter().any(|t| !t.trim().is_empty())
    }
}

/// A titled, inclusive, 1-indexed page range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterDefinition {
    pub title: String,
    pub start_page: u32,
    pub end_page: u32,
}

/// Detector output is the same shape as a committed chapter; only validation differs.
pub type ChapterCandidate = ChapterDefinition;

impl ChapterDefinition {
    pub fn new(title: impl Into<String>, start_page: u32, end_page: u32) -> Self {
        Self {
            title: title.into(),
            start_page,
            end_page,
        }
    }

    /// Number of pages in the range, zero when the range is inverted.
    pub fn page_count(&self) -> u32 {
        if self.end_page >= self.start_page {
            (self.end_page - self.start_page).saturating_add(1)
        } else {
            0
        }
    }

    pub fn contains(&self, page: u32) -> bool {
        self.start_page <= page && page <= self.end_page
    }
}

/// Result of checking a chapter list against the chapter-set invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
    /// Pages covered by in-range chapters, counted with multiplicity.
    pub total_pages_covered: u32,
}

/// A boundary edit applied to a committed chapter set by the repairer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChapterEdit {
    /// Move the end page of the chapter at `index`.
    Resize { index: usize, end_page: u32 },
    /// Split the chapter containing `start_page`; the new chapter starts there.
    Insert { title: String, start_page: u32 },
    /// Drop the chapter at `index`, handing its pages to a neighbour.
    Remove { index: usize },
}

/// Unique identifier of a split task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generates a new random UUID v4-based TaskId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a split task. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A file produced by the splitter for one chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterOutput {
    /// Position of the chapter in the task's chapter set, 0-based.
    pub chapter_index: usize,
    pub title: String,
    pub path: PathBuf,
}

/// One asynchronous split job over an immutable chapter snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitTask {
    pub task_id: TaskId,
    pub file_id: String,
    pub chapters: Vec<ChapterDefinition>,
    pub status: TaskStatus,
    /// 0..=100, never decreases.
    pub progress: u8,
    /// Present iff `status == Failed`.
    pub error_message: Option<String>,
    /// Files produced so far, in chapter order. Kept on failure.
    pub outputs: Vec<ChapterOutput>,
    pub created_at: DateTime<Utc>,
    /// Present iff the status is terminal.
    pub completed_at: Option<DateTime<Utc>>,
}

impl SplitTask {
    pub fn pending(file_id: impl Into<String>, chapters: Vec<ChapterDefinition>) -> Self {
        Self {
            task_id: TaskId::new(),
            file_id: file_id.into(),
            chapters,
            status: TaskStatus::Pending,
            progress: 0,
            error_message: None,
            outputs: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
