//! End-to-end chapter scenarios: detection, validation, repair, and split tasks.

use async_trait::async_trait;
use chaptersplit::SplitError;
use chaptersplit::config::{TaskConfig, default_chapter_patterns};
use chaptersplit::models::{
    ChapterDefinition, ChapterEdit, DocumentEvidence, OutlineEntry, SplitTask, TaskId, TaskStatus,
};
use chaptersplit::services::detector::{BoundaryDetector, analyze_document};
use chaptersplit::services::evidence::InMemoryEvidence;
use chaptersplit::services::orchestrator::SplitOrchestrator;
use chaptersplit::services::splitter::{ManifestSplitter, Splitter};
use chaptersplit::services::validator::{repair_after_edit, validate};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn ranges(chapters: &[ChapterDefinition]) -> Vec<(u32, u32)> {
    chapters.iter().map(|c| (c.start_page, c.end_page)).collect()
}

/// Writes manifests like the real binary, but fails on one start page.
struct FailOnPage {
    inner: ManifestSplitter,
    fail_on: u32,
    attempted: Mutex<Vec<u32>>,
}

#[async_trait]
impl Splitter for FailOnPage {
    async fn split_range(
        &self,
        document_id: &str,
        start_page: u32,
        end_page: u32,
        output: &Path,
    ) -> anyhow::Result<PathBuf> {
        self.attempted.lock().unwrap().push(start_page);
        if start_page == self.fail_on {
            anyhow::bail!("page extraction failed at {start_page}");
        }
        self.inner
            .split_range(document_id, start_page, end_page, output)
            .await
    }
}

async fn wait_terminal(orch: &SplitOrchestrator, id: &TaskId) -> SplitTask {
    for _ in 0..500 {
        let task = orch.get_task_status(id).unwrap();
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {id} did not finish");
}

#[tokio::test]
async fn scenario_a_outline_detection() {
    let provider = InMemoryEvidence::new();
    provider.insert(
        "book",
        40,
        DocumentEvidence {
            outline: vec![
                OutlineEntry::top_level("Intro", 1),
                OutlineEntry::top_level("Body", 11),
                OutlineEntry::top_level("Concl", 26),
            ],
            page_texts: vec![String::new(); 40],
        },
    )
    .unwrap();
    let detector = BoundaryDetector::with_patterns(&default_chapter_patterns(), 20);

    let (metadata, detection) = analyze_document(&provider, &detector, "book", 1)
        .await
        .unwrap();

    assert_eq!(metadata.total_pages, 40);
    assert!(metadata.has_outline);
    assert!(!metadata.has_text);
    assert_eq!(ranges(&detection.chapters), vec![(1, 10), (11, 25), (26, 40)]);
    assert!(validate(&detection.chapters, 40).valid);
}

#[test]
fn scenario_b_even_split_fallback() {
    let detector = BoundaryDetector::with_patterns(&default_chapter_patterns(), 5);
    let evidence = DocumentEvidence {
        outline: vec![],
        page_texts: vec!["no headings here".to_string(); 10],
    };

    let chapters = detector.detect(&evidence, 10, 1).unwrap();
    assert_eq!(ranges(&chapters), vec![(1, 5), (6, 10)]);
}

#[test]
fn scenario_c_overlap_is_reported() {
    let chapters = vec![
        ChapterDefinition::new("First", 1, 10),
        ChapterDefinition::new("Second", 8, 20),
    ];
    let report = validate(&chapters, 20);
    assert!(!report.valid);
    assert!(report.issues.iter().any(|i| i.contains("overlap")));
}

#[test]
fn scenario_d_remove_middle_chapter() {
    let chapters = vec![
        ChapterDefinition::new("A", 1, 10),
        ChapterDefinition::new("B", 11, 20),
        ChapterDefinition::new("C", 21, 30),
    ];
    let repaired = repair_after_edit(chapters, &ChapterEdit::Remove { index: 1 }, 30).unwrap();

    assert_eq!(repaired.len(), 2);
    assert_eq!(ranges(&repaired), vec![(1, 10), (11, 30)]);
    assert!(validate(&repaired, 30).valid);
}

#[tokio::test]
async fn scenario_e_failure_keeps_earlier_output() {
    let dir = tempfile::tempdir().unwrap();
    let splitter = Arc::new(FailOnPage {
        inner: ManifestSplitter,
        fail_on: 11,
        attempted: Mutex::new(Vec::new()),
    });
    let config = TaskConfig {
        output_dir: dir.path().to_path_buf(),
        max_concurrent_tasks: 2,
    };
    let orch = SplitOrchestrator::new(splitter.clone(), &config);
    let chapters = vec![
        ChapterDefinition::new("A", 1, 10),
        ChapterDefinition::new("B", 11, 20),
        ChapterDefinition::new("C", 21, 30),
    ];

    let created = orch.create_split_task("file-e", &chapters, 30).unwrap();
    let done = wait_terminal(&orch, &created.task_id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error_message.as_deref().unwrap().contains("page extraction failed"));
    assert_eq!(done.outputs.len(), 1);
    assert!(done.outputs[0].path.exists(), "chapter 1 output must survive");
    assert_eq!(*splitter.attempted.lock().unwrap(), vec![1, 11]);
    assert_ne!(done.progress, 100);
}

#[tokio::test]
async fn tasks_for_different_files_run_independently() {
    let dir = tempfile::tempdir().unwrap();
    let config = TaskConfig {
        output_dir: dir.path().to_path_buf(),
        max_concurrent_tasks: 4,
    };
    let orch = SplitOrchestrator::new(Arc::new(ManifestSplitter), &config);
    let chapters = vec![
        ChapterDefinition::new("Only", 1, 3),
    ];

    let ids: Vec<TaskId> = ["a", "b", "c"]
        .iter()
        .map(|file| orch.create_split_task(file, &chapters, 3).unwrap().task_id)
        .collect();

    for id in &ids {
        let task = wait_terminal(&orch, id).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        assert!(task.outputs[0].path.starts_with(dir.path().join(&task.file_id)));
    }
    assert_eq!(orch.queue_status().completed, 3);
}

#[test]
fn invalid_document_is_rejected_everywhere() {
    let detector = BoundaryDetector::with_patterns(&default_chapter_patterns(), 5);
    let err = detector.detect(&DocumentEvidence::default(), 0, 1).unwrap_err();
    assert!(matches!(err, SplitError::InvalidDocument { .. }));

    let err = repair_after_edit(
        vec![ChapterDefinition::new("A", 1, 1)],
        &ChapterEdit::Remove { index: 0 },
        0,
    )
    .unwrap_err();
    assert!(matches!(err, SplitError::InvalidDocument { .. }));
}
