use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Characters replaced with `_` in output file names.
const UNSAFE_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_FILENAME_CHARS: usize = 50;

/// Produces one output file for a page range of a document.
///
/// Called once per chapter, in page order. Errors are surfaced verbatim in the task.
#[async_trait]
pub trait Splitter: Send + Sync {
    /// Write pages `start_page..=end_page` of `document_id` at `output`, returning the
    /// path of the file actually written.
    async fn split_range(
        &self,
        document_id: &str,
        start_page: u32,
        end_page: u32,
        output: &Path,
    ) -> Result<PathBuf>;
}

/// Where the output for the `index`-th chapter (0-based) of a file goes.
pub fn chapter_output_path(output_dir: &Path, file_id: &str, index: usize, title: &str) -> PathBuf {
    output_dir
        .join(file_id)
        .join("chapters")
        .join(format!("{:02}_{}.pdf", index + 1, sanitize_filename(title)))
}

pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .take(MAX_FILENAME_CHARS)
        .collect();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        "chapter".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Serialize)]
struct RangeManifest<'a> {
    document_id: &'a str,
    start_page: u32,
    end_page: u32,
    page_count: u32,
}

/// Records each requested range as a JSON manifest next to the requested location.
///
/// Stands in for a page-extraction engine; the manifest names exactly which pages a real
/// engine would copy.
#[derive(Debug, Default, Clone)]
pub struct ManifestSplitter;

#[async_trait]
impl Splitter for ManifestSplitter {
    async fn split_range(
        &self,
        document_id: &str,
        start_page: u32,
        end_page: u32,
        output: &Path,
    ) -> Result<PathBuf> {
        anyhow::ensure!(
            1 <= start_page && start_page <= end_page,
            "invalid page range {start_page}-{end_page}"
        );

        let path = output.with_extension("json");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let manifest = RangeManifest {
            document_id,
            start_page,
            end_page,
            page_count: end_page - start_page + 1,
        };
        let body = serde_json::to_vec_pretty(&manifest)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        tracing::debug!(document_id, start_page, end_page, path = %path.display(), "range manifest written");
        Ok(path)
    }
}
