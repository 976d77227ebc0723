//! Structural and textual evidence about a document.
//!
//! Extraction lives outside this crate; [`EvidenceProvider`] is the seam, and
//! [`collect_evidence`] turns its three calls into the detector's input.

use crate::error::{Result, SplitError};
use crate::models::{DocumentEvidence, DocumentMetadata, OutlineEntry};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    /// Outline entries in document order; empty when the document has none.
    async fn outline(&self, document_id: &str) -> anyhow::Result<Vec<OutlineEntry>>;

    /// Extracted text of a 1-indexed page.
    async fn page_text(&self, document_id: &str, page_number: u32) -> anyhow::Result<String>;

    async fn total_pages(&self, document_id: &str) -> anyhow::Result<i64>;
}

/// Gather metadata and evidence for one document.
pub async fn collect_evidence(
    provider: &dyn EvidenceProvider,
    document_id: &str,
) -> Result<(DocumentMetadata, DocumentEvidence)> {
    let reported = provider
        .total_pages(document_id)
        .await
        .map_err(|e| SplitError::invalid_document(format!("{document_id}: {e}")))?;
    let total_pages = u32::try_from(reported)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| {
            SplitError::invalid_document(format!("{document_id} reports {reported} pages"))
        })?;

    let outline = provider
        .outline(document_id)
        .await
        .map_err(|e| SplitError::invalid_document(format!("{document_id}: outline: {e}")))?;

    let mut page_texts = Vec::with_capacity(total_pages as usize);
    for page in 1..=total_pages {
        match provider.page_text(document_id, page).await {
            Ok(text) => page_texts.push(text),
            Err(e) => {
                // One unreadable page should not sink detection.
                tracing::warn!(document_id, page, error = %e, "page text unavailable");
                page_texts.push(String::new());
            }
        }
    }

    let evidence = DocumentEvidence {
        outline,
        page_texts,
    };
    let metadata = DocumentMetadata {
        document_id: document_id.to_string(),
        total_pages,
        has_outline: evidence.outline.iter().any(|e| e.level <= 1),
        has_text: evidence.has_text(),
    };

    tracing::debug!(
        document_id,
        total_pages,
        outline_entries = evidence.outline.len(),
        "collected document evidence"
    );
    Ok((metadata, evidence))
}

/// Evidence held in memory, keyed by document id.
#[derive(Default)]
pub struct InMemoryEvidence {
    documents: RwLock<HashMap<String, (i64, DocumentEvidence)>>,
}

impl InMemoryEvidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        document_id: impl Into<String>,
        total_pages: i64,
        evidence: DocumentEvidence,
    ) -> anyhow::Result<()> {
        let mut docs = self
            .documents
            .write()
            .map_err(|_| anyhow!("evidence store poisoned"))?;
        docs.insert(document_id.into(), (total_pages, evidence));
        Ok(())
    }

    fn with_document<T>(
        &self,
        document_id: &str,
        f: impl FnOnce(i64, &DocumentEvidence) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let docs = self
            .documents
            .read()
            .map_err(|_| anyhow!("evidence store poisoned"))?;
        let (total, evidence) = docs
            .get(document_id)
            .ok_or_else(|| anyhow!("unknown document {document_id}"))?;
        f(*total, evidence)
    }
}

#[async_trait]
impl EvidenceProvider for InMemoryEvidence {
    async fn outline(&self, document_id: &str) -> anyhow::Result<Vec<OutlineEntry>> {
        self.with_document(document_id, |_, e| Ok(e.outline.clone()))
    }

    async fn page_text(&self, document_id: &str, page_number: u32) -> anyhow::Result<String> {
        self.with_document(document_id, |_, e| {
            e.page_text(page_number)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("page {page_number} has no extracted text"))
        })
    }

    async fn total_pages(&self, document_id: &str) -> anyhow::Result<i64> {
        self.with_document(document_id, |total, _| Ok(total))
    }
}
