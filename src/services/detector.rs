use crate::config::DetectionConfig;
use crate::error::{Result, SplitError};
use crate::models::{ChapterCandidate, ChapterDefinition, DocumentEvidence, DocumentMetadata};
use crate::services::evidence::{EvidenceProvider, collect_evidence};
use regex::Regex;
use serde::Serialize;

/// Matched heading lines at or above this length are replaced by the match itself.
const MAX_HEADING_TITLE_CHARS: usize = 100;

/// Which source produced a chapter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Outline,
    Pattern,
    EvenSplit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub method: DetectionMethod,
    pub chapters: Vec<ChapterCandidate>,
}

/// Derives candidate chapters from outline, heading text, or an even split, in that order.
pub struct BoundaryDetector {
    patterns: Vec<Regex>,
    target_chapter_pages: u32,
}

impl BoundaryDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self::with_patterns(&config.chapter_patterns, config.target_chapter_pages)
    }

    /// Patterns that fail to compile are logged and skipped.
    pub fn with_patterns<S: AsRef<str>>(patterns: &[S], target_chapter_pages: u32) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| {
                let pattern: &str = p.as_ref();
                match Regex::new(pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern, error = %e, "skipping heading pattern");
                        None
                    }
                }
            })
            .collect();

        Self {
            patterns,
            target_chapter_pages: target_chapter_pages.max(1),
        }
    }

    pub fn detect(
        &self,
        evidence: &DocumentEvidence,
        total_pages: u32,
        min_pages_per_chapter: u32,
    ) -> Result<Vec<ChapterCandidate>> {
        self.detect_with_method(evidence, total_pages, min_pages_per_chapter)
            .map(|d| d.chapters)
    }

    /// Like [`detect`](Self::detect), also reporting which method won.
    pub fn detect_with_method(
        &self,
        evidence: &DocumentEvidence,
        total_pages: u32,
        min_pages_per_chapter: u32,
    ) -> Result<Detection> {
        if total_pages == 0 {
            return Err(SplitError::invalid_document("document has no pages"));
        }

        let accept = |chapters: &[ChapterDefinition]| {
            chapters
                .iter()
                .any(|c| c.page_count() >= min_pages_per_chapter)
        };

        let outline = chapters_from_outline(evidence, total_pages);
        let detection = if accept(&outline) {
            Detection {
                method: DetectionMethod::Outline,
                chapters: outline,
            }
        } else {
            let by_pattern = self.chapters_from_patterns(evidence, total_pages);
            if accept(&by_pattern) {
                Detection {
                    method: DetectionMethod::Pattern,
                    chapters: by_pattern,
                }
            } else {
                Detection {
                    method: DetectionMethod::EvenSplit,
                    chapters: even_split(total_pages, self.target_chapter_pages),
                }
            }
        };

        tracing::info!(
            method = ?detection.method,
            chapters = detection.chapters.len(),
            total_pages,
            "chapter detection finished"
        );
        Ok(detection)
    }

    fn chapters_from_patterns(
        &self,
        evidence: &DocumentEvidence,
        total_pages: u32,
    ) -> Vec<ChapterDefinition> {
        let mut boundaries: Vec<(u32, String)> = Vec::new();

        for page in 1..=total_pages {
            let Some(text) = evidence.page_text(page) else {
                continue;
            };
            if let Some(title) = self.first_heading(text) {
                boundaries.push((page, title));
            }
        }

        tracing::debug!(boundaries = boundaries.len(), "heading pattern scan");
        chapters_from_boundaries(boundaries, total_pages)
    }

    /// First heading on a page: patterns in priority order, lines in page order.
    fn first_heading(&self, text: &str) -> Option<String> {
        for regex in &self.patterns {
            for line in text.lines() {
                let line = line.trim();
                if let Some(found) = regex.find(line) {
                    let title = if line.chars().count() < MAX_HEADING_TITLE_CHARS {
                        line
                    } else {
                        found.as_str().trim()
                    };
                    return Some(title.to_string());
                }
            }
        }
        None
    }
}

/// Top-level outline entries become boundaries. Pages below 1 clamp to 1; entries past the
/// last page, or not after the previous kept entry, are dropped.
fn chapters_from_outline(evidence: &DocumentEvidence, total_pages: u32) -> Vec<ChapterDefinition> {
    let mut boundaries: Vec<(u32, String)> = Vec::new();

    for entry in evidence.outline.iter().filter(|e| e.level <= 1) {
        let page = entry.page_number.max(1);
        let Ok(page) = u32::try_from(page) else {
            continue;
        };
        if page > total_pages {
            tracing::debug!(title = %entry.title, page, "outline entry beyond last page");
            continue;
        }
        if boundaries.last().is_some_and(|(last, _)| page <= *last) {
            continue;
        }
        boundaries.push((page, entry.title.trim().to_string()));
    }

    chapters_from_boundaries(boundaries, total_pages)
}

/// Each boundary runs to the page before the next one; the last runs to `total_pages`.
/// Boundaries must be strictly increasing and within range.
fn chapters_from_boundaries(boundaries: Vec<(u32, String)>, total_pages: u32) -> Vec<ChapterDefinition> {
    let starts: Vec<u32> = boundaries.iter().map(|(page, _)| *page).collect();

    let mut chapters: Vec<ChapterDefinition> = boundaries
        .into_iter()
        .enumerate()
        .map(|(i, (start, title))| {
            let end = starts.get(i + 1).map_or(total_pages, |next| next - 1);
            let title = if title.is_empty() {
                format!("Chapter {}", i + 1)
            } else {
                title
            };
            ChapterDefinition::new(title, start, end)
        })
        .collect();

    // Front matter before the first boundary belongs to the first chapter.
    if let Some(first) = chapters.first_mut() {
        first.start_page = 1;
    }
    chapters
}

/// `k = max(1, round(total / target))` chapters whose sizes differ by at most one page,
/// the larger ones first.
pub fn even_split(total_pages: u32, target_chapter_pages: u32) -> Vec<ChapterDefinition> {
    if total_pages == 0 {
        return Vec::new();
    }
    let target = u64::from(target_chapter_pages.max(1));
    let total = u64::from(total_pages);
    // Round half up.
    let k = ((total * 2 + target) / (2 * target)).clamp(1, total) as u32;

    let base = total_pages / k;
    let remainder = total_pages % k;

    let mut chapters = Vec::with_capacity(k as usize);
    let mut start = 1;
    for i in 0..k {
        let size = base + u32::from(i < remainder);
        let end = start + size - 1;
        chapters.push(ChapterDefinition::new(format!("Chapter {}", i + 1), start, end));
        start = end + 1;
    }
    chapters
}

/// Collect evidence for a document and detect its chapters.
pub async fn analyze_document(
    provider: &dyn EvidenceProvider,
    detector: &BoundaryDetector,
    document_id: &str,
    min_pages_per_chapter: u32,
) -> Result<(DocumentMetadata, Detection)> {
    let (metadata, evidence) = collect_evidence(provider, document_id).await?;
    let detection =
        detector.detect_with_method(&evidence, metadata.total_pages, min_pages_per_chapter)?;
    Ok((metadata, detection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_chapter_patterns;
    use crate::models::OutlineEntry;

    fn detector(target: u32) -> BoundaryDetector {
        BoundaryDetector::with_patterns(&default_chapter_patterns(), target)
    }

    fn ranges(chapters: &[ChapterDefinition]) -> Vec<(u32, u32)> {
        chapters.iter().map(|c| (c.start_page, c.end_page)).collect()
    }

    fn blank_pages(n: usize) -> Vec<String> {
        vec![String::from("plain body text"); n]
    }

    #[test]
    fn outline_boundaries_partition_the_document() {
        let evidence = DocumentEvidence {
            outline: vec![
                OutlineEntry::top_level("Intro", 1),
                OutlineEntry::top_level("Body", 11),
                OutlineEntry::top_level("Concl", 26),
            ],
            page_texts: vec![],
        };

        let detection = detector(20).detect_with_method(&evidence, 40, 1).unwrap();
        assert_eq!(detection.method, DetectionMethod::Outline);
        assert_eq!(ranges(&detection.chapters), vec![(1, 10), (11, 25), (26, 40)]);
        assert_eq!(detection.chapters[1].title, "Body");
    }

    #[test]
    fn outline_clamps_and_collapses_bad_entries() {
        let evidence = DocumentEvidence {
            outline: vec![
                OutlineEntry::top_level("Cover", -3),
                OutlineEntry::top_level("Dup", 1),
                OutlineEntry::top_level("One", 5),
                OutlineEntry::top_level("Back", 4),
                OutlineEntry {
                    title: "Nested".into(),
                    page_number: 7,
                    level: 2,
                },
                OutlineEntry::top_level("Two", 9),
                OutlineEntry::top_level("Beyond", 99),
            ],
            page_texts: vec![],
        };

        let chapters = detector(20).detect(&evidence, 12, 1).unwrap();
        assert_eq!(ranges(&chapters), vec![(1, 4), (5, 8), (9, 12)]);
        let titles: Vec<_> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Cover", "One", "Two"]);
    }

    #[test]
    fn outline_starting_late_absorbs_front_matter() {
        let evidence = DocumentEvidence {
            outline: vec![
                OutlineEntry::top_level("  ", 3),
                OutlineEntry::top_level("Second", 6),
            ],
            page_texts: vec![],
        };

        let chapters = detector(20).detect(&evidence, 10, 1).unwrap();
        assert_eq!(ranges(&chapters), vec![(1, 5), (6, 10)]);
        assert_eq!(chapters[0].title, "Chapter 1");
    }

    #[test]
    fn headings_open_boundaries_once_per_page() {
        let mut pages = blank_pages(9);
        pages[0] = "Chapter 1 Beginnings\nmore".into();
        pages[3] = "Chapter 2\nChapter 3 on the same page".into();
        pages[6] = "第三章 结局".into();

        let detection = detector(20).detect_with_method(
            &DocumentEvidence {
                outline: vec![],
                page_texts: pages,
            },
            9,
            1,
        )
        .unwrap();

        assert_eq!(detection.method, DetectionMethod::Pattern);
        assert_eq!(ranges(&detection.chapters), vec![(1, 3), (4, 6), (7, 9)]);
        assert_eq!(detection.chapters[0].title, "Chapter 1 Beginnings");
        assert_eq!(detection.chapters[1].title, "Chapter 2");
        assert_eq!(detection.chapters[2].title, "第三章 结局");
    }

    #[test]
    fn long_heading_line_uses_matched_text() {
        let line = format!("Chapter 4 {}", "x".repeat(120));
        let detector = detector(20);
        assert_eq!(detector.first_heading(&line).as_deref(), Some("Chapter 4"));
    }

    #[test]
    fn falls_back_to_patterns_when_outline_too_small() {
        let mut pages = blank_pages(6);
        pages[0] = "Part 1".into();
        pages[3] = "Part 2".into();
        let evidence = DocumentEvidence {
            outline: vec![
                OutlineEntry::top_level("a", 1),
                OutlineEntry::top_level("b", 2),
                OutlineEntry::top_level("c", 3),
                OutlineEntry::top_level("d", 4),
                OutlineEntry::top_level("e", 5),
                OutlineEntry::top_level("f", 6),
            ],
            page_texts: pages,
        };

        let detection = detector(20).detect_with_method(&evidence, 6, 3).unwrap();
        assert_eq!(detection.method, DetectionMethod::Pattern);
        assert_eq!(ranges(&detection.chapters), vec![(1, 3), (4, 6)]);
    }

    #[test]
    fn even_split_when_nothing_matches() {
        let evidence = DocumentEvidence {
            outline: vec![],
            page_texts: blank_pages(10),
        };

        let detection = detector(5).detect_with_method(&evidence, 10, 1).unwrap();
        assert_eq!(detection.method, DetectionMethod::EvenSplit);
        assert_eq!(ranges(&detection.chapters), vec![(1, 5), (6, 10)]);
        assert_eq!(detection.chapters[1].title, "Chapter 2");
    }

    #[test]
    fn even_split_spreads_the_remainder_first() {
        // round(23 / 5) = 5 chapters of 5,5,5,4,4
        assert_eq!(
            ranges(&even_split(23, 5)),
            vec![(1, 5), (6, 10), (11, 15), (16, 19), (20, 23)]
        );
        // round(2 / 20) = 0, floored to one chapter
        assert_eq!(ranges(&even_split(2, 20)), vec![(1, 2)]);
        // 1.5 rounds up
        assert_eq!(even_split(30, 20).len(), 2);
    }

    #[test]
    fn zero_pages_is_invalid() {
        let err = detector(5).detect(&DocumentEvidence::default(), 0, 1).unwrap_err();
        assert!(matches!(err, SplitError::InvalidDocument { .. }));
    }

    #[test]
    fn broken_patterns_are_skipped() {
        let detector = BoundaryDetector::with_patterns(&["(unclosed", r"^Act \d+"], 5);
        assert_eq!(detector.patterns.len(), 1);
        assert_eq!(detector.first_heading("Act 3").as_deref(), Some("Act 3"));
    }
}
