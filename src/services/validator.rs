//! Chapter-set invariants and their repair after edits.
//!
//! A committed set is non-empty, titled, in range, ordered by start page, non-overlapping,
//! and covers `1..=total_pages` without gaps. [`validate`] reports every violation;
//! [`repair_after_edit`] applies one edit and restores contiguity by index.

use crate::error::{Result, SplitError};
use crate::models::{ChapterDefinition, ChapterEdit, ValidationReport};

/// Check all invariants without short-circuiting.
pub fn validate(chapters: &[ChapterDefinition], total_pages: u32) -> ValidationReport {
    let mut issues = Vec::new();

    if total_pages == 0 {
        issues.push("document has no pages".to_string());
    }
    if chapters.is_empty() {
        issues.push("chapter list is empty".to_string());
    }

    for (i, chapter) in chapters.iter().enumerate() {
        if chapter.title.trim().is_empty() {
            issues.push(format!("chapter {} has an empty title", i + 1));
        }
    }

    for (i, chapter) in chapters.iter().enumerate() {
        if chapter.start_page < 1 {
            issues.push(format!("chapter {} starts before page 1", i + 1));
        }
        if chapter.end_page > total_pages {
            issues.push(format!(
                "chapter {} ends at page {} beyond the last page {}",
                i + 1,
                chapter.end_page,
                total_pages
            ));
        }
        if chapter.start_page > chapter.end_page {
            issues.push(format!(
                "chapter {} starts at page {} after its end page {}",
                i + 1,
                chapter.start_page,
                chapter.end_page
            ));
        }
    }

    if chapters
        .windows(2)
        .any(|pair| pair[0].start_page > pair[1].start_page)
    {
        issues.push("chapters are not ordered by start page".to_string());
    }

    // Overlap and coverage are judged in start-page order, numbering by original position.
    let mut order: Vec<usize> = (0..chapters.len()).collect();
    order.sort_by_key(|&i| chapters[i].start_page);

    for pair in order.windows(2) {
        let (a, b) = (&chapters[pair[0]], &chapters[pair[1]]);
        if a.end_page >= b.start_page {
            issues.push(format!(
                "chapters {} ({}-{}) and {} ({}-{}) overlap",
                pair[0] + 1,
                a.start_page,
                a.end_page,
                pair[1] + 1,
                b.start_page,
                b.end_page
            ));
        }
    }

    if let (Some(&first), Some(&last)) = (order.first(), order.last()) {
        if chapters[first].start_page != 1 {
            issues.push(format!(
                "chapters start at page {} instead of page 1",
                chapters[first].start_page
            ));
        }
        if chapters[last].end_page != total_pages {
            issues.push(format!(
                "chapters end at page {} instead of the last page {}",
                chapters[last].end_page, total_pages
            ));
        }
    }
    for pair in order.windows(2) {
        let (a, b) = (&chapters[pair[0]], &chapters[pair[1]]);
        if a.end_page.saturating_add(1) < b.start_page {
            issues.push(format!(
                "pages {}-{} between chapters {} and {} are not covered",
                a.end_page + 1,
                b.start_page - 1,
                pair[0] + 1,
                pair[1] + 1
            ));
        }
    }

    let total_pages_covered = chapters
        .iter()
        .filter(|c| c.start_page >= 1 && c.end_page <= total_pages)
        .map(ChapterDefinition::page_count)
        .fold(0u32, u32::saturating_add);

    tracing::debug!(
        chapters = chapters.len(),
        total_pages,
        issues = issues.len(),
        "chapter validation finished"
    );

    ValidationReport {
        valid: issues.is_empty(),
        issues,
        total_pages_covered,
    }
}

/// [`validate`], turned into an error carrying every issue.
pub fn ensure_valid(chapters: &[ChapterDefinition], total_pages: u32) -> Result<()> {
    let report = validate(chapters, total_pages);
    if report.valid {
        Ok(())
    } else {
        Err(SplitError::Validation {
            issues: report.issues,
        })
    }
}

/// Apply `edit` to a committed set and restore every invariant.
///
/// Removal merges forward into the following chapter, or backward into the preceding one
/// when the last chapter is removed.
pub fn repair_after_edit(
    mut chapters: Vec<ChapterDefinition>,
    edit: &ChapterEdit,
    total_pages: u32,
) -> Result<Vec<ChapterDefinition>> {
    if total_pages == 0 {
        return Err(SplitError::invalid_document("document has no pages"));
    }
    if chapters.is_empty() {
        return Err(SplitError::irreparable("no chapters to edit"));
    }

    let n = chapters.len();
    match edit {
        ChapterEdit::Resize { index, end_page } => {
            let index = checked_index(*index, n)?;
            let start = chapters[index].start_page;
            if *end_page < start {
                return Err(SplitError::validation(format!(
                    "chapter {} cannot end at page {end_page} before its start page {start}",
                    index + 1
                )));
            }
            // Every following chapter keeps at least one page.
            let followers = (n - 1 - index) as u32;
            let latest_end = total_pages.saturating_sub(followers);
            if *end_page > latest_end {
                return Err(SplitError::irreparable(format!(
                    "chapter {} cannot end at page {end_page}: {followers} later chapter(s) need pages up to {total_pages}",
                    index + 1
                )));
            }
            chapters[index].end_page = *end_page;
            cascade_forward(&mut chapters, index, total_pages)?;
        }
        ChapterEdit::Insert { title, start_page } => {
            if title.trim().is_empty() {
                return Err(SplitError::validation("inserted chapter has an empty title"));
            }
            let host = chapters
                .iter()
                .position(|c| c.start_page < *start_page && *start_page <= c.end_page)
                .ok_or_else(|| {
                    SplitError::validation(format!(
                        "page {start_page} is not strictly inside any chapter"
                    ))
                })?;
            let new_chapter =
                ChapterDefinition::new(title.clone(), *start_page, chapters[host].end_page);
            chapters[host].end_page = start_page - 1;
            chapters.insert(host + 1, new_chapter);
        }
        ChapterEdit::Remove { index } => {
            let index = checked_index(*index, n)?;
            if n == 1 {
                return Err(SplitError::irreparable("cannot remove the only chapter"));
            }
            let removed = chapters.remove(index);
            if index < chapters.len() {
                chapters[index].start_page = removed.start_page;
            } else {
                chapters[index - 1].end_page = removed.end_page;
            }
        }
    }

    let report = validate(&chapters, total_pages);
    if !report.valid {
        return Err(SplitError::irreparable(report.issues.join("; ")));
    }

    tracing::debug!(?edit, chapters = chapters.len(), "chapter set repaired");
    Ok(chapters)
}

/// Make every chapter after `from` start right after its predecessor, pushing ends forward
/// by the minimum needed, and pin the last chapter to `total_pages`.
fn cascade_forward(chapters: &mut [ChapterDefinition], from: usize, total_pages: u32) -> Result<()> {
    for j in from + 1..chapters.len() {
        let start = chapters[j - 1].end_page.checked_add(1).ok_or_else(|| {
            SplitError::irreparable(format!(
                "chapter {} ends past the last representable page",
                j
            ))
        })?;
        let chapter = &mut chapters[j];
        chapter.start_page = start;
        if chapter.end_page < start {
            chapter.end_page = start;
        }
    }
    if let Some(last) = chapters.last_mut() {
        last.end_page = total_pages;
    }
    Ok(())
}

fn checked_index(index: usize, len: usize) -> Result<usize> {
    if index < len {
        Ok(index)
    } else {
        Err(SplitError::validation(format!(
            "chapter index {index} is out of range for {len} chapter(s)"
        )))
    }
}
