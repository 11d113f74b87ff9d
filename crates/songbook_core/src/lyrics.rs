//! Verse splitting and paging over free-form lyric text.
//!
//! # Responsibility
//! - Split lyrics into verses at blank-line boundaries.
//! - Return a bounded page of verses.
//!
//! # Invariants
//! - A line that is empty or whitespace-only is blank.
//! - A run of one or more blank lines is a single delimiter.
//! - Leading and trailing blank runs never produce a verse.
//! - Splitting is a pure function of the input text.

use crate::model::page::PageRequest;

/// Splits `text` into verses, in document order.
///
/// Each verse borrows the original text from the start of its first line to
/// the end of its last line (line terminator excluded), so line breaks inside
/// a verse are kept as written.
///
/// ```
/// use songbook_core::lyrics::split_verses;
///
/// let verses = split_verses("one\ntwo\n\n\nthree\n");
/// assert_eq!(verses, vec!["one\ntwo", "three"]);
/// ```
pub fn split_verses(text: &str) -> Vec<&str> {
    let mut verses = Vec::new();
    let mut open: Option<(usize, usize)> = None;
    let mut line_start = 0;

    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        let content_end = line_start + content.len();

        if content.trim().is_empty() {
            if let Some((start, end)) = open.take() {
                verses.push(&text[start..end]);
            }
        } else {
            open = match open {
                Some((start, _)) => Some((start, content_end)),
                None => Some((line_start, content_end)),
            };
        }

        line_start += line.len();
    }

    if let Some((start, end)) = open {
        verses.push(&text[start..end]);
    }

    verses
}

/// Returns the verses of `text` that fall inside `page`.
///
/// The window is clipped to the verses that exist: a page past the end yields
/// an empty list, never an error.
pub fn paginate_verses(text: &str, page: &PageRequest) -> Vec<String> {
    let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let take = usize::try_from(page.limit()).unwrap_or(usize::MAX);

    split_verses(text)
        .into_iter()
        .skip(skip)
        .take(take)
        .map(str::to_owned)
        .collect()
}

/// Joins verses back into a document with a single blank line between them.
pub fn join_verses<S: AsRef<str>>(verses: &[S]) -> String {
    verses
        .iter()
        .map(|verse| verse.as_ref())
        .collect::<Vec<_>>()
        .join("\n\n")
}
