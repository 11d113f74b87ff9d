//! Pagination request type shared by song listing and lyric paging.

use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Rejected pagination input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageError {
    /// Page index below 1.
    InvalidPage(i64),
    /// Page size below 1.
    InvalidPageSize(i64),
}

impl Display for PageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPage(value) => write!(f, "page_id must be >= 1, got {value}"),
            Self::InvalidPageSize(value) => write!(f, "page_size must be >= 1, got {value}"),
        }
    }
}

impl Error for PageError {}

/// A window over an ordered collection.
///
/// Pages are 1-based. Construction guarantees both fields are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Builds a request, rejecting a page index or size below 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use songbook_core::PageRequest;
    ///
    /// let request = PageRequest::new(3, 20).unwrap();
    /// assert_eq!(request.offset(), 40);
    /// assert!(PageRequest::new(0, 20).is_err());
    /// ```
    pub fn new(page: i64, page_size: i64) -> Result<Self, PageError> {
        let page = u32::try_from(page)
            .ok()
            .filter(|value| *value >= 1)
            .ok_or(PageError::InvalidPage(page))?;
        let page_size = u32::try_from(page_size)
            .ok()
            .filter(|value| *value >= 1)
            .ok_or(PageError::InvalidPageSize(page_size))?;
        Ok(Self { page, page_size })
    }

    /// 1-based page index.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Maximum number of items on the page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of items skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Same as `page_size`, for SQL `LIMIT`.
    pub fn limit(&self) -> u32 {
        self.page_size
    }
}
