//! Page-index/page-size state for the measurements table.

use std::fmt;

use serde::Deserialize;
use strum::Display;
use strum::EnumIter;
use strum::EnumString;

/// Sentinel accepted by [`Pagination::set_page_size`] meaning "all rows".
pub const ALL_ROWS: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    #[error("page size must be positive or -1 for all rows, got {0}")]
    InvalidPageSize(i64),
}

/// Requested page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Rows(usize),
    All,
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::Rows(n) => write!(f, "{}", n),
            PageSize::All => write!(f, "All"),
        }
    }
}

/// Page sizes offered by the table footer.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, Deserialize,
)]
pub enum PageSizeOption {
    #[default]
    #[strum(serialize = "5")]
    #[serde(rename = "5")]
    Five,
    #[strum(serialize = "10")]
    #[serde(rename = "10")]
    Ten,
    #[strum(serialize = "25")]
    #[serde(rename = "25")]
    TwentyFive,
    #[strum(serialize = "all", ascii_case_insensitive)]
    #[serde(rename = "all")]
    All,
}

impl From<PageSizeOption> for PageSize {
    fn from(option: PageSizeOption) -> Self {
        match option {
            PageSizeOption::Five => PageSize::Rows(5),
            PageSizeOption::Ten => PageSize::Rows(10),
            PageSizeOption::TwentyFive => PageSize::Rows(25),
            PageSizeOption::All => PageSize::All,
        }
    }
}

/// Visible page and effective page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    pub page_index: usize,
    pub page_size: usize,
}

/// Pagination controller.
///
/// Keeps `page_index * page_size < total_rows` whenever there are rows, and
/// `page_index == 0` otherwise. The controller lives as long as the view and
/// is reset, never replaced, when the row set changes.
#[derive(Debug, Clone)]
pub struct Pagination {
    page_index: usize,
    page_size: PageSize,
    total_rows: usize,
}

impl Pagination {
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_index: 0,
            page_size,
            total_rows: 0,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn requested_page_size(&self) -> PageSize {
        self.page_size
    }

    /// Effective rows per page; `All` spans every row (at least one).
    pub fn page_size(&self) -> usize {
        match self.page_size {
            PageSize::Rows(n) => n,
            PageSize::All => self.total_rows.max(1),
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page(&self) -> PageState {
        PageState {
            page_index: self.page_index,
            page_size: self.page_size(),
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total_rows.div_ceil(self.page_size()).max(1)
    }

    fn last_page(&self) -> usize {
        self.total_pages() - 1
    }

    /// Tell the controller how many rows it paginates over.
    pub fn set_total_rows(&mut self, total_rows: usize) {
        if total_rows != self.total_rows {
            self.total_rows = total_rows;
            self.page_index = 0;
        }
    }

    /// Jump to page `n`, clamped into the valid page range.
    pub fn set_page(&mut self, n: i64) {
        let last = self.last_page();
        self.page_index = if n < 0 {
            0
        } else {
            usize::try_from(n).map_or(last, |n| n.min(last))
        };
    }

    /// Change the page size; [`ALL_ROWS`] shows every row on one page.
    pub fn set_page_size(&mut self, size: i64) -> Result<(), PaginationError> {
        let page_size = match size {
            ALL_ROWS => PageSize::All,
            n if n > 0 => PageSize::Rows(
                usize::try_from(n).map_err(|_| PaginationError::InvalidPageSize(n))?,
            ),
            n => return Err(PaginationError::InvalidPageSize(n)),
        };
        self.page_size = page_size;
        self.page_index = 0;
        Ok(())
    }

    pub fn first(&mut self) {
        self.set_page(0);
    }

    pub fn previous(&mut self) {
        if self.page_index > 0 {
            self.page_index -= 1;
        }
    }

    pub fn next(&mut self) {
        if self.page_index < self.last_page() {
            self.page_index += 1;
        }
    }

    pub fn last(&mut self) {
        self.page_index = self.last_page();
    }

    pub fn has_previous(&self) -> bool {
        self.page_index > 0
    }

    pub fn has_next(&self) -> bool {
        self.page_index < self.last_page()
    }

    /// The rows on the current page, clipped to the slice bounds.
    pub fn visible_slice<'a, T>(&self, rows: &'a [T]) -> &'a [T] {
        let start = self.page_index.saturating_mul(self.page_size());
        if start >= rows.len() {
            return &[];
        }
        let end = start.saturating_add(self.page_size()).min(rows.len());
        &rows[start..end]
    }

    /// Footer text, e.g. `6–10 of 12`.
    pub fn range_label(&self) -> String {
        if self.total_rows == 0 {
            return "0–0 of 0".to_string();
        }
        let from = self.page_index * self.page_size() + 1;
        let to = (from - 1 + self.page_size()).min(self.total_rows);
        format!("{}–{} of {}", from, to, self.total_rows)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(PageSizeOption::default().into())
    }
}
