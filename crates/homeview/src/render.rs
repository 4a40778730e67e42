//! Plain-text rendering of the measurements table.

use std::fmt;

use crate::measurements::DisplayRow;
use crate::measurements::Snapshot;
use crate::measurements::Status;
use crate::pagination::Pagination;

const FUNCTIONALITY_HEADER: &str = "Sensor Functionality";
const MEASUREMENT_HEADER: &str = "Measurement";

/// Title line shown above the table.
pub fn title(snapshot: &Snapshot) -> String {
    format!(
        "{} Measurements from {}",
        snapshot.device,
        snapshot.range.display_label()
    )
}

/// Render whatever the view currently shows: the table when ready, otherwise
/// the loading or error line in its place.
pub fn render_snapshot(snapshot: &Snapshot, pagination: &Pagination) -> String {
    match snapshot.status {
        Status::Loading => "Loading...\n".to_string(),
        Status::Error => format!(
            "Error: {}\n",
            snapshot.error_message.as_deref().unwrap_or("unknown error")
        ),
        Status::Ready => render_table(
            &title(snapshot),
            pagination.visible_slice(&snapshot.rows),
            pagination,
        ),
    }
}

/// Render one page of rows, each value on its own line, followed by the
/// pagination footer.
pub fn render_table(title: &str, rows: &[DisplayRow], pagination: &Pagination) -> String {
    Table {
        title,
        rows,
        pagination,
    }
    .to_string()
}

/// One page of the measurements table.
pub struct Table<'a> {
    pub title: &'a str,
    pub rows: &'a [DisplayRow],
    pub pagination: &'a Pagination,
}

impl Table<'_> {
    fn name_width(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.sensor_functionality.chars().count())
            .fold(FUNCTIONALITY_HEADER.len(), usize::max)
    }

    fn value_width(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| r.values.iter().map(|v| v.chars().count()))
            .fold(MEASUREMENT_HEADER.len(), usize::max)
    }
}

impl fmt::Display for Table<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.name_width();
        let separator = format!("{}-+-{}", "-".repeat(width), "-".repeat(self.value_width()));

        writeln!(f, "{}", self.title)?;
        writeln!(f)?;
        writeln!(f, "{:<width$} | {}", FUNCTIONALITY_HEADER, MEASUREMENT_HEADER)?;
        writeln!(f, "{}", separator)?;

        for row in self.rows {
            if row.values.is_empty() {
                writeln!(f, "{:<width$} |", row.sensor_functionality)?;
                continue;
            }
            for (idx, value) in row.values.iter().enumerate() {
                let name = if idx == 0 {
                    row.sensor_functionality.as_str()
                } else {
                    ""
                };
                writeln!(f, "{:<width$} | {}", name, value)?;
            }
        }

        writeln!(f, "{}", separator)?;
        writeln!(
            f,
            "Rows per page: {}  {}  Page {}/{}",
            self.pagination.requested_page_size(),
            self.pagination.range_label(),
            self.pagination.page_index() + 1,
            self.pagination.total_pages()
        )
    }
}
