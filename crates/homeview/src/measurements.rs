//! Device measurement query and its paginated view.
//!
//! A [`MeasurementsView`] fetches the measurements of one device over a
//! [`TimeRange`], reshapes the backend's map of sensor functionality to
//! readings into [`DisplayRow`]s and exposes them page by page.
//!
//! Every invocation takes a new generation number. A fetch that completes
//! after a newer invocation has begun is discarded, so the view always shows
//! the result for the most recently supplied inputs regardless of the order
//! in which responses arrive.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde::Deserialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::backend::Backend;
use crate::backend::BackendError;
use crate::pagination::PageSize;
use crate::pagination::PageState;
use crate::pagination::Pagination;
use crate::pagination::PaginationError;
use crate::range::TimeRange;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("device id must not be empty")]
    EmptyDeviceId,
}

/// Identifier of a device on the backend. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Result<Self, InputError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(InputError::EmptyDeviceId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One table row: a sensor functionality and its formatted readings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub sensor_functionality: String,
    pub values: Vec<String>,
}

/// Order of rows in the reshaped table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowOrder {
    /// The order in which the backend enumerated the keys.
    #[default]
    Backend,
    /// Sorted by sensor functionality name.
    Lexicographic,
}

/// Format one reading as `"<value> <unit>"`.
///
/// Readings arrive either split (`{"value": "21", "unit": "C"}`) or already
/// joined (`{"valueWithUnit": "21 C"}`).
fn format_reading(functionality: &str, entry: &serde_json::Value) -> Result<String, BackendError> {
    let invalid = || {
        BackendError::Decode(format!(
            "reading for '{}' is not a {{value, unit}} object: {}",
            functionality, entry
        ))
    };

    let obj = entry.as_object().ok_or_else(invalid)?;

    if let Some(joined) = obj.get("valueWithUnit").and_then(|v| v.as_str()) {
        return Ok(joined.to_string());
    }

    let value = match obj.get("value") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => return Err(invalid()),
    };
    let unit = obj.get("unit").and_then(|v| v.as_str()).ok_or_else(invalid)?;

    Ok(format!("{} {}", value, unit))
}

/// Reshape a measurement response into display rows.
///
/// One row per key, including keys without readings.
pub fn reshape(body: &serde_json::Value, order: RowOrder) -> Result<Vec<DisplayRow>, BackendError> {
    let map = body.as_object().ok_or_else(|| {
        BackendError::Decode(format!(
            "expected an object of sensor functionalities, found {}",
            json_kind(body)
        ))
    })?;

    let mut rows = map
        .iter()
        .map(|(functionality, readings)| {
            let readings = readings.as_array().ok_or_else(|| {
                BackendError::Decode(format!(
                    "readings for '{}' must be an array, found {}",
                    functionality,
                    json_kind(readings)
                ))
            })?;

            let values = readings
                .iter()
                .map(|entry| format_reading(functionality, entry))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(DisplayRow {
                sensor_functionality: functionality.clone(),
                values,
            })
        })
        .collect::<Result<Vec<_>, BackendError>>()?;

    if order == RowOrder::Lexicographic {
        rows.sort_by(|a, b| a.sensor_functionality.cmp(&b.sensor_functionality));
    }

    Ok(rows)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Observable status of the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Loading,
    Ready(Vec<DisplayRow>),
    Error(String),
}

/// Handle for one in-flight invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    pub device: DeviceId,
    pub range: TimeRange,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Point-in-time copy of the view's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status: Status,
    pub rows: Vec<DisplayRow>,
    pub error_message: Option<String>,
    pub page: PageState,
    pub total_pages: usize,
    pub device: DeviceId,
    pub range: TimeRange,
}

struct ViewState {
    generation: u64,
    device: DeviceId,
    range: TimeRange,
    phase: Phase,
    pagination: Pagination,
}

/// Measurements of one device over a time range, shown page by page.
///
/// State changes only through the operations below; the lock is never held
/// across the network call.
pub struct MeasurementsView<B: Backend> {
    backend: Arc<B>,
    row_order: RowOrder,
    state: Mutex<ViewState>,
}

impl<B: Backend> MeasurementsView<B> {
    /// Create a view in the `loading` state. Nothing is fetched until
    /// [`invoke`](Self::invoke) or [`set_inputs`](Self::set_inputs) is called.
    pub fn new(backend: Arc<B>, device: DeviceId, range: TimeRange, page_size: PageSize) -> Self {
        Self {
            backend,
            row_order: RowOrder::default(),
            state: Mutex::new(ViewState {
                generation: 0,
                device,
                range,
                phase: Phase::Loading,
                pagination: Pagination::new(page_size),
            }),
        }
    }

    pub fn with_row_order(mut self, order: RowOrder) -> Self {
        self.row_order = order;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        // State is replaced wholesale by each transition, so a poisoned lock
        // still holds a consistent value.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a new invocation: enter `loading`, drop stale rows and errors,
    /// return to the first page and supersede every earlier ticket.
    pub fn begin(&self, device: DeviceId, range: TimeRange) -> Ticket {
        let mut state = self.lock();
        state.generation += 1;
        state.device = device.clone();
        state.range = range;
        state.phase = Phase::Loading;
        state.pagination.set_total_rows(0);

        debug!(
            generation = state.generation,
            "Fetching measurements for {} from {} to {}",
            device,
            range.start_iso(),
            range.end_iso()
        );

        Ticket {
            generation: state.generation,
            device,
            range,
        }
    }

    /// Issue the single backend request for a ticket and reshape its reply.
    pub async fn fetch(&self, ticket: &Ticket) -> Result<Vec<DisplayRow>, BackendError> {
        let body = self
            .backend
            .fetch_measurements(
                ticket.device.as_str(),
                &ticket.range.start_iso(),
                &ticket.range.end_iso(),
            )
            .await?;
        reshape(&body, self.row_order)
    }

    /// Apply the outcome of a ticket's fetch.
    ///
    /// Returns `false` and changes nothing when the ticket has been
    /// superseded by a later [`begin`](Self::begin).
    pub fn complete(&self, ticket: &Ticket, outcome: Result<Vec<DisplayRow>, BackendError>) -> bool {
        let mut state = self.lock();
        if ticket.generation != state.generation {
            debug!(
                generation = ticket.generation,
                current = state.generation,
                "Discarding superseded measurements for {}",
                ticket.device
            );
            return false;
        }

        match outcome {
            Ok(rows) => {
                info!(
                    "Loaded {} sensor functionalities for {}",
                    rows.len(),
                    ticket.device
                );
                state.pagination.set_total_rows(rows.len());
                state.phase = Phase::Ready(rows);
            }
            Err(e) => {
                warn!("Failed to fetch measurements for {}: {}", ticket.device, e);
                state.pagination.set_total_rows(0);
                state.phase = Phase::Error(e.to_string());
            }
        }
        true
    }

    /// Fetch measurements for `(device, range)` and apply the result if no
    /// newer invocation started meanwhile. Failures are not retried.
    pub async fn invoke(&self, device: DeviceId, range: TimeRange) -> bool {
        let ticket = self.begin(device, range);
        let outcome = self.fetch(&ticket).await;
        self.complete(&ticket, outcome)
    }

    /// Invoke only if `(device, range)` differs from the current inputs or
    /// nothing has been fetched yet. Returns whether a fetch was issued.
    pub async fn set_inputs(&self, device: DeviceId, range: TimeRange) -> bool {
        let unchanged = {
            let state = self.lock();
            state.generation > 0 && state.device == device && state.range == range
        };
        if unchanged {
            return false;
        }
        self.invoke(device, range).await;
        true
    }

    /// Re-run the query for the current inputs.
    pub async fn refresh(&self) -> bool {
        let (device, range) = {
            let state = self.lock();
            (state.device.clone(), state.range)
        };
        self.invoke(device, range).await
    }

    pub fn status(&self) -> Status {
        match self.lock().phase {
            Phase::Loading => Status::Loading,
            Phase::Ready(_) => Status::Ready,
            Phase::Error(_) => Status::Error,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        let (status, rows, error_message) = match &state.phase {
            Phase::Loading => (Status::Loading, Vec::new(), None),
            Phase::Ready(rows) => (Status::Ready, rows.clone(), None),
            Phase::Error(message) => (Status::Error, Vec::new(), Some(message.clone())),
        };
        Snapshot {
            status,
            rows,
            error_message,
            page: state.pagination.page(),
            total_pages: state.pagination.total_pages(),
            device: state.device.clone(),
            range: state.range,
        }
    }

    /// Rows on the current page; empty unless `ready`.
    pub fn visible_rows(&self) -> Vec<DisplayRow> {
        let state = self.lock();
        match &state.phase {
            Phase::Ready(rows) => state.pagination.visible_slice(rows).to_vec(),
            _ => Vec::new(),
        }
    }

    /// Copy of the pagination controller, for rendering.
    pub fn pagination(&self) -> Pagination {
        self.lock().pagination.clone()
    }

    pub fn set_page(&self, n: i64) {
        self.lock().pagination.set_page(n);
    }

    pub fn set_page_size(&self, size: i64) -> Result<(), PaginationError> {
        self.lock().pagination.set_page_size(size)
    }

    pub fn first_page(&self) {
        self.lock().pagination.first();
    }

    pub fn previous_page(&self) {
        self.lock().pagination.previous();
    }

    pub fn next_page(&self) {
        self.lock().pagination.next();
    }

    pub fn last_page(&self) {
        self.lock().pagination.last();
    }
}
