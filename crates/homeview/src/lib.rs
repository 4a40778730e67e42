pub mod backend;
pub mod blind_roller;
pub mod config;
pub mod measurements;
pub mod pagination;
pub mod range;
pub mod render;

pub use backend::Backend;
pub use backend::BackendError;
pub use backend::HttpBackend;
pub use blind_roller::BlindRoller;
pub use blind_roller::BlindRollerEntry;
pub use blind_roller::BlindRollerError;
pub use blind_roller::list_blind_rollers;
pub use config::Config;
pub use config::Diagnostic;
pub use config::LogLevel;
pub use config::format_diagnostics;
pub use measurements::DeviceId;
pub use measurements::DisplayRow;
pub use measurements::MeasurementsView;
pub use measurements::RowOrder;
pub use measurements::Snapshot;
pub use measurements::Status;
pub use pagination::PageSize;
pub use pagination::PageSizeOption;
pub use pagination::PageState;
pub use pagination::Pagination;
pub use range::TimeRange;
