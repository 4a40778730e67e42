//! Blind-roller position control.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::backend::Backend;
use crate::backend::BackendError;
use crate::measurements::DeviceId;

/// Sensor functionality that reports a blind roller's position.
pub const POSITION_FUNCTIONALITY: &str = "Scale";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlindRollerError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("invalid current state value '{0}'")]
    InvalidState(String),

    #[error("position must be between 0 and 100, got {0}")]
    OutOfRange(i64),
}

/// A device with a blind-setter actuator and the room it is in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindRollerEntry {
    pub device_name: String,
    pub room_name: String,
}

#[derive(Deserialize)]
struct BlindRollerList {
    #[serde(rename = "_embedded")]
    embedded: Option<EmbeddedBlindRollers>,
}

#[derive(Deserialize)]
struct EmbeddedBlindRollers {
    #[serde(rename = "blindRollerDTOList", default)]
    rollers: Vec<BlindRollerEntry>,
}

/// Every blind roller the backend knows about.
///
/// An empty collection comes back without an `_embedded` member, which is
/// read as no rollers.
pub async fn list_blind_rollers<B: Backend + ?Sized>(
    backend: &B,
) -> Result<Vec<BlindRollerEntry>, BackendError> {
    let body = backend.list_blind_rollers().await?;
    let list: BlindRollerList =
        serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(list.embedded.map(|e| e.rollers).unwrap_or_default())
}

/// One blind roller, addressed by device.
pub struct BlindRoller<B: Backend> {
    backend: Arc<B>,
    device: DeviceId,
}

impl<B: Backend> BlindRoller<B> {
    pub fn new(backend: Arc<B>, device: DeviceId) -> Self {
        Self { backend, device }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Current close percentage as reported by the device.
    pub async fn current_position(&self) -> Result<u8, BlindRollerError> {
        let reading = self
            .backend
            .current_measurement(self.device.as_str(), POSITION_FUNCTIONALITY)
            .await?;
        parse_position(&reading)
    }

    /// Move the blind roller to `percent` (0 is closed, 100 is open).
    pub async fn set_position(&self, percent: i64) -> Result<u8, BlindRollerError> {
        let percent = u8::try_from(percent)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or(BlindRollerError::OutOfRange(percent))?;

        self.backend
            .set_close_percentage(self.device.as_str(), percent)
            .await?;
        info!("Set {} to {}%", self.device, percent);
        Ok(percent)
    }
}

/// Parse the leading integer of a reading such as `"70"` or `"70 %"`.
fn parse_position(reading: &str) -> Result<u8, BlindRollerError> {
    let trimmed = reading.trim();
    let digits: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    digits
        .parse::<u8>()
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| BlindRollerError::InvalidState(trimmed.to_string()))
}
