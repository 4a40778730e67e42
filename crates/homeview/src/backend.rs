//! REST backend for devices and their measurements.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Response;
use reqwest::Url;
use tracing::debug;

/// Failures talking to the backend.
///
/// `Display` is the message shown to the user in place of the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request failed with status code {status}")]
    Http { status: u16 },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid backend url '{0}'")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            BackendError::Http {
                status: status.as_u16(),
            }
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

/// Operations the dashboard needs from the backend.
///
/// This trait allows swapping the HTTP implementation for a mock in tests.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Raw measurement map for a device between two ISO-8601 instants.
    async fn fetch_measurements(
        &self,
        device_id: &str,
        start_iso: &str,
        end_iso: &str,
    ) -> Result<serde_json::Value, BackendError>;

    /// Latest reading of one sensor functionality of a device.
    async fn current_measurement(
        &self,
        device_id: &str,
        functionality: &str,
    ) -> Result<String, BackendError>;

    /// Move a blind roller to the given close percentage.
    async fn set_close_percentage(&self, device_id: &str, percent: u8)
        -> Result<(), BackendError>;

    /// Devices carrying a blind-setter actuator, with the room each is in.
    async fn list_blind_rollers(&self) -> Result<serde_json::Value, BackendError>;
}

/// Backend reached over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    root: Url,
}

impl HttpBackend {
    /// Create a backend rooted at `base_url` (e.g. `http://localhost:8080`).
    ///
    /// No request timeout is applied unless `timeout` is given.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, BackendError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let root = Url::parse(&base_url).map_err(|_| BackendError::InvalidUrl(base_url.clone()))?;
        if root.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(base_url));
        }

        Ok(Self {
            client,
            base_url,
            root,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of `segments` below the base URL, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.root.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn device_url(&self, device_id: &str) -> Result<Url, BackendError> {
        self.endpoint(&["devices", device_id])
    }

    async fn get_json(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value, BackendError> {
        let response = self.client.get(url).query(query).send().await?;
        let body = check_status(response)?.text().await?;
        debug!("Received {} byte body", body.len());

        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BackendError::Http {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    #[tracing::instrument(skip(self))]
    async fn fetch_measurements(
        &self,
        device_id: &str,
        start_iso: &str,
        end_iso: &str,
    ) -> Result<serde_json::Value, BackendError> {
        self.get_json(
            self.device_url(device_id)?,
            &[("givenStart", start_iso), ("givenEnd", end_iso)],
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn current_measurement(
        &self,
        device_id: &str,
        functionality: &str,
    ) -> Result<String, BackendError> {
        let response = self
            .client
            .get(self.device_url(device_id)?)
            .query(&[("functionality", functionality)])
            .send()
            .await?;
        let body = check_status(response)?.text().await?;

        // The reading comes back either as plain text or as a JSON string.
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(serde_json::Value::String(s)) => Ok(s),
            Ok(serde_json::Value::Number(n)) => Ok(n.to_string()),
            _ => Ok(body.trim().to_string()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn set_close_percentage(
        &self,
        device_id: &str,
        percent: u8,
    ) -> Result<(), BackendError> {
        let response = self
            .client
            .patch(self.device_url(device_id)?)
            .query(&[("closePercentage", percent)])
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_blind_rollers(&self) -> Result<serde_json::Value, BackendError> {
        let url = self.endpoint(&["actuatorfunctionality", "BlindSetter"])?;
        self.get_json(url, &[("type", "map")]).await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use tokio::sync::oneshot;

    use super::*;

    type Reply = Result<serde_json::Value, BackendError>;

    /// Mock backend for testing.
    ///
    /// Measurement replies are queued; a reply may be gated on a oneshot so a
    /// test can decide when each in-flight request completes.
    #[derive(Default)]
    pub struct MockBackend {
        replies: Mutex<VecDeque<(Option<oneshot::Receiver<()>>, Reply)>>,
        pub fetches: AtomicUsize,
        pub requests: Mutex<Vec<(String, String, String)>>,
        pub readings: Mutex<HashMap<String, Result<String, BackendError>>>,
        pub positions: Mutex<Vec<(String, u8)>>,
        pub blind_rollers: Mutex<Option<Result<serde_json::Value, BackendError>>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_reply(&self, reply: Reply) {
            self.replies.lock().unwrap().push_back((None, reply));
        }

        /// Queue a reply that is only delivered once the returned sender fires.
        pub fn push_gated_reply(&self, reply: Reply) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.replies.lock().unwrap().push_back((Some(rx), reply));
            tx
        }

        pub fn set_reading(&self, device_id: &str, reading: Result<String, BackendError>) {
            self.readings
                .lock()
                .unwrap()
                .insert(device_id.to_string(), reading);
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn fetch_measurements(
            &self,
            device_id: &str,
            start_iso: &str,
            end_iso: &str,
        ) -> Result<serde_json::Value, BackendError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push((
                device_id.to_string(),
                start_iso.to_string(),
                end_iso.to_string(),
            ));

            let (gate, reply) = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| (None, Ok(serde_json::json!({}))));

            if let Some(gate) = gate {
                gate.await.ok();
            }
            reply
        }

        async fn current_measurement(
            &self,
            device_id: &str,
            _functionality: &str,
        ) -> Result<String, BackendError> {
            self.readings
                .lock()
                .unwrap()
                .get(device_id)
                .cloned()
                .unwrap_or(Err(BackendError::Http { status: 404 }))
        }

        async fn set_close_percentage(
            &self,
            device_id: &str,
            percent: u8,
        ) -> Result<(), BackendError> {
            self.positions
                .lock()
                .unwrap()
                .push((device_id.to_string(), percent));
            Ok(())
        }

        async fn list_blind_rollers(&self) -> Result<serde_json::Value, BackendError> {
            self.blind_rollers
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(serde_json::json!({})))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:8080/", None).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8080");
        assert_eq!(
            backend.device_url("Sensor1").unwrap().as_str(),
            "http://localhost:8080/devices/Sensor1"
        );
    }

    #[test]
    fn test_device_id_is_percent_encoded() {
        let backend = HttpBackend::new("http://localhost:8080", None).unwrap();
        assert_eq!(
            backend.device_url("Kitchen#2").unwrap().as_str(),
            "http://localhost:8080/devices/Kitchen%232"
        );
        assert_eq!(
            backend.device_url("a/b?c").unwrap().as_str(),
            "http://localhost:8080/devices/a%2Fb%3Fc"
        );
    }

    #[test]
    fn test_base_path_is_kept() {
        let backend = HttpBackend::new("http://smarthome.local/api/", None).unwrap();
        assert_eq!(
            backend.device_url("Sensor1").unwrap().as_str(),
            "http://smarthome.local/api/devices/Sensor1"
        );
        assert_eq!(
            backend
                .endpoint(&["actuatorfunctionality", "BlindSetter"])
                .unwrap()
                .as_str(),
            "http://smarthome.local/api/actuatorfunctionality/BlindSetter"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpBackend::new("not a url", None),
            Err(BackendError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            BackendError::Http { status: 500 }.to_string(),
            "request failed with status code 500"
        );
        assert_eq!(
            BackendError::Network("connection refused".into()).to_string(),
            "network error: connection refused"
        );
    }
}
