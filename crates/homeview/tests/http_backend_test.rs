use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use homeview::Backend;
use homeview::BackendError;
use homeview::BlindRoller;
use homeview::BlindRollerEntry;
use homeview::BlindRollerError;
use homeview::DeviceId;
use homeview::DisplayRow;
use homeview::HttpBackend;
use homeview::MeasurementsView;
use homeview::PageSize;
use homeview::Status;
use homeview::TimeRange;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Requests seen by the mock backend, as (method, device, query)
type Seen = Arc<Mutex<Vec<(String, String, HashMap<String, String>)>>>;

async fn get_device(
    State(seen): State<Seen>,
    Path(device): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    seen.lock()
        .unwrap()
        .push(("GET".to_string(), device.clone(), query.clone()));

    if let Some(functionality) = query.get("functionality") {
        return match (device.as_str(), functionality.as_str()) {
            ("Blind1", "Scale") => "70".into_response(),
            ("Blind2", "Scale") => "\"half\"".into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        };
    }

    match device.as_str() {
        "Sensor1" | "Kitchen#2" => axum::Json(json!({
            "Temperature": [{"value": "21", "unit": "C"}],
            "Humidity": [{"value": "40", "unit": "%"}]
        }))
        .into_response(),
        "Legacy" => axum::Json(json!({
            "Temperature": [{"valueWithUnit": "1.0 Unit1"}, {"valueWithUnit": "2.0 Unit2"}]
        }))
        .into_response(),
        "ArrayBody" => axum::Json(json!([{"value": "21", "unit": "C"}])).into_response(),
        "NotJson" => "<html>oops</html>".into_response(),
        "Broken" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "Slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            axum::Json(json!({})).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn patch_device(
    State(seen): State<Seen>,
    Path(device): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    seen.lock()
        .unwrap()
        .push(("PATCH".to_string(), device, query));
    StatusCode::OK
}

async fn get_actuator_functionality(
    Path(functionality): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if functionality != "BlindSetter" || query.get("type").map(String::as_str) != Some("map") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    axum::Json(json!({
        "_embedded": {
            "blindRollerDTOList": [
                {"deviceName": "Blind1", "roomName": "Bedroom"},
                {"deviceName": "Blind2", "roomName": "Office"}
            ]
        }
    }))
    .into_response()
}

async fn spawn_backend() -> (String, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/devices/:id", get(get_device).patch(patch_device))
        .route("/actuatorfunctionality/:id", get(get_actuator_functionality))
        .layer(TraceLayer::new_for_http())
        .with_state(seen.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), seen)
}

fn spring() -> TimeRange {
    TimeRange::parse("2024-03-01", "2024-06-30").unwrap()
}

async fn run_query(base_url: &str, device: &str) -> homeview::Snapshot {
    let backend = Arc::new(HttpBackend::new(base_url, None).unwrap());
    let device = DeviceId::new(device).unwrap();
    let view = MeasurementsView::new(backend, device.clone(), spring(), PageSize::Rows(5));
    view.invoke(device, spring()).await;
    view.snapshot()
}

#[tokio::test]
async fn test_measurements_end_to_end() {
    let (base_url, seen) = spawn_backend().await;

    let snapshot = run_query(&base_url, "Sensor1").await;
    assert_eq!(snapshot.status, Status::Ready);
    assert_eq!(
        snapshot.rows,
        vec![
            DisplayRow {
                sensor_functionality: "Temperature".to_string(),
                values: vec!["21 C".to_string()],
            },
            DisplayRow {
                sensor_functionality: "Humidity".to_string(),
                values: vec!["40 %".to_string()],
            },
        ]
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (method, device, query) = &seen[0];
    assert_eq!(method, "GET");
    assert_eq!(device, "Sensor1");
    assert_eq!(query["givenStart"], "2024-03-01T00:00:00.000Z");
    assert_eq!(query["givenEnd"], "2024-06-30T00:00:00.000Z");
}

#[tokio::test]
async fn test_joined_readings() {
    let (base_url, _) = spawn_backend().await;

    let snapshot = run_query(&base_url, "Legacy").await;
    assert_eq!(snapshot.status, Status::Ready);
    assert_eq!(snapshot.rows[0].values, ["1.0 Unit1", "2.0 Unit2"]);
}

#[tokio::test]
async fn test_array_body_is_error() {
    let (base_url, _) = spawn_backend().await;

    let snapshot = run_query(&base_url, "ArrayBody").await;
    assert_eq!(snapshot.status, Status::Error);
    assert!(snapshot.rows.is_empty());
    assert!(snapshot.error_message.unwrap().contains("an array"));
}

#[tokio::test]
async fn test_non_json_body_is_decode_error() {
    let (base_url, _) = spawn_backend().await;
    let backend = HttpBackend::new(&base_url, None).unwrap();

    let err = backend
        .fetch_measurements("NotJson", "a", "b")
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Decode(_)));
}

#[tokio::test]
async fn test_server_error_status() {
    let (base_url, _) = spawn_backend().await;

    let snapshot = run_query(&base_url, "Broken").await;
    assert_eq!(snapshot.status, Status::Error);
    assert_eq!(
        snapshot.error_message.as_deref(),
        Some("request failed with status code 500")
    );
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Grab a free port, then close it again
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(&format!("http://{}", addr), None).unwrap();
    let err = backend
        .fetch_measurements("Sensor1", "a", "b")
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Network(_)), "{:?}", err);
}

#[tokio::test]
async fn test_configured_timeout() {
    let (base_url, _) = spawn_backend().await;
    let backend = HttpBackend::new(&base_url, Some(Duration::from_millis(200))).unwrap();

    let err = backend
        .fetch_measurements("Slow", "a", "b")
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Network(_)), "{:?}", err);
}

#[tokio::test]
async fn test_blind_roller_over_http() {
    let (base_url, seen) = spawn_backend().await;
    let backend = Arc::new(HttpBackend::new(&base_url, None).unwrap());

    let roller = BlindRoller::new(backend.clone(), DeviceId::new("Blind1").unwrap());
    assert_eq!(roller.current_position().await, Ok(70));
    assert_eq!(roller.set_position(40).await, Ok(40));

    let patch = seen
        .lock()
        .unwrap()
        .iter()
        .find(|(method, _, _)| method == "PATCH")
        .cloned()
        .unwrap();
    assert_eq!(patch.1, "Blind1");
    assert_eq!(patch.2["closePercentage"], "40");

    let garbled = BlindRoller::new(backend.clone(), DeviceId::new("Blind2").unwrap());
    assert_eq!(
        garbled.current_position().await,
        Err(BlindRollerError::InvalidState("half".to_string()))
    );

    let missing = BlindRoller::new(backend, DeviceId::new("Nope").unwrap());
    assert_eq!(
        missing.current_position().await,
        Err(BlindRollerError::Backend(BackendError::Http { status: 404 }))
    );
}

#[tokio::test]
async fn test_backend_from_config_file() {
    let (base_url, _) = spawn_backend().await;

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("homeview.toml");
    std::fs::write(
        &path,
        format!(
            "[backend]\nbase_url = \"{}/\"\ntimeout_secs = 5\n\n[measurements]\nrow_order = \"lexicographic\"\n",
            base_url
        ),
    )
    .unwrap();

    let (config, diagnostics) = homeview::Config::from_files(&[path]).unwrap();
    assert!(diagnostics.is_empty());

    let backend = Arc::new(
        HttpBackend::new(&config.backend.base_url, config.backend.timeout).unwrap(),
    );
    assert_eq!(backend.base_url(), base_url);

    let device = DeviceId::new("Sensor1").unwrap();
    let view = MeasurementsView::new(
        backend,
        device.clone(),
        config.measurements.default_range,
        config.measurements.page_size.into(),
    )
    .with_row_order(config.measurements.row_order);
    assert!(view.set_inputs(device, config.measurements.default_range).await);

    let names: Vec<String> = view
        .visible_rows()
        .into_iter()
        .map(|r| r.sensor_functionality)
        .collect();
    assert_eq!(names, ["Humidity", "Temperature"]);
}

#[tokio::test]
async fn test_device_id_reserved_characters() {
    let (base_url, seen) = spawn_backend().await;

    let snapshot = run_query(&base_url, "Kitchen#2").await;
    assert_eq!(snapshot.status, Status::Ready);
    assert_eq!(snapshot.rows.len(), 2);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, "Kitchen#2");
    assert!(seen[0].2.contains_key("givenStart"));
}

#[tokio::test]
async fn test_list_blind_rollers_over_http() {
    let (base_url, _) = spawn_backend().await;
    let backend = HttpBackend::new(&base_url, None).unwrap();

    let rollers = homeview::list_blind_rollers(&backend).await.unwrap();
    assert_eq!(
        rollers,
        vec![
            BlindRollerEntry {
                device_name: "Blind1".to_string(),
                room_name: "Bedroom".to_string(),
            },
            BlindRollerEntry {
                device_name: "Blind2".to_string(),
                room_name: "Office".to_string(),
            },
        ]
    );
}
