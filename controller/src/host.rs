use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{debug, info, warn};

use climate_common::{
    ClimateEngine, DecisionResponse, Evaluation, ForecastOracle, NoModel, RoundRobin,
    SeasonalTrendModel, TOPIC_CONTROLLER_DECISION, TOPIC_SENSOR_READING,
};

use crate::store::AppStore;

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<ClimateEngine>>,
    mqtt: Option<AsyncClient>,
    store: AppStore,
    api_key: Option<ApiKey>,
}

/// SHA-256 of the configured key; candidates are hashed before comparison.
#[derive(Clone)]
struct ApiKey {
    digest: Arc<Vec<u8>>,
}

impl ApiKey {
    fn new(secret: &str) -> Self {
        Self {
            digest: Arc::new(Sha256::digest(secret.as_bytes()).to_vec()),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        Sha256::digest(candidate.as_bytes()).as_slice() == self.digest.as_slice()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct SensorPayload {
    #[serde(alias = "temp")]
    temperature: f64,
    #[serde(alias = "hum")]
    humidity: f64,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        Default::default()
    });

    let model_path = std::env::var("CLIMATE_MODEL_PATH").unwrap_or(runtime.model_path.clone());
    let oracle: Box<dyn ForecastOracle> = match SeasonalTrendModel::load(&model_path) {
        Ok(model) => {
            info!("forecast model loaded from {model_path}");
            Box::new(model)
        }
        Err(err) => {
            warn!("forecast model unavailable at {model_path} ({err}); forecasts fall back to the current reading");
            Box::new(NoModel)
        }
    };
    let engine = ClimateEngine::new(
        runtime.engine.clone(),
        oracle,
        Box::<RoundRobin>::default(),
    );

    let api_key = match std::env::var("PROACTIVE_API_KEY") {
        Ok(key) if !key.is_empty() => Some(ApiKey::new(&key)),
        _ => {
            warn!("PROACTIVE_API_KEY is not set; telemetry requests are not authenticated");
            None
        }
    };

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let (mqtt, eventloop) = if mqtt_host.is_empty() {
        info!("MQTT_HOST is empty; MQTT ingestion disabled");
        (None, None)
    } else {
        let mut mqtt_options = MqttOptions::new("climate-controller-rust", mqtt_host, mqtt_port);
        let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
        let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
        if !mqtt_user.is_empty() {
            mqtt_options.set_credentials(mqtt_user, mqtt_pass);
        }
        let (client, eventloop) = AsyncClient::new(mqtt_options, 64);
        (Some(client), Some(eventloop))
    };

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        mqtt,
        store,
        api_key,
    };

    if let (Some(client), Some(eventloop)) = (app_state.mqtt.clone(), eventloop) {
        client
            .subscribe(TOPIC_SENSOR_READING, QoS::AtMostOnce)
            .await
            .context("failed to subscribe to sensor readings")?;
        spawn_mqtt_loop(app_state.clone(), eventloop);
    }

    let web_root = std::env::var("CLIMATE_WEB_ROOT")
        .unwrap_or_else(|_| format!("{}/web", env!("CARGO_MANIFEST_DIR")));
    let app = router(app_state)
        .fallback_service(ServeDir::new(web_root))
        .layer(CorsLayer::permissive());

    let port = std::env::var("CLIMATE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("climate controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/telemetry", post(handle_telemetry))
        .route("/history", get(handle_get_history))
        .route("/api/status", get(handle_get_status))
        .with_state(app_state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, &message.topic, &message.payload).await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    if topic == TOPIC_SENSOR_READING {
        let reading: SensorPayload =
            serde_json::from_slice(payload).context("malformed sensor reading payload")?;
        ingest_reading(app_state, reading.temperature, reading.humidity).await;
    }

    Ok(())
}

/// Runs one reading through the engine, then logs, stores and publishes the
/// outcome. Storage and publish failures never change the returned decision.
async fn ingest_reading(state: &AppState, temperature: f64, humidity: f64) -> DecisionResponse {
    let evaluation = {
        let mut engine = state.engine.lock().await;
        engine.process(temperature, humidity, Utc::now(), monotonic_ms())
    };

    log_evaluation(&evaluation, temperature, humidity);

    if let Some(record) = evaluation.record() {
        if let Err(err) = state.store.append_record(&record).await {
            warn!("failed to append decision record: {err:#}");
        }
    }

    let response = evaluation.response();
    publish_decision(state, &response);
    response
}

fn log_evaluation(evaluation: &Evaluation, temperature: f64, humidity: f64) {
    if let Some(err) = &evaluation.rejected {
        warn!("rejected reading temp={temperature} hum={humidity}: {err}");
        return;
    }
    if let Some(err) = &evaluation.oracle_error {
        debug!("forecast fallback in use: {err}");
    }

    let label = evaluation.decision.label();
    if evaluation.suppressed {
        debug!("debounced repeat of {label} at {temperature:.2}");
    } else if let Some(forecast) = evaluation.forecast {
        info!(
            "decision {label} temp={temperature:.2} p30={:.2} p60={:.2} severity={:.2}",
            forecast.horizon_30, forecast.horizon_60, evaluation.anomaly.severity
        );
    }
}

fn publish_decision(state: &AppState, response: &DecisionResponse) {
    let Some(mqtt) = &state.mqtt else {
        return;
    };

    match serde_json::to_vec(response) {
        Ok(body) => {
            // try_publish so a stalled broker never holds up the sensor's response.
            if let Err(err) = mqtt.try_publish(TOPIC_CONTROLLER_DECISION, QoS::AtLeastOnce, true, body) {
                warn!("decision publish failed: {err}");
            }
        }
        Err(err) => warn!("decision serialization failed: {err}"),
    }
}

async fn handle_telemetry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if let Some(api_key) = &state.api_key {
        let provided = headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !api_key.matches(provided) {
            return error_response(StatusCode::UNAUTHORIZED, "Unauthorized: Invalid API Key");
        }
    }

    let Some(temperature) = parse_param(&params, "temp") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing or invalid 'temp' parameter");
    };
    let Some(humidity) = parse_param(&params, "hum") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing or invalid 'hum' parameter");
    };

    Json(ingest_reading(&state, temperature, humidity).await).into_response()
}

async fn handle_get_history(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let limit = params
        .get("limit")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    match state.store.recent_records(limit).await {
        Ok(records) => Json(records).into_response(),
        Err(err) => {
            warn!("failed to read decision history: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read history")
        }
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = {
        let engine = state.engine.lock().await;
        engine.status(monotonic_ms())
    };
    Json(status)
}

fn parse_param(params: &HashMap<String, String>, name: &str) -> Option<f64> {
    params.get(name)?.trim().parse::<f64>().ok()
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::http::HeaderValue;
    use climate_common::{Command, EngineConfig, FixedVariant, Status};

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "climate-host-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn test_state(name: &str, api_key: Option<&str>) -> AppState {
        let engine =
            ClimateEngine::without_model(EngineConfig::default(), Box::new(FixedVariant(0)));
        AppState {
            engine: Arc::new(Mutex::new(engine)),
            mqtt: None,
            store: AppStore::at(scratch_dir(name)),
            api_key: api_key.map(ApiKey::new),
        }
    }

    fn query(temp: &str, hum: &str) -> Query<HashMap<String, String>> {
        Query(HashMap::from([
            ("temp".to_string(), temp.to_string()),
            ("hum".to_string(), hum.to_string()),
        ]))
    }

    #[test]
    fn api_key_digest_comparison() {
        let key = ApiKey::new("s3cret");
        assert!(key.matches("s3cret"));
        assert!(!key.matches("s3cret "));
        assert!(!key.matches(""));
    }

    #[tokio::test]
    async fn telemetry_rejects_wrong_key() {
        let state = test_state("wrong-key", Some("s3cret"));
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("guess"));

        let response = handle_telemetry(State(state), headers, query("24.0", "50.0"))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn telemetry_requires_numeric_params() {
        let state = test_state("bad-params", None);

        let response = handle_telemetry(State(state), HeaderMap::new(), query("warm", "50.0"))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn accepted_reading_is_recorded() {
        let state = test_state("recorded", Some("s3cret"));
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("s3cret"));

        let response = handle_telemetry(State(state.clone()), headers, query("17.0", "45.0"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let history = state.store.recent_records(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].decision, "ECONOMY:ECONOMY_MODE");
        assert_eq!(history[0].temperature, 17.0);
    }

    #[tokio::test]
    async fn non_finite_reading_gets_fallback_and_no_record() {
        let state = test_state("nan", None);

        let response = ingest_reading(&state, f64::NAN, 50.0).await;

        assert_eq!(response.command, Command::Idle);
        assert_eq!(response.status, Status::Stable);
        assert!(response.system_meta.rejected.is_some());
        assert!(response.forecast.is_none());
        assert!(state.store.recent_records(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn decision_survives_store_failure() {
        let dir = scratch_dir("unwritable");
        std::fs::create_dir_all(&dir).unwrap();
        // A directory where the log file should be makes every append fail.
        std::fs::create_dir_all(dir.join("decisions.jsonl")).unwrap();
        let mut state = test_state("unwritable-engine", None);
        state.store = AppStore::at(dir);

        let response = ingest_reading(&state, 24.0, 50.0).await;

        assert_eq!(response.command, Command::Idle);
        assert_eq!(response.status, Status::Stable);
    }

    #[tokio::test]
    async fn concurrent_readings_are_serialized() {
        let state = test_state("concurrent", None);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                ingest_reading(&state, 22.0 + (i % 4) as f64 * 0.1, 50.0).await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let status = state.engine.lock().await.status(monotonic_ms());
        assert_eq!(status.processed_readings, 16);
        assert_eq!(status.window_length, 10);
    }

    #[tokio::test]
    async fn mqtt_payload_accepts_short_field_names() {
        let state = test_state("mqtt", None);

        handle_mqtt_message(&state, TOPIC_SENSOR_READING, br#"{"temp": 25.5, "hum": 61.0}"#)
            .await
            .unwrap();

        let history = state.store.recent_records(1).await.unwrap();
        assert_eq!(history[0].humidity, 61.0);
        assert!(handle_mqtt_message(&state, TOPIC_SENSOR_READING, b"not json")
            .await
            .is_err());
    }
}
