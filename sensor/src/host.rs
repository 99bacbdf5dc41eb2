use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::json;
use tracing::{info, warn};

use climate_common::{DecisionResponse, TOPIC_SENSOR_READING, TOPIC_SENSOR_STATUS};

const START_TEMPERATURE: f64 = 27.0;
const STEP_PER_TICK: f64 = 0.5;
const HUMIDITY: f64 = 65.0;

/// Steadily warming room; enough ticks trip the heat spike detector.
fn simulated_reading(tick: u64) -> (f64, f64) {
    (START_TEMPERATURE + STEP_PER_TICK * tick as f64, HUMIDITY)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Where readings go: the MQTT broker, or the controller's HTTP endpoint.
enum Sink {
    Mqtt(AsyncClient),
    Http {
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
    },
}

impl Sink {
    async fn send(&self, temperature: f64, humidity: f64) -> anyhow::Result<()> {
        match self {
            Self::Mqtt(mqtt) => {
                let payload = json!({ "temperature": temperature, "humidity": humidity });
                mqtt.publish(
                    TOPIC_SENSOR_READING,
                    QoS::AtLeastOnce,
                    false,
                    serde_json::to_vec(&payload)?,
                )
                .await
                .context("failed to publish sensor reading")?;
            }
            Self::Http {
                client,
                base_url,
                api_key,
            } => {
                let request =
                    telemetry_request(client, base_url, api_key.as_deref(), temperature, humidity)?;
                let decision: DecisionResponse = client
                    .execute(request)
                    .await
                    .context("telemetry request failed")?
                    .error_for_status()?
                    .json()
                    .await
                    .context("malformed decision response")?;
                info!(
                    "controller answered {}:{} ({})",
                    decision.command.as_str(),
                    decision.status.as_str(),
                    decision.cta
                );
            }
        }
        Ok(())
    }
}

fn telemetry_request(
    client: &reqwest::Client,
    base_url: &str,
    api_key: Option<&str>,
    temperature: f64,
    humidity: f64,
) -> reqwest::Result<reqwest::Request> {
    let mut builder = client
        .post(format!("{}/telemetry", base_url.trim_end_matches('/')))
        .query(&[("temp", temperature), ("hum", humidity)]);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.build()
}

fn connect_mqtt() -> AsyncClient {
    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new("climate-sensor-rust", mqtt_host, mqtt_port);

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    mqtt
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let interval_secs = env_u64("SIM_INTERVAL_SECS", 3).max(1);
    let ticks = env_u64("SIM_TICKS", 10);

    let sink = match std::env::var("SIM_TELEMETRY_URL") {
        Ok(base_url) if !base_url.is_empty() => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .context("failed to build HTTP client")?;
            let api_key = std::env::var("PROACTIVE_API_KEY")
                .ok()
                .filter(|key| !key.is_empty());
            info!("sensor simulator posting to {base_url}/telemetry");
            Sink::Http {
                client,
                base_url,
                api_key,
            }
        }
        _ => {
            let mqtt = connect_mqtt();
            mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
                .await
                .context("failed to publish sensor online status")?;
            Sink::Mqtt(mqtt)
        }
    };

    info!("sensor simulator started: {ticks} readings every {interval_secs}s");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    for tick in 0..ticks {
        interval.tick().await;

        let (temperature, humidity) = simulated_reading(tick);
        info!("sending reading temp={temperature:.1} hum={humidity:.1}");
        if let Err(err) = sink.send(temperature, humidity).await {
            warn!("failed to deliver reading: {err:#}");
        }
    }

    if let Sink::Mqtt(mqtt) = &sink {
        mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "offline")
            .await
            .context("failed to publish sensor offline status")?;
        // Let the event loop flush the queued publishes before exit.
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    info!("sensor simulator finished");
    Ok(())
}
