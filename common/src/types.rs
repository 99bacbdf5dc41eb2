use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{config::EngineConfig, error::ReadingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Off,
    Idle,
    Prep,
    Active,
    AnomalyHeat,
    AnomalyCold,
    Economy,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Idle => "IDLE",
            Self::Prep => "PREP",
            Self::Active => "ACTIVE",
            Self::AnomalyHeat => "ANOMALY_HEAT",
            Self::AnomalyCold => "ANOMALY_COLD",
            Self::Economy => "ECONOMY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    AnomalyHeat,
    AnomalyCold,
    ActiveCooling,
    ProactivePrep,
    EconomyMode,
    Stable,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnomalyHeat => "ANOMALY_HEAT",
            Self::AnomalyCold => "ANOMALY_COLD",
            Self::ActiveCooling => "ACTIVE_COOLING",
            Self::ProactivePrep => "PROACTIVE_PREP",
            Self::EconomyMode => "ECONOMY_MODE",
            Self::Stable => "STABLE",
        }
    }

    /// Anomaly statuses bypass the debounce window.
    pub fn is_anomaly(self) -> bool {
        self.as_str().contains("ANOMALY")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Cooling,
}

impl Trend {
    pub fn between(current: f64, horizon_30: f64) -> Self {
        if horizon_30 > current {
            Self::Rising
        } else {
            Self::Cooling
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastConfidence {
    Model,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Rejects samples that would poison the anomaly window. Humidity never
    /// drives a decision, so a finite out-of-range value is clamped instead.
    pub fn validated(
        temperature: f64,
        humidity: f64,
        timestamp: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Result<Self, ReadingError> {
        if !temperature.is_finite() {
            return Err(ReadingError::NonFiniteTemperature);
        }
        if !humidity.is_finite() {
            return Err(ReadingError::NonFiniteHumidity);
        }
        if !(config.min_valid_temp..=config.max_valid_temp).contains(&temperature) {
            return Err(ReadingError::TemperatureOutOfRange {
                value: temperature,
                min: config.min_valid_temp,
                max: config.max_valid_temp,
            });
        }

        Ok(Self {
            temperature,
            humidity: humidity.clamp(0.0, 100.0),
            timestamp,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub horizon_30: f64,
    pub horizon_60: f64,
    pub confidence: ForecastConfidence,
}

impl Forecast {
    pub fn identity(current: f64) -> Self {
        Self {
            horizon_30: current,
            horizon_60: current,
            confidence: ForecastConfidence::Fallback,
        }
    }

    pub fn model(horizon_30: f64, horizon_60: f64) -> Self {
        Self {
            horizon_30,
            horizon_60,
            confidence: ForecastConfidence::Model,
        }
    }

    pub fn is_model_backed(&self) -> bool {
        self.confidence == ForecastConfidence::Model
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub command: Command,
    pub status: Status,
    pub message: String,
}

impl Decision {
    /// `COMMAND:STATUS`, the form written to the decision log.
    pub fn label(&self) -> String {
        format!("{}:{}", self.command.as_str(), self.status.as_str())
    }
}

/// Row appended to the decision log for every accepted reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub prediction_30: f64,
    pub prediction_60: f64,
    pub decision: String,
    pub human_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastView {
    #[serde(rename = "30m")]
    pub horizon_30: f64,
    #[serde(rename = "60m")]
    pub horizon_60: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMeta {
    pub engine_active: bool,
    pub severity: f64,
    #[serde(default)]
    pub suppressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
}

/// Body returned to the sensor for each reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub command: Command,
    pub status: Status,
    pub cta: String,
    /// Null when the reading was rejected and no earlier reading anchors one.
    #[serde(default)]
    pub forecast: Option<ForecastView>,
    pub system_meta: SystemMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    #[serde(rename = "modelLoaded")]
    pub model_loaded: bool,
    #[serde(rename = "windowLength")]
    pub window_length: usize,
    #[serde(rename = "windowCapacity")]
    pub window_capacity: usize,
    #[serde(rename = "lastCommand")]
    pub last_command: &'static str,
    #[serde(rename = "lastStatus")]
    pub last_status: Option<&'static str>,
    #[serde(rename = "lastMessage")]
    pub last_message: Option<String>,
    #[serde(rename = "msSinceLastAdmit")]
    pub ms_since_last_admit: Option<u64>,
    #[serde(rename = "upperThreshold")]
    pub upper_threshold: f64,
    #[serde(rename = "lowerThreshold")]
    pub lower_threshold: f64,
    #[serde(rename = "dwellMs")]
    pub dwell_ms: u64,
    #[serde(rename = "processedReadings")]
    pub processed_readings: u64,
    #[serde(rename = "rejectedReadings")]
    pub rejected_readings: u64,
}
