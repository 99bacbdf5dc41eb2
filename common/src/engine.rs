use chrono::{DateTime, Utc};

use crate::{
    anomaly::{Anomaly, AnomalyDetector},
    config::EngineConfig,
    error::ReadingError,
    forecast::{self, ForecastAdapter, ForecastOracle, NoModel},
    hysteresis::{Debouncer, HysteresisState},
    message::{self, MessageContext, MessageGenerator, VariantSelector},
    policy::{self, Thresholds},
    types::{
        Command, Decision, DecisionRecord, DecisionResponse, EngineStatus, Forecast, ForecastView,
        Reading, Status, SystemMeta, Trend,
    },
};

/// Everything the engine concluded about one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// `None` when the reading failed validation.
    pub reading: Option<Reading>,
    /// Temperature the forecast is anchored to. `None` only when a reading is
    /// rejected before any valid one has been seen.
    pub current: Option<f64>,
    pub forecast: Option<Forecast>,
    pub anomaly: Anomaly,
    pub decision: Decision,
    pub suppressed: bool,
    pub rejected: Option<ReadingError>,
    pub oracle_error: Option<String>,
}

impl Evaluation {
    pub fn trend(&self) -> Option<Trend> {
        Some(Trend::between(self.current?, self.forecast?.horizon_30))
    }

    /// Row for the decision log. Rejected readings produce none.
    pub fn record(&self) -> Option<DecisionRecord> {
        let reading = self.reading?;
        let forecast = self.forecast?;
        Some(DecisionRecord {
            timestamp: reading.timestamp,
            temperature: reading.temperature,
            humidity: reading.humidity,
            prediction_30: forecast.horizon_30,
            prediction_60: forecast.horizon_60,
            decision: self.decision.label(),
            human_notes: self.decision.message.clone(),
        })
    }

    pub fn response(&self) -> DecisionResponse {
        DecisionResponse {
            command: self.decision.command,
            status: self.decision.status,
            cta: self.decision.message.clone(),
            forecast: self.forecast.zip(self.trend()).map(|(forecast, trend)| ForecastView {
                horizon_30: round2(forecast.horizon_30),
                horizon_60: round2(forecast.horizon_60),
                trend,
            }),
            system_meta: SystemMeta {
                engine_active: self.forecast.is_some_and(|forecast| forecast.is_model_backed()),
                severity: self.anomaly.severity,
                suppressed: self.suppressed,
                rejected: self.rejected.map(|err| err.to_string()),
            },
        }
    }
}

pub struct ClimateEngine {
    pub config: EngineConfig,
    thresholds: Thresholds,

    detector: AnomalyDetector,
    forecaster: ForecastAdapter,
    messages: MessageGenerator,
    debouncer: Debouncer,
    hysteresis: HysteresisState,

    last_temperature: Option<f64>,
    processed_readings: u64,
    rejected_readings: u64,
}

impl ClimateEngine {
    pub fn new(
        mut config: EngineConfig,
        oracle: Box<dyn ForecastOracle>,
        selector: Box<dyn VariantSelector>,
    ) -> Self {
        config.sanitize();
        Self {
            thresholds: Thresholds {
                upper: config.upper_threshold,
                lower: config.lower_threshold,
            },
            detector: AnomalyDetector::from_config(&config),
            forecaster: ForecastAdapter::new(oracle, config.forecast_steps),
            messages: MessageGenerator::new(selector),
            debouncer: Debouncer::new(config.dwell_ms),
            hysteresis: HysteresisState::default(),
            last_temperature: None,
            processed_readings: 0,
            rejected_readings: 0,
            config,
        }
    }

    pub fn without_model(config: EngineConfig, selector: Box<dyn VariantSelector>) -> Self {
        Self::new(config, Box::new(NoModel), selector)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn model_loaded(&self) -> bool {
        self.forecaster.model_loaded()
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn hysteresis(&self) -> &HysteresisState {
        &self.hysteresis
    }

    /// Validate, observe, forecast, resolve, render and debounce one reading.
    /// Always yields a decision; invalid readings get the idle fallback and
    /// leave the window and debounce state untouched.
    pub fn process(
        &mut self,
        temperature: f64,
        humidity: f64,
        timestamp: DateTime<Utc>,
        now_ms: u64,
    ) -> Evaluation {
        match Reading::validated(temperature, humidity, timestamp, &self.config) {
            Ok(reading) => self.evaluate(reading, now_ms),
            Err(err) => self.reject(err),
        }
    }

    pub fn status(&self, now_ms: u64) -> EngineStatus {
        let last = self.hysteresis.last_decision();
        EngineStatus {
            model_loaded: self.model_loaded(),
            window_length: self.detector.window().len(),
            window_capacity: self.detector.window().capacity(),
            last_command: self.hysteresis.last_command().as_str(),
            last_status: self.hysteresis.last_status().map(Status::as_str),
            last_message: last.map(|decision| decision.message.clone()),
            ms_since_last_admit: self
                .hysteresis
                .last_timestamp_ms()
                .map(|last_ms| now_ms.saturating_sub(last_ms)),
            upper_threshold: self.thresholds.upper,
            lower_threshold: self.thresholds.lower,
            dwell_ms: self.debouncer.dwell_ms,
            processed_readings: self.processed_readings,
            rejected_readings: self.rejected_readings,
        }
    }

    fn evaluate(&mut self, reading: Reading, now_ms: u64) -> Evaluation {
        let current = reading.temperature;
        let anomaly = self.detector.observe(current);

        let (raw_forecast, oracle_error) = self.forecaster.forecast(current);
        let forecast = forecast::amplify(raw_forecast, &anomaly);

        let (command, status) = policy::resolve(
            current,
            forecast.horizon_30,
            forecast.horizon_60,
            &anomaly,
            self.thresholds,
        );

        let message = self.messages.render(&MessageContext {
            status,
            severity: anomaly.severity,
            eta_minutes: message::eta_minutes(current, forecast.horizon_30, self.thresholds.upper),
            trend: Trend::between(current, forecast.horizon_30),
            current,
        });

        let admission = self.debouncer.admit(
            Decision {
                command,
                status,
                message,
            },
            &mut self.hysteresis,
            now_ms,
        );

        self.last_temperature = Some(current);
        self.processed_readings = self.processed_readings.saturating_add(1);

        Evaluation {
            reading: Some(reading),
            current: Some(current),
            forecast: Some(forecast),
            anomaly,
            decision: admission.decision,
            suppressed: admission.suppressed,
            rejected: None,
            oracle_error: oracle_error.map(|err| err.to_string()),
        }
    }

    fn reject(&mut self, err: ReadingError) -> Evaluation {
        self.rejected_readings = self.rejected_readings.saturating_add(1);

        // Anchor the response to the last good temperature, if there is one.
        let current = self.last_temperature;
        Evaluation {
            reading: None,
            current,
            forecast: current.map(Forecast::identity),
            anomaly: Anomaly::NONE,
            decision: Decision {
                command: Command::Idle,
                status: Status::Stable,
                message: message::REJECTED_READING.to_string(),
            },
            suppressed: false,
            rejected: Some(err),
            oracle_error: None,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
