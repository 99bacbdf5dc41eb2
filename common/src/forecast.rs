//! Forecast oracle seam.
//!
//! The engine only relies on the horizon-indexing contract: `forecast(steps)`
//! yields one prediction per 5-minute step, index `steps/2 - 1` is read as the
//! 30 minute horizon and the last index as the 60 minute horizon.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    anomaly::Anomaly,
    error::OracleError,
    types::Forecast,
};

pub trait ForecastOracle: Send + Sync {
    fn forecast(&self, steps: usize) -> Result<Vec<f64>, OracleError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Stand-in used when no model could be loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModel;

impl ForecastOracle for NoModel {
    fn forecast(&self, _steps: usize) -> Result<Vec<f64>, OracleError> {
        Err(OracleError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Pre-fitted level + trend + seasonal model, read from a JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalTrendModel {
    pub level: f64,
    #[serde(default)]
    pub trend: f64,
    #[serde(default)]
    pub seasonal: Vec<f64>,
}

impl SeasonalTrendModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OracleError> {
        let raw = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

impl ForecastOracle for SeasonalTrendModel {
    fn forecast(&self, steps: usize) -> Result<Vec<f64>, OracleError> {
        let predictions = (1..=steps)
            .map(|h| {
                let seasonal = if self.seasonal.is_empty() {
                    0.0
                } else {
                    self.seasonal[(h - 1) % self.seasonal.len()]
                };
                self.level + self.trend * h as f64 + seasonal
            })
            .collect();
        Ok(predictions)
    }
}

pub struct ForecastAdapter {
    oracle: Box<dyn ForecastOracle>,
    steps: usize,
}

impl ForecastAdapter {
    pub fn new(oracle: Box<dyn ForecastOracle>, steps: usize) -> Self {
        Self {
            oracle,
            steps: steps.max(2),
        }
    }

    pub fn without_model(steps: usize) -> Self {
        Self::new(Box::new(NoModel), steps)
    }

    pub fn model_loaded(&self) -> bool {
        self.oracle.is_available()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Raw `(p30, p60)` from the oracle.
    pub fn horizons(&self) -> Result<(f64, f64), OracleError> {
        let sequence = self.oracle.forecast(self.steps)?;
        if sequence.len() < self.steps {
            return Err(OracleError::ShortHorizon {
                got: sequence.len(),
                needed: self.steps,
            });
        }

        let short_index = self.steps / 2 - 1;
        let long_index = self.steps - 1;
        for index in [short_index, long_index] {
            if !sequence[index].is_finite() {
                return Err(OracleError::NonFinite(index));
            }
        }

        Ok((sequence[short_index], sequence[long_index]))
    }

    /// Forecast anchored at `current`, degrading to the identity forecast
    /// whenever the oracle cannot answer.
    pub fn forecast(&self, current: f64) -> (Forecast, Option<OracleError>) {
        match self.horizons() {
            Ok((horizon_30, horizon_60)) => (Forecast::model(horizon_30, horizon_60), None),
            Err(err) => (Forecast::identity(current), Some(err)),
        }
    }
}

/// Continues a detected excursion into the forecast: the window delta,
/// weighted by severity, is added once at 30 minutes and twice at 60.
pub fn amplify(forecast: Forecast, anomaly: &Anomaly) -> Forecast {
    if !anomaly.is_flagged() {
        return forecast;
    }

    let push = anomaly.delta * anomaly.severity;
    Forecast {
        horizon_30: forecast.horizon_30 + push,
        horizon_60: forecast.horizon_60 + 2.0 * push,
        confidence: forecast.confidence,
    }
}
