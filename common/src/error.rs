use thiserror::Error;

/// Reasons a sensor reading is refused before it reaches the anomaly window.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ReadingError {
    #[error("temperature is not a finite number")]
    NonFiniteTemperature,
    #[error("humidity is not a finite number")]
    NonFiniteHumidity,
    #[error("temperature {value:.2} outside plausible range [{min:.1}, {max:.1}]")]
    TemperatureOutOfRange { value: f64, min: f64, max: f64 },
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no forecast model loaded")]
    Unavailable,
    #[error("forecast returned {got} steps, need {needed}")]
    ShortHorizon { got: usize, needed: usize },
    #[error("forecast contains a non-finite value at step {0}")]
    NonFinite(usize),
    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed model file: {0}")]
    Malformed(#[from] serde_json::Error),
}
