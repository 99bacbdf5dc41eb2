pub mod anomaly;
pub mod config;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod hysteresis;
pub mod message;
pub mod policy;
pub mod topics;
pub mod types;

pub use anomaly::{Anomaly, AnomalyDetector, AnomalyFlag, AnomalyWindow};
pub use config::{EngineConfig, NetworkConfig, RuntimeConfig};
pub use engine::{ClimateEngine, Evaluation};
pub use error::{OracleError, ReadingError};
pub use forecast::{ForecastAdapter, ForecastOracle, NoModel, SeasonalTrendModel};
pub use hysteresis::{Admission, Debouncer, HysteresisState};
pub use message::{FixedVariant, MessageGenerator, RoundRobin, VariantSelector};
pub use policy::Thresholds;
pub use topics::*;
pub use types::{
    Command, Decision, DecisionRecord, DecisionResponse, EngineStatus, Forecast,
    ForecastConfidence, Reading, Status, Trend,
};
