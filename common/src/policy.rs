use crate::{
    anomaly::{Anomaly, AnomalyFlag},
    types::{Command, Status},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Heat comfort ceiling.
    pub upper: f64,
    /// Cold economy floor.
    pub lower: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            upper: 30.0,
            lower: 18.0,
        }
    }
}

/// Resolves a command and status label. The first matching rule wins and the
/// order is fixed: anomaly, forecast heat, economy cold, idle.
pub fn resolve(
    current: f64,
    horizon_30: f64,
    _horizon_60: f64,
    anomaly: &Anomaly,
    thresholds: Thresholds,
) -> (Command, Status) {
    // A fast excursion invalidates the forecast, so it preempts everything.
    match anomaly.flag {
        AnomalyFlag::Heat => return (Command::AnomalyHeat, Status::AnomalyHeat),
        AnomalyFlag::Cold => return (Command::AnomalyCold, Status::AnomalyCold),
        AnomalyFlag::None => {}
    }

    if horizon_30 >= thresholds.upper {
        return if current >= thresholds.upper {
            (Command::Active, Status::ActiveCooling)
        } else {
            (Command::Prep, Status::ProactivePrep)
        };
    }

    if current <= thresholds.lower {
        return (Command::Economy, Status::EconomyMode);
    }

    (Command::Idle, Status::Stable)
}
