//! Human-facing justification text.
//!
//! Anomaly text is picked by severity tier so safety messages are
//! deterministic. Steady-state text rotates through equivalent variants via a
//! [`VariantSelector`].

use crate::types::{Status, Trend};

/// Minutes covered by the short forecast horizon.
const SHORT_HORIZON_MINUTES: f64 = 30.0;
/// Forecast moves smaller than this carry no usable ETA.
const MIN_ETA_DELTA: f64 = 0.05;
/// Severity above which anomaly text switches to the high tier.
const HIGH_SEVERITY: f64 = 0.7;

pub trait VariantSelector: Send {
    /// Index into a non-empty list of `count` variants for `status`.
    fn select(&mut self, status: Status, count: usize) -> usize;
}

/// One counter shared by every status; each call advances it.
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    next: usize,
}

impl VariantSelector for RoundRobin {
    fn select(&mut self, _status: Status, count: usize) -> usize {
        let index = self.next % count;
        self.next = self.next.wrapping_add(1);
        index
    }
}

/// Always picks the same variant (clamped to the list length).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedVariant(pub usize);

impl VariantSelector for FixedVariant {
    fn select(&mut self, _status: Status, count: usize) -> usize {
        self.0.min(count - 1)
    }
}

/// Linear ETA in minutes until `current` reaches `upper`, extrapolated from the
/// 30 minute forecast.
pub fn eta_minutes(current: f64, horizon_30: f64, upper: f64) -> Option<u32> {
    let delta = horizon_30 - current;
    if delta.abs() < MIN_ETA_DELTA {
        return None;
    }

    let rate = delta / SHORT_HORIZON_MINUTES;
    let minutes = ((upper - current) / rate).round().max(0.0);
    Some(minutes as u32)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageContext {
    pub status: Status,
    pub severity: f64,
    pub eta_minutes: Option<u32>,
    pub trend: Trend,
    pub current: f64,
}

const HEAT_HIGH: &str =
    "Sudden heat surge detected ({temp}°C). Cooling is engaged at full strength until the spike settles.";
const HEAT_LOW: &str =
    "Temperature is climbing faster than usual ({temp}°C). Cooling is engaged early as a precaution.";
const COLD_HIGH: &str =
    "Sharp temperature drop detected ({temp}°C). Cooling is suspended until readings settle.";
const COLD_LOW: &str =
    "Temperature is falling faster than usual ({temp}°C). Holding steady before changing anything.";

const PREP: &[&str] = &[
    "Thermal energy is rising. I will engage the AC {eta} to maintain your comfort.",
    "Heat is on the way. Cooling will start {eta} so the room never gets there.",
    "The forecast crosses the comfort ceiling. Pre-cooling begins {eta}.",
];

const ACTIVE_RISING: &[&str] = &[
    "It is already hot and still warming. Cooling is running at full capacity.",
    "Heat has arrived. The AC is active and working to bring the room down.",
];

const ACTIVE_BREAKING: &[&str] = &[
    "The heat is starting to break. I'll be able to switch off the FAN {eta} to save energy.",
    "Temperatures are easing. Cooling can wind down {eta}.",
];

const ECONOMY: &[&str] = &[
    "It's cool enough already. Cooling stays off to save energy.",
    "Temperatures are low. Economy mode keeps the actuator idle.",
];

const STABLE: &[&str] = &[
    "Climate is stable. No manual action or automated changes required for the next hour.",
    "Everything is within range. Nothing to do for now.",
    "Conditions are steady. The system is standing by.",
];

pub const REJECTED_READING: &str =
    "The last sensor reading was rejected. Holding a safe idle state until valid data arrives.";

pub struct MessageGenerator {
    selector: Box<dyn VariantSelector>,
}

impl MessageGenerator {
    pub fn new(selector: Box<dyn VariantSelector>) -> Self {
        Self { selector }
    }

    pub fn render(&mut self, ctx: &MessageContext) -> String {
        let high = ctx.severity > HIGH_SEVERITY;
        let template = match ctx.status {
            Status::AnomalyHeat if high => HEAT_HIGH,
            Status::AnomalyHeat => HEAT_LOW,
            Status::AnomalyCold if high => COLD_HIGH,
            Status::AnomalyCold => COLD_LOW,
            Status::ProactivePrep => self.pick(ctx.status, PREP),
            Status::ActiveCooling if ctx.trend == Trend::Cooling => {
                self.pick(ctx.status, ACTIVE_BREAKING)
            }
            Status::ActiveCooling => self.pick(ctx.status, ACTIVE_RISING),
            Status::EconomyMode => self.pick(ctx.status, ECONOMY),
            Status::Stable => self.pick(ctx.status, STABLE),
        };

        template
            .replace("{temp}", &format!("{:.1}", ctx.current))
            .replace("{eta}", &eta_phrase(ctx.eta_minutes, ctx.trend))
    }

    fn pick(&mut self, status: Status, variants: &'static [&'static str]) -> &'static str {
        let index = self.selector.select(status, variants.len());
        variants[index.min(variants.len() - 1)]
    }
}

impl Default for MessageGenerator {
    fn default() -> Self {
        Self::new(Box::<RoundRobin>::default())
    }
}

fn eta_phrase(eta: Option<u32>, trend: Trend) -> String {
    match eta {
        Some(minutes) if minutes > 0 && minutes < 60 => format!("in {minutes} minutes"),
        _ if trend == Trend::Rising => "shortly".to_string(),
        _ => "soon".to_string(),
    }
}
