use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window_capacity: usize,
    pub heat_spike: f64,
    pub cold_spike: f64,
    pub upper_threshold: f64,
    pub lower_threshold: f64,
    pub dwell_ms: u64,
    pub min_valid_temp: f64,
    pub max_valid_temp: f64,
    pub forecast_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_capacity: 10,
            heat_spike: 1.5,
            cold_spike: -4.0,
            upper_threshold: 30.0,
            lower_threshold: 18.0,
            dwell_ms: 10_000,
            min_valid_temp: -40.0,
            max_valid_temp: 85.0,
            forecast_steps: 12,
        }
    }
}

impl EngineConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        self.window_capacity = self.window_capacity.clamp(2, 1_000);
        if !self.heat_spike.is_finite() || self.heat_spike <= 0.0 {
            self.heat_spike = defaults.heat_spike;
        }
        if !self.cold_spike.is_finite() || self.cold_spike >= 0.0 {
            self.cold_spike = defaults.cold_spike;
        }
        if !self.upper_threshold.is_finite()
            || !self.lower_threshold.is_finite()
            || self.lower_threshold >= self.upper_threshold
        {
            self.upper_threshold = defaults.upper_threshold;
            self.lower_threshold = defaults.lower_threshold;
        }
        if !self.min_valid_temp.is_finite()
            || !self.max_valid_temp.is_finite()
            || self.min_valid_temp >= self.max_valid_temp
        {
            self.min_valid_temp = defaults.min_valid_temp;
            self.max_valid_temp = defaults.max_valid_temp;
        }
        // Two steps minimum so the 30 minute index stays distinct from the 60 minute one.
        self.forecast_steps = self.forecast_steps.clamp(2, 288);
        if self.forecast_steps % 2 != 0 {
            self.forecast_steps += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub http_port: u16,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_port: 8000,
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default = "default_model_path")]
    pub model_path: String,
}

fn default_model_path() -> String {
    "models/thermal_model.json".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            network: NetworkConfig::default(),
            model_path: default_model_path(),
        }
    }
}
