pub const TOPIC_SENSOR_READING: &str = "climate/sensor/reading";
pub const TOPIC_SENSOR_STATUS: &str = "climate/sensor/status";

pub const TOPIC_CONTROLLER_DECISION: &str = "climate/controller/decision";
