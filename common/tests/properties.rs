//! Property tests for the decision pipeline invariants.

use chrono::{TimeZone, Utc};
use climate_common::{
    message::eta_minutes,
    policy::{resolve, Thresholds},
    Anomaly, AnomalyDetector, AnomalyWindow, ClimateEngine, Command, Debouncer, Decision,
    EngineConfig, FixedVariant, ForecastOracle, HysteresisState, OracleError, RoundRobin, Status,
};
use proptest::prelude::*;

struct Horizons {
    short: f64,
    long: f64,
}

impl ForecastOracle for Horizons {
    fn forecast(&self, steps: usize) -> Result<Vec<f64>, OracleError> {
        let mut sequence = vec![self.short; steps];
        sequence[steps - 1] = self.long;
        Ok(sequence)
    }
}

fn timestamp() -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_767_225_600, 0).unwrap()
}

proptest! {
    /// Below the floor with a calm forecast the only outcome is economy.
    #[test]
    fn cold_reading_without_forecast_heat_is_economy(
        current in -40.0f64..18.0,
        horizon_30 in -40.0f64..30.0,
    ) {
        let (command, status) = resolve(
            current,
            horizon_30,
            horizon_30,
            &Anomaly::NONE,
            Thresholds::default(),
        );

        prop_assert_eq!(command, Command::Economy);
        prop_assert_eq!(status, Status::EconomyMode);
    }

    /// A window delta above the heat spike always wins, whatever the forecast says.
    #[test]
    fn heat_delta_always_resolves_anomaly_heat(
        base in 0.0f64..40.0,
        rise in 1.51f64..20.0,
        short in -20.0f64..60.0,
        long in -20.0f64..60.0,
    ) {
        let mut engine = ClimateEngine::new(
            EngineConfig::default(),
            Box::new(Horizons { short, long }),
            Box::new(FixedVariant(0)),
        );

        engine.process(base, 50.0, timestamp(), 0);
        let evaluation = engine.process(base + rise, 50.0, timestamp(), 1_000);

        prop_assert_eq!(evaluation.decision.command, Command::AnomalyHeat);
        prop_assert_eq!(evaluation.decision.status, Status::AnomalyHeat);
    }

    /// Two identical calm readings inside the dwell window return the same decision.
    #[test]
    fn repeat_within_dwell_is_byte_identical(
        temp in 18.5f64..29.5,
        gap_ms in 0u64..10_000,
    ) {
        let mut engine = ClimateEngine::new(
            EngineConfig::default(),
            Box::new(Horizons { short: temp + 0.2, long: temp + 0.3 }),
            Box::<RoundRobin>::default(),
        );

        let first = engine.process(temp, 50.0, timestamp(), 5_000);
        let second = engine.process(temp, 50.0, timestamp(), 5_000 + gap_ms);

        prop_assert!(second.suppressed);
        prop_assert_eq!(
            serde_json::to_vec(&second.decision).unwrap(),
            serde_json::to_vec(&first.decision).unwrap()
        );
    }

    /// Anomalies are admitted even a fraction of a second after another admission.
    #[test]
    fn anomaly_bypasses_debounce(gap_ms in 0u64..1_000, heat in any::<bool>()) {
        let debouncer = Debouncer::new(10_000);
        let mut state = HysteresisState::default();
        let (command, status) = if heat {
            (Command::AnomalyHeat, Status::AnomalyHeat)
        } else {
            (Command::AnomalyCold, Status::AnomalyCold)
        };
        let anomaly = Decision { command, status, message: "excursion".to_string() };

        debouncer.admit(anomaly.clone(), &mut state, 20_000);
        let admission = debouncer.admit(anomaly, &mut state, 20_000 + gap_ms);

        prop_assert!(!admission.suppressed);
        prop_assert_eq!(state.last_timestamp_ms(), Some(20_000 + gap_ms));
    }

    /// With a fixed positive slope, getting closer to the ceiling never lengthens the ETA.
    #[test]
    fn eta_shrinks_as_current_approaches_ceiling(
        lower in 15.0f64..29.0,
        step in 0.01f64..1.0,
        slope in 0.1f64..5.0,
    ) {
        let higher = (lower + step).min(29.99);
        let far = eta_minutes(lower, lower + slope, 30.0).unwrap();
        let near = eta_minutes(higher, higher + slope, 30.0).unwrap();

        prop_assert!(near <= far, "near {} > far {}", near, far);
    }

    /// After overflowing the window only the last N samples are kept.
    #[test]
    fn window_keeps_only_last_n(
        capacity in 2usize..20,
        samples in proptest::collection::vec(-10.0f64..40.0, 1..60),
    ) {
        let mut window = AnomalyWindow::with_capacity(capacity);
        for sample in &samples {
            window.push(*sample);
        }

        let kept = samples.len().min(capacity);
        prop_assert_eq!(window.len(), kept);
        prop_assert_eq!(window.oldest(), Some(samples[samples.len() - kept]));
    }

    /// Severity stays within [0, 1] for any pair of samples.
    #[test]
    fn severity_is_normalised(first in -40.0f64..85.0, second in -40.0f64..85.0) {
        let mut detector = AnomalyDetector::default();
        detector.observe(first);
        let anomaly = detector.observe(second);

        prop_assert!((0.0..=1.0).contains(&anomaly.severity));
    }
}
