use crate::types::{Command, Decision, Status};

/// Last admitted decision and when it was admitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HysteresisState {
    last: Option<Decision>,
    last_timestamp_ms: Option<u64>,
}

impl HysteresisState {
    pub fn last_decision(&self) -> Option<&Decision> {
        self.last.as_ref()
    }

    pub fn last_command(&self) -> Command {
        self.last
            .as_ref()
            .map(|decision| decision.command)
            .unwrap_or(Command::Off)
    }

    pub fn last_status(&self) -> Option<Status> {
        self.last.as_ref().map(|decision| decision.status)
    }

    pub fn last_timestamp_ms(&self) -> Option<u64> {
        self.last_timestamp_ms
    }

    fn record(&mut self, decision: &Decision, now_ms: u64) {
        self.last = Some(decision.clone());
        self.last_timestamp_ms = Some(now_ms);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub decision: Decision,
    /// The previous decision was returned in place of the new one.
    pub suppressed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    pub dwell_ms: u64,
}

impl Debouncer {
    pub fn new(dwell_ms: u64) -> Self {
        Self { dwell_ms }
    }

    pub fn admit(&self, decision: Decision, state: &mut HysteresisState, now_ms: u64) -> Admission {
        if decision.status.is_anomaly() {
            state.record(&decision, now_ms);
            return Admission {
                decision,
                suppressed: false,
            };
        }

        if let (Some(previous), Some(last_ms)) = (&state.last, state.last_timestamp_ms) {
            let within_dwell = now_ms.saturating_sub(last_ms) < self.dwell_ms;
            if within_dwell && decision.command == previous.command {
                return Admission {
                    decision: previous.clone(),
                    suppressed: true,
                };
            }
        }

        state.record(&decision, now_ms);
        Admission {
            decision,
            suppressed: false,
        }
    }
}
