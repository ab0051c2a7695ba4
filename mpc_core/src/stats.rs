// Run-Time Statistics
// ===================
// Start/end timestamps for the setup phases, keyed by a small closed set
// of phase ids. Exported as JSON for human inspection.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    SpPresetup,
    SpSetup,
}

impl Phase {
    const ALL: [Phase; 2] = [Phase::SpPresetup, Phase::SpSetup];

    pub fn name(self) -> &'static str {
        match self {
            Phase::SpPresetup => "sp_presetup",
            Phase::SpSetup => "sp_setup",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Span {
    start: Option<Instant>,
    end: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct RunTimeStats {
    spans: HashMap<Phase, Span>,
}

impl RunTimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&mut self, phase: Phase) {
        self.spans.entry(phase).or_default().start = Some(Instant::now());
    }

    pub fn record_end(&mut self, phase: Phase) {
        self.spans.entry(phase).or_default().end = Some(Instant::now());
    }

    /// Elapsed time of a phase, once both its start and its end have been
    /// recorded.
    pub fn duration(&self, phase: Phase) -> Option<Duration> {
        let span = self.spans.get(&phase)?;
        match (span.start, span.end) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Phase durations in milliseconds as a JSON object; phases without a
    /// complete span appear as null.
    pub fn as_json(&self) -> Value {
        let mut object = serde_json::Map::new();
        for phase in Phase::ALL {
            let millis = self
                .duration(phase)
                .map(|duration| json!(duration.as_secs_f64() * 1000.0))
                .unwrap_or(Value::Null);
            object.insert(format!("{}_ms", phase.name()), millis);
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_needs_start_and_end() {
        let mut stats = RunTimeStats::new();
        assert!(stats.duration(Phase::SpSetup).is_none());
        stats.record_start(Phase::SpSetup);
        assert!(stats.duration(Phase::SpSetup).is_none());
        stats.record_end(Phase::SpSetup);
        assert!(stats.duration(Phase::SpSetup).is_some());
    }

    #[test]
    fn test_json_export_lists_all_phases() {
        let mut stats = RunTimeStats::new();
        stats.record_start(Phase::SpPresetup);
        stats.record_end(Phase::SpPresetup);
        let value = stats.as_json();
        assert!(value["sp_presetup_ms"].is_number());
        assert!(value["sp_setup_ms"].is_null());
    }
}
