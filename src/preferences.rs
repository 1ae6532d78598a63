use heapless::String;
use ufmt::uwrite;

use crate::alert::ALERT_WINDOW_MS;
use crate::npk::FrameCheck;
use crate::stage::{stage_index, GrowthStage, GROWTH_STAGES};
use crate::timer::SAMPLE_INTERVAL_MS;

/// Preferences defines the operator-adjustable behaviour of the monitor.
/// stage_index: The active growth stage, as an index into the crop calendar
/// sample_interval_ms: Time between sampling cycles
/// alert_window_ms: Minimum time between repeated notifications
/// frame_check: Whether NPK responses are fully validated
/// telemetry_enabled: Whether snapshots are offered to the telemetry sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Preferences {
    pub stage_index: usize,
    pub sample_interval_ms: u32,
    pub alert_window_ms: u64,
    pub frame_check: FrameCheck,
    pub telemetry_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            stage_index: 0,                         // Germination
            sample_interval_ms: SAMPLE_INTERVAL_MS, // 30s
            alert_window_ms: ALERT_WINDOW_MS,       // 1 minute
            frame_check: FrameCheck::Lenient,
            telemetry_enabled: true,
        }
    }
}

impl Preferences {
    /// Applies an external stage selection; out-of-range input selects the first stage
    pub fn select_stage(&mut self, index: i32) {
        self.stage_index = stage_index(index);
    }

    /// The active stage; an out-of-range stored index selects the first stage
    pub fn stage(&self) -> &'static GrowthStage {
        GROWTH_STAGES
            .get(self.stage_index)
            .unwrap_or(&GROWTH_STAGES[0])
    }

    /// Resets an out-of-range stored index to the first stage
    pub fn normalize(&mut self) {
        if self.stage_index >= GROWTH_STAGES.len() {
            self.stage_index = 0;
        }
    }

    /// Steps forwards or backwards through the crop calendar, wrapping around
    /// param forward: Whether to step forward; If false, step backwards
    pub fn step_stage(&mut self, forward: bool) {
        self.normalize();
        let len = GROWTH_STAGES.len();
        self.stage_index = if forward {
            (self.stage_index + 1) % len
        } else {
            (self.stage_index + len - 1) % len
        };
    }

    /// Formats the active stage: "LABEL 70-90%"
    pub fn format_stage(&self) -> String<20> {
        let stage = self.stage();
        let mut s: String<20> = String::new();
        let _ = uwrite!(
            s,
            "{} {}-{}%",
            stage.label,
            stage.min_moisture_pct,
            stage.max_moisture_pct
        );
        s
    }
}
