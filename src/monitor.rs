//! The monitor session.
//!
//! Owns every piece of state that lives across cycles (calibration profile,
//! snapshot, alert window, preferences) and drives one sampling cycle at a
//! time: read every channel, evaluate thresholds, gate alerts, publish.
//!
//! Nothing that goes wrong inside a cycle escapes it. A failed channel only
//! clears its health flag and is retried on the next cycle.

use crate::alert::{AlertDispatchGate, AlertWindowState, GateDecision, Notifier};
use crate::calibration::{CalibrationProfile, OperatorGate};
use crate::error::MonitorError;
use crate::preferences::Preferences;
use crate::report::{render_status, StatusReport};
use crate::sensors::FieldSensors;
use crate::snapshot::{ChannelHealth, SensorSnapshot};
use crate::stage::GrowthStage;
use crate::threshold::{evaluate, Findings};
use crate::timer::CycleTimer;

/// Receives one snapshot per cycle (cloud dashboard)
pub trait Telemetry {
    type Error;

    /// Whether the connectivity collaborator currently has a link
    fn is_ready(&mut self) -> bool;

    fn publish(&mut self, snapshot: &SensorSnapshot) -> Result<(), Self::Error>;
}

/// Telemetry sink for deployments without a data link
pub struct NoTelemetry;

impl Telemetry for NoTelemetry {
    type Error = core::convert::Infallible;

    fn is_ready(&mut self) -> bool {
        false
    }

    fn publish(&mut self, _snapshot: &SensorSnapshot) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Sampling,
    /// Operator calibration in progress; sampling cycles are refused
    Calibrating,
}

/// Operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    SelfTest,
    Calibrate,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    SelfTest(ChannelHealth),
    Calibrated(CalibrationProfile),
    Status(StatusReport),
}

/// Summary of one sampling cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub health: ChannelHealth,
    pub findings: Findings,
    pub decision: GateDecision,
    pub published: bool,
}

pub struct Monitor<H, N, T> {
    sensors: H,
    notifier: N,
    telemetry: T,
    profile: CalibrationProfile,
    snapshot: SensorSnapshot,
    gate: AlertDispatchGate,
    preferences: Preferences,
    timer: CycleTimer,
    mode: Mode,
}

impl<H, N, T> Monitor<H, N, T>
where
    H: FieldSensors,
    N: Notifier,
    T: Telemetry,
{
    pub fn new(sensors: H, notifier: N, telemetry: T) -> Self {
        Self::with_profile(sensors, notifier, telemetry, CalibrationProfile::default())
    }

    /// Starts from a previously stored calibration
    pub fn with_profile(
        mut sensors: H,
        notifier: N,
        telemetry: T,
        profile: CalibrationProfile,
    ) -> Self {
        let preferences = Preferences::default();
        sensors.set_frame_check(preferences.frame_check);
        Self {
            sensors,
            notifier,
            telemetry,
            profile,
            snapshot: SensorSnapshot::default(),
            gate: AlertDispatchGate::new(preferences.alert_window_ms),
            timer: CycleTimer::new(preferences.sample_interval_ms),
            preferences,
            mode: Mode::Sampling,
        }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn set_preferences(&mut self, mut preferences: Preferences) {
        preferences.normalize();
        self.sensors.set_frame_check(preferences.frame_check);
        self.gate.set_window(preferences.alert_window_ms);
        self.timer.set_interval(preferences.sample_interval_ms);
        self.preferences = preferences;
    }

    /// External stage-selection input
    pub fn select_stage(&mut self, index: i32) {
        self.preferences.select_stage(index);
        info!("monitor: stage {}", self.stage().label);
    }

    pub fn stage(&self) -> &'static GrowthStage {
        self.preferences.stage()
    }

    pub fn snapshot(&self) -> &SensorSnapshot {
        &self.snapshot
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn alert_state(&self) -> AlertWindowState {
        self.gate.state()
    }

    /// Runs a cycle if one is due at `now_ms`
    pub fn tick(&mut self, now_ms: u64) -> Option<CycleReport> {
        if !self.timer.is_due(now_ms) {
            return None;
        }
        self.run_cycle(now_ms).ok()
    }

    /// One complete sampling cycle
    pub fn run_cycle(&mut self, now_ms: u64) -> Result<CycleReport, MonitorError> {
        if self.mode == Mode::Calibrating {
            warn!("monitor: cycle refused during calibration");
            return Err(MonitorError::Calibrating);
        }
        debug!("monitor: cycle at {} ms", now_ms);

        self.refresh_snapshot();
        let health = self.snapshot.health;
        if health.all_failed() {
            warn!("monitor: every channel is down");
        }

        let findings = evaluate(&self.snapshot, self.stage());
        let decision = self.gate.dispatch(&findings, now_ms, &mut self.notifier);
        let published = self.publish();

        self.timer.mark(now_ms);
        info!(
            "monitor: cycle done, health={:?} findings={} decision={:?}",
            health,
            findings.len(),
            decision
        );

        Ok(CycleReport {
            health,
            findings,
            decision,
            published,
        })
    }

    fn refresh_snapshot(&mut self) {
        let climate = self.sensors.read_climate();
        self.snapshot.record_climate(climate);

        let soil = self.sensors.read_soil(&self.profile);
        self.snapshot.record_soil(soil);

        let npk = self.sensors.read_npk();
        self.snapshot.record_npk(npk);
    }

    fn publish(&mut self) -> bool {
        if !self.preferences.telemetry_enabled || !self.telemetry.is_ready() {
            return false;
        }
        match self.telemetry.publish(&self.snapshot) {
            Ok(()) => true,
            Err(_) => {
                warn!("monitor: telemetry publish failed");
                false
            }
        }
    }

    /// Reads every channel once and reports which ones answered.
    /// Alert state is not touched.
    pub fn self_test(&mut self) -> ChannelHealth {
        self.refresh_snapshot();
        let health = self.snapshot.health;
        info!("monitor: self-test {:?}", health);
        health
    }

    /// Operator two-point calibration.
    ///
    /// Blocks on `gate` for as long as the operator takes. On rejection the
    /// current profile stays in force.
    pub fn calibrate<G: OperatorGate>(
        &mut self,
        gate: &mut G,
    ) -> Result<CalibrationProfile, MonitorError> {
        if self.mode == Mode::Calibrating {
            return Err(MonitorError::Calibrating);
        }
        self.mode = Mode::Calibrating;
        let result = self.sensors.calibrate_soil(gate, &mut self.profile);
        self.mode = Mode::Sampling;
        Ok(result?)
    }

    pub fn status(&self) -> StatusReport {
        render_status(
            &self.snapshot,
            self.stage(),
            &self.profile,
            &self.gate.state(),
        )
    }

    pub fn handle<G: OperatorGate>(
        &mut self,
        command: Command,
        gate: &mut G,
    ) -> Result<CommandOutcome, MonitorError> {
        match command {
            Command::SelfTest => Ok(CommandOutcome::SelfTest(self.self_test())),
            Command::Calibrate => self.calibrate(gate).map(CommandOutcome::Calibrated),
            Command::Status => Ok(CommandOutcome::Status(self.status())),
        }
    }
}
