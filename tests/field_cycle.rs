//! Drives whole sampling cycles against scripted field conditions.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use paddy_monitor::alert::{GateDecision, Notifier};
use paddy_monitor::calibration::{CalibrationPhase, CalibrationProfile, OperatorGate};
use paddy_monitor::npk::NpkReading;
use paddy_monitor::sensors::{Climate, FieldSensors};
use paddy_monitor::threshold::{FindingChannel, Severity};
use paddy_monitor::{
    CalibrationError, Command, CommandOutcome, Monitor, NpkError, SensorError, Telemetry,
};

/// One scripted cycle of field conditions
#[derive(Clone, Copy)]
struct Field {
    climate: Result<Climate, SensorError>,
    soil: Result<u8, SensorError>,
    npk: Result<NpkReading, NpkError>,
}

const HEALTHY_NPK: NpkReading = NpkReading {
    nitrogen_mg_kg: 180,
    phosphorus_mg_kg: 30,
    potassium_mg_kg: 120,
};

fn paddy(soil_pct: u8) -> Field {
    Field {
        climate: Ok(Climate {
            temperature_c: 28.0,
            relative_humidity_pct: 80.0,
        }),
        soil: Ok(soil_pct),
        npk: Ok(HEALTHY_NPK),
    }
}

fn dead_field() -> Field {
    Field {
        climate: Err(SensorError::ClimateUnavailable),
        soil: Err(SensorError::SoilUnavailable),
        npk: Err(NpkError::Timeout {
            received: 0,
            expected: 19,
        }),
    }
}

#[derive(Clone, Default)]
struct ScriptedField {
    script: Rc<RefCell<VecDeque<Field>>>,
    current: Option<Field>,
}

impl ScriptedField {
    fn push(&self, field: Field) {
        self.script.borrow_mut().push_back(field);
    }

    fn current(&mut self) -> Field {
        if let Some(next) = self.script.borrow_mut().pop_front() {
            self.current = Some(next);
        }
        self.current.unwrap_or_else(dead_field)
    }
}

impl FieldSensors for ScriptedField {
    fn read_climate(&mut self) -> Result<Climate, SensorError> {
        // climate is read first; it advances the script for the cycle
        self.current().climate
    }

    fn read_soil(&mut self, _profile: &CalibrationProfile) -> Result<u8, SensorError> {
        self.current.map_or(Err(SensorError::SoilUnavailable), |f| f.soil)
    }

    fn read_npk(&mut self) -> Result<NpkReading, NpkError> {
        self.current.map_or(Err(NpkError::Link), |f| f.npk)
    }

    fn calibrate_soil<G: OperatorGate>(
        &mut self,
        gate: &mut G,
        profile: &mut CalibrationProfile,
    ) -> Result<CalibrationProfile, CalibrationError> {
        gate.wait_for(CalibrationPhase::Dry, &mut NoDelay);
        gate.wait_for(CalibrationPhase::Wet, &mut NoDelay);
        profile.apply(3000, 1200)?;
        Ok(*profile)
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

#[derive(Clone, Default)]
struct Outbox {
    sent: Rc<RefCell<Vec<String>>>,
}

impl Notifier for Outbox {
    type Error = ();

    fn notify(&mut self, message: &str, _severity: Severity) -> Result<(), ()> {
        self.sent.borrow_mut().push(message.to_string());
        Ok(())
    }
}

/// Telemetry link that refuses every publish
struct BrokenLink {
    attempts: Rc<RefCell<u32>>,
}

impl Telemetry for BrokenLink {
    type Error = &'static str;

    fn is_ready(&mut self) -> bool {
        true
    }

    fn publish(
        &mut self,
        _snapshot: &paddy_monitor::snapshot::SensorSnapshot,
    ) -> Result<(), Self::Error> {
        *self.attempts.borrow_mut() += 1;
        Err("link down")
    }
}

struct Operator {
    phases: Vec<CalibrationPhase>,
}

impl OperatorGate for Operator {
    fn wait_for<D: DelayNs>(&mut self, phase: CalibrationPhase, _delay: &mut D) {
        self.phases.push(phase);
    }
}

fn monitor() -> (
    Monitor<ScriptedField, Outbox, BrokenLink>,
    ScriptedField,
    Outbox,
    Rc<RefCell<u32>>,
) {
    let sensors = ScriptedField::default();
    let outbox = Outbox::default();
    let attempts = Rc::new(RefCell::new(0));
    let monitor = Monitor::new(
        sensors.clone(),
        outbox.clone(),
        BrokenLink {
            attempts: attempts.clone(),
        },
    );
    (monitor, sensors, outbox, attempts)
}

#[test]
fn dry_soil_alert_fires_suppresses_and_rearms() {
    let (mut monitor, sensors, outbox, _) = monitor();
    monitor.select_stage(1); // VEGETATIVA 70-90%

    let mut decisions = Vec::new();
    for (now, soil) in [(0, 65), (30_000, 65), (61_000, 65), (70_000, 80), (70_001, 65)] {
        sensors.push(paddy(soil));
        let report = monitor.run_cycle(now).unwrap();
        decisions.push(report.decision);
    }

    assert_eq!(
        decisions,
        vec![
            GateDecision::Fire,
            GateDecision::Suppress,
            GateDecision::Fire,
            GateDecision::Clear,
            GateDecision::Fire,
        ]
    );
    let sent = outbox.sent.borrow();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|m| m.starts_with("Dry soil 65%")));
}

#[test]
fn in_band_cycle_has_no_findings() {
    let (mut monitor, sensors, outbox, _) = monitor();
    monitor.select_stage(1);
    sensors.push(paddy(80));

    let report = monitor.run_cycle(0).unwrap();
    assert!(report.health.all_healthy());
    assert!(report.findings.is_empty());
    assert_eq!(report.decision, GateDecision::Clear);
    assert!(outbox.sent.borrow().is_empty());
}

#[test]
fn total_sensor_failure_reports_nothing_and_does_not_alert() {
    let (mut monitor, sensors, outbox, _) = monitor();
    sensors.push(dead_field());

    let report = monitor.run_cycle(0).unwrap();
    assert!(report.health.all_failed());
    assert!(report.findings.is_empty());
    assert_eq!(report.decision, GateDecision::Clear);
    assert!(outbox.sent.borrow().is_empty());
}

#[test]
fn npk_timeout_keeps_last_good_values() {
    let (mut monitor, sensors, _, _) = monitor();
    monitor.select_stage(1);
    sensors.push(paddy(80));
    monitor.run_cycle(0).unwrap();

    let mut stale = paddy(80);
    stale.npk = Err(NpkError::Timeout {
        received: 18,
        expected: 19,
    });
    sensors.push(stale);
    let report = monitor.run_cycle(30_000).unwrap();

    assert!(!report.health.npk);
    assert!(report.health.climate && report.health.soil);
    assert_eq!(monitor.snapshot().nitrogen_mg_kg, 180);
    assert_eq!(monitor.snapshot().potassium_mg_kg, 120);
    // stale nutrient values are not re-evaluated
    assert!(report
        .findings
        .iter()
        .all(|f| f.channel != FindingChannel::Nitrogen));
}

#[test]
fn low_nutrients_are_reported_per_element() {
    let (mut monitor, sensors, outbox, _) = monitor();
    monitor.select_stage(1);
    let mut poor = paddy(80);
    poor.npk = Ok(NpkReading {
        nitrogen_mg_kg: 100,
        phosphorus_mg_kg: 10,
        potassium_mg_kg: 50,
    });
    sensors.push(poor);

    let report = monitor.run_cycle(0).unwrap();
    let channels: Vec<_> = report.findings.iter().map(|f| f.channel).collect();
    assert_eq!(
        channels,
        vec![
            FindingChannel::Nitrogen,
            FindingChannel::Phosphorus,
            FindingChannel::Potassium
        ]
    );
    assert_eq!(outbox.sent.borrow().len(), 1);
    assert_eq!(outbox.sent.borrow()[0].lines().count(), 3);
}

#[test]
fn telemetry_failure_is_not_fatal() {
    let (mut monitor, sensors, _, attempts) = monitor();
    sensors.push(paddy(80));

    let first = monitor.run_cycle(0).unwrap();
    let second = monitor.run_cycle(30_000).unwrap();

    assert!(!first.published);
    assert!(!second.published);
    assert_eq!(*attempts.borrow(), 2);
}

#[test]
fn operator_commands() {
    let (mut monitor, sensors, _, _) = monitor();
    sensors.push(paddy(80));
    let mut operator = Operator { phases: Vec::new() };

    match monitor.handle(Command::SelfTest, &mut operator) {
        Ok(CommandOutcome::SelfTest(health)) => assert!(health.all_healthy()),
        other => panic!("unexpected {:?}", other),
    }
    // self-test never touches the alert window
    assert!(!monitor.alert_state().alert_currently_active);

    match monitor.handle(Command::Calibrate, &mut operator) {
        Ok(CommandOutcome::Calibrated(profile)) => {
            assert_eq!(profile.dry_reference(), 3000);
            assert_eq!(profile.wet_reference(), 1200);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(monitor.profile().is_calibrated());
    assert_eq!(
        operator.phases,
        vec![CalibrationPhase::Dry, CalibrationPhase::Wet]
    );

    match monitor.handle(Command::Status, &mut operator) {
        Ok(CommandOutcome::Status(report)) => {
            assert!(report.contains("Cal dry 3000 wet 1200"));
        }
        other => panic!("unexpected {:?}", other),
    }
}
