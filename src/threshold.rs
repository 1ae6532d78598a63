//! Threshold evaluation
//!
//! Every rule is evaluated on its own, so one cycle can raise several
//! findings. A channel whose health flag is down never raises a finding:
//! a sensor known to be broken must not page anybody.

use heapless::{String, Vec};
use ufmt::uwrite;

use crate::report::write_tenths;
use crate::snapshot::SensorSnapshot;
use crate::stage::GrowthStage;

pub const TEMPERATURE_MIN_C: f32 = 20.0;
pub const TEMPERATURE_MAX_C: f32 = 35.0;
pub const NITROGEN_MIN_MG_KG: u16 = 150;
pub const PHOSPHORUS_MIN_MG_KG: u16 = 20;
pub const POTASSIUM_MIN_MG_KG: u16 = 100;

pub const MESSAGE_CAPACITY: usize = 96;
pub const MAX_FINDINGS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Severity {
    Ok,
    Warn,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FindingChannel {
    Temperature,
    SoilMoisture,
    Nitrogen,
    Phosphorus,
    Potassium,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThresholdFinding {
    pub severity: Severity,
    pub channel: FindingChannel,
    pub message: String<MESSAGE_CAPACITY>,
}

pub type Findings = Vec<ThresholdFinding, MAX_FINDINGS>;

fn push(findings: &mut Findings, channel: FindingChannel, message: String<MESSAGE_CAPACITY>) {
    let finding = ThresholdFinding {
        severity: Severity::Critical,
        channel,
        message,
    };
    if findings.push(finding).is_err() {
        error!("threshold: finding list full, dropping {:?}", channel);
    }
}

/// Evaluates one snapshot against the fixed limits and the stage's moisture band
pub fn evaluate(snapshot: &SensorSnapshot, stage: &GrowthStage) -> Findings {
    let mut findings = Findings::new();

    if snapshot.health.climate {
        check_temperature(snapshot.temperature_c, &mut findings);
    }
    if snapshot.health.soil {
        check_moisture(snapshot.soil_moisture_pct, stage, &mut findings);
    }
    if snapshot.health.npk {
        check_nutrients(snapshot, &mut findings);
    }

    findings
}

fn check_temperature(temperature_c: f32, findings: &mut Findings) {
    let mut msg: String<MESSAGE_CAPACITY> = String::new();
    if temperature_c < TEMPERATURE_MIN_C {
        let _ = uwrite!(msg, "Low temperature ");
        write_tenths(&mut msg, temperature_c);
        let _ = uwrite!(
            msg,
            "C (<20C): raise water level to protect the crop"
        );
        push(findings, FindingChannel::Temperature, msg);
    } else if temperature_c > TEMPERATURE_MAX_C {
        let _ = uwrite!(msg, "High temperature ");
        write_tenths(&mut msg, temperature_c);
        let _ = uwrite!(msg, "C (>35C): add water to cool the paddy");
        push(findings, FindingChannel::Temperature, msg);
    }
}

fn check_moisture(moisture_pct: u8, stage: &GrowthStage, findings: &mut Findings) {
    let mut msg: String<MESSAGE_CAPACITY> = String::new();
    if moisture_pct < stage.min_moisture_pct {
        let _ = uwrite!(
            msg,
            "Dry soil {}% < {}-{}% ({}): irrigate urgently",
            moisture_pct,
            stage.min_moisture_pct,
            stage.max_moisture_pct,
            stage.label
        );
        push(findings, FindingChannel::SoilMoisture, msg);
    } else if moisture_pct > stage.max_moisture_pct {
        let _ = uwrite!(
            msg,
            "Saturated soil {}% > {}-{}% ({}): open drainage",
            moisture_pct,
            stage.min_moisture_pct,
            stage.max_moisture_pct,
            stage.label
        );
        push(findings, FindingChannel::SoilMoisture, msg);
    }
}

fn check_nutrients(snapshot: &SensorSnapshot, findings: &mut Findings) {
    let rules = [
        (
            FindingChannel::Nitrogen,
            "N",
            snapshot.nitrogen_mg_kg,
            NITROGEN_MIN_MG_KG,
            "apply urea",
        ),
        (
            FindingChannel::Phosphorus,
            "P",
            snapshot.phosphorus_mg_kg,
            PHOSPHORUS_MIN_MG_KG,
            "apply superphosphate",
        ),
        (
            FindingChannel::Potassium,
            "K",
            snapshot.potassium_mg_kg,
            POTASSIUM_MIN_MG_KG,
            "apply KCl",
        ),
    ];

    for (channel, symbol, value, minimum, advice) in rules {
        if value < minimum {
            let mut msg: String<MESSAGE_CAPACITY> = String::new();
            let _ = uwrite!(
                msg,
                "Low {} {} mg/kg (<{}): {}",
                symbol,
                value,
                minimum,
                advice
            );
            push(findings, channel, msg);
        }
    }
}

/// Highest severity among `findings`, `Ok` when there are none
pub fn worst_severity(findings: &[ThresholdFinding]) -> Severity {
    findings
        .iter()
        .map(|f| f.severity)
        .max()
        .unwrap_or(Severity::Ok)
}

pub fn has_critical(findings: &[ThresholdFinding]) -> bool {
    worst_severity(findings) == Severity::Critical
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ChannelHealth;
    use crate::stage::select_stage;

    fn healthy() -> SensorSnapshot {
        SensorSnapshot {
            temperature_c: 28.0,
            relative_humidity_pct: 80.0,
            soil_moisture_pct: 80,
            nitrogen_mg_kg: 200,
            phosphorus_mg_kg: 30,
            potassium_mg_kg: 150,
            health: ChannelHealth {
                climate: true,
                soil: true,
                npk: true,
            },
        }
    }

    #[test]
    fn nominal_snapshot_has_no_findings() {
        let findings = evaluate(&healthy(), select_stage(1));
        assert!(findings.is_empty());
        assert_eq!(worst_severity(&findings), Severity::Ok);
    }

    #[test]
    fn vegetative_stage_moisture_band() {
        let stage = select_stage(1);
        assert_eq!(stage.label, "VEGETATIVA");

        let mut snapshot = healthy();
        snapshot.soil_moisture_pct = 65;
        let findings = evaluate(&snapshot, stage);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].channel, FindingChannel::SoilMoisture);
        assert_eq!(
            findings[0].message.as_str(),
            "Dry soil 65% < 70-90% (VEGETATIVA): irrigate urgently"
        );

        snapshot.soil_moisture_pct = 80;
        assert!(evaluate(&snapshot, stage).is_empty());
    }

    #[test]
    fn saturated_soil_recommends_drainage() {
        let mut snapshot = healthy();
        snapshot.soil_moisture_pct = 95;
        let findings = evaluate(&snapshot, select_stage(3));
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("drainage"));
        assert!(findings[0].message.contains("MATURACAO"));
    }

    #[test]
    fn temperature_limits_are_exclusive() {
        let stage = select_stage(1);
        let mut snapshot = healthy();

        snapshot.temperature_c = 20.0;
        assert!(evaluate(&snapshot, stage).is_empty());
        snapshot.temperature_c = 35.0;
        assert!(evaluate(&snapshot, stage).is_empty());

        snapshot.temperature_c = 19.5;
        let findings = evaluate(&snapshot, stage);
        assert_eq!(findings[0].channel, FindingChannel::Temperature);
        assert!(findings[0].message.starts_with("Low temperature 19.5C"));

        snapshot.temperature_c = 36.2;
        let findings = evaluate(&snapshot, stage);
        assert!(findings[0].message.starts_with("High temperature 36.2C"));
    }

    #[test]
    fn nutrient_rules_fire_independently() {
        let mut snapshot = healthy();
        snapshot.nitrogen_mg_kg = 149;
        snapshot.phosphorus_mg_kg = 19;
        snapshot.potassium_mg_kg = 99;
        let findings = evaluate(&snapshot, select_stage(1));
        let channels: std::vec::Vec<_> = findings.iter().map(|f| f.channel).collect();
        assert_eq!(
            channels,
            [
                FindingChannel::Nitrogen,
                FindingChannel::Phosphorus,
                FindingChannel::Potassium
            ]
        );
        assert!(findings[0].message.contains("urea"));
        assert!(findings[1].message.contains("superphosphate"));
        assert!(findings[2].message.contains("KCl"));
    }

    #[test]
    fn nutrient_limits_are_inclusive_minimums() {
        let mut snapshot = healthy();
        snapshot.nitrogen_mg_kg = 150;
        snapshot.phosphorus_mg_kg = 20;
        snapshot.potassium_mg_kg = 100;
        assert!(evaluate(&snapshot, select_stage(1)).is_empty());
    }

    #[test]
    fn unhealthy_channels_raise_nothing() {
        let snapshot = SensorSnapshot {
            temperature_c: 5.0,
            soil_moisture_pct: 0,
            nitrogen_mg_kg: 0,
            phosphorus_mg_kg: 0,
            potassium_mg_kg: 0,
            ..SensorSnapshot::default()
        };
        assert!(evaluate(&snapshot, select_stage(0)).is_empty());
    }

    #[test]
    fn all_rules_can_fire_together() {
        let snapshot = SensorSnapshot {
            temperature_c: 10.0,
            relative_humidity_pct: 50.0,
            soil_moisture_pct: 10,
            nitrogen_mg_kg: 0,
            phosphorus_mg_kg: 0,
            potassium_mg_kg: 0,
            health: ChannelHealth {
                climate: true,
                soil: true,
                npk: true,
            },
        };
        let findings = evaluate(&snapshot, select_stage(2));
        assert_eq!(findings.len(), 5);
        assert!(has_critical(&findings));
    }
}
