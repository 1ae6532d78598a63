use heapless::String;
use ufmt::uwrite;

use crate::alert::AlertWindowState;
use crate::calibration::CalibrationProfile;
use crate::snapshot::SensorSnapshot;
use crate::stage::GrowthStage;

pub const STATUS_CAPACITY: usize = 256;

pub type StatusReport = String<STATUS_CAPACITY>;

/// Writes `value` with one decimal place, since ufmt has no float support
pub fn write_tenths<const N: usize>(out: &mut String<N>, value: f32) {
    let scaled = value * 10.0;
    let tenths = if scaled >= 0.0 {
        (scaled + 0.5) as i32
    } else {
        (scaled - 0.5) as i32
    };
    if tenths < 0 {
        let _ = out.push('-');
    }
    let abs = tenths.unsigned_abs();
    let _ = uwrite!(out, "{}.{}", abs / 10, abs % 10);
}

fn health_tag(healthy: bool) -> &'static str {
    if healthy {
        "ok"
    } else {
        "FAIL"
    }
}

/// Answer to the operator's "report status" command.
///
/// One line per concern: climate, soil, nutrients, stage, calibration, alert.
/// Values of a failed channel are the last good ones and are tagged FAIL.
pub fn render_status(
    snapshot: &SensorSnapshot,
    stage: &GrowthStage,
    profile: &CalibrationProfile,
    alert: &AlertWindowState,
) -> StatusReport {
    let mut out = StatusReport::new();

    let _ = uwrite!(out, "T ");
    write_tenths(&mut out, snapshot.temperature_c);
    let _ = uwrite!(out, "C RH ");
    write_tenths(&mut out, snapshot.relative_humidity_pct);
    let _ = uwrite!(out, "% {}\n", health_tag(snapshot.health.climate));

    let _ = uwrite!(
        out,
        "Soil {}% {}\n",
        snapshot.soil_moisture_pct,
        health_tag(snapshot.health.soil)
    );

    let _ = uwrite!(
        out,
        "N {} P {} K {} mg/kg {}\n",
        snapshot.nitrogen_mg_kg,
        snapshot.phosphorus_mg_kg,
        snapshot.potassium_mg_kg,
        health_tag(snapshot.health.npk)
    );

    let _ = uwrite!(
        out,
        "Stage {} {}-{}%\n",
        stage.label,
        stage.min_moisture_pct,
        stage.max_moisture_pct
    );

    let _ = uwrite!(
        out,
        "Cal dry {} wet {} {}\n",
        profile.dry_reference(),
        profile.wet_reference(),
        if profile.is_calibrated() {
            "calibrated"
        } else {
            "default"
        }
    );

    if alert.alert_currently_active {
        let _ = uwrite!(out, "Alert active since {} ms", alert.last_fired_at_ms);
    } else {
        let _ = uwrite!(out, "Alert idle");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ChannelHealth;
    use crate::stage::select_stage;

    #[test]
    fn tenths_formatting() {
        let mut s: String<16> = String::new();
        write_tenths(&mut s, 27.46);
        assert_eq!(s.as_str(), "27.5");

        let mut s: String<16> = String::new();
        write_tenths(&mut s, -3.04);
        assert_eq!(s.as_str(), "-3.0");

        let mut s: String<16> = String::new();
        write_tenths(&mut s, 0.0);
        assert_eq!(s.as_str(), "0.0");
    }

    #[test]
    fn status_lists_every_concern() {
        let snapshot = SensorSnapshot {
            temperature_c: 27.5,
            relative_humidity_pct: 81.0,
            soil_moisture_pct: 76,
            nitrogen_mg_kg: 150,
            phosphorus_mg_kg: 30,
            potassium_mg_kg: 100,
            health: ChannelHealth {
                climate: true,
                soil: true,
                npk: false,
            },
        };
        let alert = AlertWindowState {
            last_fired_at_ms: 61_000,
            alert_currently_active: true,
        };
        let report = render_status(
            &snapshot,
            select_stage(1),
            &CalibrationProfile::default(),
            &alert,
        );

        assert_eq!(
            report.as_str(),
            "T 27.5C RH 81.0% ok\n\
             Soil 76% ok\n\
             N 150 P 30 K 100 mg/kg FAIL\n\
             Stage VEGETATIVA 70-90%\n\
             Cal dry 3200 wet 1300 default\n\
             Alert active since 61000 ms"
        );
    }
}
