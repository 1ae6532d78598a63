use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::error::CalibrationError;
use crate::moisture::{SoilAdc, SoilProbe};
use crate::timer::OPERATOR_POLL_MS;

pub const MIN_CALIBRATION_SPAN: u16 = 500;
pub const DEFAULT_DRY_REFERENCE: u16 = 3200;
pub const DEFAULT_WET_REFERENCE: u16 = 1300;

pub const CALIBRATION_SETTLE_MS: u32 = 500;
pub const CALIBRATION_SAMPLES: u8 = 10;
pub const CALIBRATION_SAMPLE_INTERVAL_MS: u32 = 100;

/// Two reference ADC points for the soil probe.
///
/// The probe reads lower when wetter, so `dry_reference` maps to 0% and
/// `wet_reference` to 100%. Both constructors enforce
/// `dry - wet > MIN_CALIBRATION_SPAN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationProfile {
    dry_reference: u16,
    wet_reference: u16,
    is_calibrated: bool,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        CalibrationProfile {
            dry_reference: DEFAULT_DRY_REFERENCE,
            wet_reference: DEFAULT_WET_REFERENCE,
            is_calibrated: false,
        }
    }
}

impl CalibrationProfile {
    /// Builds a calibrated profile from measured references
    pub fn from_references(dry: u16, wet: u16) -> Result<Self, CalibrationError> {
        Self::validate(dry, wet)?;
        Ok(CalibrationProfile {
            dry_reference: dry,
            wet_reference: wet,
            is_calibrated: true,
        })
    }

    /// Rejects inverted pairs and pairs without enough dynamic range
    pub fn validate(dry: u16, wet: u16) -> Result<(), CalibrationError> {
        if dry <= wet || dry - wet <= MIN_CALIBRATION_SPAN {
            return Err(CalibrationError::Rejected {
                dry,
                wet,
                min_span: MIN_CALIBRATION_SPAN,
            });
        }
        Ok(())
    }

    /// Replaces the references. On rejection `self` is left untouched.
    pub fn apply(&mut self, dry: u16, wet: u16) -> Result<(), CalibrationError> {
        *self = Self::from_references(dry, wet)?;
        Ok(())
    }

    pub fn dry_reference(&self) -> u16 {
        self.dry_reference
    }

    pub fn wet_reference(&self) -> u16 {
        self.wet_reference
    }

    pub fn is_calibrated(&self) -> bool {
        self.is_calibrated
    }

    /// Linear map from raw ADC to moisture percent, rounded and clamped to 0..=100
    pub fn percent(&self, raw: u16) -> u8 {
        let dry = i32::from(self.dry_reference);
        let wet = i32::from(self.wet_reference);
        let span = dry - wet;
        if span <= 0 {
            return 0;
        }
        // round(x / span) == floor((2x + span) / 2span)
        let scaled = (dry - i32::from(raw)) * 100;
        let pct = (2 * scaled + span).div_euclid(2 * span);
        pct.clamp(0, 100) as u8
    }
}

/// See [`CalibrationProfile::percent`]
pub fn read_percent(raw: u16, profile: &CalibrationProfile) -> u8 {
    profile.percent(raw)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationPhase {
    /// Probe in dry soil (or air)
    Dry,
    /// Probe in saturated soil
    Wet,
}

/// Blocks until the operator confirms the probe is placed for `phase`
pub trait OperatorGate {
    fn wait_for<D: DelayNs>(&mut self, phase: CalibrationPhase, delay: &mut D);
}

/// Operator confirms with a push button: press, then release
pub struct ButtonGate<B> {
    button: B,
}

impl<B: InputPin> ButtonGate<B> {
    pub fn new(button: B) -> Self {
        Self { button }
    }

    pub fn is_pressed(&mut self) -> bool {
        self.button.is_high().unwrap_or(false)
    }
}

impl<B: InputPin> OperatorGate for ButtonGate<B> {
    fn wait_for<D: DelayNs>(&mut self, phase: CalibrationPhase, delay: &mut D) {
        info!("calibration: waiting for operator ({:?})", phase);
        while !self.is_pressed() {
            delay.delay_ms(OPERATOR_POLL_MS);
        }
        while self.is_pressed() {
            delay.delay_ms(OPERATOR_POLL_MS);
        }
    }
}

/// Runs the two-phase operator calibration.
///
/// Each phase waits for the operator, then averages
/// [`CALIBRATION_SAMPLES`] readings after a [`CALIBRATION_SETTLE_MS`] settle.
/// On success `profile` is replaced and returned; on any failure it is left
/// as it was.
pub fn calibrate<A, P, G, D>(
    probe: &mut SoilProbe<A, P>,
    gate: &mut G,
    delay: &mut D,
    profile: &mut CalibrationProfile,
) -> Result<CalibrationProfile, CalibrationError>
where
    A: SoilAdc,
    P: OutputPin,
    G: OperatorGate,
    D: DelayNs,
{
    let mut sample = |phase: CalibrationPhase, delay: &mut D| {
        gate.wait_for(phase, delay);
        let raw = probe
            .read_average(
                delay,
                CALIBRATION_SETTLE_MS,
                CALIBRATION_SAMPLES,
                CALIBRATION_SAMPLE_INTERVAL_MS,
            )
            .map_err(|_| CalibrationError::SensorUnavailable)?;
        info!("calibration: {:?} reference = {}", phase, raw);
        Ok::<u16, CalibrationError>(raw)
    };

    let dry = sample(CalibrationPhase::Dry, &mut *delay)?;
    let wet = sample(CalibrationPhase::Wet, &mut *delay)?;

    if let Err(e) = profile.apply(dry, wet) {
        warn!("calibration: rejected dry={} wet={}", dry, wet);
        return Err(e);
    }
    info!("calibration: accepted dry={} wet={}", dry, wet);
    Ok(*profile)
}
