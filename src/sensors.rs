use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};

use crate::calibration::{calibrate, CalibrationProfile, OperatorGate};
use crate::error::{CalibrationError, NpkError, SensorError};
use crate::moisture::{SoilAdc, SoilProbe};
use crate::npk::{FrameCheck, NpkClient, NpkReading};

/// Ambient temperature and humidity from the climate sensor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Climate {
    pub temperature_c: f32,
    pub relative_humidity_pct: f32,
}

impl Climate {
    /// Rejects NaN and values no field sensor can report
    pub fn is_plausible(&self) -> bool {
        (-40.0f32..=85.0).contains(&self.temperature_c)
            && (0.0f32..=100.0).contains(&self.relative_humidity_pct)
    }
}

/// Temperature/humidity sensor
pub trait ClimateSensor {
    fn read_climate<D: DelayNs>(&mut self, delay: &mut D) -> Result<Climate, SensorError>;
}

/// Everything a sampling cycle reads from.
///
/// The monitor only talks to hardware through this trait.
pub trait FieldSensors {
    fn read_climate(&mut self) -> Result<Climate, SensorError>;

    fn read_soil(&mut self, profile: &CalibrationProfile) -> Result<u8, SensorError>;

    fn read_npk(&mut self) -> Result<NpkReading, NpkError>;

    fn calibrate_soil<G: OperatorGate>(
        &mut self,
        gate: &mut G,
        profile: &mut CalibrationProfile,
    ) -> Result<CalibrationProfile, CalibrationError>;

    fn set_frame_check(&mut self, _check: FrameCheck) {}
}

/// The board's sensor wiring: climate sensor, soil probe and NPK transceiver
/// sharing one delay provider
pub struct Hardware<C, A, P, S, E, D> {
    pub climate: C,
    pub soil: SoilProbe<A, P>,
    pub npk: NpkClient<S, E>,
    pub delay: D,
}

impl<C, A, P, S, E, D> FieldSensors for Hardware<C, A, P, S, E, D>
where
    C: ClimateSensor,
    A: SoilAdc,
    P: OutputPin,
    S: Read + Write + ReadReady,
    E: OutputPin,
    D: DelayNs,
{
    fn read_climate(&mut self) -> Result<Climate, SensorError> {
        let climate = self.climate.read_climate(&mut self.delay)?;
        if !climate.is_plausible() {
            return Err(SensorError::Implausible);
        }
        Ok(climate)
    }

    fn read_soil(&mut self, profile: &CalibrationProfile) -> Result<u8, SensorError> {
        self.soil.read_percent(&mut self.delay, profile)
    }

    fn read_npk(&mut self) -> Result<NpkReading, NpkError> {
        self.npk.read(&mut self.delay)
    }

    fn calibrate_soil<G: OperatorGate>(
        &mut self,
        gate: &mut G,
        profile: &mut CalibrationProfile,
    ) -> Result<CalibrationProfile, CalibrationError> {
        calibrate(&mut self.soil, gate, &mut self.delay, profile)
    }

    fn set_frame_check(&mut self, check: FrameCheck) {
        self.npk.set_frame_check(check);
    }
}
