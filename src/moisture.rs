//! Soil moisture probe
//!
//! A resistive/capacitive probe on an ADC input whose supply is switched by a
//! GPIO. The rail is energized only while a read is in progress to slow down
//! electrode corrosion.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::calibration::CalibrationProfile;
use crate::error::SensorError;
use crate::guard::LineGuard;

pub const ADC_MAX: u16 = 4095; // 12-bit converter
pub const PROBE_SETTLE_MS: u32 = 100;

/// One-shot analog input the probe is wired to
pub trait SoilAdc {
    type Error;

    fn read_raw(&mut self) -> Result<u16, Self::Error>;
}

pub struct SoilProbe<A, P> {
    adc: A,
    power: P,
}

impl<A, P> SoilProbe<A, P>
where
    A: SoilAdc,
    P: OutputPin,
{
    pub fn new(adc: A, power: P) -> Self {
        Self { adc, power }
    }

    /// Powers the probe, waits `settle_ms`, averages up to `samples` readings
    /// spaced `interval_ms` apart, then powers it down again.
    ///
    /// Failed or out-of-range samples are dropped from the average. The read
    /// only fails if no sample at all succeeded.
    pub fn read_average<D: DelayNs>(
        &mut self,
        delay: &mut D,
        settle_ms: u32,
        samples: u8,
        interval_ms: u32,
    ) -> Result<u16, SensorError> {
        let _power =
            LineGuard::assert(&mut self.power).map_err(|_| SensorError::SoilUnavailable)?;
        delay.delay_ms(settle_ms);

        let mut acc: u32 = 0;
        let mut count: u32 = 0;
        for i in 0..samples {
            if i > 0 {
                delay.delay_ms(interval_ms);
            }
            match self.adc.read_raw() {
                Ok(raw) if raw <= ADC_MAX => {
                    acc += u32::from(raw);
                    count += 1;
                }
                Ok(raw) => warn!("soil: discarding out-of-range sample {}", raw),
                Err(_) => warn!("soil: ADC sample {} failed", i),
            }
        }

        if count == 0 {
            return Err(SensorError::SoilUnavailable);
        }
        // Average of u16 values always fits
        Ok((acc / count) as u16)
    }

    /// Single powered sample, used by the sampling cycle
    pub fn read_raw<D: DelayNs>(&mut self, delay: &mut D) -> Result<u16, SensorError> {
        self.read_average(delay, PROBE_SETTLE_MS, 1, 0)
    }

    /// Samples the probe and maps it through `profile`
    pub fn read_percent<D: DelayNs>(
        &mut self,
        delay: &mut D,
        profile: &CalibrationProfile,
    ) -> Result<u8, SensorError> {
        let raw = self.read_raw(delay)?;
        let pct = profile.percent(raw);
        debug!("soil: raw={} pct={}", raw, pct);
        Ok(pct)
    }

    pub fn release(self) -> (A, P) {
        (self.adc, self.power)
    }
}
