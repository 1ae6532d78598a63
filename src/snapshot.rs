use crate::error::{NpkError, SensorError};
use crate::npk::NpkReading;
use crate::sensors::Climate;

/// Per-channel health from the most recent cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelHealth {
    pub climate: bool,
    pub soil: bool,
    pub npk: bool,
}

impl ChannelHealth {
    pub fn all_healthy(&self) -> bool {
        self.climate && self.soil && self.npk
    }

    pub fn all_failed(&self) -> bool {
        !(self.climate || self.soil || self.npk)
    }
}

/// Latest readings, overwritten in place every sampling cycle.
///
/// When a channel fails its previous values are kept and only its health
/// flag is cleared, so a stale value is never mistaken for a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorSnapshot {
    pub temperature_c: f32,
    pub relative_humidity_pct: f32,
    pub soil_moisture_pct: u8,
    pub nitrogen_mg_kg: u16,
    pub phosphorus_mg_kg: u16,
    pub potassium_mg_kg: u16,
    pub health: ChannelHealth,
}

impl SensorSnapshot {
    pub fn record_climate(&mut self, reading: Result<Climate, SensorError>) {
        match reading {
            Ok(climate) => {
                self.temperature_c = climate.temperature_c;
                self.relative_humidity_pct = climate.relative_humidity_pct;
                self.health.climate = true;
            }
            Err(e) => {
                warn!("snapshot: climate channel down: {:?}", e);
                self.health.climate = false;
            }
        }
    }

    pub fn record_soil(&mut self, reading: Result<u8, SensorError>) {
        match reading {
            Ok(pct) => {
                self.soil_moisture_pct = pct.min(100);
                self.health.soil = true;
            }
            Err(e) => {
                warn!("snapshot: soil channel down: {:?}", e);
                self.health.soil = false;
            }
        }
    }

    pub fn record_npk(&mut self, reading: Result<NpkReading, NpkError>) {
        match reading {
            Ok(npk) => {
                self.nitrogen_mg_kg = npk.nitrogen_mg_kg;
                self.phosphorus_mg_kg = npk.phosphorus_mg_kg;
                self.potassium_mg_kg = npk.potassium_mg_kg;
                self.health.npk = true;
            }
            Err(e) => {
                warn!("snapshot: NPK channel down: {:?}", e);
                self.health.npk = false;
            }
        }
    }
}
