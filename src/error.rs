//! Error types for the sensing channels and the monitor session.
//!
//! Every error here is small and `Copy` so it can be returned from a sampling
//! cycle hot path without allocation. None of them is fatal: the monitor turns
//! each one into a cleared health flag or a surfaced operator message.

use thiserror_no_std::Error;

/// Two-point calibration failures
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    /// The dry and wet references are inverted or too close together.
    /// The previous profile is kept.
    #[error("calibration rejected: dry={dry} wet={wet} (need dry - wet > {min_span})")]
    Rejected { dry: u16, wet: u16, min_span: u16 },

    /// The probe could not be sampled during a calibration phase
    #[error("soil probe unavailable during calibration")]
    SensorUnavailable,

    /// Sampling cycles are running; calibration needs exclusive access
    #[error("calibration already in progress")]
    Busy,
}

/// NPK transaction failures
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NpkError {
    /// Fewer than a full response frame arrived before the deadline
    #[error("NPK response timed out after {received} of {expected} bytes")]
    Timeout { received: usize, expected: usize },

    /// A full frame arrived but failed address/function/length/CRC checks
    #[error("NPK response framing error: {0}")]
    Framing(FramingFault),

    /// The caller's abort signal fired while waiting for the response
    #[error("NPK read aborted")]
    Aborted,

    /// The UART or direction-control line reported an error
    #[error("NPK serial link failure")]
    Link,
}

/// Which part of a response frame failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramingFault {
    /// Frame shorter than the fixed response length
    Length,
    Address,
    Function,
    ByteCount,
    Crc,
}

impl core::fmt::Display for FramingFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            FramingFault::Length => "short frame",
            FramingFault::Address => "unexpected device address",
            FramingFault::Function => "unexpected function code",
            FramingFault::ByteCount => "unexpected byte count",
            FramingFault::Crc => "CRC mismatch",
        };
        f.write_str(text)
    }
}

/// A channel could not produce a reading this cycle
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    #[error("climate sensor unavailable")]
    ClimateUnavailable,

    #[error("soil probe unavailable")]
    SoilUnavailable,

    /// Reading outside what the sensor can physically report
    #[error("implausible reading")]
    Implausible,
}

/// Session-level failures surfaced to operator commands
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MonitorError {
    #[error("calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    /// A sampling cycle was requested while the monitor is calibrating
    #[error("monitor is calibrating")]
    Calibrating,
}
