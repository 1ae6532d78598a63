#![cfg_attr(not(test), no_std)]

//! # paddy-monitor-rs
//! ## An unattended paddy-rice soil monitor in Rust
//!
//! Features:
//! - Ambient temperature and humidity monitoring
//! - Two-point calibrated soil moisture probe with switched power rail
//! - RS-485 NPK sensor client (Modbus-RTU style, half duplex)
//! - Growth-stage aware moisture bands
//! - Nutrient and temperature thresholds with agronomic guidance
//! - Rate-limited, deduplicated alert dispatch

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod alert;
pub mod calibration;
pub mod error;
pub mod guard;
pub mod moisture;
pub mod monitor;
pub mod npk;
pub mod preferences;
pub mod report;
pub mod sensors;
pub mod snapshot;
pub mod stage;
pub mod threshold;
pub mod timer;

pub use error::{CalibrationError, MonitorError, NpkError, SensorError};
pub use monitor::{Command, CommandOutcome, CycleReport, Monitor, Telemetry};
