//! PCF50633 PMU control core
//!
//! Async `no_std` driver for the NXP PCF50633 power management unit: register
//! access, interrupt dispatch, ADC request queue, USB charger classification,
//! power key timing, the no-battery watcher and suspend/resume sequencing.
//! Board integration goes through the [`Platform`] trait.

#![no_std]

mod fmt;

pub mod adc;
pub mod charger;
pub mod config;
pub mod data_types;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod nobat;
pub mod platform;
pub mod power;
pub mod registers;

pub use config::Config;
pub use driver::Pcf50633;
pub use error::Error;
pub use platform::Platform;
pub use registers::DEFAULT_I2C_ADDRESS;
