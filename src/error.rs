//! Error definitions for the PCF50633 control core.

use crate::data_types::SuspendPhase;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug)]
pub enum Error<I2cError> {
    /// Underlying I2C transaction failed.
    I2c(I2cError),
    /// Burst longer than the staging buffer.
    OutOfRange,
    /// Device has not finished `init()`.
    NotReady,
    /// Device is mid suspend/resume, or a wait timed out.
    Busy,
    /// Register access attempted while the bus must stay quiet.
    PhaseViolation(SuspendPhase),
    /// Requested suspend/resume step is not legal from the current phase.
    InvalidTransition { from: SuspendPhase, to: SuspendPhase },
    /// Every ADC request slot (or blocking waiter) is taken.
    AdcQueueFull,
}

impl<I2cError: core::fmt::Debug> core::fmt::Display for Error<I2cError> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "I2C error: {:?}", e),
            Error::OutOfRange => write!(f, "burst length out of range"),
            Error::NotReady => write!(f, "device not initialized"),
            Error::Busy => write!(f, "device busy"),
            Error::PhaseViolation(phase) => write!(f, "register access during {:?}", phase),
            Error::InvalidTransition { from, to } => {
                write!(f, "invalid phase transition {:?} -> {:?}", from, to)
            }
            Error::AdcQueueFull => write!(f, "ADC request queue full"),
        }
    }
}
