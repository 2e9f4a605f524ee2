//! Suspend/resume sequencing.
//!
//! The phase moves strictly through
//! `Running -> StartingSuspend -> CompletedSuspend -> StartingResume -> CompletedResume -> Running`.
//! The last step is taken by the first dispatch pass after resume.

use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal_async::i2c::I2c;
use heapless::String;

use crate::data_types::{DispatchOutcome, SuspendPhase};
use crate::driver::Pcf50633;
use crate::error::Error;
use crate::platform::Platform;
use crate::registers::{INT_REG_COUNT, Int1, addr};

/// Poll period of [`Pcf50633::wait_until_ready`].
pub const READY_POLL: Duration = Duration::from_millis(5);

/// Capacity of the text built by [`Pcf50633::report_resume_reasons`].
pub const RESUME_REPORT_CAPACITY: usize = 768;

/// Interrupt source names, indexed by `byte * 8 + bit` of the status block.
const RESUMER_NAMES: [Option<&str>; INT_REG_COUNT * 8] = [
    Some("adpins"),
    Some("adprem"),
    Some("usbins"),
    Some("usbrem"),
    None,
    None,
    Some("rtcalarm"),
    Some("second"),
    Some("onkeyr"),
    Some("onkeyf"),
    Some("exton1r"),
    Some("exton1f"),
    Some("exton2r"),
    Some("exton2f"),
    Some("exton3r"),
    Some("exton3f"),
    Some("batfull"),
    Some("chghalt"),
    Some("thlimon"),
    Some("thlimoff"),
    Some("usblimon"),
    Some("usblimoff"),
    Some("adcrdy"),
    Some("onkey1s"),
    Some("lowsys"),
    Some("lowbat"),
    Some("hightmp"),
    Some("autopwrfail"),
    Some("dwn1pwrfail"),
    Some("dwn2pwrfail"),
    Some("ledpwrfail"),
    Some("ledovp"),
    Some("ldo1pwrfail"),
    Some("ldo2pwrfail"),
    Some("ldo3pwrfail"),
    Some("ldo4pwrfail"),
    Some("ldo5pwrfail"),
    Some("ldo6pwrfail"),
    Some("hcldopwrfail"),
    Some("hcldoovl"),
];

impl SuspendPhase {
    /// Whether `next` is the one legal successor of this phase.
    pub fn can_advance_to(self, next: SuspendPhase) -> bool {
        use SuspendPhase::*;
        match (self, next) {
            (Running, StartingSuspend)
            | (StartingSuspend, CompletedSuspend)
            | (CompletedSuspend, StartingResume)
            | (StartingResume, CompletedResume)
            | (CompletedResume, Running) => true,
            (Running | StartingSuspend | CompletedSuspend | StartingResume | CompletedResume, _) => false,
        }
    }
}

impl<M, I2C, P> Pcf50633<M, I2C, P>
where
    M: RawMutex,
    I2C: I2c,
    P: Platform,
{
    pub(crate) fn advance_phase(&self, next: SuspendPhase) -> Result<(), Error<I2C::Error>> {
        self.with_state(|s| {
            if !s.phase.can_advance_to(next) {
                return Err(Error::InvalidTransition { from: s.phase, to: next });
            }
            s.phase = next;
            Ok(())
        })
    }

    fn set_irq_line(&self, enabled: bool) {
        self.with_state(|s| s.irq_enabled = enabled);
        self.platform(|p| p.set_irq_enabled(enabled));
    }

    /// Mask every interrupt source except the configured wake sources and park the bus.
    ///
    /// The bus lock is held for the whole sequence. A failed mask write is
    /// logged and the suspend still completes.
    pub async fn suspend(&self) -> Result<(), Error<I2C::Error>> {
        let mut i2c = self.bus.lock().await;
        self.advance_phase(SuspendPhase::StartingSuspend)?;
        self.set_irq_line(false);

        let mut masks = [0u8; INT_REG_COUNT];
        for (mask, resumers) in masks.iter_mut().zip(self.config.resumers) {
            *mask = !resumers;
        }
        if Self::bus_write(&mut i2c, self.address, addr::INT1M, &masks).await.is_err() {
            error!("error writing wake masks before suspend");
        }

        self.advance_phase(SuspendPhase::CompletedSuspend)?;
        debug!("PMU suspended");
        Ok(())
    }

    /// Restore the interrupt masks, reopen the interrupt line and run one
    /// dispatch pass to collect the wake reasons.
    pub async fn resume(&self) -> Result<(), Error<I2C::Error>> {
        {
            let mut i2c = self.bus.lock().await;
            self.advance_phase(SuspendPhase::StartingResume)?;

            // Everything unmasked except the RTC SECOND tick.
            let masks = [Int1::SECOND.bits(), 0, 0, 0, 0];
            if Self::bus_write(&mut i2c, self.address, addr::INT1M, &masks).await.is_err() {
                error!("error restoring interrupt masks on resume");
            }

            self.advance_phase(SuspendPhase::CompletedResume)?;
        }
        self.set_irq_line(true);

        // Free pass, no interrupt edge behind it.
        self.with_state(|s| s.irq_refs += 1);
        if self.dispatch().await == DispatchOutcome::Rescheduled {
            self.irq_pending.signal(());
        }
        Ok(())
    }

    /// Wait for [`Pcf50633::ready`] to succeed, giving up with `Busy` after `timeout`.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), Error<I2C::Error>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.ready() {
                Ok(()) => return Ok(()),
                Err(_) if Instant::now() >= deadline => {
                    error!("timed out waiting for PMU to become ready");
                    return Err(Error::Busy);
                }
                Err(_) => Timer::after(READY_POLL).await,
            }
        }
    }

    /// One line per interrupt source, marked with `*` when it was pending at the last resume.
    pub fn report_resume_reasons(&self) -> String<RESUME_REPORT_CAPACITY> {
        let reasons = self.resume_reasons();
        let mut out = String::new();
        for (n, name) in RESUMER_NAMES.iter().enumerate() {
            let Some(name) = name else {
                continue;
            };
            let marker = if reasons.is_set(n) { "  * " } else { "    " };
            // Capacity covers every name.
            let _ = writeln!(out, "{}{}", marker, name);
        }
        out
    }
}
