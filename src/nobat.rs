//! Watcher for a battery coming back while the board runs from USB.
//!
//! Started from the low-battery path when USB power is good. Polls MBCS3 until
//! the battery voltage reappears, then re-runs charger detection so charging
//! resumes with the right limit.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};
use embedded_hal_async::i2c::I2c;

use crate::data_types::SuspendPhase;
use crate::driver::Pcf50633;
use crate::platform::Platform;
use crate::registers::{Mbcs3, addr};

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct NoBatteryWatch {
    pub(crate) busy: bool,
    /// USB removal count when the watch was requested.
    pub(crate) removal_snapshot: u32,
}

impl<M, I2C, P> Pcf50633<M, I2C, P>
where
    M: RawMutex,
    I2C: I2c,
    P: Platform,
{
    /// Start the watcher unless one is already running.
    pub(crate) fn request_no_battery_watch(&self) {
        let removals = self.usb_removal_count();
        let started = self.nobat.lock(|watch| {
            let mut w = watch.get();
            if w.busy {
                return false;
            }
            w.busy = true;
            w.removal_snapshot = removals;
            watch.set(w);
            true
        });
        if started {
            debug!("starting no-battery watcher");
            self.nobat_start.signal(());
        } else {
            debug!("no-battery watcher already running");
        }
    }

    pub fn no_battery_watch_active(&self) -> bool {
        self.nobat.lock(|watch| watch.get().busy)
    }

    /// Task body for the watcher. Run it next to [`Pcf50633::run`].
    pub async fn run_no_battery_watcher(&self) -> ! {
        loop {
            self.nobat_start.wait().await;
            self.watch_no_battery().await;
        }
    }

    /// One watch: poll until a battery shows up or USB is pulled.
    pub async fn watch_no_battery(&self) {
        let snapshot = self.nobat.lock(|watch| watch.get().removal_snapshot);
        loop {
            Timer::after(self.config.nobat_poll).await;
            if self.phase() != SuspendPhase::Running {
                continue;
            }

            match self.read_reg(addr::MBCS3).await {
                Ok(mbcs3) if Mbcs3::from_bits_retain(mbcs3).contains(Mbcs3::VBATSTAT) => {
                    info!("battery inserted, re-evaluating charger");
                    self.with_state(|s| s.last_bat_insert = Some(Instant::now()));
                    self.queue_charger_detect().await;
                    break;
                }
                Ok(_) => {}
                Err(_) => warn!("MBCS3 read failed in no-battery watcher"),
            }

            if self.usb_removal_count() != snapshot {
                debug!("USB removed, stopping no-battery watcher");
                break;
            }
        }
        self.nobat.lock(|watch| {
            let mut w = watch.get();
            w.busy = false;
            watch.set(w);
        });
    }
}
