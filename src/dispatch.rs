//! Interrupt decode and dispatch.
//!
//! [`Pcf50633::on_interrupt`] only takes a reference and wakes the worker; all
//! bus traffic happens in [`Pcf50633::dispatch`], driven by [`Pcf50633::run`].

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};
use embedded_hal_async::i2c::I2c;

use crate::data_types::{
    DispatchOutcome, Features, InterruptStatus, Key, PmuEvent, RtcEvent, StatusFlags, SuspendPhase, UsbCurrentTier,
};
use crate::driver::Pcf50633;
use crate::error::Error;
use crate::platform::Platform;
use crate::registers::{Int1, Int2, Int3, Int4, Int5, MBCC7_USB_MASK, Mbcc1, OocShdwn, addr, usb_power_ok};

/// INT4 bits that report a failing rail rather than a battery condition.
const INT4_RAIL_FAULTS: Int4 = Int4::AUTOPWRFAIL
    .union(Int4::DWN1PWRFAIL)
    .union(Int4::DWN2PWRFAIL)
    .union(Int4::LEDPWRFAIL)
    .union(Int4::LEDOVP);

impl<M, I2C, P> Pcf50633<M, I2C, P>
where
    M: RawMutex,
    I2C: I2c,
    P: Platform,
{
    /// Interrupt line handler. Safe to call from any context; never touches the bus.
    ///
    /// An edge that arrives while a pass is already queued and not yet running
    /// folds into that pass and takes no reference of its own.
    pub fn on_interrupt(&self) {
        let already_queued = self.irq_pending.signaled();
        let accepted = self.with_state(|s| {
            if !s.irq_enabled {
                return false;
            }
            if already_queued && !s.working {
                warn!("PMU interrupt while service still queued");
                return false;
            }
            s.irq_refs += 1;
            true
        });
        if accepted {
            self.irq_pending.signal(());
        }
    }

    /// Service loop: runs dispatch passes and deferred current-limit changes.
    pub async fn run(&self) -> ! {
        loop {
            match select(self.irq_pending.wait(), self.curlim_pending.wait()).await {
                Either::First(()) => {
                    if self.dispatch().await == DispatchOutcome::Rescheduled {
                        Timer::after(self.config.reschedule_backoff).await;
                        self.irq_pending.signal(());
                    }
                }
                Either::Second(()) => {
                    if self.process_current_limit().await == DispatchOutcome::Rescheduled {
                        Timer::after(self.config.curlim_backoff).await;
                        self.curlim_pending.signal(());
                    }
                }
            }
        }
    }

    /// One dispatch pass: read and clear the status block, then handle every asserted bit.
    ///
    /// The interrupt reference taken by `on_interrupt` is released unless the
    /// pass has to run again.
    pub async fn dispatch(&self) -> DispatchOutcome {
        let _pass = self.dispatch_lock.lock().await;
        self.with_state(|s| s.working = true);

        let outcome = self.service_interrupts().await;

        self.with_state(|s| {
            s.working = false;
            if outcome != DispatchOutcome::Rescheduled {
                s.irq_refs = s.irq_refs.saturating_sub(1);
            }
        });
        self.platform(|p| p.sync_input());
        outcome
    }

    async fn service_interrupts(&self) -> DispatchOutcome {
        let (phase, initialized) = self.with_state(|s| (s.phase, s.initialized));
        match phase {
            SuspendPhase::StartingSuspend | SuspendPhase::CompletedSuspend => {
                debug!("PMU interrupt during suspend, ignored");
                return DispatchOutcome::Skipped;
            }
            SuspendPhase::StartingResume => return DispatchOutcome::Rescheduled,
            SuspendPhase::Running | SuspendPhase::CompletedResume => {}
        }
        if !initialized {
            return DispatchOutcome::Rescheduled;
        }

        let mut status = InterruptStatus::default();
        if self.read(addr::INT1, &mut status.0).await.is_err() {
            info!("PMU interrupt status read failed, retrying");
            return DispatchOutcome::Rescheduled;
        }
        trace!("PMU interrupt status {:?}", status.0);

        if phase == SuspendPhase::CompletedResume {
            self.finish_resume(status);
        }
        if !self.coldplug_done() {
            self.coldplug(&mut status).await;
        }

        self.handle_int1(status.int1()).await;
        self.handle_int2(status.int2()).await;
        self.handle_int3(status.int3()).await;
        self.handle_int4(status.int4()).await;
        self.handle_int5(status.int5());

        if self.with_state(|s| s.adc_needs_kick) {
            self.kick_adc().await;
        }
        DispatchOutcome::Serviced
    }

    /// First pass after resume: keep the wake reasons and return to running.
    fn finish_resume(&self, status: InterruptStatus) {
        if self.advance_phase(SuspendPhase::Running).is_err() {
            return;
        }
        self.with_state(|s| {
            s.resume_reasons = status;
            // The key press that woke us must not reach the input sink.
            s.suppress_onkey_events = status.int2().intersects(Int2::ONKEYF | Int2::ONKEYR);
        });
        debug!("resume completed, reasons {:?}", status.0);
    }

    /// First pass after attach: pick up state that changed before interrupts were live.
    async fn coldplug(&self, status: &mut InterruptStatus) {
        status.0[0] &= !Int1::SECOND.bits();
        if self
            .set_bits(addr::INT1M, Int1::SECOND.bits(), Int1::SECOND.bits())
            .await
            .is_err()
        {
            warn!("failed to mask SECOND after coldplug");
        }

        match self.read_reg(addr::MBCS1).await {
            Ok(mbcs1) if usb_power_ok(mbcs1) => {
                info!("USB power present at attach");
                self.usb_inserted();
            }
            Ok(_) => {}
            Err(_) => warn!("MBCS1 read failed during coldplug"),
        }
        self.queue_charger_detect().await;
        self.with_state(|s| s.coldplug_done = true);
    }

    fn usb_inserted(&self) {
        self.platform(|p| {
            p.report_key(Key::Power2, true);
            p.power_status_changed();
        });
        self.with_state(|s| s.flags.insert(StatusFlags::USB_PRESENT));
        self.notify(PmuEvent::UsbInsert);
    }

    async fn handle_int1(&self, int1: Int1) {
        if int1.contains(Int1::ADPINS) {
            self.adapter_changed(true);
        }
        if int1.contains(Int1::ADPREM) {
            self.adapter_changed(false);
        }

        if int1.contains(Int1::USBINS) {
            self.usb_inserted();
            // Let the ID resistor settle before sampling it.
            Timer::after(self.config.usb_debounce).await;
            self.queue_charger_detect().await;
        }
        // Removal is meaningless if the same pass also saw an insertion.
        if int1.contains(Int1::USBREM) && !int1.contains(Int1::USBINS) {
            let was_present = self.with_state(|s| {
                s.usb_removal_count = s.usb_removal_count.wrapping_add(1);
                let was_present = s.flags.contains(StatusFlags::USB_PRESENT);
                if was_present {
                    s.flags.remove(StatusFlags::USB_PRESENT);
                    s.last_curlim_ma = 0;
                }
                was_present
            });
            if was_present {
                self.platform(|p| {
                    p.report_key(Key::Power2, false);
                    p.power_status_changed();
                });
                self.notify(PmuEvent::UsbRemove);
                self.queue_charger_detect().await;
            }
        }

        if int1.contains(Int1::ALARM) && self.config.features.contains(Features::RTC) {
            self.platform(|p| p.rtc_event(RtcEvent::Alarm));
        }
        if int1.contains(Int1::SECOND) {
            if self.flags().contains(StatusFlags::RTC_SECOND) {
                self.platform(|p| p.rtc_event(RtcEvent::Second));
            }
            self.power_key_tick().await;
        }
    }

    fn adapter_changed(&self, present: bool) {
        self.platform(|p| {
            p.report_key(Key::Battery, present);
            p.power_status_changed();
        });
        self.with_state(|s| s.flags.set(StatusFlags::CHG_PRESENT, present));
        self.notify(if present { PmuEvent::Insert } else { PmuEvent::Remove });
    }

    /// SECOND tick while the ON key is held past ONKEY1S.
    async fn power_key_tick(&self) {
        let held = self.with_state(|s| {
            if s.onkey_seconds < 0 || !s.flags.contains(StatusFlags::PWR_PRESSED) {
                return None;
            }
            s.onkey_seconds += 1;
            Some(s.onkey_seconds)
        });
        let Some(seconds) = held else {
            return;
        };
        debug!("ON key held for {} s", seconds);

        if seconds == self.config.onkey_seconds_sig_init {
            let signalled = self.platform(|p| {
                if !p.init_process_present() {
                    return false;
                }
                p.signal_init_power_fail();
                true
            });
            if signalled {
                info!("ON key held, asking init to shut down");
            } else {
                debug!("ON key held but no init to signal");
            }
        }
        if seconds == self.config.onkey_seconds_shutdown {
            info!("ON key held, entering standby");
            if self.go_standby().await.is_err() {
                error!("failed to enter standby");
            }
        }
    }

    async fn handle_int2(&self, int2: Int2) {
        if int2.contains(Int2::ONKEYF) {
            let suppress = self.with_state(|s| {
                s.flags.insert(StatusFlags::PWR_PRESSED);
                s.suppress_onkey_events
            });
            if !suppress {
                self.platform(|p| p.report_key(Key::Power, true));
            }
        }
        if int2.contains(Int2::ONKEYR) {
            let (suppress, rtc_second) = self.with_state(|s| {
                s.flags.remove(StatusFlags::PWR_PRESSED);
                s.onkey_seconds = -1;
                let suppress = s.suppress_onkey_events;
                s.suppress_onkey_events = false;
                (suppress, s.flags.contains(StatusFlags::RTC_SECOND))
            });
            if !suppress {
                self.platform(|p| p.report_key(Key::Power, false));
            }
            if !rtc_second
                && self
                    .set_bits(addr::INT1M, Int1::SECOND.bits(), Int1::SECOND.bits())
                    .await
                    .is_err()
            {
                warn!("failed to mask SECOND after ON key release");
            }
        }
        // EXTONx edges are not used on this board family.
    }

    async fn handle_int3(&self, int3: Int3) {
        if int3.contains(Int3::BATFULL) {
            self.battery_full().await;
        }
        if int3.contains(Int3::CHGHALT) {
            info!("charger halted");
            self.notify(PmuEvent::ChargerChange);
        }
        if int3.contains(Int3::THLIMON) {
            info!("charger thermal limit on");
            self.with_state(|s| s.flags.insert(StatusFlags::CHG_PROT));
            self.notify(PmuEvent::ChargerChange);
        }
        if int3.contains(Int3::THLIMOFF) {
            self.with_state(|s| s.flags.remove(StatusFlags::CHG_PROT));
            self.notify(PmuEvent::ChargerChange);
        }
        if int3.intersects(Int3::USBLIMON | Int3::USBLIMOFF) {
            debug!("USB current limit {}", if int3.contains(Int3::USBLIMON) { "hit" } else { "released" });
            self.notify(PmuEvent::ChargerChange);
        }
        if int3.contains(Int3::ADCRDY) {
            self.service_adc_ready().await;
        }
        if int3.contains(Int3::ONKEY1S) {
            self.with_state(|s| s.onkey_seconds = 0);
            // Keep the chip from resetting itself; the host owns the long press now.
            if self
                .set_bits(addr::OOCSHDWN, OocShdwn::TOTRST.bits(), OocShdwn::TOTRST.bits())
                .await
                .is_err()
            {
                warn!("failed to set TOTRST");
            }
            if self.clear_bits(addr::INT1M, Int1::SECOND.bits()).await.is_err() {
                warn!("failed to unmask SECOND for ON key timing");
            }
        }
    }

    /// BATFULL handling. Right after a battery is inserted the flag is bogus
    /// and the charger is kicked instead of being reported idle.
    async fn battery_full(&self) {
        let recent_insert = self
            .with_state(|s| s.last_bat_insert)
            .is_some_and(|at| Instant::now().saturating_duration_since(at) < self.config.batfull_guard);
        if !recent_insert {
            info!("battery full");
            self.notify(PmuEvent::ChargerIdle);
            return;
        }

        info!("BATFULL right after battery insertion, restarting charger");
        if self.bounce_usb_tier().await.is_err() {
            warn!("failed to restart charger after BATFULL");
        }
    }

    /// Drop the USB tier to suspend and put it back.
    async fn bounce_usb_tier(&self) -> Result<(), Error<I2C::Error>> {
        let tier = self.read_reg(addr::MBCC7).await? & MBCC7_USB_MASK;
        self.set_bits(addr::MBCC7, MBCC7_USB_MASK, UsbCurrentTier::Suspend.bits())
            .await?;
        self.set_bits(addr::MBCC7, MBCC7_USB_MASK, tier).await
    }

    async fn handle_int4(&self, int4: Int4) {
        if int4.intersects(Int4::LOWSYS | Int4::LOWBAT) {
            self.low_battery().await;
        }
        if int4.contains(Int4::HIGHTMP) {
            error!("PMU over temperature, suspending");
            self.platform(|p| p.critical_suspend());
        }
        let faults = int4 & INT4_RAIL_FAULTS;
        if !faults.is_empty() {
            warn!("PMU rail fault INT4 {:#x}", faults.bits());
            self.with_state(|s| s.rail_faults.0 |= faults);
        }
    }

    async fn low_battery(&self) {
        let Ok(mbcs1) = self.read_reg(addr::MBCS1).await else {
            error!("low battery but MBCS1 unreadable");
            return;
        };

        if usb_power_ok(mbcs1) {
            // Running on USB with no (or a flat) battery: keep charging and
            // watch for a battery to come back.
            info!("low battery on USB power");
            self.notify(PmuEvent::ChargerIdle);
            let resume = Mbcc1::RESUME.bits();
            if self.set_bits(addr::MBCC1, resume, resume).await.is_err() {
                warn!("failed to resume charger");
            }
            self.request_no_battery_watch();
        } else {
            let init = self.platform(|p| {
                if p.init_process_present() {
                    p.low_battery();
                    p.signal_init_power_fail();
                    true
                } else {
                    p.critical_suspend();
                    false
                }
            });
            if init {
                warn!("low battery, asking init to shut down");
            } else {
                error!("low battery and no init, emergency suspend");
            }
        }

        // Tell the chip the host is handling it.
        if self
            .set_bits(addr::OOCSHDWN, OocShdwn::TOTRST.bits(), OocShdwn::TOTRST.bits())
            .await
            .is_err()
        {
            warn!("failed to set TOTRST");
        }
    }

    fn handle_int5(&self, int5: Int5) {
        if !int5.is_empty() {
            warn!("PMU LDO fault INT5 {:#x}", int5.bits());
            self.with_state(|s| s.rail_faults.1 |= int5);
        }
    }

    /// Ask the RTC SECOND tick to be forwarded (and keep the interrupt unmasked).
    pub async fn set_rtc_second_enabled(&self, enabled: bool) -> Result<(), Error<I2C::Error>> {
        let second = Int1::SECOND.bits();
        self.set_bits(addr::INT1M, second, if enabled { 0 } else { second }).await?;
        self.with_state(|s| s.flags.set(StatusFlags::RTC_SECOND, enabled));
        Ok(())
    }
}
