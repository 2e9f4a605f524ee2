//! Charger classification and USB current-limit control.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::i2c::I2c;

use crate::config::Config;
use crate::data_types::{
    AdcAverage, AdcChannel, ChargeMode, ChargerStatus, ChargerType, DispatchOutcome, Features, PmuEvent,
    StatusFlags, UsbCurrentTier,
};
use crate::driver::Pcf50633;
use crate::error::Error;
use crate::platform::Platform;
use crate::registers::{GPIOCFG_MASK, MBCC5_FAST_CHARGE_MAX, MBCC7_USB_MASK, Mbcc1, addr};

/// Classify the ID-pin sample taken on ADCIN1.
///
/// Samples under the midpoint between the 1 A and "nothing" nominal values mean
/// a dedicated charger. Anything else with USB power present is treated as a
/// host port.
pub fn classify(sample: u16, usb_present: bool, config: &Config) -> ChargerType {
    if sample < config.one_amp_threshold() {
        ChargerType::OneAmp
    } else if usb_present {
        ChargerType::HostUsb
    } else {
        ChargerType::None
    }
}

impl<M, I2C, P> Pcf50633<M, I2C, P>
where
    M: RawMutex,
    I2C: I2c,
    P: Platform,
{
    /// Completion of a charger-detect conversion.
    pub(crate) async fn configure_for_charger(&self, sample: u16) {
        let usb_present = self.flags().contains(StatusFlags::USB_PRESENT);
        let charger = classify(sample, usb_present, &self.config);
        debug!("charger detect sample {} -> {:?}", sample, charger);
        if self.apply_charger_type(charger).await.is_err() {
            warn!("failed to configure for {:?}", charger);
        }
    }

    /// Set the USB current limit matching a charger type.
    pub async fn apply_charger_type(&self, charger: ChargerType) -> Result<(), Error<I2C::Error>> {
        match charger {
            ChargerType::None => self.set_current_limit(0).await,
            ChargerType::HostUsb => {
                // Keep whatever the host granted, but never under 100 mA.
                let last = self.last_current_limit();
                self.set_current_limit(if last > 100 { last } else { 100 }).await
            }
            ChargerType::OneAmp => {
                self.set_current_limit(1000).await?;
                // Release the GPO so it no longer drives the USB data lines.
                self.clear_bits(addr::GPOCFG, GPIOCFG_MASK).await
            }
        }
    }

    /// Program the USB current limit tier and the charge enable that goes with it.
    pub async fn set_current_limit(&self, ma: u16) -> Result<(), Error<I2C::Error>> {
        self.with_state(|s| s.last_curlim_ma = ma);
        let tier = UsbCurrentTier::from_milliamps(ma);
        debug!("USB current limit {} mA -> {:?}", ma, tier);
        self.set_bits(addr::MBCC7, MBCC7_USB_MASK, tier.bits()).await?;

        let active = tier.permits_charging();
        let flags = self.flags();
        if !active && flags.contains(StatusFlags::USB_PRESENT) {
            self.notify(PmuEvent::ChargerActive);
        }
        self.charge_enable(active).await?;
        // A low tier always ends on idle, even when charging was already off.
        if !active && !flags.contains(StatusFlags::CHG_ENABLED) && self.config.features.contains(Features::MBC) {
            self.notify(PmuEvent::ChargerIdle);
        }

        // Drop a stale BATFULL latch: pulse RESUME with automatic resume off.
        let autores = Mbcc1::AUTORES.bits();
        let resume = Mbcc1::RESUME.bits();
        self.set_bits(addr::MBCC1, autores, 0).await?;
        self.set_bits(addr::MBCC1, resume, resume).await?;
        self.set_bits(addr::MBCC1, autores, autores).await?;

        self.write_reg(addr::MBCC5, MBCC5_FAST_CHARGE_MAX).await
    }

    /// Enable or disable charging.
    ///
    /// Notifications fire only on a real change of the enabled flag. Does
    /// nothing on boards without the charger feature.
    pub async fn charge_enable(&self, on: bool) -> Result<(), Error<I2C::Error>> {
        if !self.config.features.contains(Features::MBC) {
            return Ok(());
        }

        let tier = if on {
            Some(UsbCurrentTier::from_bits(self.read_reg(addr::MBCC7).await?))
        } else {
            None
        };
        let chgena = Mbcc1::CHGENA.bits();
        self.set_bits(addr::MBCC1, chgena, if on { chgena } else { 0 }).await?;

        let (was_on, usb_present) = self.with_state(|s| {
            let was_on = s.flags.contains(StatusFlags::CHG_ENABLED);
            s.flags.set(StatusFlags::CHG_ENABLED, on);
            (was_on, s.flags.contains(StatusFlags::USB_PRESENT))
        });
        if was_on == on {
            return Ok(());
        }
        match tier {
            Some(tier) if tier.permits_charging() && usb_present => self.notify(PmuEvent::ChargerActive),
            Some(_) => {}
            None => self.notify(PmuEvent::ChargerIdle),
        }
        Ok(())
    }

    /// Ask for a new USB current limit from any context.
    ///
    /// The limit is applied later by [`Pcf50633::run`]. If USB is pulled in the
    /// meantime the request is dropped.
    pub fn notify_current_limit(&self, ma: u16) {
        let queued = self.curlim_pending.signaled();
        self.with_state(|s| {
            s.pending_curlim_ma = ma;
            s.curlim_removal_snapshot = s.usb_removal_count;
        });
        if queued {
            debug!("current limit change already queued, now {} mA", ma);
        }
        self.curlim_pending.signal(());
    }

    /// Apply a current limit queued by [`Pcf50633::notify_current_limit`].
    pub async fn process_current_limit(&self) -> DispatchOutcome {
        let _serial = self.curlim_lock.lock().await;
        let (phase, initialized, stale, ma) = self.with_state(|s| {
            (
                s.phase,
                s.initialized,
                s.curlim_removal_snapshot != s.usb_removal_count,
                s.pending_curlim_ma,
            )
        });

        if phase.is_suspending() {
            debug!("current limit change dropped while suspending");
            return DispatchOutcome::Skipped;
        }
        if !initialized || !phase.allows_bus_access() {
            return DispatchOutcome::Rescheduled;
        }
        if stale {
            debug!("USB removed before current limit applied");
            return DispatchOutcome::Skipped;
        }

        if self.set_current_limit(ma).await.is_err() {
            warn!("failed to apply {} mA current limit", ma);
        }
        DispatchOutcome::Serviced
    }

    /// Active USB current limit tier as read back from MBCC7.
    pub async fn usb_current_limit(&self) -> Result<UsbCurrentTier, Error<I2C::Error>> {
        Ok(UsbCurrentTier::from_bits(self.read_reg(addr::MBCC7).await?))
    }

    /// Classify what is plugged in right now, alongside the active tier.
    pub async fn charger_type(&self) -> Result<ChargerStatus, Error<I2C::Error>> {
        let tier = self.usb_current_limit().await?;
        let sample = self.charger_adc().await?;
        let charger = classify(sample, self.flags().contains(StatusFlags::USB_PRESENT), &self.config);
        Ok(ChargerStatus { charger, tier })
    }

    /// Raw ID-pin sample, for calibrating the detection thresholds.
    pub async fn charger_adc(&self) -> Result<u16, Error<I2C::Error>> {
        self.adc_read(AdcChannel::Adcin1, AdcAverage::Avg16).await
    }

    /// Charger state machine position.
    pub async fn charge_mode(&self) -> Result<ChargeMode, Error<I2C::Error>> {
        Ok(ChargeMode::from_bits(self.read_reg(addr::MBCS2).await?))
    }

    /// Names of the charger status flags currently set.
    pub fn charge_state(&self) -> impl Iterator<Item = &'static str> {
        self.flags().charger_state_names()
    }

    /// The chip only lets us enable or disable charging, not pick a mode.
    pub async fn set_charge_mode(&self, charge: bool) -> Result<(), Error<I2C::Error>> {
        self.charge_enable(charge).await
    }

    /// Apply a USB current limit regardless of what is attached.
    ///
    /// Can draw more than the attached source is rated for.
    pub async fn force_usb_limit_dangerous(&self, ma: u16) -> Result<(), Error<I2C::Error>> {
        warn!("forcing USB current limit to {} mA", ma);
        self.set_current_limit(ma).await
    }
}
