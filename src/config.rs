//! Board configuration for the control core.
//! Defaults match the reference handset; override per board with the `with_*` helpers.

use embassy_time::Duration;

use crate::data_types::Features;
use crate::registers::INT_REG_COUNT;

/// ADCIN1 sample seen with a dedicated 1 A charger on the ID pin.
pub const ADC_NOM_CHG_DETECT_1A: u16 = 6;
/// ADCIN1 sample seen with nothing (or a host) on the ID pin.
pub const ADC_NOM_CHG_DETECT_NONE: u16 = 43;

/// Seconds the ON key must be held before init is asked to shut down.
pub const ONKEY_SECONDS_SIG_INIT: i16 = 4;
/// Seconds the ON key must be held before the PMU is forced to standby.
pub const ONKEY_SECONDS_SHUTDOWN: i16 = 8;

/// BATFULL right after battery insertion is a false reading.
pub const BATFULL_GUARD: Duration = Duration::from_secs(2);
/// Settling time after USB insertion so the ID resistor can be seen.
pub const USB_DEBOUNCE: Duration = Duration::from_millis(500);
/// Poll period of the no-battery watcher.
pub const NOBAT_POLL: Duration = Duration::from_secs(1);
/// Pause before a dispatch pass is resubmitted.
pub const RESCHEDULE_BACKOFF: Duration = Duration::from_millis(10);
/// Pause before a deferred current-limit request is resubmitted.
pub const CURLIM_BACKOFF: Duration = Duration::from_millis(1);

/// BATSNS full scale, millivolts over 1024 counts.
pub const BATTVOLT_FULL_SCALE_MV: u32 = 6000;
/// Linear battery scale end points. The scale is approximate.
pub const BATTVOLT_SCALE_START_MV: u16 = 2800;
pub const BATTVOLT_SCALE_END_MV: u16 = 4200;

/// Board configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub features: Features,
    pub onkey_seconds_sig_init: i16,
    pub onkey_seconds_shutdown: i16,
    /// Interrupt sources allowed to wake the system, one byte per status register.
    pub resumers: [u8; INT_REG_COUNT],
    pub chg_detect_1a: u16,
    pub chg_detect_none: u16,
    pub batfull_guard: Duration,
    pub usb_debounce: Duration,
    pub nobat_poll: Duration,
    pub reschedule_backoff: Duration,
    pub curlim_backoff: Duration,
    pub battvolt_full_scale_mv: u32,
    pub battvolt_scale_start_mv: u16,
    pub battvolt_scale_end_mv: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            features: Features::MBC | Features::RTC | Features::BATVOLT,
            onkey_seconds_sig_init: ONKEY_SECONDS_SIG_INIT,
            onkey_seconds_shutdown: ONKEY_SECONDS_SHUTDOWN,
            // USB/adapter insertion, alarm, ON key and battery events.
            resumers: [0x4F, 0x02, 0x03, 0x06, 0x00],
            chg_detect_1a: ADC_NOM_CHG_DETECT_1A,
            chg_detect_none: ADC_NOM_CHG_DETECT_NONE,
            batfull_guard: BATFULL_GUARD,
            usb_debounce: USB_DEBOUNCE,
            nobat_poll: NOBAT_POLL,
            reschedule_backoff: RESCHEDULE_BACKOFF,
            curlim_backoff: CURLIM_BACKOFF,
            battvolt_full_scale_mv: BATTVOLT_FULL_SCALE_MV,
            battvolt_scale_start_mv: BATTVOLT_SCALE_START_MV,
            battvolt_scale_end_mv: BATTVOLT_SCALE_END_MV,
        }
    }
}

impl Config {
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn with_onkey_thresholds(mut self, sig_init: i16, shutdown: i16) -> Self {
        self.onkey_seconds_sig_init = sig_init;
        self.onkey_seconds_shutdown = shutdown;
        self
    }

    pub fn with_resumers(mut self, resumers: [u8; INT_REG_COUNT]) -> Self {
        self.resumers = resumers;
        self
    }

    pub fn with_batfull_guard(mut self, guard: Duration) -> Self {
        self.batfull_guard = guard;
        self
    }

    /// Set debounce, watcher poll and backoff periods in one go (handy for host tests).
    pub fn with_timings(
        mut self,
        usb_debounce: Duration,
        nobat_poll: Duration,
        reschedule_backoff: Duration,
    ) -> Self {
        self.usb_debounce = usb_debounce;
        self.nobat_poll = nobat_poll;
        self.reschedule_backoff = reschedule_backoff;
        self.curlim_backoff = reschedule_backoff;
        self
    }

    /// Sample boundary under which the ID pin reads as a 1 A charger.
    pub fn one_amp_threshold(&self) -> u16 {
        (self.chg_detect_none + self.chg_detect_1a) / 2
    }
}
