//! Board-side collaborators of the control core.
//!
//! Everything the PMU core needs from the rest of the system goes through one
//! [`Platform`] object: charger notifications, the input event sink, the RTC
//! sink, the init process and the interrupt line. All methods are called
//! synchronously from within a dispatch pass and must return quickly.

use crate::data_types::{Features, Key, PmuEvent, RtcEvent};

pub trait Platform {
    /// Charger / feature notification.
    fn on_event(&mut self, feature: Features, event: PmuEvent);

    /// Report a key state change to the input sink.
    fn report_key(&mut self, key: Key, pressed: bool);

    /// Flush buffered key reports. Called once at the end of every dispatch pass.
    fn sync_input(&mut self) {}

    /// Supply state changed (adapter/USB inserted or removed).
    fn power_status_changed(&mut self) {}

    /// RTC alarm or SECOND tick.
    fn rtc_event(&mut self, _event: RtcEvent) {}

    /// Whether a userspace init process exists that can be signalled.
    fn init_process_present(&self) -> bool;

    /// Ask init for an orderly power-fail shutdown.
    fn signal_init_power_fail(&mut self);

    /// Battery is low but init will handle it.
    fn low_battery(&mut self) {}

    /// Request an immediate critical power-down.
    fn critical_suspend(&mut self);

    /// Enable or disable the PMU interrupt line at the interrupt controller.
    fn set_irq_enabled(&mut self, _enabled: bool) {}

    /// Completion of a request queued with [`crate::Pcf50633::adc_read_async`].
    fn on_adc_result(&mut self, _context: u32, _sample: u16) {}
}
