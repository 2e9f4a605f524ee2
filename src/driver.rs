//! Device handle and register access layer for PCF50633.
//!
//! One [`Pcf50633`] value owns the bus, the platform sink and all device state.
//! Every register operation takes the bus lock for its own duration only and is
//! refused while the suspend/resume sequencer keeps the bus quiet.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use embedded_hal::i2c::Error as _;
use embedded_hal_async::i2c::I2c;

use crate::adc::{ADC_QUEUE_DEPTH, AdcQueue};
use crate::config::Config;
use crate::data_types::{Features, Gpio, InterruptStatus, PmuEvent, StatusFlags, SuspendPhase};
use crate::error::Error;
use crate::nobat::NoBatteryWatch;
use crate::platform::Platform;
use crate::registers::{
    DEFAULT_I2C_ADDRESS, GPIOCFG_MASK, GPOCFG_GPOSEL_0, GPOCFG_GPOSEL_1, GPOCFG_GPOSEL_INVERSE, INT_REG_COUNT,
    Int4, Int5, OocShdwn, addr,
};

/// Longest burst accepted by [`Pcf50633::write`].
pub const MAX_BURST: usize = 7;

/// Mutable device state, guarded by a short blocking lock.
pub(crate) struct DeviceState {
    pub(crate) phase: SuspendPhase,
    pub(crate) initialized: bool,
    pub(crate) flags: StatusFlags,
    /// Last limit handed to `set_current_limit`, 0 after USB removal.
    pub(crate) last_curlim_ma: u16,
    pub(crate) usb_removal_count: u32,
    pub(crate) pending_curlim_ma: u16,
    pub(crate) curlim_removal_snapshot: u32,
    /// Seconds the ON key has been held past ONKEY1S, -1 while released.
    pub(crate) onkey_seconds: i16,
    pub(crate) suppress_onkey_events: bool,
    pub(crate) coldplug_done: bool,
    pub(crate) resume_reasons: InterruptStatus,
    pub(crate) last_bat_insert: Option<Instant>,
    pub(crate) rail_faults: (Int4, Int5),
    pub(crate) irq_enabled: bool,
    pub(crate) irq_refs: u32,
    pub(crate) working: bool,
    pub(crate) adc: AdcQueue,
    /// Front ADC request could not be started and must be kicked again.
    pub(crate) adc_needs_kick: bool,
}

impl DeviceState {
    const fn new() -> Self {
        Self {
            phase: SuspendPhase::Running,
            initialized: false,
            flags: StatusFlags::empty(),
            last_curlim_ma: 0,
            usb_removal_count: 0,
            pending_curlim_ma: 0,
            curlim_removal_snapshot: 0,
            onkey_seconds: -1,
            suppress_onkey_events: false,
            coldplug_done: false,
            resume_reasons: InterruptStatus([0; INT_REG_COUNT]),
            last_bat_insert: None,
            rail_faults: (Int4::empty(), Int5::empty()),
            irq_enabled: false,
            irq_refs: 0,
            working: false,
            adc: AdcQueue::new(),
            adc_needs_kick: false,
        }
    }
}

/// PCF50633 control core.
pub struct Pcf50633<M: RawMutex, I2C, P> {
    /// Register lock: serializes every bus transaction.
    pub(crate) bus: Mutex<M, I2C>,
    pub(crate) address: u8,
    pub(crate) config: Config,
    pub(crate) state: BlockingMutex<M, RefCell<DeviceState>>,
    pub(crate) platform: BlockingMutex<M, RefCell<P>>,
    /// At most one dispatch pass at a time.
    pub(crate) dispatch_lock: Mutex<M, ()>,
    /// Serializes deferred current-limit application.
    pub(crate) curlim_lock: Mutex<M, ()>,
    /// Single-instance guard of the no-battery watcher.
    pub(crate) nobat: BlockingMutex<M, Cell<NoBatteryWatch>>,
    pub(crate) irq_pending: Signal<M, ()>,
    pub(crate) curlim_pending: Signal<M, ()>,
    pub(crate) nobat_start: Signal<M, ()>,
    pub(crate) adc_waiters: [Signal<M, u16>; ADC_QUEUE_DEPTH],
}

impl<M: RawMutex, I2C, P> Pcf50633<M, I2C, P> {
    /// Create a new control core at the default I2C address (0x73).
    pub fn new(i2c: I2C, platform: P, config: Config) -> Self {
        Self::with_address(i2c, DEFAULT_I2C_ADDRESS, platform, config)
    }

    /// Create a new control core with a custom I2C address.
    pub fn with_address(i2c: I2C, address: u8, platform: P, config: Config) -> Self {
        Self {
            bus: Mutex::new(i2c),
            address,
            config,
            state: BlockingMutex::new(RefCell::new(DeviceState::new())),
            platform: BlockingMutex::new(RefCell::new(platform)),
            dispatch_lock: Mutex::new(()),
            curlim_lock: Mutex::new(()),
            nobat: BlockingMutex::new(Cell::new(NoBatteryWatch::default())),
            irq_pending: Signal::new(),
            curlim_pending: Signal::new(),
            nobat_start: Signal::new(),
            adc_waiters: [const { Signal::new() }; ADC_QUEUE_DEPTH],
        }
    }

    /// Detach: hand back the bus and the platform sink.
    pub fn release(self) -> (I2C, P) {
        (self.bus.into_inner(), self.platform.into_inner().into_inner())
    }

    /// Return the 7-bit I2C address configured for this instance.
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    pub fn phase(&self) -> SuspendPhase {
        self.with_state(|s| s.phase)
    }

    pub fn flags(&self) -> StatusFlags {
        self.with_state(|s| s.flags)
    }

    /// Limit remembered from the last `set_current_limit` (0 after USB removal).
    pub fn last_current_limit(&self) -> u16 {
        self.with_state(|s| s.last_curlim_ma)
    }

    pub fn usb_removal_count(&self) -> u32 {
        self.with_state(|s| s.usb_removal_count)
    }

    /// Seconds the ON key has been held past the one-second mark, `-1` while released.
    pub fn onkey_seconds(&self) -> i16 {
        self.with_state(|s| s.onkey_seconds)
    }

    pub fn coldplug_done(&self) -> bool {
        self.with_state(|s| s.coldplug_done)
    }

    /// Interrupt status captured by the first pass after resume.
    pub fn resume_reasons(&self) -> InterruptStatus {
        self.with_state(|s| s.resume_reasons)
    }

    /// Power rail failures seen since attach (INT4 fail bits, INT5).
    pub fn rail_faults(&self) -> (Int4, Int5) {
        self.with_state(|s| s.rail_faults)
    }

    /// Interrupt references taken by `on_interrupt` and not yet released by a finished pass.
    pub fn pending_irq_references(&self) -> u32 {
        self.with_state(|s| s.irq_refs)
    }

    pub(crate) fn platform<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        self.platform.lock(|platform| f(&mut platform.borrow_mut()))
    }
}

impl<M, I2C, P> Pcf50633<M, I2C, P>
where
    M: RawMutex,
    I2C: I2c,
    P: Platform,
{
    /// Attach: unmask every interrupt source and open the interrupt line.
    ///
    /// SECOND stays unmasked so the first tick kicks the coldplug pass.
    pub async fn init(&self) -> Result<(), Error<I2C::Error>> {
        self.write(addr::INT1M, &[0; INT_REG_COUNT]).await?;
        self.with_state(|s| {
            s.initialized = true;
            s.irq_enabled = true;
        });
        self.platform(|p| p.set_irq_enabled(true));
        info!("PCF50633 probe completed");
        Ok(())
    }

    /// Report whether the device can take requests: `NotReady` before `init()`,
    /// `Busy` while suspending or resuming.
    pub fn ready(&self) -> Result<(), Error<I2C::Error>> {
        self.with_state(|s| {
            if !s.initialized {
                return Err(Error::NotReady);
            }
            match s.phase {
                SuspendPhase::Running | SuspendPhase::CompletedResume => Ok(()),
                _ => Err(Error::Busy),
            }
        })
    }

    /// Take the bus lock, refusing while the bus must stay quiet.
    pub(crate) async fn lock_bus(&self) -> Result<MutexGuard<'_, M, I2C>, Error<I2C::Error>> {
        let guard = self.bus.lock().await;
        let phase = self.phase();
        if !phase.allows_bus_access() {
            error!("PCF50633 register access while {:?}", phase);
            return Err(Error::PhaseViolation(phase));
        }
        Ok(guard)
    }

    pub(crate) async fn bus_read(
        i2c: &mut I2C,
        address: u8,
        reg: u8,
        data: &mut [u8],
    ) -> Result<(), Error<I2C::Error>> {
        i2c.write_read(address, &[reg], data).await.map_err(|e| {
            debug!("I2C read at {:#x} failed: {:?}", reg, e.kind());
            Error::I2c(e)
        })
    }

    pub(crate) async fn bus_write(
        i2c: &mut I2C,
        address: u8,
        reg: u8,
        data: &[u8],
    ) -> Result<(), Error<I2C::Error>> {
        let mut buf = [0u8; MAX_BURST + 1];
        if data.len() > MAX_BURST {
            return Err(Error::OutOfRange);
        }
        buf[0] = reg;
        buf[1..=data.len()].copy_from_slice(data);
        i2c.write(address, &buf[..=data.len()]).await.map_err(|e| {
            debug!("I2C write at {:#x} failed: {:?}", reg, e.kind());
            Error::I2c(e)
        })
    }

    /// Read a block of consecutive registers in one transaction.
    pub async fn read(&self, reg: u8, data: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        let mut i2c = self.lock_bus().await?;
        Self::bus_read(&mut i2c, self.address, reg, data).await
    }

    /// Write a block of consecutive registers (up to [`MAX_BURST`]) in one transaction.
    pub async fn write(&self, reg: u8, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        let mut i2c = self.lock_bus().await?;
        Self::bus_write(&mut i2c, self.address, reg, data).await
    }

    /// Read a single register.
    pub async fn read_reg(&self, reg: u8) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.read(reg, &mut buf).await?;
        Ok(buf[0])
    }

    /// Write a single register.
    pub async fn write_reg(&self, reg: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.write(reg, &[value]).await
    }

    /// Replace the `mask` bits of a register with `value` (read-modify-write under one lock).
    pub async fn set_bits(&self, reg: u8, mask: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        let mut i2c = self.lock_bus().await?;
        let mut cur = [0u8; 1];
        Self::bus_read(&mut i2c, self.address, reg, &mut cur).await?;
        let new = (cur[0] & !mask) | (value & mask);
        Self::bus_write(&mut i2c, self.address, reg, &[new]).await
    }

    /// Clear the `mask` bits of a register (read-modify-write under one lock).
    pub async fn clear_bits(&self, reg: u8, mask: u8) -> Result<(), Error<I2C::Error>> {
        self.set_bits(reg, mask, 0).await
    }

    /// Send a charger notification to the platform.
    pub(crate) fn notify(&self, event: PmuEvent) {
        self.platform(|p| p.on_event(Features::MBC, event));
    }

    /// Power off the main CPU and peripherals (PMU standby).
    pub async fn go_standby(&self) -> Result<(), Error<I2C::Error>> {
        self.set_bits(addr::OOCSHDWN, OocShdwn::GOSTDBY.bits(), OocShdwn::GOSTDBY.bits())
            .await
    }

    /// Drive a general purpose output constantly high or low.
    pub async fn gpio_set(&self, gpio: Gpio, on: bool) -> Result<(), Error<I2C::Error>> {
        let sel = if on { GPOCFG_GPOSEL_1 } else { GPOCFG_GPOSEL_0 };
        self.set_bits(gpio.config_reg(), GPIOCFG_MASK, sel).await
    }

    /// Whether a general purpose output is configured to drive high.
    pub async fn gpio_get(&self, gpio: Gpio) -> Result<bool, Error<I2C::Error>> {
        let val = self.read_reg(gpio.config_reg()).await? & GPIOCFG_MASK;
        Ok(val == GPOCFG_GPOSEL_1 || val == (GPOCFG_GPOSEL_0 | GPOCFG_GPOSEL_INVERSE))
    }

    /// Snapshot of the whole register space.
    ///
    /// The interrupt status registers read back as zero: reading them would
    /// clear pending events behind the dispatch engine's back.
    pub async fn dump_registers(&self) -> Result<[u8; 256], Error<I2C::Error>> {
        let mut dump = [0u8; 256];
        let mut i2c = self.lock_bus().await?;
        for (reg, slot) in dump.iter_mut().enumerate() {
            let reg = reg as u8;
            if (addr::INT1..=addr::INT5).contains(&reg) {
                continue;
            }
            let mut buf = [0u8; 1];
            Self::bus_read(&mut i2c, self.address, reg, &mut buf).await?;
            *slot = buf[0];
        }
        Ok(dump)
    }
}
