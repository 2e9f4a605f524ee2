//! Register-level fake of the PMU plus a recording platform, shared by the behavioural tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::Duration;
use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
use pcf50633_rs::config::Config;
use pcf50633_rs::data_types::{Features, Key, PmuEvent, RtcEvent};
use pcf50633_rs::registers::{Adcc1, addr};
use pcf50633_rs::{DEFAULT_I2C_ADDRESS, Pcf50633, Platform};

pub type Pmu = Pcf50633<NoopRawMutex, FakeBus, FakePlatform>;

#[derive(Debug)]
pub struct BusFault;

impl embedded_hal::i2c::Error for BusFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Register file with clear-on-read interrupt status and a one-shot ADC model.
pub struct Regs {
    pub mem: [u8; 256],
    /// Every register write as (first register, payload).
    pub writes: Vec<(u8, Vec<u8>)>,
    pub transactions: usize,
    /// Number of upcoming read operations that fail.
    pub fail_reads: usize,
    /// Fail the next read that starts at this register.
    pub fail_reg: Option<u8>,
    /// Sample returned per ADC mux selection (ADCC1 bits 7-4).
    pub adc_samples: HashMap<u8, u16>,
    pub adc_starts: Vec<u8>,
    /// Yield to the executor before every transaction.
    pub yield_each: bool,
}

impl Regs {
    fn write(&mut self, reg: u8, payload: &[u8]) {
        self.writes.push((reg, payload.to_vec()));
        for (i, &byte) in payload.iter().enumerate() {
            let a = reg.wrapping_add(i as u8);
            self.mem[a as usize] = byte;
            if a == addr::ADCC1 && byte & Adcc1::ADCSTART.bits() != 0 {
                let mux = byte & 0xF0;
                let sample = self.adc_samples.get(&mux).copied().unwrap_or(0);
                self.mem[addr::ADCS1 as usize] = (sample >> 2) as u8;
                self.mem[addr::ADCS3 as usize] = (sample & 0x03) as u8;
                self.mem[addr::INT3 as usize] |= 0x40;
                self.adc_starts.push(mux);
            }
        }
    }

    fn read(&mut self, reg: u8, buf: &mut [u8]) {
        for (i, slot) in buf.iter_mut().enumerate() {
            let a = reg.wrapping_add(i as u8);
            *slot = self.mem[a as usize];
            if (addr::INT1..=addr::INT5).contains(&a) {
                self.mem[a as usize] = 0;
            }
        }
    }

    /// Register writes that targeted `reg` as their first register.
    pub fn writes_to(&self, reg: u8) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|(r, _)| *r == reg)
            .map(|(_, data)| data.clone())
            .collect()
    }
}

#[derive(Clone)]
pub struct FakeBus(pub Rc<RefCell<Regs>>);

impl FakeBus {
    pub fn new() -> Self {
        FakeBus(Rc::new(RefCell::new(Regs {
            mem: [0; 256],
            writes: Vec::new(),
            transactions: 0,
            fail_reads: 0,
            fail_reg: None,
            adc_samples: HashMap::new(),
            adc_starts: Vec::new(),
            yield_each: false,
        })))
    }

    pub fn reg(&self, reg: u8) -> u8 {
        self.0.borrow().mem[reg as usize]
    }

    pub fn set_reg(&self, reg: u8, value: u8) {
        self.0.borrow_mut().mem[reg as usize] = value;
    }

    /// Latch interrupt bits in status register `INT1 + index`.
    pub fn raise(&self, index: u8, bits: u8) {
        self.0.borrow_mut().mem[(addr::INT1 + index) as usize] |= bits;
    }

    pub fn set_adc_sample(&self, mux: u8, sample: u16) {
        self.0.borrow_mut().adc_samples.insert(mux, sample);
    }

    pub fn transactions(&self) -> usize {
        self.0.borrow().transactions
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.0.borrow_mut().fail_reads = count;
    }

    pub fn fail_read_of(&self, reg: u8) {
        self.0.borrow_mut().fail_reg = Some(reg);
    }

    /// Make every transaction suspend once, so concurrent callers interleave.
    pub fn yield_on_every_transaction(&self) {
        self.0.borrow_mut().yield_each = true;
    }

    pub fn usb_power(&self, present: bool) {
        self.set_reg(addr::MBCS1, if present { 0x03 } else { 0x00 });
    }
}

impl ErrorType for FakeBus {
    type Error = BusFault;
}

impl embedded_hal_async::i2c::I2c for FakeBus {
    async fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), BusFault> {
        assert_eq!(address, DEFAULT_I2C_ADDRESS);
        if self.0.borrow().yield_each {
            yield_now().await;
        }
        let mut regs = self.0.borrow_mut();
        regs.transactions += 1;
        let mut pointer = 0u8;
        for op in operations {
            match op {
                Operation::Write(data) => {
                    let (&reg, payload) = data.split_first().ok_or(BusFault)?;
                    pointer = reg;
                    if !payload.is_empty() {
                        regs.write(reg, payload);
                    }
                }
                Operation::Read(buf) => {
                    if regs.fail_reg == Some(pointer) {
                        regs.fail_reg = None;
                        return Err(BusFault);
                    }
                    if regs.fail_reads > 0 {
                        regs.fail_reads -= 1;
                        return Err(BusFault);
                    }
                    regs.read(pointer, buf);
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct Record {
    pub events: Vec<(Features, PmuEvent)>,
    pub keys: Vec<(Key, bool)>,
    pub syncs: usize,
    pub power_changes: usize,
    pub rtc: Vec<RtcEvent>,
    pub init_present: bool,
    pub init_signals: usize,
    pub low_battery: usize,
    pub critical: usize,
    pub irq_enabled: Vec<bool>,
    pub adc_results: Vec<(u32, u16)>,
}

#[derive(Clone, Default)]
pub struct FakePlatform(pub Rc<RefCell<Record>>);

impl FakePlatform {
    pub fn events(&self) -> Vec<PmuEvent> {
        self.0.borrow().events.iter().map(|(_, e)| *e).collect()
    }

    pub fn count(&self, event: PmuEvent) -> usize {
        self.events().into_iter().filter(|e| *e == event).count()
    }

    pub fn keys(&self) -> Vec<(Key, bool)> {
        self.0.borrow().keys.clone()
    }

    pub fn clear(&self) {
        let mut r = self.0.borrow_mut();
        r.events.clear();
        r.keys.clear();
    }

    pub fn with_init(self, present: bool) -> Self {
        self.0.borrow_mut().init_present = present;
        self
    }
}

impl Platform for FakePlatform {
    fn on_event(&mut self, feature: Features, event: PmuEvent) {
        self.0.borrow_mut().events.push((feature, event));
    }

    fn report_key(&mut self, key: Key, pressed: bool) {
        self.0.borrow_mut().keys.push((key, pressed));
    }

    fn sync_input(&mut self) {
        self.0.borrow_mut().syncs += 1;
    }

    fn power_status_changed(&mut self) {
        self.0.borrow_mut().power_changes += 1;
    }

    fn rtc_event(&mut self, event: RtcEvent) {
        self.0.borrow_mut().rtc.push(event);
    }

    fn init_process_present(&self) -> bool {
        self.0.borrow().init_present
    }

    fn signal_init_power_fail(&mut self) {
        self.0.borrow_mut().init_signals += 1;
    }

    fn low_battery(&mut self) {
        self.0.borrow_mut().low_battery += 1;
    }

    fn critical_suspend(&mut self) {
        self.0.borrow_mut().critical += 1;
    }

    fn set_irq_enabled(&mut self, enabled: bool) {
        self.0.borrow_mut().irq_enabled.push(enabled);
    }

    fn on_adc_result(&mut self, context: u32, sample: u16) {
        self.0.borrow_mut().adc_results.push((context, sample));
    }
}

/// Defaults with no debounce or backoff, and a short watcher poll.
pub fn fast_config() -> Config {
    Config::default().with_timings(Duration::from_ticks(0), Duration::from_millis(1), Duration::from_ticks(0))
}

/// ADCIN1 mux value.
pub const MUX_ADCIN1: u8 = 0x70;
/// ID-pin sample of an unterminated connector.
pub const SAMPLE_NOTHING: u16 = 43;
/// ID-pin sample of a dedicated 1 A charger.
pub const SAMPLE_ONE_AMP: u16 = 6;

pub fn new_pmu(config: Config) -> (Pmu, FakeBus, FakePlatform) {
    let bus = FakeBus::new();
    let platform = FakePlatform::default().with_init(true);
    bus.set_adc_sample(MUX_ADCIN1, SAMPLE_NOTHING);
    let pmu = Pcf50633::new(bus.clone(), platform.clone(), config);
    (pmu, bus, platform)
}

/// Attach and run the coldplug pass plus the charger detection it queues.
pub async fn attach(pmu: &Pmu) {
    pmu.init().await.unwrap();
    pmu.dispatch().await;
    pmu.dispatch().await;
}

pub fn usb_tier(bus: &FakeBus) -> u8 {
    bus.reg(addr::MBCC7) & 0x03
}
