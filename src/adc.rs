//! ADC request queue.
//!
//! The chip has one converter, so conversions are serialized through a small
//! ring. `head == tail` means idle, which leaves `ADC_QUEUE_DEPTH - 1` usable
//! slots. Only the request at the front is ever running on the hardware.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::i2c::I2c;

use crate::data_types::{AdcAverage, AdcChannel};
use crate::driver::Pcf50633;
use crate::error::Error;
use crate::platform::Platform;
use crate::registers::{
    ADCC1_ADCMUX_MASK, ADCC1_AVERAGE_MASK, ADCC2_RATIOMETRIC_OFF, ADCC3_ACCSW_EN, Adcc1, adc_result, addr,
};

/// Ring size, including the one slot sacrificed to tell full from empty.
pub const ADC_QUEUE_DEPTH: usize = 8;

const _: () = assert!(ADC_QUEUE_DEPTH.is_power_of_two());

/// Where a finished conversion is delivered.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdcCompletion {
    /// Wake the blocking reader parked on this waiter slot.
    Waiter(u8),
    /// Feed the sample to the charger classifier.
    ChargerDetect,
    /// Hand the sample to `Platform::on_adc_result` with this context.
    Platform(u32),
    /// The blocking reader went away before the result came in.
    Discard,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdcRequest {
    pub channel: AdcChannel,
    pub average: AdcAverage,
    pub completion: AdcCompletion,
}

impl AdcRequest {
    /// ADCC1 value that starts this conversion at 10-bit resolution.
    pub fn adcc1(&self) -> u8 {
        (self.channel.bits() & ADCC1_ADCMUX_MASK)
            | (self.average.bits() & ADCC1_AVERAGE_MASK)
            | (Adcc1::ADCSTART | Adcc1::RES_10BIT).bits()
    }
}

/// Fixed ring of pending conversions plus the blocking-waiter pool.
#[derive(Debug)]
pub struct AdcQueue {
    slots: [Option<AdcRequest>; ADC_QUEUE_DEPTH],
    head: usize,
    tail: usize,
    waiters: u8,
}

impl Default for AdcQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcQueue {
    pub const fn new() -> Self {
        Self {
            slots: [None; ADC_QUEUE_DEPTH],
            head: 0,
            tail: 0,
            waiters: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.head == self.tail
    }

    pub fn len(&self) -> usize {
        (self.head.wrapping_sub(self.tail)) & (ADC_QUEUE_DEPTH - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.is_idle()
    }

    /// Append a request.
    ///
    /// Returns `Ok(true)` when the queue was idle and the hardware must be
    /// started, `Ok(false)` when the request waits behind a running one. A full
    /// ring hands the request back untouched.
    pub fn push(&mut self, request: AdcRequest) -> Result<bool, AdcRequest> {
        let next = (self.head + 1) & (ADC_QUEUE_DEPTH - 1);
        if next == self.tail {
            return Err(request);
        }
        let was_idle = self.is_idle();
        self.slots[self.head] = Some(request);
        self.head = next;
        Ok(was_idle)
    }

    /// The request currently owning the converter.
    pub fn front(&self) -> Option<&AdcRequest> {
        if self.is_idle() {
            return None;
        }
        self.slots[self.tail].as_ref()
    }

    /// Remove the finished front request.
    ///
    /// Whoever pops the last request leaves the converter idle; the next
    /// `push` then reports `Ok(true)` and its caller starts the hardware.
    pub fn pop(&mut self) -> Option<AdcRequest> {
        if self.is_idle() {
            return None;
        }
        let request = self.slots[self.tail].take();
        self.tail = (self.tail + 1) & (ADC_QUEUE_DEPTH - 1);
        request
    }

    /// Reserve a blocking-waiter slot.
    pub fn claim_waiter(&mut self) -> Option<u8> {
        let free = (0..ADC_QUEUE_DEPTH as u8).find(|&w| self.waiters & (1 << w) == 0)?;
        self.waiters |= 1 << free;
        Some(free)
    }

    /// Free a waiter slot. A request still queued for it completes into nothing.
    pub fn release_waiter(&mut self, waiter: u8) {
        self.waiters &= !(1 << waiter);
        for request in self.slots.iter_mut().flatten() {
            if request.completion == AdcCompletion::Waiter(waiter) {
                request.completion = AdcCompletion::Discard;
            }
        }
    }
}

/// Holds a blocking-read waiter slot until the read returns or is dropped.
struct WaiterSlot<'a, M: RawMutex, I2C, P> {
    pmu: &'a Pcf50633<M, I2C, P>,
    index: u8,
}

impl<M: RawMutex, I2C, P> Drop for WaiterSlot<'_, M, I2C, P> {
    fn drop(&mut self) {
        let index = self.index;
        self.pmu.with_state(|s| s.adc.release_waiter(index));
    }
}

impl<M, I2C, P> Pcf50633<M, I2C, P>
where
    M: RawMutex,
    I2C: I2c,
    P: Platform,
{
    /// Convert one channel and wait for the 10-bit result.
    pub async fn adc_read(&self, channel: AdcChannel, average: AdcAverage) -> Result<u16, Error<I2C::Error>> {
        self.ready()?;
        let waiter = self.with_state(|s| s.adc.claim_waiter()).ok_or_else(|| {
            error!("no free ADC waiter");
            Error::AdcQueueFull
        })?;
        let _slot = WaiterSlot { pmu: self, index: waiter };
        self.adc_waiters[waiter as usize].reset();

        self.submit_adc(AdcRequest {
            channel,
            average,
            completion: AdcCompletion::Waiter(waiter),
        })
        .await?;
        Ok(self.adc_waiters[waiter as usize].wait().await)
    }

    /// Queue a conversion whose result goes to `Platform::on_adc_result(context, sample)`.
    pub async fn adc_read_async(
        &self,
        channel: AdcChannel,
        average: AdcAverage,
        context: u32,
    ) -> Result<(), Error<I2C::Error>> {
        self.ready()?;
        self.submit_adc(AdcRequest {
            channel,
            average,
            completion: AdcCompletion::Platform(context),
        })
        .await
    }

    /// Number of conversions queued or running.
    pub fn adc_pending(&self) -> usize {
        self.with_state(|s| s.adc.len())
    }

    /// Enqueue a request and start the converter if it was idle.
    ///
    /// Only an overflow is an error. A request that is queued but could not be
    /// started stays at the front and is kicked again on the next dispatch pass.
    pub(crate) async fn submit_adc(&self, request: AdcRequest) -> Result<(), Error<I2C::Error>> {
        let was_idle = self.with_state(|s| s.adc.push(request)).map_err(|dropped| {
            error!("ADC queue overflow, dropping {:?}", dropped);
            Error::AdcQueueFull
        })?;
        if was_idle {
            self.kick_adc().await;
        }
        Ok(())
    }

    /// Start the front request on the hardware.
    pub(crate) async fn kick_adc(&self) {
        let Some(request) = self.with_state(|s| s.adc.front().copied()) else {
            return;
        };
        let started = self.adc_setup(&request).await;
        if started.is_err() {
            error!("ADC start failed for {:?}", request.channel);
        }
        self.with_state(|s| s.adc_needs_kick = started.is_err());
    }

    async fn adc_setup(&self, request: &AdcRequest) -> Result<(), Error<I2C::Error>> {
        let mut i2c = self.lock_bus().await?;
        Self::bus_write(&mut i2c, self.address, addr::ADCC2, &[ADCC2_RATIOMETRIC_OFF]).await?;
        Self::bus_write(&mut i2c, self.address, addr::ADCC3, &[ADCC3_ACCSW_EN]).await?;
        Self::bus_write(&mut i2c, self.address, addr::ADCC1, &[request.adcc1()]).await
    }

    /// Queue a charger-detect conversion on ADCIN1.
    pub(crate) async fn queue_charger_detect(&self) {
        let request = AdcRequest {
            channel: AdcChannel::Adcin1,
            average: AdcAverage::Avg16,
            completion: AdcCompletion::ChargerDetect,
        };
        if self.submit_adc(request).await.is_err() {
            warn!("charger detection not queued");
        }
    }

    /// ADCRDY: collect the result, complete the front request and start the next one.
    pub(crate) async fn service_adc_ready(&self) {
        if self.with_state(|s| s.adc.is_idle()) {
            warn!("ADCRDY with no pending request");
            return;
        }

        let mut result = [0u8; 3];
        if self.read(addr::ADCS1, &mut result).await.is_err() {
            // The conversion is lost, run the same request again.
            warn!("ADC result read failed, restarting conversion");
            self.kick_adc().await;
            return;
        }
        let sample = adc_result(result[0], result[2]);

        let Some((request, more)) = self.with_state(|s| {
            let request = s.adc.pop()?;
            Some((request, !s.adc.is_idle()))
        }) else {
            return;
        };
        trace!("ADC {:?} -> {}", request.channel, sample);
        match request.completion {
            AdcCompletion::Waiter(w) => self.adc_waiters[w as usize].signal(sample),
            AdcCompletion::ChargerDetect => self.configure_for_charger(sample).await,
            AdcCompletion::Platform(context) => self.platform(|p| p.on_adc_result(context, sample)),
            AdcCompletion::Discard => debug!("ADC result {} dropped, reader gone", sample),
        }

        // An idle queue is restarted by the next submitter.
        if more {
            self.kick_adc().await;
        }
    }

    /// Battery voltage in millivolts.
    pub async fn battery_millivolts(&self) -> Result<u16, Error<I2C::Error>> {
        let sample = self.adc_read(AdcChannel::BatSnsResistive, AdcAverage::Avg16).await?;
        Ok(crate::registers::adc_to_millivolts(sample, self.config.battvolt_full_scale_mv))
    }

    /// Rough battery charge percentage from a linear voltage scale.
    pub async fn battery_percent(&self) -> Result<u16, Error<I2C::Error>> {
        let mv = self.battery_millivolts().await?;
        Ok(crate::registers::battery_percent(
            mv,
            self.config.battvolt_scale_start_mv,
            self.config.battvolt_scale_end_mv,
        ))
    }
}
