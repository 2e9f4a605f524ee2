//! Data types for the PCF50633 control core.

use crate::registers::{Int1, Int2, Int3, Int4, Int5, INT_REG_COUNT, MBCC7_USB_MASK};

/// Suspend/resume phase of the device.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SuspendPhase {
    Running,
    StartingSuspend,
    CompletedSuspend,
    StartingResume,
    CompletedResume,
}

impl SuspendPhase {
    /// Register traffic is only legal while running or right after resume.
    pub fn allows_bus_access(self) -> bool {
        matches!(self, SuspendPhase::Running | SuspendPhase::CompletedResume)
    }

    /// Phases in which the chip is going down or is already down.
    pub fn is_suspending(self) -> bool {
        matches!(self, SuspendPhase::StartingSuspend | SuspendPhase::CompletedSuspend)
    }
}

/// USB current limit tier (MBCC7[1:0]).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UsbCurrentTier {
    Ma100,
    Ma500,
    Ma1000,
    /// USB input suspended, no current drawn.
    Suspend,
}

impl UsbCurrentTier {
    /// Nearest tier not exceeding `ma`.
    pub fn from_milliamps(ma: u16) -> Self {
        match ma {
            1000.. => UsbCurrentTier::Ma1000,
            500.. => UsbCurrentTier::Ma500,
            100.. => UsbCurrentTier::Ma100,
            _ => UsbCurrentTier::Suspend,
        }
    }

    /// Decode the tier from a raw MBCC7 value.
    pub fn from_bits(mbcc7: u8) -> Self {
        match mbcc7 & MBCC7_USB_MASK {
            0x00 => UsbCurrentTier::Ma100,
            0x01 => UsbCurrentTier::Ma500,
            0x02 => UsbCurrentTier::Ma1000,
            _ => UsbCurrentTier::Suspend,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            UsbCurrentTier::Ma100 => 0x00,
            UsbCurrentTier::Ma500 => 0x01,
            UsbCurrentTier::Ma1000 => 0x02,
            UsbCurrentTier::Suspend => 0x03,
        }
    }

    pub fn milliamps(self) -> u16 {
        match self {
            UsbCurrentTier::Ma100 => 100,
            UsbCurrentTier::Ma500 => 500,
            UsbCurrentTier::Ma1000 => 1000,
            UsbCurrentTier::Suspend => 0,
        }
    }

    /// Only the 500 mA and 1 A tiers leave headroom for real charging current.
    pub fn permits_charging(self) -> bool {
        matches!(self, UsbCurrentTier::Ma500 | UsbCurrentTier::Ma1000)
    }
}

/// What is plugged into the USB connector, as judged from the ID-pin ADC sample.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChargerType {
    None,
    /// USB host or unknown adapter (catch-all while USB power is present).
    HostUsb,
    /// Dedicated 1 A charger.
    OneAmp,
}

/// Charger type together with the active USB tier.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChargerStatus {
    pub charger: ChargerType,
    pub tier: UsbCurrentTier,
}

/// ADC input mux selection (ADCC1[7:4]).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdcChannel {
    BatSnsResistive,
    BatSnsSubtractor,
    Adcin2Resistive,
    Adcin2Subtractor,
    BatTemp,
    /// USB ID / charger detect input.
    Adcin1,
}

impl AdcChannel {
    pub fn bits(self) -> u8 {
        match self {
            AdcChannel::BatSnsResistive => 0x00,
            AdcChannel::BatSnsSubtractor => 0x10,
            AdcChannel::Adcin2Resistive => 0x20,
            AdcChannel::Adcin2Subtractor => 0x30,
            AdcChannel::BatTemp => 0x60,
            AdcChannel::Adcin1 => 0x70,
        }
    }
}

/// ADC sample averaging (ADCC1[3:2]).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdcAverage {
    None,
    Avg4,
    Avg8,
    Avg16,
}

impl AdcAverage {
    pub fn bits(self) -> u8 {
        match self {
            AdcAverage::None => 0x00,
            AdcAverage::Avg4 => 0x04,
            AdcAverage::Avg8 => 0x08,
            AdcAverage::Avg16 => 0x0C,
        }
    }
}

bitflags::bitflags! {
    /// Optional chip features wired up on a given board.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Features: u8 {
        /// Main battery charger.
        const MBC     = 1 << 0;
        const RTC     = 1 << 1;
        const CHGCUR  = 1 << 2;
        const BATVOLT = 1 << 3;
        const BATTEMP = 1 << 4;
    }

    /// Driver-side status flags. Bit positions follow the chip's charger state naming.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct StatusFlags: u8 {
        const CHG_ENABLED = 1 << 0;
        const CHG_PRESENT = 1 << 1;
        const USB_PRESENT = 1 << 2;
        const CHG_ERR     = 1 << 3;
        const CHG_PROT    = 1 << 4;
        const CHG_READY   = 1 << 5;
        /// RTC asked for the SECOND tick.
        const RTC_SECOND  = 1 << 6;
        /// Power key currently held.
        const PWR_PRESSED = 1 << 7;
    }
}

impl StatusFlags {
    /// Human readable names of the charger-state bits that are set.
    pub fn charger_state_names(self) -> impl Iterator<Item = &'static str> {
        const NAMES: [(StatusFlags, &str); 6] = [
            (StatusFlags::CHG_ENABLED, "enabled"),
            (StatusFlags::CHG_PRESENT, "charger_present"),
            (StatusFlags::USB_PRESENT, "usb_present"),
            (StatusFlags::CHG_ERR, "error"),
            (StatusFlags::CHG_PROT, "protection"),
            (StatusFlags::CHG_READY, "ready"),
        ];
        NAMES
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

/// Event kinds handed to [`crate::Platform::on_event`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PmuEvent {
    /// Wall adapter inserted.
    Insert,
    /// Wall adapter removed.
    Remove,
    UsbInsert,
    UsbRemove,
    ChargerActive,
    ChargerIdle,
    ChargerChange,
}

/// Keys reported to the input sink.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Key {
    /// The ON key.
    Power,
    /// USB power presence.
    Power2,
    /// Wall adapter presence.
    Battery,
}

/// Events forwarded to the RTC sink.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RtcEvent {
    Alarm,
    Second,
}

/// Charger state machine as reported by MBCS2.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChargeMode {
    PlayOnly,
    Precharge,
    PrechargeWait,
    Fast,
    FastWait,
    Suspended,
    BatteryFull,
    Halt,
    Unknown(u8),
}

impl ChargeMode {
    pub fn from_bits(mbcs2: u8) -> Self {
        match mbcs2 & crate::registers::MBCS2_MBC_MASK {
            0x00 => ChargeMode::PlayOnly,
            0x01 | 0x06 => ChargeMode::Precharge,
            0x02 | 0x07 => ChargeMode::PrechargeWait,
            0x03 | 0x08 => ChargeMode::Fast,
            0x04 | 0x09 => ChargeMode::FastWait,
            0x05 => ChargeMode::Suspended,
            0x0A => ChargeMode::BatteryFull,
            0x0B => ChargeMode::Halt,
            other => ChargeMode::Unknown(other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChargeMode::PlayOnly => "play-only",
            ChargeMode::Precharge => "pre",
            ChargeMode::PrechargeWait => "pre-wait",
            ChargeMode::Fast => "fast",
            ChargeMode::FastWait => "fast-wait",
            ChargeMode::Suspended => "suspended",
            ChargeMode::BatteryFull => "bat-full",
            ChargeMode::Halt => "halt",
            ChargeMode::Unknown(_) => "unknown",
        }
    }
}

/// General purpose outputs.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Gpio {
    Gpio1,
    Gpio2,
    Gpio3,
    Gpo,
}

impl Gpio {
    /// Configuration register of this output.
    pub fn config_reg(self) -> u8 {
        use crate::registers::addr;
        match self {
            Gpio::Gpio1 => addr::GPIO1CFG,
            Gpio::Gpio2 => addr::GPIO2CFG,
            Gpio::Gpio3 => addr::GPIO3CFG,
            Gpio::Gpo => addr::GPOCFG,
        }
    }
}

/// Snapshot of the five interrupt status registers.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InterruptStatus(pub [u8; INT_REG_COUNT]);

impl InterruptStatus {
    pub fn int1(&self) -> Int1 {
        Int1::from_bits_truncate(self.0[0])
    }

    pub fn int2(&self) -> Int2 {
        Int2::from_bits_retain(self.0[1])
    }

    pub fn int3(&self) -> Int3 {
        Int3::from_bits_retain(self.0[2])
    }

    pub fn int4(&self) -> Int4 {
        Int4::from_bits_retain(self.0[3])
    }

    pub fn int5(&self) -> Int5 {
        Int5::from_bits_retain(self.0[4])
    }

    /// Whether interrupt source `n` (bit `n & 7` of status byte `n >> 3`) is set.
    pub fn is_set(&self, n: usize) -> bool {
        n < INT_REG_COUNT * 8 && self.0[n >> 3] & (1 << (n & 7)) != 0
    }
}

/// How a dispatch pass ended.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    /// Status block read and every asserted bit handled.
    Serviced,
    /// Device is suspending; nothing touched.
    Skipped,
    /// Bus or phase not ready yet; the pass must run again after a backoff.
    Rescheduled,
}
