//! Register map and constants for PCF50633.
//! Only the registers touched by the control core are listed; regulator, RTC and LED
//! blocks belong to their own sub-drivers.

/// Default 7-bit I2C address of the PMU.
pub const DEFAULT_I2C_ADDRESS: u8 = 0x73;

/// Register addresses.
pub mod addr {
    /// Interrupt status block, five consecutive registers, cleared on read.
    pub const INT1: u8 = 0x02;
    pub const INT2: u8 = 0x03;
    pub const INT3: u8 = 0x04;
    pub const INT4: u8 = 0x05;
    pub const INT5: u8 = 0x06;
    /// Interrupt mask block, one register per status byte (1 = masked).
    pub const INT1M: u8 = 0x07;
    pub const INT2M: u8 = 0x08;
    pub const INT3M: u8 = 0x09;
    pub const INT4M: u8 = 0x0A;
    pub const INT5M: u8 = 0x0B;
    /// On/off controller shutdown control.
    pub const OOCSHDWN: u8 = 0x0C;
    /// GPIO / GPO output configuration (consecutive).
    pub const GPIO1CFG: u8 = 0x14;
    pub const GPIO2CFG: u8 = 0x15;
    pub const GPIO3CFG: u8 = 0x16;
    pub const GPOCFG: u8 = 0x17;
    /// Main battery charger control.
    pub const MBCC1: u8 = 0x43;
    /// Fast charge current ceiling (USB path).
    pub const MBCC5: u8 = 0x47;
    /// USB current limit and battery temperature control.
    pub const MBCC7: u8 = 0x49;
    /// Charger status.
    pub const MBCS1: u8 = 0x4B;
    pub const MBCS2: u8 = 0x4C;
    pub const MBCS3: u8 = 0x4D;
    /// ADC control.
    pub const ADCC1: u8 = 0x52;
    pub const ADCC2: u8 = 0x53;
    pub const ADCC3: u8 = 0x54;
    /// ADC result.
    pub const ADCS1: u8 = 0x55;
    pub const ADCS3: u8 = 0x57;
}

/// Number of interrupt status (and mask) registers.
pub const INT_REG_COUNT: usize = 5;

/// MBCC7 bits 1-0 select the USB current limit tier.
pub const MBCC7_USB_MASK: u8 = 0x03;
/// ADCS3 bits 1-0 hold the two low bits of a 10-bit conversion.
pub const ADCS3_ADCDAT1L_MASK: u8 = 0x03;
/// ADCC1 bits 7-4 select the input mux.
pub const ADCC1_ADCMUX_MASK: u8 = 0xF0;
/// ADCC1 bits 3-2 select sample averaging.
pub const ADCC1_AVERAGE_MASK: u8 = 0x0C;
/// MBCS2 bits 3-0 hold the charger state machine.
pub const MBCS2_MBC_MASK: u8 = 0x0F;
/// GPIO/GPO configuration selector field.
pub const GPIOCFG_MASK: u8 = 0x0F;
/// Selector value driving the output constantly high.
pub const GPOCFG_GPOSEL_1: u8 = 0x07;
/// Selector value driving the output constantly low.
pub const GPOCFG_GPOSEL_0: u8 = 0x00;
/// Output polarity inversion bit.
pub const GPOCFG_GPOSEL_INVERSE: u8 = 0x08;

/// MBCC5 value that removes the fast charge ceiling; the USB tier still bounds the draw.
pub const MBCC5_FAST_CHARGE_MAX: u8 = 0xFF;

/// ADCC2 value that disables ratiometric mode.
pub const ADCC2_RATIOMETRIC_OFF: u8 = 0x00;
/// ADCC3 value that enables ACCSW biasing.
pub const ADCC3_ACCSW_EN: u8 = 0x01;

bitflags::bitflags! {
    /// INT1 status / mask bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Int1: u8 {
        const ADPINS = 1 << 0;
        const ADPREM = 1 << 1;
        const USBINS = 1 << 2;
        const USBREM = 1 << 3;
        // Bits 5-4 reserved.
        const ALARM  = 1 << 6;
        const SECOND = 1 << 7;
    }

    /// INT2 status / mask bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Int2: u8 {
        const ONKEYR  = 1 << 0;
        const ONKEYF  = 1 << 1;
        const EXTON1R = 1 << 2;
        const EXTON1F = 1 << 3;
        const EXTON2R = 1 << 4;
        const EXTON2F = 1 << 5;
        const EXTON3R = 1 << 6;
        const EXTON3F = 1 << 7;
    }

    /// INT3 status / mask bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Int3: u8 {
        const BATFULL   = 1 << 0;
        const CHGHALT   = 1 << 1;
        const THLIMON   = 1 << 2;
        const THLIMOFF  = 1 << 3;
        const USBLIMON  = 1 << 4;
        const USBLIMOFF = 1 << 5;
        const ADCRDY    = 1 << 6;
        const ONKEY1S   = 1 << 7;
    }

    /// INT4 status / mask bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Int4: u8 {
        const LOWSYS      = 1 << 0;
        const LOWBAT      = 1 << 1;
        const HIGHTMP     = 1 << 2;
        const AUTOPWRFAIL = 1 << 3;
        const DWN1PWRFAIL = 1 << 4;
        const DWN2PWRFAIL = 1 << 5;
        const LEDPWRFAIL  = 1 << 6;
        const LEDOVP      = 1 << 7;
    }

    /// INT5 status / mask bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Int5: u8 {
        const LDO1PWRFAIL  = 1 << 0;
        const LDO2PWRFAIL  = 1 << 1;
        const LDO3PWRFAIL  = 1 << 2;
        const LDO4PWRFAIL  = 1 << 3;
        const LDO5PWRFAIL  = 1 << 4;
        const LDO6PWRFAIL  = 1 << 5;
        const HCLDOPWRFAIL = 1 << 6;
        const HCLDOOVL     = 1 << 7;
    }

    /// OOCSHDWN register bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct OocShdwn: u8 {
        /// Enter standby (main supplies off).
        const GOSTDBY  = 1 << 0;
        /// Host handles the condition; chip must not reset on its own timer.
        const TOTRST   = 1 << 2;
    }

    /// MBCC1 register bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Mbcc1: u8 {
        const CHGENA  = 1 << 0;
        const AUTORES = 1 << 2;
        const RESUME  = 1 << 3;
    }

    /// MBCS1 register bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Mbcs1: u8 {
        const USBPRES   = 1 << 0;
        const USBOK     = 1 << 1;
        const ADAPTPRES = 1 << 2;
        const ADAPTOK   = 1 << 3;
    }

    /// MBCS3 register bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Mbcs3: u8 {
        const USBLIM_PLAY = 1 << 0;
        const USBLIM_CHG  = 1 << 1;
        const TLIM_PLAY   = 1 << 2;
        const TLIM_CHG    = 1 << 3;
        const ILIM        = 1 << 4;
        const VLIM        = 1 << 5;
        /// Battery voltage above the presence threshold.
        const VBATSTAT    = 1 << 6;
        const VRES        = 1 << 7;
    }

    /// ADCC1 control bits (mux and averaging are multi-bit fields, see `AdcChannel` / `AdcAverage`).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Adcc1: u8 {
        const ADCSTART  = 1 << 0;
        const RES_10BIT = 1 << 1;
    }
}

/// Combine ADCS1 (bits 9-2) and ADCS3 (bits 1-0) into a 10-bit sample.
pub fn adc_result(adcs1: u8, adcs3: u8) -> u16 {
    ((adcs1 as u16) << 2) | (adcs3 & ADCS3_ADCDAT1L_MASK) as u16
}

/// Convert a BATSNS sample to millivolts (10-bit over `full_scale_mv`).
pub fn adc_to_millivolts(sample: u16, full_scale_mv: u32) -> u16 {
    ((sample as u32 * full_scale_mv) / 1024) as u16
}

/// Linear battery percentage between `start_mv` and `end_mv`.
///
/// This scale is a rough approximation and is kept as-is; voltages under
/// `start_mv` read as 0.
pub fn battery_percent(mv: u16, start_mv: u16, end_mv: u16) -> u16 {
    let divider = (end_mv.saturating_sub(start_mv) / 100).max(1);
    mv.saturating_sub(start_mv) / divider
}

/// True when both USB presence and USB-OK are reported in MBCS1.
pub fn usb_power_ok(mbcs1: u8) -> bool {
    Mbcs1::from_bits_truncate(mbcs1).contains(Mbcs1::USBPRES | Mbcs1::USBOK)
}
