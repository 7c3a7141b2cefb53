//! API for the ADC (Analog to Digital Converter) peripheral. Supports blocking
//! single-channel reads, regular conversion sequences, and DMA requests.

use core::ops::Deref;

use crate::{
    pac::{self, ADC_COMMON, RCC},
    util::RccPeriph,
};

/// ADC interrupt sources. Enabled in CR1; flags live in SR.
#[derive(Clone, Copy)]
pub enum AdcInterrupt {
    /// End of conversion (EOCIE)
    EndOfConversion,
    /// Overrun (OVRIE)
    Overrun,
    /// Analog watchdog (AWDIE)
    AnalogWatchdog,
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// Conversion resolution. Sets ADC_CR1, RES field. Lower resolutions convert faster.
pub enum Resolution {
    B12 = 0b00,
    B10 = 0b01,
    B8 = 0b10,
    B6 = 0b11,
}

impl Default for Resolution {
    fn default() -> Self {
        Self::B12
    }
}

/// ADC data register alignment. Sets ADC_CR2, ALIGN field.
#[derive(Clone, Copy)]
#[repr(u8)]
pub enum Align {
    /// Right alignment of output data
    Right = 0,
    /// Left alignment of output data
    Left = 1,
}

impl Default for Align {
    fn default() -> Self {
        Align::Right
    }
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// The APB2 division factor for the ADC clock, shared by all converters. Sets
/// ADC_CCR, ADCPRE field. ADCCLK must stay at or below 36Mhz.
pub enum Prescaler {
    Div2 = 0b00,
    Div4 = 0b01,
    Div6 = 0b10,
    Div8 = 0b11,
}

impl Prescaler {
    /// The numeric division factor.
    pub fn divisor(&self) -> u32 {
        match self {
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div6 => 6,
            Self::Div8 => 8,
        }
    }
}

impl Default for Prescaler {
    fn default() -> Self {
        Self::Div4
    }
}

/// ADC sampling time, in ADC clock cycles. Each channel can be sampled with a
/// different time. Total conversion time is the sample time plus 12 cycles
/// (at 12-bit resolution).
#[derive(Clone, Copy)]
#[repr(u8)]
pub enum SampleTime {
    /// 3 cycles
    T3 = 0b000,
    /// 15 cycles
    T15 = 0b001,
    /// 28 cycles
    T28 = 0b010,
    /// 56 cycles
    T56 = 0b011,
    /// 84 cycles
    T84 = 0b100,
    /// 112 cycles
    T112 = 0b101,
    /// 144 cycles
    T144 = 0b110,
    /// 480 cycles
    T480 = 0b111,
}

impl Default for SampleTime {
    fn default() -> Self {
        Self::T56
    }
}

/// Configuration for an ADC. Can be used with default::Default.
#[derive(Clone)]
pub struct AdcConfig {
    /// Conversion resolution. Defaults to 12-bit.
    pub resolution: Resolution,
    /// Data register alignment. Defaults to right-aligned.
    pub align: Align,
    /// APB2 prescaler for the shared ADC clock. Defaults to /4.
    pub prescaler: Prescaler,
    /// Sample time applied by the one-shot `read()`. Defaults to 56 cycles.
    pub sample_time: SampleTime,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            resolution: Default::default(),
            align: Default::default(),
            prescaler: Default::default(),
            sample_time: Default::default(),
        }
    }
}

/// Represents an Analog to Digital Converter peripheral.
pub struct Adc<R> {
    pub regs: R,
    cfg: AdcConfig,
}

impl<R> Adc<R>
where
    R: Deref<Target = pac::adc1::RegisterBlock> + RccPeriph,
{
    /// Initialize an ADC peripheral, including configuration register writes and
    /// enabling its RCC peripheral clock. Note that the prescaler lives in the
    /// common register block, and so applies to all three converters.
    pub fn new(regs: R, cfg: AdcConfig) -> Self {
        let rcc = unsafe { &(*RCC::ptr()) };
        R::en_reset(rcc);

        let common = unsafe { &(*ADC_COMMON::ptr()) };
        common.ccr.modify(|_, w| match cfg.prescaler {
            Prescaler::Div2 => w.adcpre().div2(),
            Prescaler::Div4 => w.adcpre().div4(),
            Prescaler::Div6 => w.adcpre().div6(),
            Prescaler::Div8 => w.adcpre().div8(),
        });

        // Power off while configuring.
        regs.cr2.modify(|_, w| w.adon().clear_bit());

        regs.cr1
            .modify(|_, w| w.res().bits(cfg.resolution as u8));
        regs.cr2.modify(|_, w| {
            // Single conversion mode, software trigger.
            w.cont().clear_bit();
            w.exten().disabled();
            w.align().bit(cfg.align as u8 != 0)
        });

        regs.cr2.modify(|_, w| w.adon().set_bit());

        Self { regs, cfg }
    }

    /// Power the ADC on (CR2, ADON).
    pub fn enable(&mut self) {
        self.regs.cr2.modify(|_, w| w.adon().set_bit());
    }

    /// Power the ADC down. Draws no current once off.
    pub fn disable(&mut self) {
        self.regs.cr2.modify(|_, w| w.adon().clear_bit());
    }

    /// Select continuous or single conversion mode (CR2, CONT).
    pub fn set_continuous(&mut self, continuous: bool) {
        self.regs.cr2.modify(|_, w| w.cont().bit(continuous));
    }

    /// Enable or disable scan mode (CR1, SCAN). Required for a regular sequence
    /// longer than one conversion.
    pub fn set_scan(&mut self, scan: bool) {
        self.regs.cr1.modify(|_, w| w.scan().bit(scan));
    }

    /// Set the sample time for a given channel. Only allowed while no conversion
    /// is in progress. Channels 0-9 live in SMPR2; 10-18 in SMPR1.
    pub fn set_sample_time(&mut self, channel: u8, smp: SampleTime) {
        if channel <= 9 {
            self.regs.smpr2.modify(|_, w| match channel {
                0 => w.smp0().bits(smp as u8),
                1 => w.smp1().bits(smp as u8),
                2 => w.smp2().bits(smp as u8),
                3 => w.smp3().bits(smp as u8),
                4 => w.smp4().bits(smp as u8),
                5 => w.smp5().bits(smp as u8),
                6 => w.smp6().bits(smp as u8),
                7 => w.smp7().bits(smp as u8),
                8 => w.smp8().bits(smp as u8),
                _ => w.smp9().bits(smp as u8),
            });
        } else {
            self.regs.smpr1.modify(|_, w| match channel {
                10 => w.smp10().bits(smp as u8),
                11 => w.smp11().bits(smp as u8),
                12 => w.smp12().bits(smp as u8),
                13 => w.smp13().bits(smp as u8),
                14 => w.smp14().bits(smp as u8),
                15 => w.smp15().bits(smp as u8),
                16 => w.smp16().bits(smp as u8),
                17 => w.smp17().bits(smp as u8),
                _ => w.smp18().bits(smp as u8),
            });
        }
    }

    /// Set the length of the regular conversion sequence (SQR1, L field).
    /// `len` is the number of conversions, 1 to 16.
    pub fn set_sequence_len(&mut self, len: u8) {
        assert!((1..=16).contains(&len), "ADC sequence length must be in 1..=16");
        self.regs.sqr1.modify(|_, w| w.l().bits(len - 1));
    }

    /// Assign a channel to a position in the regular sequence. `position` is
    /// 1 to 16; positions 1-6 live in SQR3, 7-12 in SQR2, 13-16 in SQR1.
    pub fn set_sequence(&mut self, channel: u8, position: u8) {
        let chan = channel & 0x1f;
        match position {
            1 => self.regs.sqr3.modify(|_, w| unsafe { w.sq1().bits(chan) }),
            2 => self.regs.sqr3.modify(|_, w| unsafe { w.sq2().bits(chan) }),
            3 => self.regs.sqr3.modify(|_, w| unsafe { w.sq3().bits(chan) }),
            4 => self.regs.sqr3.modify(|_, w| unsafe { w.sq4().bits(chan) }),
            5 => self.regs.sqr3.modify(|_, w| unsafe { w.sq5().bits(chan) }),
            6 => self.regs.sqr3.modify(|_, w| unsafe { w.sq6().bits(chan) }),
            7 => self.regs.sqr2.modify(|_, w| unsafe { w.sq7().bits(chan) }),
            8 => self.regs.sqr2.modify(|_, w| unsafe { w.sq8().bits(chan) }),
            9 => self.regs.sqr2.modify(|_, w| unsafe { w.sq9().bits(chan) }),
            10 => self.regs.sqr2.modify(|_, w| unsafe { w.sq10().bits(chan) }),
            11 => self.regs.sqr2.modify(|_, w| unsafe { w.sq11().bits(chan) }),
            12 => self.regs.sqr2.modify(|_, w| unsafe { w.sq12().bits(chan) }),
            13 => self.regs.sqr1.modify(|_, w| unsafe { w.sq13().bits(chan) }),
            14 => self.regs.sqr1.modify(|_, w| unsafe { w.sq14().bits(chan) }),
            15 => self.regs.sqr1.modify(|_, w| unsafe { w.sq15().bits(chan) }),
            16 => self.regs.sqr1.modify(|_, w| unsafe { w.sq16().bits(chan) }),
            _ => panic!("ADC sequence position must be in 1..=16"),
        }
    }

    /// Start a regular conversion (CR2, SWSTART).
    pub fn start_conversion(&mut self) {
        self.regs.cr2.modify(|_, w| w.swstart().set_bit());
    }

    /// Block until the end-of-conversion flag sets, then return the data register
    /// contents. Reading DR clears EOC.
    pub fn read_result(&mut self) -> u16 {
        while self.regs.sr.read().eoc().bit_is_clear() {}
        self.regs.dr.read().data().bits()
    }

    /// Take a single reading of a channel, blocking until the conversion completes.
    /// Configures a one-deep sequence using the config's default sample time.
    pub fn read(&mut self, channel: u8) -> u16 {
        self.set_sample_time(channel, self.cfg.sample_time);
        self.set_sequence_len(1);
        self.set_sequence(channel, 1);

        self.start_conversion();
        self.read_result()
    }

    /// Enable the internal temperature sensor and VREFINT (CCR, TSVREFE). The
    /// temperature sensor reads on channel 18, VREFINT on channel 17. Mutually
    /// exclusive with VBAT monitoring, which shares channel 18.
    pub fn enable_temp_sensor(&mut self) {
        let common = unsafe { &(*ADC_COMMON::ptr()) };
        common.ccr.modify(|_, w| {
            w.vbate().clear_bit();
            w.tsvrefe().set_bit()
        });
    }

    /// Enable VBAT monitoring on channel 18 (CCR, VBATE). The input is internally
    /// divided by 4.
    pub fn enable_vbat(&mut self) {
        let common = unsafe { &(*ADC_COMMON::ptr()) };
        common.ccr.modify(|_, w| {
            w.tsvrefe().clear_bit();
            w.vbate().set_bit()
        });
    }

    /// Enable the DMA request (CR2, DMA), issued after each regular conversion.
    /// DDS keeps requests flowing for circular buffers.
    pub fn enable_dma(&mut self) {
        self.regs.cr2.modify(|_, w| {
            w.dma().set_bit();
            w.dds().set_bit()
        });
    }

    /// Disable the DMA request.
    pub fn disable_dma(&mut self) {
        self.regs.cr2.modify(|_, w| {
            w.dma().clear_bit();
            w.dds().clear_bit()
        });
    }

    /// Enable an interrupt source.
    pub fn enable_interrupt(&mut self, interrupt: AdcInterrupt) {
        self.regs.cr1.modify(|_, w| match interrupt {
            AdcInterrupt::EndOfConversion => w.eocie().set_bit(),
            AdcInterrupt::Overrun => w.ovrie().set_bit(),
            AdcInterrupt::AnalogWatchdog => w.awdie().set_bit(),
        });
    }

    /// Disable an interrupt source.
    pub fn disable_interrupt(&mut self, interrupt: AdcInterrupt) {
        self.regs.cr1.modify(|_, w| match interrupt {
            AdcInterrupt::EndOfConversion => w.eocie().clear_bit(),
            AdcInterrupt::Overrun => w.ovrie().clear_bit(),
            AdcInterrupt::AnalogWatchdog => w.awdie().clear_bit(),
        });
    }

    /// Clear a status flag. The SR bits are write-0-to-clear.
    pub fn clear_interrupt(&mut self, interrupt: AdcInterrupt) {
        self.regs.sr.modify(|_, w| match interrupt {
            AdcInterrupt::EndOfConversion => w.eoc().clear_bit(),
            AdcInterrupt::Overrun => w.ovr().clear_bit(),
            AdcInterrupt::AnalogWatchdog => w.awd().clear_bit(),
        });
    }

    /// Print the (raw) contents of the status register.
    pub fn read_status(&self) -> u32 {
        self.regs.sr.read().bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prescaler_divisors() {
        assert_eq!(Prescaler::Div2.divisor(), 2);
        assert_eq!(Prescaler::Div8.divisor(), 8);
        assert_eq!(Prescaler::Div6 as u8, 0b10);
    }

    #[test]
    fn sample_time_encodings() {
        assert_eq!(SampleTime::T3 as u8, 0b000);
        assert_eq!(SampleTime::T84 as u8, 0b100);
        assert_eq!(SampleTime::T480 as u8, 0b111);
    }

    #[test]
    fn resolution_encodings() {
        assert_eq!(Resolution::B12 as u8, 0b00);
        assert_eq!(Resolution::B6 as u8, 0b11);
    }

    #[test]
    fn adc_clock_from_prescaler() {
        // 90Mhz APB2 with the default /4 prescaler stays under the 36Mhz ADCCLK limit.
        let apb2 = 90_000_000u32;
        let cfg = AdcConfig::default();
        let copy = cfg.clone();
        assert!(apb2 / copy.prescaler.divisor() <= 36_000_000);
    }
}
