//! This module allows for serial communication using the STM32 USART peripheral.
//! It provides APIs to configure, read, and write, with blocking and DMA-request
//! functionality.

use core::ops::Deref;

use crate::{
    clocks::Clocks,
    pac::{self, RCC},
    util::{BaudPeriph, RccPeriph},
};

/// Serial error
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum UsartError {
    /// Framing error
    Framing,
    /// Noise error
    Noise,
    /// RX buffer overrun
    Overrun,
    /// Parity check error
    Parity,
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// The number of stop bits. (USART_CR2, STOP)
pub enum StopBits {
    S1 = 0b00,
    S0_5 = 0b01,
    S2 = 0b10,
    S1_5 = 0b11,
}

#[derive(Clone, Copy, PartialEq)]
/// Parity control enable/disable, and even/odd selection (USART_CR1, PCE and PS)
pub enum Parity {
    EnabledEven,
    EnabledOdd,
    Disabled,
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// The length of word to transmit and receive. (USART_CR1, M)
pub enum WordLen {
    W8 = 0,
    W9 = 1,
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// Set Oversampling16 or Oversampling8 modes.
pub enum OverSampling {
    O16 = 0,
    O8 = 1,
}

#[derive(Clone, Copy)]
/// The type of USART interrupt to configure. Reference the USART_SR register.
pub enum UsartInterrupt {
    Cts,
    Idle,
    LineBreak,
    /// Covers overrun, framing, and noise errors while DMA reception is active. (CR3, EIE)
    Error,
    ParityError,
    ReadNotEmpty,
    TransmissionComplete,
    TransmitEmpty,
}

/// Configuration for USART. Can be used with default::Default.
#[derive(Clone)]
pub struct UsartConfig {
    /// Word length. Defaults to 8-bits.
    pub word_len: WordLen,
    /// Stop bits: Defaults to 1.
    pub stop_bits: StopBits,
    /// Oversampling rate. Defaults to 16x.
    pub oversampling: OverSampling,
    /// Enable or disable parity control. Defaults to disabled.
    pub parity: Parity,
}

impl Default for UsartConfig {
    fn default() -> Self {
        Self {
            word_len: WordLen::W8,
            stop_bits: StopBits::S1,
            oversampling: OverSampling::O16,
            parity: Parity::Disabled,
        }
    }
}

/// Compute the BRR word for a given peripheral clock and baud rate. USARTDIV is a
/// fixed-point number: 12-bit mantissa, 4-bit fraction. With 8x oversampling the
/// fraction shrinks to 3 bits and bit 3 must stay cleared.
fn calc_brr(fclk: u32, baud: u32, oversampling: OverSampling) -> u16 {
    match oversampling {
        OverSampling::O16 => (fclk / baud) as u16,
        OverSampling::O8 => {
            let div = 2 * fclk / baud;
            ((div & 0xfff0) | ((div & 0xf) >> 1)) as u16
        }
    }
}

/// Represents the USART peripheral, for serial communications.
pub struct Usart<R> {
    pub regs: R,
    pub baud: u32,
    pub config: UsartConfig,
}

impl<R> Usart<R>
where
    R: Deref<Target = pac::usart1::RegisterBlock> + RccPeriph + BaudPeriph,
{
    /// Initialize a USART peripheral, including configuration register writes, and enabling and
    /// resetting its RCC peripheral clock. `baud` is the baud rate, in bits-per-second.
    pub fn new(regs: R, baud: u32, config: UsartConfig, clock_cfg: &Clocks) -> Self {
        let rcc = unsafe { &(*RCC::ptr()) };
        R::en_reset(rcc);

        let mut usart = Self { regs, baud, config };

        // Some bits can't be written with the USART enabled.
        usart.disable();

        // RM: "Character Transmission Procedures".
        // 1. Program the M bit in USART_CR1 to define the word length.
        usart.regs.cr1.modify(|_, w| {
            w.m().bit(usart.config.word_len as u8 != 0);
            w.over8().bit(usart.config.oversampling as u8 != 0);
            w.pce().bit(usart.config.parity != Parity::Disabled);
            w.ps().bit(usart.config.parity == Parity::EnabledOdd)
        });

        // 2. Select the desired baud rate using the USART_BRR register.
        usart.set_baud(baud, clock_cfg);
        // 3. Program the number of stop bits in USART_CR2.
        usart
            .regs
            .cr2
            .modify(|_, w| w.stop().bits(usart.config.stop_bits as u8));
        // 4. Enable the USART by writing the UE bit in USART_CR1 register to 1.
        usart.enable();

        // 5. Set the TE bit in USART_CR1 to send an idle frame as first transmission.
        // 6. Set the RE bit in USART_CR1. This enables the receiver, which begins searching
        // for a start bit.
        usart.regs.cr1.modify(|_, w| {
            w.te().set_bit();
            w.re().set_bit()
        });

        usart
    }

    /// Set the BAUD rate. Called during init, and can be called later to change BAUD
    /// during program execution.
    pub fn set_baud(&mut self, baud: u32, clock_cfg: &Clocks) {
        let originally_enabled = self.regs.cr1.read().ue().bit_is_set();

        if originally_enabled {
            self.regs.cr1.modify(|_, w| w.ue().clear_bit());
        }

        // The baud input is the bus clock of the APB this instance hangs off.
        let fclk = R::baud(clock_cfg);
        let div = calc_brr(fclk, baud, self.config.oversampling);

        self.regs.brr.write(|w| unsafe { w.bits(div as u32) });

        self.baud = baud;

        if originally_enabled {
            self.regs.cr1.modify(|_, w| w.ue().set_bit());
        }
    }

    /// Enable this USART peripheral.
    pub fn enable(&mut self) {
        self.regs.cr1.modify(|_, w| w.ue().set_bit());
    }

    /// Disable this USART peripheral.
    pub fn disable(&mut self) {
        self.regs.cr1.modify(|_, w| w.ue().clear_bit());
    }

    /// Transmit data, as a sequence of u8. See RM: "Character transmission procedure".
    pub fn write(&mut self, data: &[u8]) {
        // 7. Write the data to send in the USART_DR register (this clears the TXE bit).
        // Repeat this for each data to be transmitted.
        for word in data {
            while self.regs.sr.read().txe().bit_is_clear() {}
            self.regs.dr.write(|w| w.dr().bits(*word as u16));
        }
        // 8. After writing the last data into the USART_DR register, wait until TC=1. This
        // indicates that the transmission of the last frame is complete.
        while self.regs.sr.read().tc().bit_is_clear() {}
    }

    /// Write a single word, without waiting until ready for the next. Compared to the
    /// `write()` function, this does not block.
    pub fn write_one(&mut self, word: u8) {
        self.regs.dr.write(|w| w.dr().bits(word as u16));
    }

    /// Receive data into a u8 buffer. See RM: "Character reception procedure".
    /// Error flags raised during reception are returned, with the partial data
    /// dropped.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), UsartError> {
        for slot in buf.iter_mut() {
            while self.regs.sr.read().rxne().bit_is_clear() {}
            self.check_status()?;
            *slot = self.regs.dr.read().dr().bits() as u8;
        }

        Ok(())
    }

    /// Read a single word, without waiting until ready for the next. Compared to the
    /// `read()` function, this does not block.
    pub fn read_one(&mut self) -> u8 {
        self.regs.dr.read().dr().bits() as u8
    }

    /// Print the (raw) contents of the status register.
    pub fn read_status(&self) -> u32 {
        self.regs.sr.read().bits()
    }

    /// Enable a specific type of interrupt. See RM: "USART interrupt requests" table.
    pub fn enable_interrupt(&mut self, interrupt: UsartInterrupt) {
        match interrupt {
            UsartInterrupt::Cts => {
                self.regs.cr3.modify(|_, w| w.ctsie().set_bit());
            }
            UsartInterrupt::Idle => {
                self.regs.cr1.modify(|_, w| w.idleie().set_bit());
            }
            UsartInterrupt::LineBreak => {
                self.regs.cr2.modify(|_, w| w.lbdie().set_bit());
            }
            UsartInterrupt::Error => {
                self.regs.cr3.modify(|_, w| w.eie().set_bit());
            }
            UsartInterrupt::ParityError => {
                self.regs.cr1.modify(|_, w| w.peie().set_bit());
            }
            UsartInterrupt::ReadNotEmpty => {
                self.regs.cr1.modify(|_, w| w.rxneie().set_bit());
            }
            UsartInterrupt::TransmissionComplete => {
                self.regs.cr1.modify(|_, w| w.tcie().set_bit());
            }
            UsartInterrupt::TransmitEmpty => {
                self.regs.cr1.modify(|_, w| w.txeie().set_bit());
            }
        }
    }

    /// Disable a specific type of interrupt.
    pub fn disable_interrupt(&mut self, interrupt: UsartInterrupt) {
        match interrupt {
            UsartInterrupt::Cts => {
                self.regs.cr3.modify(|_, w| w.ctsie().clear_bit());
            }
            UsartInterrupt::Idle => {
                self.regs.cr1.modify(|_, w| w.idleie().clear_bit());
            }
            UsartInterrupt::LineBreak => {
                self.regs.cr2.modify(|_, w| w.lbdie().clear_bit());
            }
            UsartInterrupt::Error => {
                self.regs.cr3.modify(|_, w| w.eie().clear_bit());
            }
            UsartInterrupt::ParityError => {
                self.regs.cr1.modify(|_, w| w.peie().clear_bit());
            }
            UsartInterrupt::ReadNotEmpty => {
                self.regs.cr1.modify(|_, w| w.rxneie().clear_bit());
            }
            UsartInterrupt::TransmissionComplete => {
                self.regs.cr1.modify(|_, w| w.tcie().clear_bit());
            }
            UsartInterrupt::TransmitEmpty => {
                self.regs.cr1.modify(|_, w| w.txeie().clear_bit());
            }
        }
    }

    /// Checks if a given status flag is set. Returns `true` if the status flag is set. Note
    /// that this performs a read each time called. If checking multiple flags, this isn't optimal.
    pub fn check_status_flag(&mut self, flag: UsartInterrupt) -> bool {
        let status = self.regs.sr.read();

        match flag {
            UsartInterrupt::Cts => status.cts().bit_is_set(),
            UsartInterrupt::Idle => status.idle().bit_is_set(),
            UsartInterrupt::LineBreak => status.lbd().bit_is_set(),
            UsartInterrupt::Error => status.ore().bit_is_set() || status.fe().bit_is_set(),
            UsartInterrupt::ParityError => status.pe().bit_is_set(),
            UsartInterrupt::ReadNotEmpty => status.rxne().bit_is_set(),
            UsartInterrupt::TransmissionComplete => status.tc().bit_is_set(),
            UsartInterrupt::TransmitEmpty => status.txe().bit_is_set(),
        }
    }

    /// Clears the interrupt pending flag for a specific type of interrupt. The
    /// write-0-to-clear flags (TC, CTS, LBD) clear directly; the error flags clear
    /// via the SR-then-DR read sequence the RM describes.
    pub fn clear_interrupt(&mut self, interrupt: UsartInterrupt) {
        match interrupt {
            UsartInterrupt::Cts => self.regs.sr.modify(|_, w| w.cts().clear_bit()),
            UsartInterrupt::LineBreak => self.regs.sr.modify(|_, w| w.lbd().clear_bit()),
            UsartInterrupt::TransmissionComplete => {
                self.regs.sr.modify(|_, w| w.tc().clear_bit())
            }
            _ => {
                let _ = self.regs.sr.read();
                let _ = self.regs.dr.read();
            }
        }
    }

    /// Enable the DMA transmission request (CR3, DMAT). Data is then loaded from memory
    /// to USART_DR whenever TXE is set, with the stream configured separately.
    pub fn enable_dma_tx(&mut self) {
        self.regs.cr3.modify(|_, w| w.dmat().set_bit());
    }

    /// Enable the DMA reception request (CR3, DMAR).
    pub fn enable_dma_rx(&mut self) {
        self.regs.cr3.modify(|_, w| w.dmar().set_bit());
    }

    fn check_status(&mut self) -> Result<(), UsartError> {
        let status = self.regs.sr.read();

        let mut result = if status.pe().bit_is_set() {
            Err(UsartError::Parity)
        } else if status.fe().bit_is_set() {
            Err(UsartError::Framing)
        } else if status.ore().bit_is_set() {
            Err(UsartError::Overrun)
        } else {
            Ok(())
        };

        if status.nf().bit_is_set() {
            result = Err(UsartError::Noise);
        }

        if result.is_err() {
            // Error flags are cleared by a read of SR (above) followed by a read of DR.
            let _ = self.regs.dr.read();
        }
        result
    }
}

impl<R> core::fmt::Write for Usart<R>
where
    R: Deref<Target = pac::usart1::RegisterBlock> + RccPeriph + BaudPeriph,
{
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brr_oversampling_16() {
        // 45Mhz APB1 at 115200 baud: USARTDIV = 390.625; the truncated divider
        // lands at mantissa 24, fraction 6.
        assert_eq!(calc_brr(45_000_000, 115_200, OverSampling::O16), 0x186);
        // 90Mhz APB2 at 9600: 9375 = 0x249f.
        assert_eq!(calc_brr(90_000_000, 9_600, OverSampling::O16), 0x249f);
    }

    #[test]
    fn brr_oversampling_8_shifts_fraction() {
        let div = 2 * 45_000_000 / 115_200; // 781 = 0x30d
        let brr = calc_brr(45_000_000, 115_200, OverSampling::O8);
        // Fraction halved into 3 bits, bit 3 cleared.
        assert_eq!(brr, ((div as u16) & 0xfff0) | (((div as u16) & 0xf) >> 1));
        assert_eq!(brr & 0b1000, 0);
    }

    #[test]
    fn cr_field_encodings() {
        assert_eq!(StopBits::S2 as u8, 0b10);
        assert_eq!(StopBits::S1_5 as u8, 0b11);
        assert_eq!(WordLen::W9 as u8, 1);
        assert_eq!(OverSampling::O8 as u8, 1);
    }

    #[test]
    fn default_config() {
        let cfg = UsartConfig::default();
        let copy = cfg.clone();
        assert_eq!(copy.word_len as u8, WordLen::W8 as u8);
        assert_eq!(copy.stop_bits as u8, StopBits::S1 as u8);
        assert!(copy.parity == Parity::Disabled);
    }
}
