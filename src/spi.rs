//! Support for the Serial Peripheral Interface (SPI) bus peripheral.
//! Provides APIs to configure, read, and write from SPI, with blocking and
//! DMA-request functionality.

use core::{ops::Deref, ptr};

use crate::{
    pac::{self, RCC},
    util::RccPeriph,
};

/// SPI error
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq, defmt::Format)]
pub enum SpiError {
    /// Overrun occurred
    Overrun,
    /// Mode fault occurred
    ModeFault,
    /// CRC error
    Crc,
}

/// Set the factor to divide the APB clock by to set baud rate. Sets `SPI_CR1` register, `BR` field.
#[derive(Copy, Clone)]
#[repr(u8)]
pub enum BaudRate {
    Div2 = 0b000,
    Div4 = 0b001,
    Div8 = 0b010,
    Div16 = 0b011,
    Div32 = 0b100,
    Div64 = 0b101,
    Div128 = 0b110,
    Div256 = 0b111,
}

/// Data frame length for transfers. Sets `SPI_CR1` register, `DFF` field.
#[derive(Copy, Clone)]
#[repr(u8)]
pub enum DataSize {
    D8 = 0,
    D16 = 1,
}

#[derive(Clone, Copy, PartialEq)]
/// Select the duplex communication mode between the 2 devices. Sets `CR1` register, `BIDIMODE`,
/// and `RXONLY` fields.
pub enum SpiCommMode {
    FullDuplex,
    HalfDuplex,
    /// Simplex Transmit only. (Cfg same as Full Duplex, but ignores input)
    TransmitOnly,
    /// Simplex Receive only.
    ReceiveOnly,
}

#[derive(Clone, Copy, PartialEq)]
/// Used for managing NSS / CS pin. Sets CR1 register, SSM field.
pub enum SlaveSelect {
    /// In this configuration, slave select information
    /// is driven internally by the SSI bit value in register SPIx_CR1. The external NSS pin is
    /// free for other application uses.
    Software,
    /// This configuration is only used when the
    /// MCU is set as master. The NSS pin is managed by the hardware. The NSS signal
    /// is driven low as soon as the SPI is enabled in master mode (SPE=1), and is kept
    /// low until the SPI is disabled (SPE=0).
    HardwareOutEnable,
    /// If the microcontroller is acting as the
    /// master on the bus, this configuration allows multimaster capability. If the NSS pin
    /// is pulled low in this mode, the SPI enters master mode fault state and the device is
    /// automatically reconfigured in slave mode.
    HardwareOutDisable,
}

/// Possible interrupt types. Enable these in SPIx_CR2. Check and clear with SR. There is no explicit
/// way to clear these.
#[derive(Copy, Clone)]
pub enum SpiInterrupt {
    /// Tx buffer empty (TXEIE)
    TxBufEmpty,
    /// Rx buffer not empty (RXNEIE)
    RxBufNotEmpty,
    /// Error (ERRIE)
    Error,
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// Clock polarity. Sets CR1 register, CPOL field. Stored in the config as a field of `SpiMode`.
pub enum SpiPolarity {
    /// Clock signal low when idle
    IdleLow = 0,
    /// Clock signal high when idle
    IdleHigh = 1,
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// Clock phase. Sets CR1 register, CPHA field. Stored in the config as a field of `SpiMode`.
pub enum SpiPhase {
    /// Data in "captured" on the first clock transition
    CaptureOnFirstTransition = 0,
    /// Data in "captured" on the second clock transition
    CaptureOnSecondTransition = 1,
}

#[derive(Clone, Copy)]
/// SPI mode. Sets CR1 register, CPOL and CPHA fields.
pub struct SpiMode {
    /// Clock polarity
    pub polarity: SpiPolarity,
    /// Clock phase
    pub phase: SpiPhase,
}

impl SpiMode {
    /// Set Spi Mode 0: Idle low, capture on first transition.
    /// Data sampled on rising edge and shifted out on the falling edge
    pub fn mode0() -> Self {
        Self {
            polarity: SpiPolarity::IdleLow,
            phase: SpiPhase::CaptureOnFirstTransition,
        }
    }

    /// Set Spi Mode 1: Idle low, capture on second transition.
    /// Data sampled on the falling edge and shifted out on the rising edge
    pub fn mode1() -> Self {
        Self {
            polarity: SpiPolarity::IdleLow,
            phase: SpiPhase::CaptureOnSecondTransition,
        }
    }

    /// Set Spi Mode 2: Idle high, capture on first transition.
    /// Data sampled on the rising edge and shifted out on the falling edge
    pub fn mode2() -> Self {
        Self {
            polarity: SpiPolarity::IdleHigh,
            phase: SpiPhase::CaptureOnFirstTransition,
        }
    }

    /// Set Spi Mode 3: Idle high, capture on second transition.
    /// Data sampled on the falling edge and shifted out on the rising edge
    pub fn mode3() -> Self {
        Self {
            polarity: SpiPolarity::IdleHigh,
            phase: SpiPhase::CaptureOnSecondTransition,
        }
    }
}

#[derive(Clone)]
/// Configuration data for SPI.
pub struct SpiConfig {
    /// SPI mode associated with Polarity and Phase. Defaults to Mode0: Idle low, capture on first transition.
    pub mode: SpiMode,
    /// Sets the (duplex) communication mode between the devices. Defaults to full duplex.
    pub comm_mode: SpiCommMode,
    /// Controls use of hardware vs software CS/NSS pin. Defaults to software.
    pub slave_select: SlaveSelect,
    /// Data frame size. Defaults to 8 bits.
    pub data_size: DataSize,
    /// Shift frames out least-significant bit first. Defaults to false (MSB first).
    pub lsb_first: bool,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            mode: SpiMode::mode0(),
            comm_mode: SpiCommMode::FullDuplex,
            slave_select: SlaveSelect::Software,
            data_size: DataSize::D8,
            lsb_first: false,
        }
    }
}

/// Represents a Serial Peripheral Interface (SPI) peripheral.
pub struct Spi<R> {
    pub regs: R,
    pub cfg: SpiConfig,
}

impl<R> Spi<R>
where
    R: Deref<Target = pac::spi1::RegisterBlock> + RccPeriph,
{
    /// Initialize an SPI peripheral, including configuration register writes, and enabling and resetting
    /// its RCC peripheral clock.
    pub fn new(regs: R, cfg: SpiConfig, baud_rate: BaudRate) -> Self {
        let rcc = unsafe { &(*RCC::ptr()) };
        R::en_reset(rcc);

        // RM: "Configuring the SPI in master mode".
        // 1. Write proper GPIO registers: Configure GPIO for MOSI, MISO and SCK pins.
        // (Handled in GPIO modules and user code)

        // 2. Write to the SPI_CR1 register:
        regs.cr1.modify(|_, w| {
            // a) Select the BR[2:0] bits to define the serial clock baud rate.
            w.br().bits(baud_rate as u8);
            // b) Select the CPOL and CPHA bits to define one of the four relationships between
            // the data transfer and the serial clock.
            w.cpol().bit(cfg.mode.polarity as u8 != 0);
            w.cpha().bit(cfg.mode.phase as u8 != 0);
            // c) Set the DFF bit to define 8- or 16-bit data frame format.
            w.dff().bit(cfg.data_size as u8 != 0);
            // d) Configure BIDIMODE and RXONLY for the communication mode (they can't be
            // set at the same time).
            w.bidimode().bit(cfg.comm_mode == SpiCommMode::HalfDuplex);
            w.rxonly().bit(cfg.comm_mode == SpiCommMode::ReceiveOnly);
            // e) Configure the LSBFIRST bit to define the frame format.
            w.lsbfirst().bit(cfg.lsb_first);
            w.crcen().clear_bit();
            // f) Configure SSM and SSI.
            w.ssm().bit(cfg.slave_select == SlaveSelect::Software);
            w.ssi().bit(cfg.slave_select == SlaveSelect::Software);
            // g) Set the MSTR bit (in multimaster NSS configuration, avoid conflict state on
            // NSS if master is configured to prevent MODF error).
            w.mstr().set_bit();
            w.spe().set_bit() // Enable SPI
        });

        // 3. Write to SPI_CR2 register: configure SSOE.
        regs.cr2.modify(|_, w| {
            w.ssoe()
                .bit(cfg.slave_select == SlaveSelect::HardwareOutEnable)
        });

        Self { regs, cfg }
    }

    /// Change the SPI baud rate.
    pub fn reclock(&mut self, baud_rate: BaudRate) {
        self.regs.cr1.modify(|_, w| w.spe().clear_bit());

        self.regs.cr1.modify(|_, w| {
            w.br().bits(baud_rate as u8);
            w.spe().set_bit()
        });
    }

    /// RM: "Procedure for disabling the SPI".
    /// It is important to do this before the system enters a low-power mode when the
    /// peripheral clock is stopped. Ongoing transactions can be corrupted in this case.
    pub fn disable(&mut self) {
        // 1. Wait until RXNE=1 to receive the last data. (The blocking write and transfer
        // paths drain DR after each frame, so nothing is pending here.)
        // 2. Wait until TXE=1 and then wait until BSY=0 before disabling the SPI.
        while self.regs.sr.read().txe().bit_is_clear() {}
        while self.regs.sr.read().bsy().bit_is_set() {}
        // 3. Disable the SPI (SPE=0).
        self.regs.cr1.modify(|_, w| w.spe().clear_bit());
    }

    /// Read a single byte, blocking until it's available.
    pub fn read(&mut self) -> Result<u8, SpiError> {
        self.check_errors()?;

        while self.regs.sr.read().rxne().bit_is_clear() {}

        // An 8-bit access to the 16-bit data register.
        Ok(unsafe { ptr::read_volatile(&self.regs.dr as *const _ as *const u8) })
    }

    /// Write a single byte, blocking until the Tx buffer is free.
    /// See RM: "Data transmission and reception procedures".
    pub fn write_one(&mut self, byte: u8) -> Result<(), SpiError> {
        self.check_errors()?;

        while self.regs.sr.read().txe().bit_is_clear() {}

        #[allow(invalid_reference_casting)]
        unsafe {
            ptr::write_volatile(&self.regs.dr as *const _ as *mut u8, byte)
        };

        Ok(())
    }

    /// Write multiple bytes on the SPI line, blocking until complete. Received data
    /// is drained and discarded, keeping RXNE clear.
    pub fn write(&mut self, words: &[u8]) -> Result<(), SpiError> {
        for word in words {
            self.write_one(*word)?;
            self.read()?;
        }

        Ok(())
    }

    /// Simultaneously transmit the buffer's contents and overwrite it with the data
    /// received, blocking until complete.
    pub fn transfer(&mut self, words: &mut [u8]) -> Result<(), SpiError> {
        for word in words.iter_mut() {
            self.write_one(*word)?;
            *word = self.read()?;
        }

        Ok(())
    }

    /// An alternative transfer API, using separate read and write buffers.
    pub fn transfer_type2(
        &mut self,
        write_buf: &[u8],
        read_buf: &mut [u8],
    ) -> Result<(), SpiError> {
        for (i, word) in write_buf.iter().enumerate() {
            self.write_one(*word)?;
            if i < read_buf.len() {
                read_buf[i] = self.read()?;
            }
        }

        Ok(())
    }

    /// Enable the DMA transmission request (CR2, TXDMAEN). A DMA request is then issued
    /// each time TXE is set, with the stream configured separately.
    pub fn enable_dma_tx(&mut self) {
        self.regs.cr2.modify(|_, w| w.txdmaen().set_bit());
    }

    /// Enable the DMA reception request (CR2, RXDMAEN).
    pub fn enable_dma_rx(&mut self) {
        self.regs.cr2.modify(|_, w| w.rxdmaen().set_bit());
    }

    /// Disable both DMA requests. Run this after each DMA transfer completes, before
    /// reconfiguring the stream.
    pub fn stop_dma(&mut self) {
        self.regs.cr2.modify(|_, w| {
            w.txdmaen().clear_bit();
            w.rxdmaen().clear_bit()
        });
    }

    /// Print the (raw) contents of the status register.
    pub fn read_status(&self) -> u32 {
        self.regs.sr.read().bits()
    }

    /// Enable an interrupt. Note that unlike on other peripherals, there's no explicit way to
    /// clear these. RM: "Writing to the transmit data register always clears the TXE bit.
    /// The TXE flag is set by hardware."
    pub fn enable_interrupt(&mut self, interrupt_type: SpiInterrupt) {
        self.regs.cr2.modify(|_, w| match interrupt_type {
            SpiInterrupt::TxBufEmpty => w.txeie().set_bit(),
            SpiInterrupt::RxBufNotEmpty => w.rxneie().set_bit(),
            SpiInterrupt::Error => w.errie().set_bit(),
        });
    }

    /// Disable an interrupt.
    pub fn disable_interrupt(&mut self, interrupt_type: SpiInterrupt) {
        self.regs.cr2.modify(|_, w| match interrupt_type {
            SpiInterrupt::TxBufEmpty => w.txeie().clear_bit(),
            SpiInterrupt::RxBufNotEmpty => w.rxneie().clear_bit(),
            SpiInterrupt::Error => w.errie().clear_bit(),
        });
    }

    fn check_errors(&self) -> Result<(), SpiError> {
        let sr = self.regs.sr.read();

        if sr.ovr().bit_is_set() {
            return Err(SpiError::Overrun);
        } else if sr.modf().bit_is_set() {
            return Err(SpiError::ModeFault);
        } else if sr.crcerr().bit_is_set() {
            return Err(SpiError::Crc);
        }

        Ok(())
    }
}

#[cfg(feature = "embedded_hal")]
impl<R> embedded_hal::blocking::spi::Transfer<u8> for Spi<R>
where
    R: Deref<Target = pac::spi1::RegisterBlock> + RccPeriph,
{
    type Error = SpiError;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], SpiError> {
        Spi::transfer(self, words)?;
        Ok(words)
    }
}

#[cfg(feature = "embedded_hal")]
impl<R> embedded_hal::blocking::spi::Write<u8> for Spi<R>
where
    R: Deref<Target = pac::spi1::RegisterBlock> + RccPeriph,
{
    type Error = SpiError;

    fn write(&mut self, words: &[u8]) -> Result<(), SpiError> {
        Spi::write(self, words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_rate_encodings() {
        assert_eq!(BaudRate::Div2 as u8, 0b000);
        assert_eq!(BaudRate::Div32 as u8, 0b100);
        assert_eq!(BaudRate::Div256 as u8, 0b111);
    }

    #[test]
    fn default_config_is_msb_first() {
        let cfg = SpiConfig::default();
        let copy = cfg.clone();
        assert!(!cfg.lsb_first);
        assert!(!copy.lsb_first);
    }

    #[test]
    fn mode_constructors() {
        let m0 = SpiMode::mode0();
        assert_eq!(m0.polarity as u8, 0);
        assert_eq!(m0.phase as u8, 0);

        let m3 = SpiMode::mode3();
        assert_eq!(m3.polarity as u8, 1);
        assert_eq!(m3.phase as u8, 1);
    }
}
