//! Support for the Direct Memory Access (DMA) peripheral. This module handles
//! initialization and transfer configuration for the two stream-based DMA
//! controllers. The `Dma::cfg_stream` method is called by modules that use DMA.

use core::{
    ops::Deref,
    sync::atomic::{self, Ordering},
};

use crate::{
    pac::{self, RCC},
    util::RccPeriph,
};

#[derive(Copy, Clone)]
#[repr(u8)]
/// A DMA stream. Each controller has 8, each with its own transfer state and
/// interrupt flags. The u8 value indexes the stream register cluster.
pub enum DmaStream {
    S0 = 0,
    S1 = 1,
    S2 = 2,
    S3 = 3,
    S4 = 4,
    S5 = 5,
    S6 = 6,
    S7 = 7,
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// The request channel feeding a stream (SxCR, CHSEL field). The peripheral
/// request mapping is fixed in hardware; see the RM request mapping table for
/// which (stream, channel) pair serves each peripheral.
pub enum DmaChannelSel {
    C0 = 0,
    C1 = 1,
    C2 = 2,
    C3 = 3,
    C4 = 4,
    C5 = 5,
    C6 = 6,
    C7 = 7,
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// Transfer direction (SxCR, DIR field).
/// Can only be set when the stream is disabled.
pub enum Direction {
    /// DIR = 00 defines a peripheral-to-memory transfer
    ReadFromPeriph = 0b00,
    /// DIR = 01 defines a memory-to-peripheral transfer
    ReadFromMem = 0b01,
    /// DIR = 10 defines a memory-to-memory transfer
    MemToMem = 0b10,
}

#[derive(Copy, Clone, PartialEq)]
#[repr(u8)]
/// Circular mode (SxCR, CIRC bit).
/// Can only be set when the stream is disabled.
pub enum Circular {
    Disabled = 0,
    Enabled = 1,
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// Peripheral and memory increment mode. (SxCR, PINC and MINC bits)
/// Can only be set when the stream is disabled.
pub enum IncrMode {
    Disabled = 0,
    Enabled = 1,
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// Peripheral and memory data size. (SxCR, PSIZE and MSIZE bits)
/// Can only be set when the stream is disabled.
pub enum DataSize {
    S8 = 0b00, // ie 8 bits
    S16 = 0b01,
    S32 = 0b10,
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// Software priority of a stream (SxCR, PL field). Ties between equal software
/// priorities go to the lower-numbered stream.
/// Only write to this when the stream is disabled.
pub enum Priority {
    Low = 0b00,
    Medium = 0b01,
    High = 0b10,
    VeryHigh = 0b11,
}

#[derive(Copy, Clone)]
/// Interrupt type. Enabled in SxCR (FifoError in SxFCR); flags live in LISR and
/// HISR, cleared via LIFCR and HIFCR.
pub enum DmaInterrupt {
    TransferError,
    HalfTransfer,
    TransferComplete,
    DirectModeError,
    FifoError,
}

/// This struct is used to pass common (non-peripheral and non-use-specific) data when configuring
/// a stream.
#[derive(Clone)]
pub struct ChannelCfg {
    /// Request channel for the stream. Must match the RM's request mapping table
    /// for the peripheral being served. Defaults to channel 0.
    pub channel: DmaChannelSel,
    /// Stream priority compared to other streams; can be low, medium, high, or very high. Defaults
    /// to medium.
    pub priority: Priority,
    /// Enable or disable circular DMA. If enabled, the transfer continues after reaching the end of
    /// the buffer, looping to the beginning. A TC interrupt fires each time the end is reached, if
    /// set. Defaults to disabled.
    pub circular: Circular,
    /// Whether we increment the peripheral address on data word transfer; generally (and by default)
    /// disabled.
    pub periph_incr: IncrMode,
    /// Whether we increment the buffer address on data word transfer; generally (and by default)
    /// enabled.
    pub mem_incr: IncrMode,
}

impl Default for ChannelCfg {
    fn default() -> Self {
        Self {
            channel: DmaChannelSel::C0,
            priority: Priority::Medium,
            circular: Circular::Disabled,
            // Increment the buffer address, not the peripheral address.
            periph_incr: IncrMode::Disabled,
            mem_incr: IncrMode::Enabled,
        }
    }
}

/// The flags for streams 0-3 live in LISR/LIFCR and 4-7 in HISR/HIFCR, packed
/// in uneven groups. Returns the bit position of the stream's FEIF flag within
/// its register; the other flags sit at fixed offsets above it.
fn flag_shift(stream: DmaStream) -> u8 {
    match stream as u8 % 4 {
        0 => 0,
        1 => 6,
        2 => 16,
        _ => 22,
    }
}

/// Offset of a given flag above the stream's FEIF bit. DMEIF skips a reserved bit.
fn flag_offset(interrupt: DmaInterrupt) -> u8 {
    match interrupt {
        DmaInterrupt::FifoError => 0,
        DmaInterrupt::DirectModeError => 2,
        DmaInterrupt::TransferError => 3,
        DmaInterrupt::HalfTransfer => 4,
        DmaInterrupt::TransferComplete => 5,
    }
}

/// Mask covering all 5 event flags of a stream within its ISR/IFCR register.
fn flag_mask_all(stream: DmaStream) -> u32 {
    0b111101 << flag_shift(stream)
}

/// Represents a Direct Memory Access (DMA) peripheral.
pub struct Dma<D> {
    pub regs: D,
}

impl<D> Dma<D>
where
    D: Deref<Target = pac::dma2::RegisterBlock> + RccPeriph,
{
    /// Initialize a DMA peripheral, including enabling and resetting
    /// its RCC peripheral clock.
    pub fn new(regs: D) -> Self {
        let rcc = unsafe { &(*RCC::ptr()) };
        D::en_reset(rcc);

        Self { regs }
    }

    /// Configure a DMA stream and enable it. See RM: "Stream configuration procedure".
    /// Sets the Transfer Complete interrupt.
    pub fn cfg_stream(
        &mut self,
        stream: DmaStream,
        periph_addr: u32,
        mem_addr: u32,
        num_data: u16,
        direction: Direction,
        periph_size: DataSize,
        mem_size: DataSize,
        cfg: ChannelCfg,
    ) {
        // 1. If the stream is enabled, disable it by resetting the EN bit in the DMA_SxCR
        // register, then read this bit in order to confirm that there is no ongoing stream
        // operation.
        self.regs.st[stream as usize]
            .cr
            .modify(|_, w| w.en().clear_bit());
        while self.regs.st[stream as usize].cr.read().en().bit_is_set() {}

        // The event flags from the previous block transfer must be cleared before the
        // stream can be re-enabled.
        self.clear_all_interrupts(stream);

        let st = &self.regs.st[stream as usize];

        // 2. Set the peripheral port register address in the DMA_SxPAR register. The data is
        // moved from/to this address to/from the peripheral port after the peripheral event.
        st.par.write(|w| unsafe { w.bits(periph_addr) });

        // See the [Embedonomicon section on DMA](https://docs.rust-embedded.org/embedonomicon/dma.html)
        // for info on why we use `compiler_fence` here:
        // "We use Ordering::Release to prevent all preceding memory operations from being moved
        // after [starting DMA], which performs a volatile write."
        atomic::compiler_fence(Ordering::SeqCst);

        // 3. Set the memory address in the DMA_SxMA0R register. The data is written to or
        // read from this memory after the peripheral event.
        st.m0ar.write(|w| unsafe { w.bits(mem_addr) });

        // 4. Configure the total number of data items to be transferred in the DMA_SxNDTR
        // register. After each peripheral event or each beat of the burst, this value is
        // decremented.
        st.ndtr.write(|w| w.ndt().bits(num_data));

        // 5. Select the DMA channel (request) using CHSEL[2:0] in the DMA_SxCR register.
        // 6.-8. Configure priority, direction, increment modes, data sizes, and interrupts.
        // 9. Activate the stream by setting the EN bit in the DMA_SxCR register.
        st.cr.modify(|_, w| unsafe {
            w.chsel().bits(cfg.channel as u8);
            w.pl().bits(cfg.priority as u8);
            w.dir().bits(direction as u8);
            w.circ().bit(cfg.circular as u8 != 0);
            w.pinc().bit(cfg.periph_incr as u8 != 0);
            w.minc().bit(cfg.mem_incr as u8 != 0);
            w.psize().bits(periph_size as u8);
            w.msize().bits(mem_size as u8);
            w.tcie().set_bit();
            w.en().set_bit()
        });
    }

    /// Stop a DMA transfer, if in progress. To correctly stop and disable a stream,
    /// software clears the EN bit, then waits for it to read as 0; only then is the
    /// stream fully idle and reconfigurable.
    pub fn stop(&mut self, stream: DmaStream) {
        let st = &self.regs.st[stream as usize];

        st.cr.modify(|_, w| w.en().clear_bit());
        while st.cr.read().en().bit_is_set() {}

        atomic::compiler_fence(Ordering::SeqCst);
    }

    /// The number of data items left to transfer on a stream (SxNDTR). Zero once a
    /// (non-circular) transfer completes.
    pub fn remaining(&self, stream: DmaStream) -> u16 {
        self.regs.st[stream as usize].ndtr.read().ndt().bits()
    }

    /// Checks if a stream's transfer complete flag is set.
    pub fn transfer_is_complete(&mut self, stream: DmaStream) -> bool {
        let shift = flag_shift(stream) + flag_offset(DmaInterrupt::TransferComplete);

        let isr = if (stream as u8) < 4 {
            self.regs.lisr.read().bits()
        } else {
            self.regs.hisr.read().bits()
        };

        (isr >> shift) & 1 != 0
    }

    /// Clear an interrupt flag for a stream. The IFCR registers are write-1-to-clear.
    pub fn clear_interrupt(&mut self, stream: DmaStream, interrupt: DmaInterrupt) {
        let bit = 1 << (flag_shift(stream) + flag_offset(interrupt));

        if (stream as u8) < 4 {
            self.regs.lifcr.write(|w| unsafe { w.bits(bit) });
        } else {
            self.regs.hifcr.write(|w| unsafe { w.bits(bit) });
        }
    }

    /// Clear all 5 event flags for a stream.
    pub fn clear_all_interrupts(&mut self, stream: DmaStream) {
        let mask = flag_mask_all(stream);

        if (stream as u8) < 4 {
            self.regs.lifcr.write(|w| unsafe { w.bits(mask) });
        } else {
            self.regs.hifcr.write(|w| unsafe { w.bits(mask) });
        }
    }

    /// Enable an interrupt source for a stream. "It must not be written when the
    /// stream is enabled (EN = 1)", so the stream is paused around the write if needed.
    pub fn enable_interrupt(&mut self, stream: DmaStream, interrupt: DmaInterrupt) {
        let st = &self.regs.st[stream as usize];

        let originally_enabled = st.cr.read().en().bit_is_set();
        if originally_enabled {
            st.cr.modify(|_, w| w.en().clear_bit());
            while st.cr.read().en().bit_is_set() {}
        }

        match interrupt {
            DmaInterrupt::TransferError => st.cr.modify(|_, w| w.teie().set_bit()),
            DmaInterrupt::HalfTransfer => st.cr.modify(|_, w| w.htie().set_bit()),
            DmaInterrupt::TransferComplete => st.cr.modify(|_, w| w.tcie().set_bit()),
            DmaInterrupt::DirectModeError => st.cr.modify(|_, w| w.dmeie().set_bit()),
            DmaInterrupt::FifoError => st.fcr.modify(|_, w| w.feie().set_bit()),
        }

        if originally_enabled {
            st.cr.modify(|_, w| w.en().set_bit());
            while st.cr.read().en().bit_is_clear() {}
        }
    }

    /// Disable an interrupt source for a stream.
    pub fn disable_interrupt(&mut self, stream: DmaStream, interrupt: DmaInterrupt) {
        let st = &self.regs.st[stream as usize];

        let originally_enabled = st.cr.read().en().bit_is_set();
        if originally_enabled {
            st.cr.modify(|_, w| w.en().clear_bit());
            while st.cr.read().en().bit_is_set() {}
        }

        match interrupt {
            DmaInterrupt::TransferError => st.cr.modify(|_, w| w.teie().clear_bit()),
            DmaInterrupt::HalfTransfer => st.cr.modify(|_, w| w.htie().clear_bit()),
            DmaInterrupt::TransferComplete => st.cr.modify(|_, w| w.tcie().clear_bit()),
            DmaInterrupt::DirectModeError => st.cr.modify(|_, w| w.dmeie().clear_bit()),
            DmaInterrupt::FifoError => st.fcr.modify(|_, w| w.feie().clear_bit()),
        }

        if originally_enabled {
            st.cr.modify(|_, w| w.en().set_bit());
            while st.cr.read().en().bit_is_clear() {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_shifts_match_register_layout() {
        // Stream 0 FEIF is bit 0 of LISR; stream 3 group starts at bit 22.
        assert_eq!(flag_shift(DmaStream::S0), 0);
        assert_eq!(flag_shift(DmaStream::S1), 6);
        assert_eq!(flag_shift(DmaStream::S2), 16);
        assert_eq!(flag_shift(DmaStream::S3), 22);
        // Streams 4-7 repeat the layout in HISR.
        assert_eq!(flag_shift(DmaStream::S4), 0);
        assert_eq!(flag_shift(DmaStream::S7), 22);
    }

    #[test]
    fn transfer_complete_bit_positions() {
        // TCIF0 is LISR bit 5; TCIF3 is LISR bit 27.
        assert_eq!(
            flag_shift(DmaStream::S0) + flag_offset(DmaInterrupt::TransferComplete),
            5
        );
        assert_eq!(
            flag_shift(DmaStream::S3) + flag_offset(DmaInterrupt::TransferComplete),
            27
        );
    }

    #[test]
    fn full_mask_skips_reserved_bit() {
        // Bit 1 of each group is reserved and must stay clear.
        assert_eq!(flag_mask_all(DmaStream::S0), 0b11_1101);
        assert_eq!(flag_mask_all(DmaStream::S2), 0b11_1101 << 16);
    }
}
