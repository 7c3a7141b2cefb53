//! Support for the Controller Area Network (CAN) bus, via the bxCAN peripheral.
//! Provides APIs to configure bit timing, filters, and test modes, and to
//! transmit and receive frames through the mailbox and FIFO interfaces.

use core::ops::Deref;

use crate::{
    pac::{self, RCC},
    util::RccPeriph,
};

/// CAN error
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum CanError {
    /// No (prescaler, quanta) combination hits the requested bitrate exactly
    InvalidTiming,
    /// Frame payload exceeds the 8-byte bxCAN limit
    FrameTooLong,
    /// Filter bank index out of range
    InvalidFilter,
    /// Identifier exceeds 11 bits (standard) or 29 bits (extended)
    InvalidId,
}

#[derive(Clone, Copy, PartialEq)]
/// Operating mode, controlled through MCR and acknowledged in MSR.
pub enum CanMode {
    /// Initialization mode: configuration registers are writable, the bus is left alone.
    Initialization,
    /// Normal operation: synchronized to the bus, able to transmit and receive.
    Normal,
    /// Low-power sleep mode.
    Sleep,
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// Self-test modes (BTR, SILM and LBKM bits). Loopback receives its own frames
/// without needing a second node; silent observes the bus without driving it.
pub enum CanTestMode {
    None = 0b00,
    Loopback = 0b01,
    Silent = 0b10,
    SilentLoopback = 0b11,
}

#[derive(Clone, Copy, PartialEq)]
#[repr(u8)]
/// Receive FIFO selection. Each FIFO holds up to 3 frames.
pub enum RxFifo {
    F0 = 0,
    F1 = 1,
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// Filter bank mode (FM1R). Mask mode matches ranges of IDs; list mode matches
/// exact IDs only.
pub enum FilterMode {
    Mask = 0,
    List = 1,
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// Filter bank scale (FS1R). A single 32-bit filter, or two 16-bit ones.
pub enum FilterScale {
    Dual16 = 0,
    Single32 = 1,
}

/// Configuration of a single filter bank.
#[derive(Clone)]
pub struct CanFilterConfig {
    /// Masking or list mode. Defaults to mask.
    pub mode: FilterMode,
    /// Bit scale. Defaults to a single 32-bit filter.
    pub scale: FilterScale,
    /// Which FIFO matching frames land in. Defaults to FIFO 0.
    pub fifo: RxFifo,
    /// Raw FR1 contents: the ID word in 32-bit mode.
    pub id: u32,
    /// Raw FR2 contents: the mask word in 32-bit mask mode, or a second ID in list mode.
    pub mask: u32,
    /// Leave the bank active after configuration. Defaults to true.
    pub active: bool,
}

impl Default for CanFilterConfig {
    fn default() -> Self {
        Self {
            mode: FilterMode::Mask,
            scale: FilterScale::Single32,
            fifo: RxFifo::F0,
            // Accept-all: zero ID with zero mask matches everything.
            id: 0,
            mask: 0,
            active: true,
        }
    }
}

/// A CAN identifier, standard (11-bit) or extended (29-bit).
#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub enum CanId {
    Standard(u16),
    Extended(u32),
}

impl CanId {
    /// Whether the value fits the identifier width. Out-of-range bits would
    /// otherwise shift into adjacent fields of the mailbox IR word.
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Standard(id) => *id <= 0x7ff,
            Self::Extended(id) => *id <= 0x1fff_ffff,
        }
    }
}

/// A CAN data frame. `time` is populated on reception when time-triggered
/// communication is active; it is ignored on transmit.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct CanFrame {
    pub id: CanId,
    pub data: [u8; 8],
    pub len: u8,
    pub time: u16,
}

impl CanFrame {
    pub fn new(id: CanId, data: &[u8]) -> Result<Self, CanError> {
        if !id.is_valid() {
            return Err(CanError::InvalidId);
        }
        if data.len() > 8 {
            return Err(CanError::FrameTooLong);
        }

        let mut frame = Self {
            id,
            data: [0; 8],
            len: data.len() as u8,
            time: 0,
        };
        frame.data[..data.len()].copy_from_slice(data);

        Ok(frame)
    }
}

/// Nominal bit timing (BTR register). All values are human-readable; the
/// register encodings subtract one on write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CanBitTiming {
    /// Baud rate prescaler, 1 to 1024. One time quantum is `prescaler / pclk1`.
    pub prescaler: u16,
    /// Time segment 1 (propagation + phase 1), 1 to 16 quanta.
    pub seg1: u8,
    /// Time segment 2 (phase 2), 1 to 8 quanta.
    pub seg2: u8,
    /// Resynchronization jump width, 1 to 4 quanta.
    pub sjw: u8,
}

impl CanBitTiming {
    /// Compute a timing configuration for a bitrate given the APB1 clock. Tries
    /// bit lengths from 20 down to 8 quanta, taking the longest that divides the
    /// clock evenly, with the sample point near 87.5%. Returns an error if no
    /// combination hits the bitrate exactly.
    pub fn from_bitrate(pclk1: u32, bitrate: u32) -> Result<Self, CanError> {
        for total_tq in (8..=20u32).rev() {
            if pclk1 % (bitrate * total_tq) != 0 {
                continue;
            }
            let prescaler = pclk1 / (bitrate * total_tq);
            if !(1..=1024).contains(&prescaler) {
                continue;
            }

            let seg2 = ((total_tq + 7) / 8) as u8;
            let seg1 = (total_tq - 1) as u8 - seg2;

            return Ok(Self {
                prescaler: prescaler as u16,
                seg1,
                seg2,
                sjw: 1,
            });
        }

        Err(CanError::InvalidTiming)
    }

    /// The bit length in time quanta, including the sync segment.
    pub fn total_quanta(&self) -> u32 {
        1 + self.seg1 as u32 + self.seg2 as u32
    }
}

#[derive(Clone, Copy)]
/// The type of CAN interrupt to configure. Maps to the IER register.
pub enum CanInterrupt {
    TxMailboxEmpty,
    Fifo0MessagePending,
    Fifo0Full,
    Fifo0Overrun,
    Fifo1MessagePending,
    Fifo1Full,
    Fifo1Overrun,
    ErrorWarning,
    ErrorPassive,
    BusOff,
    LastErrorCode,
    Error,
    Wakeup,
    Sleep,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
#[repr(u8)]
/// The last error code seen on the bus (ESR, LEC field).
pub enum LastErrorCode {
    NoError = 0b000,
    Stuff = 0b001,
    Form = 0b010,
    Ack = 0b011,
    BitRecessive = 0b100,
    BitDominant = 0b101,
    Crc = 0b110,
    Software = 0b111,
}

impl LastErrorCode {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0b000 => Self::NoError,
            0b001 => Self::Stuff,
            0b010 => Self::Form,
            0b011 => Self::Ack,
            0b100 => Self::BitRecessive,
            0b101 => Self::BitDominant,
            0b110 => Self::Crc,
            _ => Self::Software,
        }
    }
}

/// A snapshot of the error state register.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct CanErrorInfo {
    pub rx_errors: u8,
    pub tx_errors: u8,
    pub last_code: LastErrorCode,
    pub bus_off: bool,
    pub passive: bool,
    pub warning: bool,
}

/// Configuration for CAN. Can be used with default::Default.
#[derive(Clone)]
pub struct CanConfig {
    /// Leave bus-off state automatically once 128 x 11 recessive bits are seen.
    /// Defaults to disabled.
    pub auto_bus_off: bool,
    /// Wake from sleep on bus activity. Defaults to disabled.
    pub auto_wake_up: bool,
    /// Retransmit automatically on arbitration loss or error (clear MCR NART).
    /// Defaults to enabled.
    pub auto_retransmit: bool,
    /// Transmit mailboxes drain in request order rather than identifier priority.
    /// Defaults to disabled.
    pub tx_fifo_priority: bool,
    /// Lock receive FIFOs on overrun, keeping the oldest frames instead of the
    /// newest. Defaults to disabled.
    pub rx_fifo_locked: bool,
    /// Loopback / silent self-test mode. Defaults to none.
    pub test_mode: CanTestMode,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            auto_bus_off: false,
            auto_wake_up: false,
            auto_retransmit: true,
            tx_fifo_priority: false,
            rx_fifo_locked: false,
            test_mode: CanTestMode::None,
        }
    }
}

// IR word layout, shared by the TX and RX mailbox identifier registers.
const IR_TXRQ: u32 = 1 << 0;
const IR_IDE: u32 = 1 << 2;
const IR_EXID_SHIFT: u32 = 3;
const IR_STID_SHIFT: u32 = 21;

/// Pack an identifier into a mailbox IR word.
fn pack_id(id: CanId) -> u32 {
    match id {
        CanId::Standard(id) => (id as u32) << IR_STID_SHIFT,
        CanId::Extended(id) => (id << IR_EXID_SHIFT) | IR_IDE,
    }
}

/// Recover the identifier from a mailbox IR word.
fn unpack_id(ir: u32) -> CanId {
    if ir & IR_IDE != 0 {
        CanId::Extended(ir >> IR_EXID_SHIFT)
    } else {
        CanId::Standard((ir >> IR_STID_SHIFT) as u16)
    }
}

/// Pack up to 8 payload bytes into the low and high data words.
fn pack_data(data: &[u8; 8], len: u8) -> (u32, u32) {
    let mut lr = 0u32;
    let mut hr = 0u32;
    for i in 0..len as usize {
        if i < 4 {
            lr |= (data[i] as u32) << (i * 8);
        } else {
            hr |= (data[i] as u32) << ((i - 4) * 8);
        }
    }
    (lr, hr)
}

fn unpack_data(lr: u32, hr: u32) -> [u8; 8] {
    let mut data = [0u8; 8];
    for i in 0..4 {
        data[i] = (lr >> (i * 8)) as u8;
        data[i + 4] = (hr >> (i * 8)) as u8;
    }
    data
}

/// Interface to a bxCAN peripheral.
pub struct Can<R> {
    pub regs: R,
}

impl<R> Can<R>
where
    R: Deref<Target = pac::can1::RegisterBlock> + RccPeriph,
{
    /// Initialize a CAN peripheral, including configuration register writes, bit
    /// timing, and enabling and resetting its RCC peripheral clock. The peripheral
    /// is left in normal mode, synchronized to the bus.
    pub fn new(regs: R, config: CanConfig, timing: CanBitTiming) -> Self {
        let rcc = unsafe { &(*RCC::ptr()) };
        R::en_reset(rcc);

        let mut can = Self { regs };

        // BTR and the MCR configuration bits are only writable in initialization mode.
        can.set_mode(CanMode::Initialization);

        can.regs.mcr.modify(|_, w| {
            w.abom().bit(config.auto_bus_off);
            w.awum().bit(config.auto_wake_up);
            w.nart().bit(!config.auto_retransmit);
            w.txfp().bit(config.tx_fifo_priority);
            w.rflm().bit(config.rx_fifo_locked)
        });

        can.regs.btr.modify(|_, w| unsafe {
            w.silm().bit(config.test_mode as u8 & 0b10 != 0);
            w.lbkm().bit(config.test_mode as u8 & 0b01 != 0);
            w.sjw().bits(timing.sjw - 1);
            w.ts1().bits(timing.seg1 - 1);
            w.ts2().bits(timing.seg2 - 1);
            w.brp().bits(timing.prescaler - 1)
        });

        can.set_mode(CanMode::Normal);

        can
    }

    /// Switch operating mode, blocking until the hardware acknowledges through MSR.
    /// Leaving initialization mode waits for synchronization to the bus (11
    /// consecutive recessive bits).
    pub fn set_mode(&mut self, mode: CanMode) {
        match mode {
            CanMode::Initialization => {
                self.regs.mcr.modify(|_, w| {
                    w.sleep().clear_bit();
                    w.inrq().set_bit()
                });
                while self.regs.msr.read().inak().bit_is_clear() {}
            }
            CanMode::Normal => {
                self.regs.mcr.modify(|_, w| {
                    w.sleep().clear_bit();
                    w.inrq().clear_bit()
                });
                while self.regs.msr.read().inak().bit_is_set() {}
            }
            CanMode::Sleep => {
                self.regs.mcr.modify(|_, w| {
                    w.inrq().clear_bit();
                    w.sleep().set_bit()
                });
                while self.regs.msr.read().slak().bit_is_clear() {}
            }
        }
    }

    /// Enable or disable time-triggered communication (MCR, TTCM). When active,
    /// the internal counter is captured into received frames' `time` field.
    pub fn set_time_triggered_mode(&mut self, enabled: bool) {
        self.regs.mcr.modify(|_, w| w.ttcm().bit(enabled));
    }

    /// Set where the CAN2 filter banks start (FMR, CAN2SB). Banks below the split
    /// serve CAN1; banks at or above it serve CAN2. The filter registers belong to
    /// CAN1 regardless of which peripheral this instance wraps.
    pub fn set_filter_start(&mut self, split: u8) -> Result<(), CanError> {
        if split > 28 {
            return Err(CanError::InvalidFilter);
        }

        let can1 = unsafe { &(*pac::CAN1::ptr()) };
        can1.fmr.modify(|_, w| unsafe { w.can2sb().bits(split) });

        Ok(())
    }

    /// Configure one of the 28 shared filter banks. See RM: "Identifier filtering".
    pub fn configure_filter(&mut self, bank: u8, config: CanFilterConfig) -> Result<(), CanError> {
        if bank > 27 {
            return Err(CanError::InvalidFilter);
        }

        let can1 = unsafe { &(*pac::CAN1::ptr()) };
        let bit = 1u32 << bank;

        // Filters are modified with the bank deactivated, behind FINIT.
        can1.fmr.modify(|_, w| w.finit().set_bit());

        // 1. Masking or list mode.
        can1.fm1r.modify(|r, w| unsafe {
            w.bits(r.bits() & !bit | (u32::from(config.mode as u8)) << bank)
        });
        // 2. Bit scale.
        can1.fs1r.modify(|r, w| unsafe {
            w.bits(r.bits() & !bit | (u32::from(config.scale as u8)) << bank)
        });
        // 3. FIFO assignment.
        can1.ffa1r.modify(|r, w| unsafe {
            w.bits(r.bits() & !bit | (u32::from(config.fifo as u8)) << bank)
        });
        // 4. Target ID and mask.
        can1.fb[bank as usize].fr1.write(|w| unsafe { w.bits(config.id) });
        can1.fb[bank as usize].fr2.write(|w| unsafe { w.bits(config.mask) });
        // 5. Activation.
        can1.fa1r.modify(|r, w| unsafe {
            w.bits(r.bits() & !bit | (u32::from(config.active)) << bank)
        });

        can1.fmr.modify(|_, w| w.finit().clear_bit());

        Ok(())
    }

    /// A transmit mailbox with no request pending, if any (TSR, TME bits).
    pub fn free_mailbox(&self) -> Option<usize> {
        let tsr = self.regs.tsr.read();
        if tsr.tme0().bit_is_set() {
            Some(0)
        } else if tsr.tme1().bit_is_set() {
            Some(1)
        } else if tsr.tme2().bit_is_set() {
            Some(2)
        } else {
            None
        }
    }

    /// Transmit a frame, blocking until a mailbox frees up. Arbitration and the
    /// actual wire transfer proceed in hardware after this returns.
    pub fn transmit(&mut self, frame: &CanFrame) -> Result<(), CanError> {
        if frame.len > 8 {
            return Err(CanError::FrameTooLong);
        }

        let mailbox = loop {
            if let Some(m) = self.free_mailbox() {
                break m;
            }
        };

        let (lr, hr) = pack_data(&frame.data, frame.len);
        let tx = &self.regs.tx[mailbox];

        tx.tdlr.write(|w| unsafe { w.bits(lr) });
        tx.tdhr.write(|w| unsafe { w.bits(hr) });
        tx.tdtr.write(|w| unsafe { w.dlc().bits(frame.len) });
        // Setting TXRQ hands the mailbox to hardware.
        tx.tir
            .write(|w| unsafe { w.bits(pack_id(frame.id) | IR_TXRQ) });

        Ok(())
    }

    /// The number of frames waiting in a receive FIFO (RFR, FMP field).
    pub fn pending(&self, fifo: RxFifo) -> u8 {
        self.regs.rfr[fifo as usize].read().fmp().bits()
    }

    /// Fetch the oldest frame from a receive FIFO, releasing its mailbox output.
    /// Returns `None` if the FIFO is empty.
    pub fn receive(&mut self, fifo: RxFifo) -> Option<CanFrame> {
        if self.pending(fifo) == 0 {
            return None;
        }

        let rx = &self.regs.rx[fifo as usize];

        let ir = rx.rir.read().bits();
        let dtr = rx.rdtr.read();
        let lr = rx.rdlr.read().bits();
        let hr = rx.rdhr.read().bits();

        let frame = CanFrame {
            id: unpack_id(ir),
            data: unpack_data(lr, hr),
            len: dtr.dlc().bits(),
            time: dtr.time().bits(),
        };

        // Release the FIFO output mailbox so the next pending frame moves up.
        self.regs.rfr[fifo as usize].modify(|_, w| w.rfom().set_bit());

        Some(frame)
    }

    /// Snapshot the error counters and flags from ESR.
    pub fn error_info(&self) -> CanErrorInfo {
        let esr = self.regs.esr.read();

        CanErrorInfo {
            rx_errors: esr.rec().bits(),
            tx_errors: esr.tec().bits(),
            last_code: LastErrorCode::from_bits(esr.lec().bits()),
            bus_off: esr.boff().bit_is_set(),
            passive: esr.epvf().bit_is_set(),
            warning: esr.ewgf().bit_is_set(),
        }
    }

    /// Enable a specific type of interrupt.
    pub fn enable_interrupt(&mut self, interrupt: CanInterrupt) {
        self.regs.ier.modify(|_, w| match interrupt {
            CanInterrupt::TxMailboxEmpty => w.tmeie().set_bit(),
            CanInterrupt::Fifo0MessagePending => w.fmpie0().set_bit(),
            CanInterrupt::Fifo0Full => w.ffie0().set_bit(),
            CanInterrupt::Fifo0Overrun => w.fovie0().set_bit(),
            CanInterrupt::Fifo1MessagePending => w.fmpie1().set_bit(),
            CanInterrupt::Fifo1Full => w.ffie1().set_bit(),
            CanInterrupt::Fifo1Overrun => w.fovie1().set_bit(),
            CanInterrupt::ErrorWarning => w.ewgie().set_bit(),
            CanInterrupt::ErrorPassive => w.epvie().set_bit(),
            CanInterrupt::BusOff => w.bofie().set_bit(),
            CanInterrupt::LastErrorCode => w.lecie().set_bit(),
            CanInterrupt::Error => w.errie().set_bit(),
            CanInterrupt::Wakeup => w.wkuie().set_bit(),
            CanInterrupt::Sleep => w.slkie().set_bit(),
        });
    }

    /// Disable a specific type of interrupt.
    pub fn disable_interrupt(&mut self, interrupt: CanInterrupt) {
        self.regs.ier.modify(|_, w| match interrupt {
            CanInterrupt::TxMailboxEmpty => w.tmeie().clear_bit(),
            CanInterrupt::Fifo0MessagePending => w.fmpie0().clear_bit(),
            CanInterrupt::Fifo0Full => w.ffie0().clear_bit(),
            CanInterrupt::Fifo0Overrun => w.fovie0().clear_bit(),
            CanInterrupt::Fifo1MessagePending => w.fmpie1().clear_bit(),
            CanInterrupt::Fifo1Full => w.ffie1().clear_bit(),
            CanInterrupt::Fifo1Overrun => w.fovie1().clear_bit(),
            CanInterrupt::ErrorWarning => w.ewgie().clear_bit(),
            CanInterrupt::ErrorPassive => w.epvie().clear_bit(),
            CanInterrupt::BusOff => w.bofie().clear_bit(),
            CanInterrupt::LastErrorCode => w.lecie().clear_bit(),
            CanInterrupt::Error => w.errie().clear_bit(),
            CanInterrupt::Wakeup => w.wkuie().clear_bit(),
            CanInterrupt::Sleep => w.slkie().clear_bit(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_id_round_trip() {
        let ir = pack_id(CanId::Standard(0x7ff));
        assert_eq!(ir, 0x7ff << 21);
        assert_eq!(unpack_id(ir), CanId::Standard(0x7ff));
    }

    #[test]
    fn extended_id_round_trip() {
        let id = 0x1234_5678 & 0x1fff_ffff;
        let ir = pack_id(CanId::Extended(id));
        assert_ne!(ir & IR_IDE, 0);
        assert_eq!(unpack_id(ir), CanId::Extended(id));
    }

    #[test]
    fn data_packing_is_little_endian_per_word() {
        let frame = CanFrame::new(CanId::Standard(1), &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let (lr, hr) = pack_data(&frame.data, frame.len);
        assert_eq!(lr, 0x0403_0201);
        assert_eq!(hr, 0x0807_0605);
        assert_eq!(unpack_data(lr, hr), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn short_payload_pads_with_zeros() {
        let frame = CanFrame::new(CanId::Standard(1), &[0xaa, 0xbb]).unwrap();
        assert_eq!(frame.len, 2);
        let (lr, hr) = pack_data(&frame.data, frame.len);
        assert_eq!(lr, 0x0000_bbaa);
        assert_eq!(hr, 0);
    }

    #[test]
    fn oversized_payload_rejected() {
        let err = CanFrame::new(CanId::Standard(1), &[0; 9]);
        assert_eq!(err.unwrap_err(), CanError::FrameTooLong);
    }

    #[test]
    fn out_of_range_ids_rejected() {
        // One past each identifier width. Accepting these would shift the extra
        // bits into the IDE/TXRQ positions of the IR word.
        let err = CanFrame::new(CanId::Standard(0x800), &[]);
        assert_eq!(err.unwrap_err(), CanError::InvalidId);

        let err = CanFrame::new(CanId::Extended(0x2000_0000), &[]);
        assert_eq!(err.unwrap_err(), CanError::InvalidId);
    }

    #[test]
    fn max_ids_accepted_and_round_trip() {
        let frame = CanFrame::new(CanId::Standard(0x7ff), &[]).unwrap();
        assert_eq!(unpack_id(pack_id(frame.id)), CanId::Standard(0x7ff));

        let frame = CanFrame::new(CanId::Extended(0x1fff_ffff), &[]).unwrap();
        assert_eq!(unpack_id(pack_id(frame.id)), CanId::Extended(0x1fff_ffff));
    }

    #[test]
    fn bit_timing_for_45mhz_apb1() {
        // 45Mhz / (500kbps x 18 quanta) divides evenly into a prescaler of 5.
        let timing = CanBitTiming::from_bitrate(45_000_000, 500_000).unwrap();
        assert_eq!(timing.prescaler, 5);
        assert_eq!(timing.total_quanta(), 18);
        assert_eq!(timing.seg1 + timing.seg2 + 1, 18);
        // Check the bitrate comes back out.
        assert_eq!(
            45_000_000 / (timing.prescaler as u32 * timing.total_quanta()),
            500_000
        );
    }

    #[test]
    fn configs_are_cloneable() {
        let cfg = CanConfig::default();
        let copy = cfg.clone();
        assert!(copy.auto_retransmit);

        let filter = CanFilterConfig::default();
        let copy = filter.clone();
        assert_eq!(copy.mask, 0);
        assert!(copy.active);
    }

    #[test]
    fn bit_timing_rejects_impossible_rate() {
        assert_eq!(
            CanBitTiming::from_bitrate(45_000_000, 1_000_001),
            Err(CanError::InvalidTiming)
        );
    }
}
