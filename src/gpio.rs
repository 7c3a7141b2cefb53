//! This module provides functionality for General Purpose Input and Output (GPIO) pins,
//! including all GPIOx register functions, and pin-change interrupts.
//! It includes implementations of the `embedded-hal` pin abstraction.

#[cfg(feature = "embedded_hal")]
use core::convert::Infallible;

use cortex_m::asm::dsb;
#[cfg(feature = "embedded_hal")]
use embedded_hal::digital::v2::{InputPin, OutputPin, ToggleableOutputPin};
use paste::paste;

use crate::pac::{self, EXTI, RCC, SYSCFG};

#[derive(Copy, Clone)]
/// Values for `GPIOx_MODER`
pub enum PinMode {
    Input,
    Output,
    Alt(AltFn),
    Analog,
}

impl PinMode {
    /// We use this function to find the value bits due to being unable to repr(u8) with
    /// the wrapped `AltFn` value.
    fn val(&self) -> u8 {
        match self {
            Self::Input => 0b00,
            Self::Output => 0b01,
            Self::Alt(_) => 0b10,
            Self::Analog => 0b11,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// Values for `GPIOx_OTYPER`
pub enum OutputType {
    PushPull = 0,
    OpenDrain = 1,
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// Values for `GPIOx_OSPEEDR`
pub enum OutputSpeed {
    Low = 0b00,
    Medium = 0b01,
    High = 0b10,
    VeryHigh = 0b11,
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// Values for `GPIOx_PUPDR`
pub enum Pull {
    Floating = 0b00,
    Up = 0b01,
    Dn = 0b10,
}

#[derive(Copy, Clone, PartialEq)]
#[repr(u8)]
/// Values for `GPIOx_IDR` and `GPIOx_ODR`.
pub enum PinState {
    High = 1,
    Low = 0,
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// Values for `GPIOx_LCKR`.
pub enum CfgLock {
    NotLocked = 0,
    Locked = 1,
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// Values for `GPIOx_AFRL` and `GPIOx_AFRH`.
pub enum AltFn {
    Af0 = 0b0000,
    Af1 = 0b0001,
    Af2 = 0b0010,
    Af3 = 0b0011,
    Af4 = 0b0100,
    Af5 = 0b0101,
    Af6 = 0b0110,
    Af7 = 0b0111,
    Af8 = 0b1000,
    Af9 = 0b1001,
    Af10 = 0b1010,
    Af11 = 0b1011,
    Af12 = 0b1100,
    Af13 = 0b1101,
    Af14 = 0b1110,
    Af15 = 0b1111,
}

#[derive(Copy, Clone, defmt::Format)]
/// GPIO port letter. Ports A through H are available on this chip.
pub enum Port {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl Port {
    /// The port's index in the SYSCFG_EXTICR registers.
    fn cr_val(&self) -> u8 {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::D => 3,
            Self::E => 4,
            Self::F => 5,
            Self::G => 6,
            Self::H => 7,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(u8)]
/// Pin number; 0 through 15. For example, use P5 for PA5 or PB5.
pub enum PinNum {
    P0 = 0,
    P1 = 1,
    P2 = 2,
    P3 = 3,
    P4 = 4,
    P5 = 5,
    P6 = 6,
    P7 = 7,
    P8 = 8,
    P9 = 9,
    P10 = 10,
    P11 = 11,
    P12 = 12,
    P13 = 13,
    P14 = 14,
    P15 = 15,
}

#[derive(Copy, Clone, Debug)]
/// A pulse edge, used to trigger interrupts.
pub enum Edge {
    Rising,
    Falling,
}

/// All ports expose an identical register layout; only the base address differs,
/// so we can share one register-block type across them.
fn regs(port: Port) -> &'static pac::gpioa::RegisterBlock {
    let ptr = match port {
        Port::A => pac::GPIOA::ptr() as *const pac::gpioa::RegisterBlock,
        Port::B => pac::GPIOB::ptr() as *const pac::gpioa::RegisterBlock,
        Port::C => pac::GPIOC::ptr() as *const pac::gpioa::RegisterBlock,
        Port::D => pac::GPIOD::ptr() as *const pac::gpioa::RegisterBlock,
        Port::E => pac::GPIOE::ptr() as *const pac::gpioa::RegisterBlock,
        Port::F => pac::GPIOF::ptr() as *const pac::gpioa::RegisterBlock,
        Port::G => pac::GPIOG::ptr() as *const pac::gpioa::RegisterBlock,
        Port::H => pac::GPIOH::ptr() as *const pac::gpioa::RegisterBlock,
    };
    unsafe { &*ptr }
}

/// Reduce DRY for setting fields.
macro_rules! set_field {
    ($pin:expr, $regs:expr, $reg:ident, $field:ident, $bit:ident, $val:expr, [$($num:expr),+]) => {
        paste! {
            // Unsafe is required for some of the fields this expands to, but not all.
            #[allow(unused_unsafe)]
            unsafe {
                match $pin {
                    $(
                        PinNum::[<P $num>] => $regs.$reg.modify(|_, w| w.[<$field $num>]().$bit($val)),
                    )+
                }
            }
        }
    }
}

/// Reduce DRY for setting up alternate functions. The field is split across the
/// AFRL and AFRH registers at pin 8.
macro_rules! set_alt {
    ($pin:expr, $regs:expr, $val:expr, [$(($num:expr, $lh:ident)),+]) => {
        paste! {
            match $pin {
                $(
                    PinNum::[<P $num>] => {
                        $regs.[<afr $lh>].modify(|_, w| w.[<afr $lh $num>]().bits($val as u8));
                    }
                )+
            }
        }
    }
}

/// Reduce DRY for setting up pin-change interrupts.
macro_rules! set_exti {
    ($pin:expr, $exti:expr, $syscfg:expr, $trigger:expr, $val:expr, [$(($num:expr, $crnum:expr)),+]) => {
        paste! {
            match $pin {
                $(
                    PinNum::[<P $num>] => {
                        $exti.imr.modify(|_, w| w.[<mr $num>]().set_bit());
                        $exti.rtsr.modify(|_, w| w.[<tr $num>]().bit($trigger));
                        $exti.ftsr.modify(|_, w| w.[<tr $num>]().bit(!$trigger));
                        $syscfg
                            .[<exticr $crnum>]
                            .modify(|_, w| unsafe { w.[<exti $num>]().bits($val) });
                    }
                )+
            }
        }
    }
}

/// Represents a single GPIO pin. Construction enables the port's AHB1 clock
/// if it's not running yet.
pub struct Pin {
    pub port: Port,
    pub pin: PinNum,
}

impl Pin {
    pub fn new(port: Port, pin: PinNum, mode: PinMode) -> Self {
        let rcc = unsafe { &(*RCC::ptr()) };

        match port {
            Port::A => {
                if rcc.ahb1enr.read().gpioaen().bit_is_clear() {
                    rcc.ahb1enr.modify(|_, w| w.gpioaen().set_bit());
                }
            }
            Port::B => {
                if rcc.ahb1enr.read().gpioben().bit_is_clear() {
                    rcc.ahb1enr.modify(|_, w| w.gpioben().set_bit());
                }
            }
            Port::C => {
                if rcc.ahb1enr.read().gpiocen().bit_is_clear() {
                    rcc.ahb1enr.modify(|_, w| w.gpiocen().set_bit());
                }
            }
            Port::D => {
                if rcc.ahb1enr.read().gpioden().bit_is_clear() {
                    rcc.ahb1enr.modify(|_, w| w.gpioden().set_bit());
                }
            }
            Port::E => {
                if rcc.ahb1enr.read().gpioeen().bit_is_clear() {
                    rcc.ahb1enr.modify(|_, w| w.gpioeen().set_bit());
                }
            }
            Port::F => {
                if rcc.ahb1enr.read().gpiofen().bit_is_clear() {
                    rcc.ahb1enr.modify(|_, w| w.gpiofen().set_bit());
                }
            }
            Port::G => {
                if rcc.ahb1enr.read().gpiogen().bit_is_clear() {
                    rcc.ahb1enr.modify(|_, w| w.gpiogen().set_bit());
                }
            }
            Port::H => {
                if rcc.ahb1enr.read().gpiohen().bit_is_clear() {
                    rcc.ahb1enr.modify(|_, w| w.gpiohen().set_bit());
                }
            }
        }
        // The next peripheral access may otherwise race the clock enable. (Chip errata.)
        dsb();

        let mut result = Self { port, pin };
        result.mode(mode);

        result
    }

    /// Set pin mode.
    pub fn mode(&mut self, value: PinMode) {
        let regs = regs(self.port);
        set_field!(self.pin, regs, moder, moder, bits, value.val(), [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);

        if let PinMode::Alt(alt) = value {
            self.alt_fn(alt);
        }
    }

    /// Set output type.
    pub fn output_type(&mut self, value: OutputType) {
        let regs = regs(self.port);
        set_field!(self.pin, regs, otyper, ot, bit, value as u8 != 0, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    }

    /// Set output speed.
    pub fn output_speed(&mut self, value: OutputSpeed) {
        let regs = regs(self.port);
        set_field!(self.pin, regs, ospeedr, ospeedr, bits, value as u8, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    }

    /// Set internal pull resistor: Pull up, pull down, or floating.
    pub fn pull(&mut self, value: Pull) {
        let regs = regs(self.port);
        set_field!(self.pin, regs, pupdr, pupdr, bits, value as u8, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    }

    /// Lock the pin's configuration bits until the next MCU reset.
    pub fn cfg_lock(&mut self, value: CfgLock) {
        let regs = regs(self.port);
        set_field!(self.pin, regs, lckr, lck, bit, value as u8 != 0, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    }

    /// Read the input data register.
    pub fn get_state(&self) -> PinState {
        let regs = regs(self.port);
        let val = (regs.idr.read().bits() >> self.pin as u8) & 1 != 0;

        if val { PinState::High } else { PinState::Low }
    }

    pub fn is_high(&self) -> bool {
        self.get_state() == PinState::High
    }

    pub fn is_low(&self) -> bool {
        !self.is_high()
    }

    /// Set a pin state. Uses the BSRR register's set/reset halves, so the write
    /// is atomic with respect to other pins on the port.
    pub fn set_state(&mut self, value: PinState) {
        let regs = regs(self.port);
        let offset = match value {
            PinState::Low => 16,
            PinState::High => 0,
        };

        regs.bsrr
            .write(|w| unsafe { w.bits(1 << (offset + self.pin as u8)) });
    }

    pub fn set_high(&mut self) {
        self.set_state(PinState::High);
    }

    pub fn set_low(&mut self) {
        self.set_state(PinState::Low);
    }

    /// Toggle the output, based on the output data register's current value.
    pub fn toggle(&mut self) {
        let regs = regs(self.port);
        let high = (regs.odr.read().bits() >> self.pin as u8) & 1 != 0;
        if high {
            self.set_low();
        } else {
            self.set_high();
        }
    }

    /// Set up a pin's alternate function. We set this up initially using `mode()`.
    fn alt_fn(&mut self, value: AltFn) {
        let regs = regs(self.port);
        set_alt!(self.pin, regs, value, [(0, l), (1, l), (2, l),
            (3, l), (4, l), (5, l), (6, l), (7, l), (8, h), (9, h), (10, h), (11, h), (12, h),
            (13, h), (14, h), (15, h)])
    }

    /// Configure this pin as an interrupt source, triggered on the given edge.
    pub fn enable_interrupt(&mut self, edge: Edge, exti: &mut EXTI, syscfg: &mut SYSCFG) {
        let rise_trigger = match edge {
            // Trigger on rising edge, disable trigger on falling edge; or vice-versa.
            Edge::Rising => true,
            Edge::Falling => false,
        };

        set_exti!(self.pin, exti, syscfg, rise_trigger, self.port.cr_val(), [(0, 1), (1, 1), (2, 1),
            (3, 1), (4, 2), (5, 2), (6, 2), (7, 2), (8, 3), (9, 3), (10, 3), (11, 3), (12, 4),
            (13, 4), (14, 4), (15, 4)])
    }
}

// Implement `embedded-hal` traits over the same register accesses.
#[cfg(feature = "embedded_hal")]
impl InputPin for Pin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(Pin::is_high(self))
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        Ok(Pin::is_low(self))
    }
}

#[cfg(feature = "embedded_hal")]
impl OutputPin for Pin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Pin::set_low(self);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Pin::set_high(self);
        Ok(())
    }
}

#[cfg(feature = "embedded_hal")]
impl ToggleableOutputPin for Pin {
    type Error = Infallible;

    fn toggle(&mut self) -> Result<(), Self::Error> {
        Pin::toggle(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_register_values() {
        assert_eq!(PinMode::Input.val(), 0b00);
        assert_eq!(PinMode::Output.val(), 0b01);
        assert_eq!(PinMode::Alt(AltFn::Af7).val(), 0b10);
        assert_eq!(PinMode::Analog.val(), 0b11);
    }

    #[test]
    fn field_encodings() {
        assert_eq!(OutputSpeed::VeryHigh as u8, 0b11);
        assert_eq!(Pull::Dn as u8, 0b10);
        assert_eq!(AltFn::Af7 as u8, 7);
        assert_eq!(PinNum::P13 as u8, 13);
        assert_eq!(Port::C.cr_val(), 2);
    }

    #[test]
    fn bsrr_shift_math() {
        // Reset half of BSRR starts at bit 16.
        let pin = PinNum::P5 as u8;
        assert_eq!(1u32 << pin, 0x0000_0020);
        assert_eq!(1u32 << (16 + pin), 0x0020_0000);
    }
}
