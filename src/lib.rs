//! Register-level drivers for the STM32F446, built on the PAC. The `clocks`
//! module is the heart of the crate: it configures the full clock tree up to
//! 180Mhz and hands out the bus frequencies every other driver derives its
//! timing from.
//!
//! See the `demos` directory for complete programs using each peripheral.

#![cfg_attr(not(test), no_std)]

pub use stm32f4::stm32f446 as pac;

pub mod adc;
pub mod can;
pub mod clocks;
pub mod delay;
pub mod dma;
pub mod error;
pub mod gpio;
mod macros;
pub mod spi;
pub mod usart;
mod util;

pub use crate::error::{Error, Result};

use crate::clocks::{Clocks, RccError};

/// Bring the MCU up to speed: configure the clock tree per `clock_cfg`. Call
/// once at the top of `main`, before touching any peripheral. If the requested
/// profile fails validation, no registers are written and the MCU stays on the
/// reset clocks (16Mhz HSI).
pub fn init(clock_cfg: &Clocks) -> core::result::Result<(), RccError> {
    clock_cfg.setup()
}
