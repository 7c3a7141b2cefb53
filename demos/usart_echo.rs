//! Echo bytes over USART2, which the Nucleo-F446RE routes to the ST-Link
//! virtual COM port. PA2 is TX, PA3 is RX, both on AF7.

#![no_std]
#![no_main]

use core::fmt::Write;

use cortex_m_rt::entry;

use stm32f446_drivers::{
    self as hal,
    clocks::Clocks,
    gpio::{AltFn, Pin, PinMode, PinNum, Port},
    usart::{Usart, UsartConfig},
};

use defmt_rtt as _;
use panic_probe as _;

#[entry]
fn main() -> ! {
    let dp = hal::pac::Peripherals::take().unwrap();

    let clock_cfg = Clocks::default();
    hal::init(&clock_cfg).unwrap();

    let _tx = Pin::new(Port::A, PinNum::P2, PinMode::Alt(AltFn::Af7));
    let _rx = Pin::new(Port::A, PinNum::P3, PinMode::Alt(AltFn::Af7));

    let mut usart = Usart::new(dp.USART2, 115_200, UsartConfig::default(), &clock_cfg);

    writeln!(usart, "echo server up at {} baud\r", 115_200).ok();

    let mut buf = [0u8; 1];
    loop {
        match usart.read(&mut buf) {
            Ok(()) => usart.write(&buf),
            Err(e) => defmt::warn!("rx error: {}", e),
        }
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
