//! Interrupt-driven USART echo. The receiver runs entirely from the USART2
//! IRQ; `main` sleeps. Shows the global-handle macros for sharing a driver
//! with an ISR.

#![no_std]
#![no_main]

use cortex_m_rt::entry;

use stm32f446_drivers::{
    self as hal, access_global,
    clocks::Clocks,
    gpio::{AltFn, Pin, PinMode, PinNum, Port},
    init_globals, make_globals,
    pac::{self, interrupt},
    setup_nvic,
    usart::{Usart, UsartConfig, UsartInterrupt},
};

use defmt_rtt as _;
use panic_probe as _;

make_globals!((USART, Usart<pac::USART2>));

#[entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();
    let dp = pac::Peripherals::take().unwrap();

    let clock_cfg = Clocks::default();
    hal::init(&clock_cfg).unwrap();

    let _tx = Pin::new(Port::A, PinNum::P2, PinMode::Alt(AltFn::Af7));
    let _rx = Pin::new(Port::A, PinNum::P3, PinMode::Alt(AltFn::Af7));

    let mut usart = Usart::new(dp.USART2, 115_200, UsartConfig::default(), &clock_cfg);
    usart.enable_interrupt(UsartInterrupt::ReadNotEmpty);

    setup_nvic!([(USART2, 1)], cp);

    init_globals!((USART, usart));

    loop {
        cortex_m::asm::wfi();
    }
}

#[interrupt]
fn USART2() {
    critical_section::with(|cs| {
        access_global!(USART, usart, cs);
        // Reading DR clears RXNE.
        let byte = usart.read_one();
        usart.write_one(byte);
    });
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
