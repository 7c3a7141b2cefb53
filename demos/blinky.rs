//! This minimal example causes an LED to blink using a (blocking) systick delay. It's
//! the canonical "Hello world" of embedded programming. It demonstrates project structure,
//! printing text to the console, using systick delays, and setting GPIO state.
//!
//! The LED is on PA5 (the user LED of the Nucleo-F446RE).

#![no_std]
#![no_main]

use cortex_m_rt::entry; // The runtime

use stm32f446_drivers::{
    self as hal,
    clocks::Clocks,
    delay::Delay,
    gpio::{Pin, PinMode, PinNum, Port},
};

use defmt_rtt as _;
// global logger
use panic_probe as _;

// This marks the entrypoint of our application.

#[entry]
fn main() -> ! {
    // Set up CPU peripherals
    let cp = cortex_m::Peripherals::take().unwrap();

    defmt::println!("Hello, world!");

    // 180Mhz off the 8Mhz ST-Link HSE bypass clock.
    let clock_cfg = Clocks::default();
    hal::init(&clock_cfg).unwrap();

    // Setup a delay, based on the Cortex-m systick.
    let mut delay = Delay::new(cp.SYST, &clock_cfg);
    let mut led = Pin::new(Port::A, PinNum::P5, PinMode::Output);

    loop {
        led.set_low();
        defmt::debug!("Output pin is low.");
        delay.delay_ms(1_000);
        led.set_high();
        defmt::debug!("Output pin is high.");
        delay.delay_ms(1_000);
    }
}

// same panicking *behavior* as `panic-probe` but doesn't print a panic message
// this prevents the panic message being printed *twice* when `defmt::panic` is invoked
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
