//! Blink without a blocking delay: SysTick fires once per millisecond, feeding a
//! free-running tick counter the main loop paces itself against.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};

use stm32f446_drivers::{
    self as hal,
    clocks::Clocks,
    delay,
    gpio::{Pin, PinMode, PinNum, Port},
};

use defmt_rtt as _;
use panic_probe as _;

#[entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();

    let clock_cfg = Clocks::default();
    hal::init(&clock_cfg).unwrap();

    // Program SysTick for a 1ms cadence. The `SysTick` exception below advances
    // the counter.
    delay::setup_tick(&mut cp.SYST, &clock_cfg);

    let mut led = Pin::new(Port::A, PinNum::P5, PinMode::Output);

    loop {
        led.toggle();
        defmt::info!("uptime: {} ms", delay::ticks());
        delay::wait_ms(500);
    }
}

#[exception]
fn SysTick() {
    delay::tick();
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
