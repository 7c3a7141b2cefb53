//! Route internal clocks to the MCO output pins for scope verification.
//! MCO1 (PA8, AF0) carries HSE; MCO2 (PC9, AF0) carries SYSCLK divided by 5,
//! 36Mhz with the default 180Mhz profile.

#![no_std]
#![no_main]

use cortex_m_rt::entry;

use stm32f446_drivers::{
    self as hal,
    clocks::{Clocks, McoPrescaler, McoSrc1, McoSrc2},
    gpio::{AltFn, OutputSpeed, Pin, PinMode, PinNum, Port},
};

use defmt_rtt as _;
use panic_probe as _;

#[entry]
fn main() -> ! {
    let clock_cfg = Clocks::default();
    hal::init(&clock_cfg).unwrap();

    defmt::info!(
        "sysclk: {}, hclk: {}, apb1: {}, apb2: {}",
        clock_cfg.sysclk(),
        clock_cfg.hclk(),
        clock_cfg.apb1(),
        clock_cfg.apb2()
    );

    let mut mco1 = Pin::new(Port::A, PinNum::P8, PinMode::Alt(AltFn::Af0));
    mco1.output_speed(OutputSpeed::VeryHigh);
    let mut mco2 = Pin::new(Port::C, PinNum::P9, PinMode::Alt(AltFn::Af0));
    mco2.output_speed(OutputSpeed::VeryHigh);

    clock_cfg.enable_mco1(McoSrc1::Hse, McoPrescaler::Div1);
    clock_cfg.enable_mco2(McoSrc2::Sysclk, McoPrescaler::Div5);

    loop {
        cortex_m::asm::wfi();
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
