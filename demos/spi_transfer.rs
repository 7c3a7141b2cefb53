//! Exercise SPI1 as a master: read a device ID register from a hypothetical
//! sensor behind a software-managed chip select. SCK on PA5, MISO on PA6,
//! MOSI on PA7 (AF5); CS on PB6 as a plain output.

#![no_std]
#![no_main]

use cortex_m_rt::entry;

use stm32f446_drivers::{
    self as hal,
    clocks::Clocks,
    delay::Delay,
    gpio::{AltFn, Pin, PinMode, PinNum, Port},
    spi::{BaudRate, Spi, SpiConfig},
};

use defmt_rtt as _;
use panic_probe as _;

const REG_WHO_AM_I: u8 = 0x0f;
const READ_FLAG: u8 = 0x80;

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();
    let dp = hal::pac::Peripherals::take().unwrap();

    let clock_cfg = Clocks::default();
    hal::init(&clock_cfg).unwrap();

    let _sck = Pin::new(Port::A, PinNum::P5, PinMode::Alt(AltFn::Af5));
    let _miso = Pin::new(Port::A, PinNum::P6, PinMode::Alt(AltFn::Af5));
    let _mosi = Pin::new(Port::A, PinNum::P7, PinMode::Alt(AltFn::Af5));
    let mut cs = Pin::new(Port::B, PinNum::P6, PinMode::Output);
    cs.set_high();

    // 90Mhz APB2 / 32 = 2.8Mhz SCK.
    let mut spi = Spi::new(dp.SPI1, SpiConfig::default(), BaudRate::Div32);
    let mut delay = Delay::new(cp.SYST, &clock_cfg);

    loop {
        let mut words = [REG_WHO_AM_I | READ_FLAG, 0x00];

        cs.set_low();
        let res = spi.transfer(&mut words);
        cs.set_high();

        match res {
            Ok(()) => defmt::info!("device id: {:x}", words[1]),
            Err(e) => defmt::warn!("spi error: {}", e),
        }

        delay.delay_ms(1_000);
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
