//! Read an analog input and the internal temperature sensor with ADC1.
//! PA0 is channel 0, configured as an analog pin; the temperature sensor
//! reads on channel 18.

#![no_std]
#![no_main]

use cortex_m_rt::entry;

use stm32f446_drivers::{
    self as hal,
    adc::{Adc, AdcConfig, SampleTime},
    clocks::Clocks,
    delay::Delay,
    gpio::{Pin, PinMode, PinNum, Port},
};

use defmt_rtt as _;
use panic_probe as _;

const TEMP_CHANNEL: u8 = 18;

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();
    let dp = hal::pac::Peripherals::take().unwrap();

    let clock_cfg = Clocks::default();
    hal::init(&clock_cfg).unwrap();

    let _ain = Pin::new(Port::A, PinNum::P0, PinMode::Analog);

    let mut adc = Adc::new(dp.ADC1, AdcConfig::default());
    adc.enable_temp_sensor();
    // The temperature sensor wants a long sample time.
    adc.set_sample_time(TEMP_CHANNEL, SampleTime::T480);

    let mut delay = Delay::new(cp.SYST, &clock_cfg);

    loop {
        let pa0 = adc.read(0);
        let temp_raw = adc.read(TEMP_CHANNEL);
        defmt::info!("PA0: {}, temp sensor (raw): {}", pa0, temp_raw);

        delay.delay_ms(500);
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
