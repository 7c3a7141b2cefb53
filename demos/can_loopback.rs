//! Send and receive CAN frames in loopback mode, which needs no transceiver or
//! second node: transmitted frames come straight back through the acceptance
//! filters. An accept-all filter routes everything to FIFO 0.

#![no_std]
#![no_main]

use cortex_m_rt::entry;

use stm32f446_drivers::{
    self as hal,
    can::{Can, CanBitTiming, CanConfig, CanFilterConfig, CanFrame, CanId, CanTestMode, RxFifo},
    clocks::Clocks,
    delay::Delay,
};

use defmt_rtt as _;
use panic_probe as _;

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();
    let dp = hal::pac::Peripherals::take().unwrap();

    let clock_cfg = Clocks::default();
    hal::init(&clock_cfg).unwrap();

    // 500kbps off the 45Mhz APB1 clock.
    let timing = CanBitTiming::from_bitrate(clock_cfg.apb1(), 500_000).unwrap();

    let config = CanConfig {
        test_mode: CanTestMode::Loopback,
        ..Default::default()
    };
    let mut can = Can::new(dp.CAN1, config, timing);

    // Accept everything into FIFO 0.
    can.configure_filter(0, CanFilterConfig::default()).unwrap();

    let mut delay = Delay::new(cp.SYST, &clock_cfg);
    let mut counter = 0u8;

    loop {
        let frame = CanFrame::new(CanId::Standard(0x123), &[counter, 0xab]).unwrap();
        can.transmit(&frame).unwrap();

        // In loopback the frame arrives as soon as it "leaves".
        while can.pending(RxFifo::F0) == 0 {}
        if let Some(rx) = can.receive(RxFifo::F0) {
            defmt::info!("received: id={}, len={}, data[0]={}", rx.id, rx.len, rx.data[0]);
        }

        counter = counter.wrapping_add(1);
        delay.delay_ms(1_000);
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
