//! This is an internal module that contains utility functionality used by other modules.

use crate::{
    clocks::Clocks,
    pac::{self, rcc::RegisterBlock},
};

/// Enables and resets peripheral clocks on various RCC registers.
/// The first argument is `apb1`, `ahb1` etc to specify the reg block. The second is something like
/// `usart2`, and the third is a `pac::RCC`.
macro_rules! rcc_en_reset {
    (apb1, $periph:expr, $rcc:expr) => {
        paste::paste! {
            $rcc.apb1enr.modify(|_, w| w.[<$periph en>]().set_bit());
            $rcc.apb1rstr.modify(|_, w| w.[<$periph rst>]().set_bit());
            $rcc.apb1rstr.modify(|_, w| w.[<$periph rst>]().clear_bit());
        }
    };
    (apb2, $periph:expr, $rcc:expr) => {
        paste::paste! {
            $rcc.apb2enr.modify(|_, w| w.[<$periph en>]().set_bit());
            $rcc.apb2rstr.modify(|_, w| w.[<$periph rst>]().set_bit());
            $rcc.apb2rstr.modify(|_, w| w.[<$periph rst>]().clear_bit());
        }
    };
    (ahb1, $periph:expr, $rcc:expr) => {
        paste::paste! {
            $rcc.ahb1enr.modify(|_, w| w.[<$periph en>]().set_bit());
            $rcc.ahb1rstr.modify(|_, w| w.[<$periph rst>]().set_bit());
            $rcc.ahb1rstr.modify(|_, w| w.[<$periph rst>]().clear_bit());
        }
    };
}

pub(crate) use rcc_en_reset;

/// Uart only. Important: This assumes we use the default UART clock.
pub trait BaudPeriph {
    fn baud(clock_cfg: &Clocks) -> u32;
}

impl BaudPeriph for pac::USART1 {
    fn baud(clock_cfg: &Clocks) -> u32 {
        clock_cfg.apb2()
    }
}

impl BaudPeriph for pac::USART2 {
    fn baud(clock_cfg: &Clocks) -> u32 {
        clock_cfg.apb1()
    }
}

impl BaudPeriph for pac::USART3 {
    fn baud(clock_cfg: &Clocks) -> u32 {
        clock_cfg.apb1()
    }
}

impl BaudPeriph for pac::USART6 {
    fn baud(clock_cfg: &Clocks) -> u32 {
        clock_cfg.apb2()
    }
}

/// Used to provide peripheral-specific implementations for RCC clock enable and reset.
pub trait RccPeriph {
    fn en_reset(rcc: &RegisterBlock);
}

impl RccPeriph for pac::USART1 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(apb2, usart1, rcc);
    }
}

impl RccPeriph for pac::USART2 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(apb1, usart2, rcc);
    }
}

impl RccPeriph for pac::USART3 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(apb1, usart3, rcc);
    }
}

impl RccPeriph for pac::USART6 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(apb2, usart6, rcc);
    }
}

impl RccPeriph for pac::SPI1 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(apb2, spi1, rcc);
    }
}

impl RccPeriph for pac::SPI2 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(apb1, spi2, rcc);
    }
}

impl RccPeriph for pac::SPI3 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(apb1, spi3, rcc);
    }
}

impl RccPeriph for pac::SPI4 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(apb2, spi4, rcc);
    }
}

impl RccPeriph for pac::CAN1 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(apb1, can1, rcc);
    }
}

impl RccPeriph for pac::CAN2 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(apb1, can2, rcc);
    }
}

impl RccPeriph for pac::DMA1 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(ahb1, dma1, rcc);
    }
}

impl RccPeriph for pac::DMA2 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc_en_reset!(ahb1, dma2, rcc);
    }
}

// The three ADCs share a single reset bit (APB2RSTR.ADCRST), so resetting one
// would knock out the others. Clock enable only.
impl RccPeriph for pac::ADC1 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc.apb2enr.modify(|_, w| w.adc1en().set_bit());
    }
}

impl RccPeriph for pac::ADC2 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc.apb2enr.modify(|_, w| w.adc2en().set_bit());
    }
}

impl RccPeriph for pac::ADC3 {
    fn en_reset(rcc: &RegisterBlock) {
        rcc.apb2enr.modify(|_, w| w.adc3en().set_bit());
    }
}
