//! Clock tree configuration for the RCC peripheral: oscillator selection, the main
//! PLL, bus prescalers, and the SYSCLK switch sequence. This module is the place
//! peripheral drivers come to for bus speeds.

use cortex_m::asm::dsb;

use crate::{
    pac::{FLASH, PWR, RCC},
    util::rcc_en_reset,
};

/// Clock-configuration error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum RccError {
    /// A derived speed is out of the documented range for this chip.
    Speed,
    /// A hardware ready flag failed to behave as expected.
    Hardware,
}

#[derive(Clone, Copy, PartialEq)]
/// The clocks source input used by the PLL.
pub enum PllSrc {
    Hsi,
    Hse(u32), // freq in Hz
}

impl PllSrc {
    /// Required instead of u8 repr due to numerical value on non-uniform discrim being experimental.
    /// (ie, can't set on `Pll(Pllsrc)`.
    fn bits(&self) -> u8 {
        match self {
            Self::Hsi => 0,
            Self::Hse(_) => 1,
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
/// The input source for the system clock (CFGR.SW).
pub enum InputSrc {
    Hsi,
    Hse(u32), // freq in Hz
    Pll(PllSrc),
}

impl InputSrc {
    /// Required due to numerical value on non-uniform discrim being experimental.
    /// (ie, can't set on `Pll(Pllsrc)`.
    pub fn bits(&self) -> u8 {
        match self {
            Self::Hsi => 0b00,
            Self::Hse(_) => 0b01,
            Self::Pll(_) => 0b10,
        }
    }
}

#[derive(Clone, Copy, defmt::Format)]
#[repr(u8)]
/// Main PLL division factor for the system clock (PLLCFGR.PLLP).
pub enum Pllp {
    Div2 = 0b00,
    Div4 = 0b01,
    Div6 = 0b10,
    Div8 = 0b11,
}

impl Pllp {
    pub fn value(&self) -> u8 {
        match self {
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div6 => 6,
            Self::Div8 => 8,
        }
    }
}

#[derive(Clone, Copy, defmt::Format)]
#[repr(u8)]
/// Main PLL division factor for the 48Mhz clock domain (PLLCFGR.PLLQ).
pub enum Pllq {
    Div2 = 0b0010,
    Div3 = 0b0011,
    Div4 = 0b0100,
    Div5 = 0b0101,
    Div6 = 0b0110,
    Div7 = 0b0111,
    Div8 = 0b1000,
    Div9 = 0b1001,
    Div10 = 0b1010,
    Div11 = 0b1011,
    Div12 = 0b1100,
    Div13 = 0b1101,
    Div14 = 0b1110,
    Div15 = 0b1111,
}

impl Pllq {
    pub fn value(&self) -> u8 {
        match self {
            Self::Div2 => 2,
            Self::Div3 => 3,
            Self::Div4 => 4,
            Self::Div5 => 5,
            Self::Div6 => 6,
            Self::Div7 => 7,
            Self::Div8 => 8,
            Self::Div9 => 9,
            Self::Div10 => 10,
            Self::Div11 => 11,
            Self::Div12 => 12,
            Self::Div13 => 13,
            Self::Div14 => 14,
            Self::Div15 => 15,
        }
    }
}

#[derive(Clone, Copy, defmt::Format)]
#[repr(u8)]
/// Division factor for the AHB clock. Also known as AHB Prescaler.
pub enum HclkPrescaler {
    Div1 = 0b0000,
    Div2 = 0b1000,
    Div4 = 0b1001,
    Div8 = 0b1010,
    Div16 = 0b1011,
    Div64 = 0b1100,
    Div128 = 0b1101,
    Div256 = 0b1110,
    Div512 = 0b1111,
}

impl HclkPrescaler {
    pub fn value(&self) -> u16 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
            Self::Div64 => 64,
            Self::Div128 => 128,
            Self::Div256 => 256,
            Self::Div512 => 512,
        }
    }
}

#[derive(Clone, Copy, defmt::Format)]
#[repr(u8)]
/// For use with `RCC_APBPPRE1`, and `RCC_APBPPRE2`. Ie, low-speed and high-speed prescalers respectively.
pub enum ApbPrescaler {
    Div1 = 0b000,
    Div2 = 0b100,
    Div4 = 0b101,
    Div8 = 0b110,
    Div16 = 0b111,
}

impl ApbPrescaler {
    pub fn value(&self) -> u8 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
        }
    }
}

#[derive(Clone, Copy)]
#[repr(u8)]
/// Represents Flash wait states in the FLASH_ACR register.
enum WaitState {
    W0 = 0,
    W1 = 1,
    W2 = 2,
    W3 = 3,
    W4 = 4,
    W5 = 5,
}

#[derive(Clone, Copy, defmt::Format)]
#[repr(u8)]
/// Source for the MCO1 output pin (PA8), set in CFGR.MCO1.
pub enum McoSrc1 {
    Hsi = 0b00,
    Lse = 0b01,
    Hse = 0b10,
    Pll = 0b11,
}

#[derive(Clone, Copy, defmt::Format)]
#[repr(u8)]
/// Source for the MCO2 output pin (PC9), set in CFGR.MCO2.
pub enum McoSrc2 {
    Sysclk = 0b00,
    PllI2s = 0b01,
    Hse = 0b10,
    Pll = 0b11,
}

#[derive(Clone, Copy, defmt::Format)]
#[repr(u8)]
/// Division applied to an MCO output (CFGR.MCOxPRE).
pub enum McoPrescaler {
    Div1 = 0b000,
    Div2 = 0b100,
    Div3 = 0b101,
    Div4 = 0b110,
    Div5 = 0b111,
}

/// Settings used to configure clocks. Create this struct by using its `Default::default()`
/// implementation, then modify as required, referencing your RM's clock tree,
/// or Stm32Cube IDE's interactive clock manager. Apply settings by running `.setup()`.
pub struct Clocks {
    /// The input source for the system and peripheral clocks. Eg HSE, HSI, PLL etc
    pub input_src: InputSrc,
    /// PLL input division. Valid range: 2..=63. Target a 1-2Mhz VCO input.
    pub pllm: u8,
    /// PLL multiplication. Valid range: 50..=432.
    pub plln: u16,
    pub pllp: Pllp,
    /// USB prescaler, for target of 48Mhz.
    pub pllq: Pllq,
    /// The value to divide SYSCLK by, to get systick and peripheral clocks. Also known as AHB divider
    pub hclk_prescaler: HclkPrescaler,
    /// The divider of HCLK to get the APB1 peripheral clock
    pub apb1_prescaler: ApbPrescaler,
    /// The divider of HCLK to get the APB2 peripheral clock
    pub apb2_prescaler: ApbPrescaler,
    /// Bypass the HSE output, for use with oscillators that don't need it. Saves power, and
    /// frees up the pin for use as GPIO.
    pub hse_bypass: bool,
    pub security_system: bool,
}

impl Clocks {
    /// Validate the configuration, then walk the RM's boot sequence: oscillator on and
    /// ready, voltage scale and overdrive, PLL program and lock, flash wait states,
    /// bus prescalers, SYSCLK switch.
    pub fn setup(&self) -> Result<(), RccError> {
        self.validate_speeds()?;

        let rcc = unsafe { &(*RCC::ptr()) };
        let flash = unsafe { &(*FLASH::ptr()) };
        let pwr = unsafe { &(*PWR::ptr()) };

        // 1. Power interface clock on; voltage scale 1 is required for speeds above 144Mhz.
        // The scale write must happen while the PLL is off.
        rcc.apb1enr.modify(|_, w| w.pwren().set_bit());
        // A write to an RCC enable register may not be visible to the next peripheral
        // access without a barrier. (Chip errata; a dummy read works as well.)
        dsb();
        pwr.cr.modify(|_, w| unsafe { w.vos().bits(0b11) });

        // 2. Adjust flash wait states according to the HCLK frequency, before raising the clock.
        // These thresholds assume a 2.7-3.6V supply.
        let hclk = self.hclk();
        flash.acr.modify(|_, w| {
            if hclk <= 30_000_000 {
                w.latency().bits(WaitState::W0 as u8)
            } else if hclk <= 60_000_000 {
                w.latency().bits(WaitState::W1 as u8)
            } else if hclk <= 90_000_000 {
                w.latency().bits(WaitState::W2 as u8)
            } else if hclk <= 120_000_000 {
                w.latency().bits(WaitState::W3 as u8)
            } else if hclk <= 150_000_000 {
                w.latency().bits(WaitState::W4 as u8)
            } else {
                w.latency().bits(WaitState::W5 as u8)
            }
        });

        // 3. Enable oscillators, and wait until ready. Bypass is programmed before the
        // HSE is switched on, since it can't change while the oscillator runs.
        match self.input_src {
            InputSrc::Hse(_) => {
                rcc.cr.modify(|_, w| w.hsebyp().bit(self.hse_bypass));
                rcc.cr.modify(|_, w| w.hseon().set_bit());
                while rcc.cr.read().hserdy().is_not_ready() {}
            }
            InputSrc::Hsi => {
                rcc.cr.modify(|_, w| w.hsion().set_bit());
                while rcc.cr.read().hsirdy().is_not_ready() {}
            }
            InputSrc::Pll(pll_src) => match pll_src {
                PllSrc::Hse(_) => {
                    rcc.cr.modify(|_, w| w.hsebyp().bit(self.hse_bypass));
                    rcc.cr.modify(|_, w| w.hseon().set_bit());
                    while rcc.cr.read().hserdy().is_not_ready() {}
                }
                PllSrc::Hsi => {
                    rcc.cr.modify(|_, w| w.hsion().set_bit());
                    while rcc.cr.read().hsirdy().is_not_ready() {}
                }
            },
        }

        if let InputSrc::Pll(pll_src) = self.input_src {
            // 4. Turn off the PLL: the dividers can only be written while it's stopped.
            rcc.cr.modify(|_, w| w.pllon().off());
            while rcc.cr.read().pllrdy().is_ready() {}

            rcc.pllcfgr.modify(|_, w| unsafe {
                w.pllsrc().bit(pll_src.bits() != 0);
                w.plln().bits(self.plln);
                w.pllm().bits(self.pllm);
                w.pllq().bits(self.pllq as u8);
                w.pllp().bits(self.pllp as u8)
            });

            // 5. Turn the PLL back on, and wait for it to lock.
            rcc.cr.modify(|_, w| w.pllon().on());
            while rcc.cr.read().pllrdy().is_not_ready() {}
        }

        // 6. Over-drive mode is required to reach 180Mhz on AHB. RM sequence: ODEN, wait
        // ODRDY, then switch the voltage regulator output with ODSWEN, wait ODSWRDY.
        if hclk > 168_000_000 {
            pwr.cr.modify(|_, w| w.oden().set_bit());
            while pwr.csr.read().odrdy().bit_is_clear() {}
            pwr.cr.modify(|_, w| w.odswen().set_bit());
            while pwr.csr.read().odswrdy().bit_is_clear() {}
        }

        // 7. Program the prescalers and switch the system clock source.
        rcc.cfgr.modify(|_, w| unsafe {
            w.sw().bits(self.input_src.bits());
            w.hpre().bits(self.hclk_prescaler as u8);
            w.ppre2().bits(self.apb2_prescaler as u8); // HCLK division for APB2.
            w.ppre1().bits(self.apb1_prescaler as u8) // HCLK division for APB1
        });
        dsb();

        // 8. Wait until the switch status reflects the requested source.
        while rcc.cfgr.read().sws().bits() != self.input_src.bits() {}

        rcc.cr.modify(|_, w| w.csson().bit(self.security_system));

        // If we're not using the default clock source as input source or for PLL, turn it off.
        match self.input_src {
            InputSrc::Hsi => (),
            InputSrc::Pll(pll_src) => match pll_src {
                PllSrc::Hsi => (),
                _ => {
                    rcc.cr.modify(|_, w| w.hsion().clear_bit());
                }
            },
            _ => {
                rcc.cr.modify(|_, w| w.hsion().clear_bit());
            }
        }

        // Enable and reset System Configuration Controller, ie for interrupts.
        rcc_en_reset!(apb2, syscfg, rcc);

        Ok(())
    }

    /// Re-select input source; used on Stop and Standby modes, where the system reverts
    /// to HSI after wake.
    pub fn reselect_input(&self) {
        let rcc = unsafe { &(*RCC::ptr()) };

        match self.input_src {
            InputSrc::Hse(_) => {
                rcc.cr.modify(|_, w| w.hseon().set_bit());
                while rcc.cr.read().hserdy().is_not_ready() {}

                rcc.cfgr
                    .modify(|_, w| unsafe { w.sw().bits(self.input_src.bits()) });
            }
            InputSrc::Pll(pll_src) => {
                if let PllSrc::Hse(_) = pll_src {
                    rcc.cr.modify(|_, w| w.hseon().set_bit());
                    while rcc.cr.read().hserdy().is_not_ready() {}
                }

                rcc.cr.modify(|_, w| w.pllon().off());
                while rcc.cr.read().pllrdy().is_ready() {}

                rcc.cr.modify(|_, w| w.pllon().on());
                while rcc.cr.read().pllrdy().is_not_ready() {}

                rcc.cfgr
                    .modify(|_, w| unsafe { w.sw().bits(self.input_src.bits()) });
            }
            InputSrc::Hsi => (), // Already reset to this.
        }
    }

    /// Output a clock on the MCO1 pin (PA8). The pin must separately be set to its
    /// alternate function 0.
    pub fn enable_mco1(&self, src: McoSrc1, prescaler: McoPrescaler) {
        let rcc = unsafe { &(*RCC::ptr()) };
        rcc.cfgr.modify(|_, w| unsafe {
            w.mco1().bits(src as u8);
            w.mco1pre().bits(prescaler as u8)
        });
    }

    /// Output a clock on the MCO2 pin (PC9). The pin must separately be set to its
    /// alternate function 0.
    pub fn enable_mco2(&self, src: McoSrc2, prescaler: McoPrescaler) {
        let rcc = unsafe { &(*RCC::ptr()) };
        rcc.cfgr.modify(|_, w| unsafe {
            w.mco2().bits(src as u8);
            w.mco2pre().bits(prescaler as u8)
        });
    }

    /// Adjust the HSI calibration, eg to compensate for temperature drift. 5 bits;
    /// the default (centered) trim is 16.
    pub fn set_hsi_trim(&self, trim: u8) {
        let rcc = unsafe { &(*RCC::ptr()) };
        rcc.cr.modify(|_, w| w.hsitrim().bits(trim & 0b1_1111));
    }

    /// Return the RCC to its post-reset state: HSI as SYSCLK, PLL and HSE off,
    /// prescalers cleared.
    pub fn reset(&self) {
        let rcc = unsafe { &(*RCC::ptr()) };

        rcc.cr.modify(|_, w| w.hsion().set_bit());
        while rcc.cr.read().hsirdy().is_not_ready() {}

        rcc.cfgr.modify(|_, w| unsafe { w.bits(0) });
        while rcc.cfgr.read().sws().bits() != 0 {}

        rcc.cr.modify(|_, w| {
            w.pllon().clear_bit();
            w.hseon().clear_bit();
            w.csson().clear_bit()
        });
        while rcc.cr.read().pllrdy().is_ready() {}

        // PLLCFGR reset value, per the register map.
        rcc.pllcfgr.write(|w| unsafe { w.bits(0x2400_3010) });
        rcc.cr.modify(|_, w| w.hsebyp().clear_bit());
    }

    /// Calculate the sysclock frequency, in Hz.
    pub fn sysclk(&self) -> u32 {
        match self.input_src {
            InputSrc::Hsi => 16_000_000,
            InputSrc::Hse(freq) => freq,
            InputSrc::Pll(pll_src) => {
                let input_freq = match pll_src {
                    PllSrc::Hsi => 16_000_000,
                    PllSrc::Hse(freq) => freq,
                };
                input_freq / self.pllm as u32 * self.plln as u32 / self.pllp.value() as u32
            }
        }
    }

    /// Check if the PLL is enabled. This is useful if checking whether to re-enable the PLL
    /// after exiting Stop or Standby modes, eg so you don't re-enable if it was already re-enabled
    /// in a different context.
    pub fn pll_is_enabled(&self) -> bool {
        let rcc = unsafe { &(*RCC::ptr()) };
        rcc.cr.read().pllon().bit_is_set()
    }

    pub fn hclk(&self) -> u32 {
        self.sysclk() / self.hclk_prescaler.value() as u32
    }

    pub fn systick(&self) -> u32 {
        self.hclk()
    }

    /// The 48Mhz domain, fed from the PLL's Q divider. 0 when the PLL is not the
    /// system clock source.
    pub fn usb(&self) -> u32 {
        match self.input_src {
            InputSrc::Pll(pll_src) => {
                let input_freq = match pll_src {
                    PllSrc::Hsi => 16_000_000,
                    PllSrc::Hse(freq) => freq,
                };
                input_freq / self.pllm as u32 * self.plln as u32 / self.pllq.value() as u32
            }
            _ => 0,
        }
    }

    pub fn apb1(&self) -> u32 {
        self.hclk() / self.apb1_prescaler.value() as u32
    }

    pub fn apb1_timer(&self) -> u32 {
        if let ApbPrescaler::Div1 = self.apb1_prescaler {
            self.apb1()
        } else {
            self.apb1() * 2
        }
    }

    pub fn apb2(&self) -> u32 {
        self.hclk() / self.apb2_prescaler.value() as u32
    }

    pub fn apb2_timer(&self) -> u32 {
        if let ApbPrescaler::Div1 = self.apb2_prescaler {
            self.apb2()
        } else {
            self.apb2() * 2
        }
    }

    pub fn validate_speeds(&self) -> Result<(), RccError> {
        // Documented limits for this chip: 180Mhz SYSCLK/AHB, 45Mhz APB1, 90Mhz APB2.
        let max_sysclk = 180_000_000;
        let max_apb1 = 45_000_000;
        let max_apb2 = 90_000_000;

        if self.plln < 50 || self.plln > 432 || self.pllm < 2 || self.pllm > 63 {
            return Err(RccError::Speed);
        }

        if let InputSrc::Pll(pll_src) = self.input_src {
            let input_freq = match pll_src {
                PllSrc::Hsi => 16_000_000,
                PllSrc::Hse(freq) => freq,
            };
            // VCO input must sit between 1 and 2Mhz; output between 100 and 432Mhz.
            let vco_in = input_freq / self.pllm as u32;
            if !(1_000_000..=2_000_000).contains(&vco_in) {
                return Err(RccError::Speed);
            }
            let vco_out = vco_in * self.plln as u32;
            if !(100_000_000..=432_000_000).contains(&vco_out) {
                return Err(RccError::Speed);
            }
        }

        if self.sysclk() > max_sysclk {
            return Err(RccError::Speed);
        }

        if self.hclk() > max_sysclk {
            return Err(RccError::Speed);
        }

        if self.apb1() > max_apb1 {
            return Err(RccError::Speed);
        }

        if self.apb2() > max_apb2 {
            return Err(RccError::Speed);
        }

        Ok(())
    }
}

impl Default for Clocks {
    /// The board's boot profile: 8Mhz oscillator on a bypassed HSE, multiplied to a
    /// 180Mhz system clock. 45Mhz APB1, 90Mhz APB2. Not valid for USB.
    fn default() -> Self {
        Self {
            input_src: InputSrc::Pll(PllSrc::Hse(8_000_000)),
            pllm: 4,
            plln: 180,
            pllp: Pllp::Div2,
            pllq: Pllq::Div8, // Note that this produces an invalid USB speed.
            hclk_prescaler: HclkPrescaler::Div1,
            apb1_prescaler: ApbPrescaler::Div4,
            apb2_prescaler: ApbPrescaler::Div2,
            hse_bypass: true,
            security_system: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_speeds() {
        let clocks = Clocks::default();
        assert_eq!(clocks.sysclk(), 180_000_000);
        assert_eq!(clocks.hclk(), 180_000_000);
        assert_eq!(clocks.systick(), 180_000_000);
        assert_eq!(clocks.apb1(), 45_000_000);
        assert_eq!(clocks.apb2(), 90_000_000);
        // Timer clocks double when the bus is divided.
        assert_eq!(clocks.apb1_timer(), 90_000_000);
        assert_eq!(clocks.apb2_timer(), 180_000_000);
        assert!(clocks.validate_speeds().is_ok());
    }

    #[test]
    fn hsi_sysclk() {
        let clocks = Clocks {
            input_src: InputSrc::Hsi,
            ..Default::default()
        };
        assert_eq!(clocks.sysclk(), 16_000_000);
    }

    #[test]
    fn pll_divider_bounds() {
        let mut clocks = Clocks {
            pllm: 1, // VCO input out of range, and below the field minimum.
            ..Default::default()
        };
        assert_eq!(clocks.validate_speeds(), Err(RccError::Speed));

        clocks.pllm = 4;
        clocks.plln = 433;
        assert_eq!(clocks.validate_speeds(), Err(RccError::Speed));

        clocks.plln = 49;
        assert_eq!(clocks.validate_speeds(), Err(RccError::Speed));
    }

    #[test]
    fn apb_limits_enforced() {
        // 180Mhz on APB1 is well past its 45Mhz limit.
        let clocks = Clocks {
            apb1_prescaler: ApbPrescaler::Div1,
            ..Default::default()
        };
        assert_eq!(clocks.validate_speeds(), Err(RccError::Speed));
    }

    #[test]
    fn overclocked_sysclk_rejected() {
        let clocks = Clocks {
            plln: 200, // 8 / 4 * 200 / 2 = 200Mhz
            ..Default::default()
        };
        assert_eq!(clocks.validate_speeds(), Err(RccError::Speed));
    }

    #[test]
    fn prescaler_encodings() {
        // CFGR.HPRE / PPREx encodings from the register map.
        assert_eq!(HclkPrescaler::Div1 as u8, 0b0000);
        assert_eq!(HclkPrescaler::Div512 as u8, 0b1111);
        assert_eq!(ApbPrescaler::Div4 as u8, 0b101);
        assert_eq!(ApbPrescaler::Div16 as u8, 0b111);
        assert_eq!(Pllp::Div2.value(), 2);
        assert_eq!(Pllq::Div8 as u8, 0b1000);
    }
}
