//! Hardware delays using the Cortex-M systick: a blocking busy-loop delay (thin
//! wrapper of `cortex_m::delay::Delay`), and a free-running millisecond tick counter
//! serviced by the `SysTick` exception.

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::{
    self,
    peripheral::{syst::SystClkSource, SYST},
};
#[cfg(feature = "embedded_hal")]
use embedded_hal::blocking::delay::{DelayMs, DelayUs};

use crate::clocks::Clocks;

/// System timer (SysTick) as a delay provider
pub struct Delay {
    cortex_m_delay: cortex_m::delay::Delay,
}

impl Delay {
    /// Configures the system timer (SysTick) as a delay provider
    pub fn new(syst: SYST, clock_cfg: &Clocks) -> Self {
        Self {
            cortex_m_delay: cortex_m::delay::Delay::new(syst, clock_cfg.systick()),
        }
    }

    /// Delay using the Cortex-M systick for a certain duration, µs. This is the core delay
    /// code all other functions, including the EH trait ones, call indirectly.
    pub fn delay_us(&mut self, us: u32) {
        self.cortex_m_delay.delay_us(us);
    }

    /// Delay using the Cortex-M systick for a certain duration, ms.
    pub fn delay_ms(&mut self, ms: u32) {
        self.delay_us(ms * 1_000);
    }
}

#[cfg(feature = "embedded_hal")]
impl DelayMs<u32> for Delay {
    fn delay_ms(&mut self, ms: u32) {
        Delay::delay_ms(self, ms);
    }
}

#[cfg(feature = "embedded_hal")]
impl DelayMs<u16> for Delay {
    fn delay_ms(&mut self, ms: u16) {
        Delay::delay_ms(self, ms as u32);
    }
}

#[cfg(feature = "embedded_hal")]
impl DelayMs<u8> for Delay {
    fn delay_ms(&mut self, ms: u8) {
        Delay::delay_ms(self, ms as u32);
    }
}

#[cfg(feature = "embedded_hal")]
impl DelayUs<u32> for Delay {
    fn delay_us(&mut self, us: u32) {
        Delay::delay_us(self, us);
    }
}

#[cfg(feature = "embedded_hal")]
impl DelayUs<u16> for Delay {
    fn delay_us(&mut self, us: u16) {
        Delay::delay_us(self, us as u32);
    }
}

#[cfg(feature = "embedded_hal")]
impl DelayUs<u8> for Delay {
    fn delay_us(&mut self, us: u8) {
        Delay::delay_us(self, us as u32);
    }
}

/// Millisecond counter, incremented from the SysTick exception. Written only by
/// the ISR; read anywhere.
static TICK_COUNT: AtomicU32 = AtomicU32::new(0);

/// Configure SysTick to fire its exception once per millisecond, feeding the tick
/// counter. The application must route its `SysTick` handler to [`tick`].
/// Mutually exclusive with [`Delay`], which reprograms the same timer.
pub fn setup_tick(syst: &mut SYST, clock_cfg: &Clocks) {
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(clock_cfg.systick() / 1_000 - 1);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Advance the tick counter. Call this, and nothing else, from the `SysTick`
/// exception handler.
pub fn tick() {
    TICK_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Milliseconds elapsed since `setup_tick`. Wraps after ~49.7 days.
pub fn ticks() -> u32 {
    TICK_COUNT.load(Ordering::Relaxed)
}

/// Block for the given number of milliseconds, polling the tick counter.
/// Correct across counter wrap-around.
pub fn wait_ms(ms: u32) {
    let start = ticks();
    while ticks().wrapping_sub(start) < ms {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_counter_increments() {
        let before = ticks();
        tick();
        tick();
        assert_eq!(ticks().wrapping_sub(before), 2);
    }

    #[test]
    fn reload_value_for_default_clock() {
        // 180Mhz core clock: 180_000 counts per ms, reload is count - 1.
        let clocks = Clocks::default();
        assert_eq!(clocks.systick() / 1_000 - 1, 179_999);
    }
}
