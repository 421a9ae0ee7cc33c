//! Time adapter: blocking delays and monotonic uptime.
//!
//! - **`target_os = "espidf"`**: FreeRTOS task delays (the calling task
//!   yields) and `esp_timer_get_time()`.
//! - **`not(target_os = "espidf")`**: `std::thread::sleep` and
//!   `std::time::Instant` for host-side simulation.

use embedded_hal::delay::DelayNs;

/// Task delay usable wherever the domain takes a [`DelayNs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskDelay;

impl DelayNs for TaskDelay {
    #[cfg(target_os = "espidf")]
    fn delay_ns(&mut self, ns: u32) {
        esp_idf_hal::delay::Ets::delay_us(ns.div_ceil(1_000));
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

/// Monotonic uptime.
pub struct Uptime {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Uptime {
    fn default() -> Self {
        Self::new()
    }
}

impl Uptime {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot.
    #[cfg(not(target_os = "espidf"))]
    pub fn us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn secs(&self) -> u64 {
        self.us() / 1_000_000
    }
}
