//! Tachometer watchdog timer using ESP-IDF's esp_timer API.
//!
//! A periodic timer fires once per signal-timeout window.  The callback
//! runs in the esp_timer task (not ISR) and only calls
//! [`TachTimer::on_alarm`](super::tach::TachTimer::on_alarm) plus a
//! non-blocking queue send.
//!
//! On simulation targets nothing is started; tests drive `on_alarm`
//! directly.

use crate::context::SystemContext;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use super::hw_init::HwInitError;

#[cfg(target_os = "espidf")]
static mut TACH_WATCHDOG: esp_timer_handle_t = core::ptr::null_mut();
#[cfg(target_os = "espidf")]
static mut TACH_PERIOD_US: u64 = 1_000_000;

/// SAFETY: TACH_WATCHDOG is written once in `init_tach_watchdog()` before
/// the fan task starts; afterwards it is only read.
#[cfg(target_os = "espidf")]
unsafe fn tach_watchdog() -> esp_timer_handle_t { unsafe { TACH_WATCHDOG } }

#[cfg(target_os = "espidf")]
unsafe extern "C" fn tach_watchdog_cb(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is the `&'static SystemContext` passed at creation.
    let ctx = unsafe { &*(arg as *const SystemContext) };
    if let Some(event) = ctx.tach.on_alarm() {
        ctx.post_from_isr(event);
    }
}

/// Create the watchdog timer (stopped).
#[cfg(target_os = "espidf")]
pub fn init_tach_watchdog(ctx: &'static SystemContext, period_ms: u32) -> Result<(), HwInitError> {
    // SAFETY: TACH_WATCHDOG / TACH_PERIOD_US are written here once at boot
    // from the main task before any callback can fire.
    unsafe {
        let args = esp_timer_create_args_t {
            callback: Some(tach_watchdog_cb),
            arg: ctx as *const SystemContext as *mut core::ffi::c_void,
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: b"tach_wd\0".as_ptr() as *const _,
            skip_unhandled_events: true,
        };
        let ret = esp_timer_create(&args, &raw mut TACH_WATCHDOG);
        if ret != ESP_OK as i32 {
            return Err(HwInitError::TimerInitFailed(ret));
        }
        TACH_PERIOD_US = u64::from(period_ms) * 1_000;
    }
    info!("hw_timer: tach watchdog created ({} ms)", period_ms);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_tach_watchdog(_ctx: &'static SystemContext, period_ms: u32) -> Result<(), super::hw_init::HwInitError> {
    log::info!("hw_timer(sim): tach watchdog not started ({} ms)", period_ms);
    Ok(())
}

/// Start or stop the watchdog together with the tachometer interrupt.
#[cfg(target_os = "espidf")]
pub fn set_tach_watchdog(enabled: bool) {
    // SAFETY: tach_watchdog() contract; null-check covers a failed init.
    unsafe {
        let t = tach_watchdog();
        if t.is_null() {
            return;
        }
        // stop first: start_periodic on a running timer fails
        esp_timer_stop(t);
        if enabled {
            esp_timer_start_periodic(t, TACH_PERIOD_US);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn set_tach_watchdog(_enabled: bool) {}

/// Monotonic microseconds, truncated to `u32` like the ISR timestamps.
#[cfg(target_os = "espidf")]
pub fn now_us() -> u32 {
    // SAFETY: esp_timer_get_time is a counter read.
    (unsafe { esp_timer_get_time() }) as u32
}

#[cfg(not(target_os = "espidf"))]
pub fn now_us() -> u32 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_micros() as u32
}

/// Hand a sampled tachometer edge to the edge state machine, as the ISR
/// does on hardware.  Used by the simulation backend.
pub fn feed_tach_edge(ctx: &SystemContext, high: bool, now_us: u32) -> bool {
    match ctx.tach.on_edge(high, now_us) {
        Some(event) => ctx.post_from_isr(event),
        None => false,
    }
}
