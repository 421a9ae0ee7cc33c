//! Core-pinned thread spawning.
//!
//! Wraps `esp_pthread_set_cfg()` so that the next `std::thread` spawn
//! becomes a FreeRTOS task pinned to a CPU core with an explicit priority
//! and stack size.  The configuration applies to the next
//! `pthread_create()` from the calling thread, so the config→spawn pair
//! must not interleave with other thread creation on that thread.
//! On non-ESP targets only the stack size is honoured.

use std::io;
use std::thread::JoinHandle;

/// ESP32 cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// PRO_CPU: Bluedroid and the update writer.
    Pro = 0,
    /// APP_CPU: sampler, fan loop, keys, screen.
    App = 1,
}

/// Task priorities.  Interrupt handlers sit above all of these.
pub mod priority {
    /// Encoder sampler and fan loop.
    pub const CONTROL: u8 = 10;
    /// Hold keys and the power task.
    pub const SERVICE: u8 = 6;
    /// Screen refresh and the update writer.
    pub const BACKGROUND: u8 = 3;
}

/// Task placement and sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// Null-terminated, e.g. `"fan\0"`.
    pub name: &'static str,
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    pub fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    // SAFETY: the config struct is fully initialised by the default
    // constructor and the name points at a 'static null-terminated string.
    let ret = unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = i32::from(spec.priority);
        cfg.stack_size = (spec.stack_kb * 1024) as i32;
        cfg.thread_name = spec.name.as_ptr() as *const _;
        esp_idf_sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != esp_idf_sys::ESP_OK as i32 {
        return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
    }

    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        spec.display_name(),
        spec.core,
        spec.priority,
        spec.stack_kb
    );
    std::thread::Builder::new()
        .name(spec.display_name().into())
        .spawn(f)
}

/// Simulation fallback: no core affinity or priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    log::info!(
        "Spawning '{}' (sim, stack={}KB)",
        spec.display_name(),
        spec.stack_kb
    );
    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb * 1024)
        .spawn(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_task_runs_with_its_name() {
        let spec = TaskSpec {
            name: "probe\0",
            core: Core::App,
            priority: priority::SERVICE,
            stack_kb: 64,
        };
        let handle = spawn_on_core(spec, || {
            assert_eq!(std::thread::current().name(), Some("probe"));
        })
        .unwrap();
        handle.join().unwrap();
    }
}
