//! Firmware slot adapter.
//!
//! Implements [`FirmwareStore`] over the inactive OTA partition.
//!
//! - **`target_os = "espidf"`**: the `esp-ota` crate for the streamed
//!   write, image validation and boot-partition switch; the partition
//!   table query goes through `esp_idf_svc::sys`.
//! - **all other targets**: an in-memory image with switchable failure
//!   points, for host-side simulation and tests.

use log::{info, warn};

use crate::app::ports::{FirmwareStore, SlotError, SlotInfo};

pub struct OtaSlotAdapter {
    open: Option<SlotInfo>,
    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
    #[cfg(target_os = "espidf")]
    completed: Option<esp_ota::CompletedOtaUpdate>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimSlot,
}

/// Simulation state: the image written so far plus injected failures.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimSlot {
    pub image: Vec<u8>,
    pub finalized: bool,
    pub boot: Option<SlotInfo>,
    pub no_slot: bool,
    pub fail_write: bool,
    pub reject_image: bool,
    pub fail_boot_set: bool,
}

impl OtaSlotAdapter {
    pub fn new() -> Self {
        Self {
            open: None,
            #[cfg(target_os = "espidf")]
            update: None,
            #[cfg(target_os = "espidf")]
            completed: None,
            #[cfg(not(target_os = "espidf"))]
            sim: SimSlot::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim(&self) -> &SimSlot {
        &self.sim
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_mut(&mut self) -> &mut SimSlot {
        &mut self.sim
    }
}

// SAFETY: the esp-ota handles hold pointers into the static partition
// table; the adapter is only ever used behind the runtime mutex.
#[cfg(target_os = "espidf")]
unsafe impl Send for OtaSlotAdapter {}

impl Default for OtaSlotAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ── ESP-IDF ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl FirmwareStore for OtaSlotAdapter {
    fn next_slot(&mut self) -> Option<SlotInfo> {
        // SAFETY: partition table lookup; the returned pointer refers to a
        // static partition descriptor.
        let part = unsafe { esp_idf_svc::sys::esp_ota_get_next_update_partition(core::ptr::null()) };
        if part.is_null() {
            return None;
        }
        let part = unsafe { &*part };
        Some(SlotInfo {
            index: (part.subtype as u32 & 0x0f) as u8,
            address: part.address,
        })
    }

    fn begin(&mut self, slot: SlotInfo) -> Result<(), SlotError> {
        self.abort();
        let update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("esp-ota begin failed: {:?}", e);
            SlotError::BeginFailed
        })?;
        self.update = Some(update);
        self.open = Some(slot);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), SlotError> {
        let update = self.update.as_mut().ok_or(SlotError::NotOpen)?;
        update.write(data).map_err(|e| {
            warn!("esp-ota write failed: {:?}", e);
            SlotError::WriteFailed
        })
    }

    fn finalize(&mut self) -> Result<(), SlotError> {
        let update = self.update.take().ok_or(SlotError::NotOpen)?;
        let completed = update.finalize().map_err(|e| {
            warn!("esp-ota finalize failed: {:?}", e);
            SlotError::FinalizeFailed
        })?;
        self.completed = Some(completed);
        Ok(())
    }

    fn set_boot_slot(&mut self, slot: SlotInfo) -> Result<(), SlotError> {
        if self.open != Some(slot) {
            return Err(SlotError::NotOpen);
        }
        let mut completed = self.completed.take().ok_or(SlotError::NotOpen)?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("esp-ota set_as_boot_partition failed: {:?}", e);
            SlotError::BootSetFailed
        })?;
        self.open = None;
        info!("ota_slot: slot {} set as boot partition", slot.index);
        Ok(())
    }

    fn abort(&mut self) {
        // esp-ota aborts the write when the handle is dropped
        if self.update.take().is_some() || self.completed.take().is_some() {
            warn!("ota_slot: write aborted");
        }
        self.open = None;
    }
}

// ── Simulation ────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl FirmwareStore for OtaSlotAdapter {
    fn next_slot(&mut self) -> Option<SlotInfo> {
        (!self.sim.no_slot).then_some(SlotInfo {
            index: 1,
            address: 0x0021_0000,
        })
    }

    fn begin(&mut self, slot: SlotInfo) -> Result<(), SlotError> {
        self.sim.image.clear();
        self.sim.finalized = false;
        self.open = Some(slot);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), SlotError> {
        if self.open.is_none() {
            return Err(SlotError::NotOpen);
        }
        if self.sim.fail_write {
            return Err(SlotError::WriteFailed);
        }
        self.sim.image.extend_from_slice(data);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SlotError> {
        if self.open.is_none() {
            return Err(SlotError::NotOpen);
        }
        if self.sim.reject_image || self.sim.image.is_empty() {
            return Err(SlotError::FinalizeFailed);
        }
        self.sim.finalized = true;
        Ok(())
    }

    fn set_boot_slot(&mut self, slot: SlotInfo) -> Result<(), SlotError> {
        if !self.sim.finalized || self.open != Some(slot) {
            return Err(SlotError::NotOpen);
        }
        if self.sim.fail_boot_set {
            return Err(SlotError::BootSetFailed);
        }
        self.sim.boot = Some(slot);
        self.open = None;
        info!("ota_slot(sim): slot {} set as boot partition", slot.index);
        Ok(())
    }

    fn abort(&mut self) {
        if self.open.take().is_some() {
            warn!("ota_slot(sim): write aborted");
        }
        self.sim.finalized = false;
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running image valid so the bootloader cancels rollback.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}
