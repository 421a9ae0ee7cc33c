//! BLE GATT adapter: fan characteristic and update link.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: simulation; replies are recorded in memory.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                          | Perms              |
//! |----------------|-------------------------------|--------------------|
//! | Fan            | `7c3e0002-…-a51f06b2c4d1`     | Read+Write         |
//! | Update         | `7c3e0003-…-a51f06b2c4d1`     | Write+Notify       |
//!
//! Bluedroid callbacks run in the Bluedroid task.  They only copy data
//! into the inbox; the radio task drains it with [`take_inbound`] and
//! dispatches into the application service.  A full inbox holds the
//! callback (and so the peer) back; update data that still cannot be
//! queued is reported as [`Inbound::Overrun`] so the transfer fails
//! instead of silently missing a chunk.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use core::sync::atomic::{AtomicU8, Ordering};

use log::{error, info, warn};

use crate::app::commands::AppCommand;
use crate::app::ports::UpdateTransport;
use crate::context::SystemContext;
use crate::flags;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x7c3e0001_4d2a_4b8e_9f61_a51f06b2c4d1;
pub const CHAR_FAN: u128 = 0x7c3e0002_4d2a_4b8e_9f61_a51f06b2c4d1;
pub const CHAR_UPDATE: u128 = 0x7c3e0003_4d2a_4b8e_9f61_a51f06b2c4d1;

/// Fan characteristic record length.
pub const FAN_RECORD_LEN: usize = 8;
/// Opcode of every fan characteristic write.
pub const OP_FAN_DUTY: u8 = 0xEF;
/// Capability bits in byte 0 of the fan record.
pub const FAN_CAPS: u8 = 0b0010;
/// Largest update chunk accepted in one write (ATT MTU 517 minus header).
pub const MAX_CHUNK: usize = 512;

pub const INBOX_DEPTH: usize = 16;
/// How long a Bluedroid callback waits for inbox room.
#[cfg(target_os = "espidf")]
const CALLBACK_WAIT: Duration = Duration::from_secs(2);

// ───────────────────────────────────────────────────────────────
// Fan characteristic codec
// ───────────────────────────────────────────────────────────────

/// Read value: `[caps, 0, 0, 0, 0, 0, duty, 0]`.
pub fn encode_fan(duty: u8) -> [u8; FAN_RECORD_LEN] {
    [FAN_CAPS, 0, 0, 0, 0, 0, duty, 0]
}

/// Interpret a fan characteristic write.
///
/// `0xEF` alone restores the default duty; a full 8-byte record sets the
/// duty from byte 6.
pub fn decode_fan_write(data: &[u8]) -> Option<AppCommand> {
    let (&op, _) = data.split_first()?;
    if op != OP_FAN_DUTY {
        warn!("gatt: unknown fan opcode {:#04x}", op);
        return None;
    }
    match data.len() {
        1 => Some(AppCommand::RestoreDefaultDuty),
        FAN_RECORD_LEN => Some(AppCommand::SetDuty(i32::from(data[6]))),
        n => {
            error!("gatt: fan write of {} bytes", n);
            None
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Inbox (callback context → radio task)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Fan(heapless::Vec<u8, FAN_RECORD_LEN>),
    Update(heapless::Vec<u8, MAX_CHUNK>),
    Disconnected,
    /// Update data was lost before it reached the session.
    Overrun,
}

struct InboxState {
    queue: VecDeque<Inbound>,
    overrun: bool,
}

/// Bounded hand-off from the radio callbacks to the update task.
///
/// `Disconnected` is always accepted.  Fan and update writes wait for
/// room; a fan write that times out is dropped, an update write that
/// times out raises the overrun flag.
pub struct Inbox {
    state: Mutex<InboxState>,
    space: Condvar,
}

impl Inbox {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(InboxState {
                queue: VecDeque::new(),
                overrun: false,
            }),
            space: Condvar::new(),
        }
    }

    /// Queue `item`, waiting up to `wait` for room.  Returns `false` if it
    /// was not queued.
    pub fn push(&self, item: Inbound, wait: Duration) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = if matches!(item, Inbound::Disconnected) {
            state
        } else {
            self.space
                .wait_timeout_while(state, wait, |s| s.queue.len() >= INBOX_DEPTH)
                .unwrap_or_else(PoisonError::into_inner)
                .0
        };

        if matches!(item, Inbound::Disconnected) || state.queue.len() < INBOX_DEPTH {
            state.queue.push_back(item);
            return true;
        }
        match item {
            Inbound::Update(data) => {
                error!("gatt: inbox full, {} update bytes lost", data.len());
                state.overrun = true;
            }
            _ => warn!("gatt: inbox full, fan write dropped"),
        }
        false
    }

    /// Record update data that never made it into the queue.
    pub fn mark_overrun(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).overrun = true;
    }

    /// Next item, oldest first.  A pending overrun is reported before
    /// anything still queued.
    pub fn take(&self) -> Option<Inbound> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let item = if core::mem::take(&mut state.overrun) {
            Some(Inbound::Overrun)
        } else {
            state.queue.pop_front()
        };
        drop(state);
        self.space.notify_all();
        item
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

static INBOX: Inbox = Inbox::new();
/// Duty served to fan characteristic reads.
static FAN_DUTY: AtomicU8 = AtomicU8::new(0);

/// Copy an update write into the inbox, flagging an overrun when it does
/// not fit in one chunk.
fn push_update(data: &[u8], wait: Duration) {
    let mut buf = heapless::Vec::new();
    if buf.extend_from_slice(data).is_ok() {
        INBOX.push(Inbound::Update(buf), wait);
    } else {
        error!("gatt: update write of {} bytes exceeds {}", data.len(), MAX_CHUNK);
        INBOX.mark_overrun();
    }
}

/// Next queued write or disconnect, oldest first.
pub fn take_inbound() -> Option<Inbound> {
    INBOX.take()
}

/// Update the value served to fan characteristic reads.
pub fn publish_duty(duty: u8) {
    FAN_DUTY.store(duty, Ordering::Relaxed);
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF Bluedroid glue
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
use core::sync::atomic::AtomicU32;
#[cfg(target_os = "espidf")]
use std::sync::OnceLock;

#[cfg(target_os = "espidf")]
static GATT_CTX: OnceLock<&'static SystemContext> = OnceLock::new();
#[cfg(target_os = "espidf")]
static GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static FAN_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static UPDATE_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static CHAR_STEP: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static PEER: Mutex<[u8; 6]> = Mutex::new([0; 6]);

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(uuid);
    unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }
}

#[cfg(target_os = "espidf")]
unsafe fn start_advertising() {
    use esp_idf_svc::sys::*;
    let mut adv_params = esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x40,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    };
    unsafe {
        esp_ble_gap_start_advertising(&mut adv_params);
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    if event == esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT {
        log::info!("gatt: advertising");
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    GATTS_IF.store(gatts_if as u32, Ordering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            let svc_uuid = uuid128_to_esp(SERVICE_UUID);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: svc_uuid,
                    inst_id: 0,
                },
                is_primary: true,
            };
            unsafe {
                esp_ble_gatts_create_service(gatts_if, &mut svc_id, 8);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let svc_handle = unsafe { (*param).create.service_handle };
            SVC_HANDLE.store(u32::from(svc_handle), Ordering::Relaxed);
            CHAR_STEP.store(1, Ordering::Relaxed);
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
                add_gatt_char(
                    svc_handle,
                    CHAR_FAN,
                    ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE,
                    ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_WRITE,
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let handle = u32::from(unsafe { (*param).add_char.attr_handle });
            let svc_handle = SVC_HANDLE.load(Ordering::Relaxed) as u16;
            match CHAR_STEP.load(Ordering::Relaxed) {
                1 => {
                    FAN_HANDLE.store(handle, Ordering::Relaxed);
                    CHAR_STEP.store(2, Ordering::Relaxed);
                    unsafe {
                        add_gatt_char(
                            svc_handle,
                            CHAR_UPDATE,
                            ESP_GATT_PERM_WRITE,
                            ESP_GATT_CHAR_PROP_BIT_WRITE
                                | ESP_GATT_CHAR_PROP_BIT_WRITE_NR
                                | ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                        );
                    }
                }
                2 => {
                    UPDATE_HANDLE.store(handle, Ordering::Relaxed);
                    CHAR_STEP.store(3, Ordering::Relaxed);
                    log::info!("gatt: characteristics registered");
                }
                _ => {}
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            CONN_ID.store(u32::from(p.conn_id), Ordering::Relaxed);
            if let Ok(mut peer) = PEER.lock() {
                *peer = p.remote_bda;
            }
            if let Some(ctx) = GATT_CTX.get() {
                ctx.flags.clear(flags::RADIO_IDLE);
            }
            log::info!("gatt: connected (conn_id={})", p.conn_id);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            CONN_ID.store(0, Ordering::Relaxed);
            INBOX.push(Inbound::Disconnected, CALLBACK_WAIT);
            if let Some(ctx) = GATT_CTX.get() {
                ctx.flags.set(flags::RADIO_IDLE);
            }
            log::info!("gatt: disconnected");
            unsafe {
                start_advertising();
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_READ_EVT => {
            let p = unsafe { &(*param).read };
            if u32::from(p.handle) == FAN_HANDLE.load(Ordering::Relaxed) {
                let record = encode_fan(FAN_DUTY.load(Ordering::Relaxed));
                let mut rsp: esp_gatt_rsp_t = unsafe { core::mem::zeroed() };
                unsafe {
                    rsp.attr_value.handle = p.handle;
                    rsp.attr_value.len = FAN_RECORD_LEN as u16;
                    rsp.attr_value.value[..FAN_RECORD_LEN].copy_from_slice(&record);
                    esp_ble_gatts_send_response(
                        gatts_if,
                        p.conn_id,
                        p.trans_id,
                        esp_gatt_status_t_ESP_GATT_OK,
                        &mut rsp,
                    );
                }
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            let handle = u32::from(p.handle);
            let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };

            if handle == FAN_HANDLE.load(Ordering::Relaxed) {
                let mut buf = heapless::Vec::new();
                if buf.extend_from_slice(data).is_ok() {
                    INBOX.push(Inbound::Fan(buf), CALLBACK_WAIT);
                } else {
                    log::error!("gatt: fan write of {} bytes", data.len());
                }
            } else if handle == UPDATE_HANDLE.load(Ordering::Relaxed) {
                push_update(data, CALLBACK_WAIT);
            }
            if p.need_rsp {
                unsafe {
                    esp_ble_gatts_send_response(
                        gatts_if,
                        p.conn_id,
                        p.trans_id,
                        esp_gatt_status_t_ESP_GATT_OK,
                        core::ptr::null_mut(),
                    );
                }
            }
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// GattLink
// ───────────────────────────────────────────────────────────────

/// The update characteristic as an [`UpdateTransport`].
pub struct GattLink {
    ctx: &'static SystemContext,
    #[cfg(not(target_os = "espidf"))]
    sent: Vec<Vec<u8>>,
}

impl GattLink {
    pub fn new(ctx: &'static SystemContext) -> Self {
        Self {
            ctx,
            #[cfg(not(target_os = "espidf"))]
            sent: Vec::new(),
        }
    }

    /// Bring up the controller and Bluedroid, register the service and
    /// start advertising as `name`.
    #[cfg(target_os = "espidf")]
    pub fn start(&mut self, name: &str) -> bool {
        use esp_idf_svc::sys::*;
        let _ = GATT_CTX.set(self.ctx);
        let mut c_name = [0u8; 32];
        let len = name.len().min(31);
        c_name[..len].copy_from_slice(&name.as_bytes()[..len]);

        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            if esp_bt_controller_init(&mut bt_cfg) != ESP_OK as i32 {
                error!("gatt: bt_controller_init failed");
                return false;
            }
            if esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE) != ESP_OK as i32 {
                error!("gatt: bt_controller_enable failed");
                return false;
            }
            if esp_bluedroid_init() != ESP_OK as i32 || esp_bluedroid_enable() != ESP_OK as i32 {
                error!("gatt: bluedroid init failed");
                return false;
            }

            esp_ble_gap_register_callback(Some(gap_event_handler));
            esp_ble_gatts_register_callback(Some(gatts_event_handler));
            esp_ble_gatts_app_register(0);
            esp_ble_gap_set_device_name(c_name.as_ptr() as *const _);
            start_advertising();
        }
        info!("gatt: advertising as '{}'", name);
        true
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start(&mut self, name: &str) -> bool {
        info!("gatt(sim): advertising '{}' (service {:032x})", name, SERVICE_UUID);
        true
    }

    /// Simulation: a peer connected.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_connect(&mut self) {
        self.ctx.flags.clear(flags::RADIO_IDLE);
    }

    /// Simulation: a peer wrote the update characteristic.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_write_update(&mut self, data: &[u8]) {
        push_update(data, Duration::ZERO);
    }

    /// Simulation: everything sent to the peer so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    #[cfg(target_os = "espidf")]
    fn notify(&mut self, data: &[u8]) {
        use esp_idf_svc::sys::*;
        let handle = UPDATE_HANDLE.load(Ordering::Relaxed);
        let conn = CONN_ID.load(Ordering::Relaxed);
        if handle == 0 || self.ctx.flags.is_set(flags::RADIO_IDLE) {
            return;
        }
        unsafe {
            esp_ble_gatts_send_indicate(
                GATTS_IF.load(Ordering::Relaxed) as esp_gatt_if_t,
                conn as u16,
                handle as u16,
                data.len() as u16,
                data.as_ptr() as *mut u8,
                false,
            );
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn notify(&mut self, data: &[u8]) {
        self.sent.push(data.to_vec());
    }
}

impl UpdateTransport for GattLink {
    fn send_response(&mut self, text: &str) {
        self.notify(text.as_bytes());
    }

    fn send_data(&mut self, data: &[u8]) {
        self.notify(data);
    }

    #[cfg(target_os = "espidf")]
    fn close(&mut self) {
        if self.ctx.flags.is_set(flags::RADIO_IDLE) {
            return;
        }
        let mut peer = *PEER.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: peer address copied out of the connect event.
        unsafe {
            esp_idf_svc::sys::esp_ble_gap_disconnect(peer.as_mut_ptr());
        }
        info!("gatt: disconnecting");
    }

    #[cfg(not(target_os = "espidf"))]
    fn close(&mut self) {
        if !self.ctx.flags.is_set(flags::RADIO_IDLE) {
            self.ctx.flags.set(flags::RADIO_IDLE);
            INBOX.push(Inbound::Disconnected, Duration::ZERO);
            info!("gatt(sim): disconnected");
        }
    }
}
