//! Update session state machine.
//!
//! ```text
//!            FW+UPD:<n> (n > 0, unlocked)
//!   Idle ──────────────────────────────────▶ Receiving(n)
//!    ▲                                        │   │
//!    │  DONE          last byte written       │   │ write / finalize /
//!    └──────────── Finalizing ◀───────────────┘   │ boot-slot error
//!                                                 ▼
//!   end() ◀────────────────────────────────── Failed (drops input)
//! ```
//!
//! Inbound chunks are staged in a fixed 512-byte ring;
//! [`UpdateSession::pump`] moves them into the firmware store.  The
//! session is not shared: [`submit`] and [`pump`] both run on whichever
//! task holds the runtime lock.  A chunk that does not fit in the ring
//! makes [`submit`] write out staged bytes inline before staging the rest.
//!
//! [`submit`]: UpdateSession::submit
//! [`pump`]: UpdateSession::pump

use core::fmt::Write as _;

use heapless::Deque;

use log::{debug, error, info, warn};

use crate::app::ports::{FirmwareStore, SlotInfo, UpdateHost, UpdateTransport};
use crate::context::SystemContext;
use crate::flags;

use super::command::{Command, Response, is_reset_line};
use super::{RING_CAPACITY, WRITE_CHUNK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Receiving { remaining: u32, slot: SlotInfo },
    Finalizing,
    /// A write failed; input is dropped until the session ends.
    Failed,
}

pub struct UpdateSession<'a> {
    ctx: &'a SystemContext,
    state: SessionState,
    ring: Deque<u8, RING_CAPACITY>,
    /// Fan, display and keys are paused for a transfer.
    host_suspended: bool,
}

impl<'a> UpdateSession<'a> {
    pub fn new(ctx: &'a SystemContext) -> Self {
        Self {
            ctx,
            state: SessionState::Idle,
            ring: Deque::new(),
            host_suspended: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_receiving(&self) -> bool {
        matches!(self.state, SessionState::Receiving { .. })
    }

    pub fn is_errored(&self) -> bool {
        self.state == SessionState::Failed
    }

    pub fn host_suspended(&self) -> bool {
        self.host_suspended
    }

    /// Bytes staged but not yet written.
    pub fn buffered(&self) -> usize {
        self.ring.len()
    }

    /// Feed one inbound chunk from the link.
    pub fn submit(
        &mut self,
        data: &[u8],
        link: &mut impl UpdateTransport,
        host: &mut impl UpdateHost,
        store: &mut impl FirmwareStore,
    ) {
        match self.state {
            SessionState::Idle => self.command(data, link, host, store),
            SessionState::Receiving { .. } if is_reset_line(data) => self.reset(link, host, store),
            SessionState::Receiving { .. } => self.stage(data, link, store),
            SessionState::Failed if is_reset_line(data) => self.reset(link, host, store),
            SessionState::Failed | SessionState::Finalizing => {}
        }
    }

    /// Write up to one chunk of staged payload.  Returns the number of
    /// bytes written; 0 when nothing is staged.
    pub fn pump(&mut self, link: &mut impl UpdateTransport, store: &mut impl FirmwareStore) -> usize {
        let SessionState::Receiving { remaining, slot } = self.state else {
            return 0;
        };
        let n = self.ring.len().min(WRITE_CHUNK).min(remaining as usize);
        if n == 0 {
            return 0;
        }

        let mut chunk = [0u8; WRITE_CHUNK];
        let staged = core::iter::from_fn(|| self.ring.pop_front()).take(n);
        for (dst, src) in chunk.iter_mut().zip(staged) {
            *dst = src;
        }
        if let Err(e) = store.write(&chunk[..n]) {
            error!("ota: write failed ({})", e);
            self.fail(link, store);
            return 0;
        }

        let remaining = remaining - n as u32;
        if remaining > 0 {
            self.state = SessionState::Receiving { remaining, slot };
            return n;
        }

        self.state = SessionState::Finalizing;
        if let Err(e) = store.finalize() {
            error!("ota: image rejected ({})", e);
            self.fail(link, store);
            return n;
        }
        if let Err(e) = store.set_boot_slot(slot) {
            error!("ota: boot slot not set ({})", e);
            self.fail(link, store);
            return n;
        }
        self.release_ring();
        self.state = SessionState::Idle;
        info!("ota: image written to slot {}", slot.index);
        link.send_response(Response::Done.as_str());
        n
    }

    /// Inbound data was lost before reaching the session.  A transfer in
    /// progress can no longer produce a valid image, so it fails.
    pub fn overrun(&mut self, link: &mut impl UpdateTransport, store: &mut impl FirmwareStore) {
        if self.is_receiving() {
            error!("ota: inbound data lost mid-transfer");
            self.fail(link, store);
        }
    }

    /// Link closed.  Drops any transfer in flight and restores normal
    /// operation if it was paused.
    pub fn end(&mut self, host: &mut impl UpdateHost, store: &mut impl FirmwareStore) {
        if matches!(self.state, SessionState::Receiving { .. } | SessionState::Finalizing) {
            warn!("ota: link closed mid-transfer");
            store.abort();
        }
        self.release_ring();
        self.state = SessionState::Idle;
        if self.host_suspended {
            self.host_suspended = false;
            host.resume();
        }
    }

    fn command(
        &mut self,
        line: &[u8],
        link: &mut impl UpdateTransport,
        host: &mut impl UpdateHost,
        store: &mut impl FirmwareStore,
    ) {
        if line.len() <= 2 {
            return;
        }
        match Command::parse(line) {
            Some(Command::Update(len)) => self.begin(len, link, host, store),
            Some(Command::Reset) => self.reset(link, host, store),
            Some(Command::FreeMemory) => {
                let free = host.free_memory();
                info!("ota: free memory {} bytes", free);
                let mut reply: heapless::String<40> = heapless::String::new();
                let _ = write!(reply, "{}\r\n", free);
                link.send_data(reply.as_bytes());
            }
            Some(Command::Version) => {
                let mut reply: heapless::String<40> = heapless::String::new();
                let _ = write!(reply, "{}\r\n", host.firmware_version());
                link.send_data(reply.as_bytes());
            }
            None => {
                warn!("ota: unknown command");
                link.send_response(Response::Error.as_str());
            }
        }
    }

    fn begin(
        &mut self,
        len: u32,
        link: &mut impl UpdateTransport,
        host: &mut impl UpdateHost,
        store: &mut impl FirmwareStore,
    ) {
        info!("ota: update request ({} bytes)", len);
        if len == 0 {
            link.send_response(Response::Error.as_str());
            return;
        }
        if self.ctx.flags.is_set(flags::RADIO_LOCK) {
            link.send_response(Response::Fail.as_str());
            return;
        }

        let suspended_here = !self.host_suspended;
        if suspended_here {
            host.suspend();
            self.host_suspended = true;
        }

        match self.open(store) {
            Some(slot) => {
                self.state = SessionState::Receiving { remaining: len, slot };
                link.send_response(Response::Ok.as_str());
            }
            None => {
                if suspended_here {
                    self.host_suspended = false;
                    host.resume();
                }
                link.send_response(Response::Error.as_str());
            }
        }
    }

    fn open(&mut self, store: &mut impl FirmwareStore) -> Option<SlotInfo> {
        let Some(slot) = store.next_slot() else {
            error!("ota: no slot to write");
            return None;
        };
        info!("ota: writing slot {} at {:#x}", slot.index, slot.address);
        if let Err(e) = store.begin(slot) {
            error!("ota: begin failed ({})", e);
            return None;
        }
        self.ring.clear();
        Some(slot)
    }

    fn stage(&mut self, mut data: &[u8], link: &mut impl UpdateTransport, store: &mut impl FirmwareStore) {
        while !data.is_empty() {
            let SessionState::Receiving { remaining, .. } = self.state else {
                return;
            };
            let wanted = (remaining as usize).saturating_sub(self.ring.len());
            if wanted == 0 {
                debug!("ota: dropped {} bytes past image end", data.len());
                return;
            }
            let space = self.ring.capacity() - self.ring.len();
            if space == 0 {
                if self.pump(link, store) == 0 {
                    return;
                }
                continue;
            }
            let take = data.len().min(space).min(wanted);
            let staged = data[..take]
                .iter()
                .take_while(|&&byte| self.ring.push_back(byte).is_ok())
                .count();
            data = &data[staged..];
        }
    }

    fn reset(
        &mut self,
        link: &mut impl UpdateTransport,
        host: &mut impl UpdateHost,
        store: &mut impl FirmwareStore,
    ) {
        info!("ota: reset requested");
        if self.is_receiving() {
            store.abort();
        }
        self.release_ring();
        self.state = SessionState::Idle;

        self.ctx.flags.set(flags::RADIO_LOCK);
        if !self.host_suspended {
            host.suspend();
        }
        // the device restarts, nothing resumes the host
        self.host_suspended = false;
        host.release_power();
        link.close();
        self.ctx.request_restart(flags::RADIO_IDLE);
    }

    fn fail(&mut self, link: &mut impl UpdateTransport, store: &mut impl FirmwareStore) {
        store.abort();
        self.release_ring();
        self.state = SessionState::Failed;
        link.send_response(Response::Fail.as_str());
    }

    fn release_ring(&mut self) {
        self.ring.clear();
    }
}
