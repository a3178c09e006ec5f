//! Host Controller Interface engine.
//!
//! [`Hci`] frames commands onto a [`Transport`], classifies incoming bytes
//! into events and ACL data, correlates completions with the command that is
//! waiting for them, and discards frames nobody claimed within the expiry
//! window.
//!
//! Everything is synchronous. [`Hci::send_command`] is a bounded busy-poll:
//! it returns once the completion arrives or the configured deadline passes.

mod error;
pub mod frame;
pub mod opcode;
mod wait;

pub use error::HciError;
pub use frame::{AclFrame, CommandResponse, EventFrame};
pub use opcode::Opcode;
pub use wait::{poll_until, Wait};

use bt_hci::cmd::Cmd;
use bt_hci::transport::WithIndicator;
use bt_hci::WriteHci;
use embassy_time::Instant;
use heapless::{Deque, Vec};

use crate::config::HciConfig;
use crate::transport::Transport;
use frame::{
    event, ACL_HEADER_LEN, COMMAND_HEADER_LEN, EVENT_HEADER_LEN, MAX_ACL_PAYLOAD,
    MAX_COMMAND_ARGS, PACKET_ACL, PACKET_EVENT,
};

/// Staging room for one maximum-size event plus a full read chunk.
const STAGING_CAPACITY: usize = 512;

/// Controller interface over transport `T`.
///
/// `EVENTS` and `ACL` bound the number of buffered frames; when a buffer is
/// full the oldest frame is dropped to make room. Both must be non-zero.
pub struct Hci<T, const EVENTS: usize = 8, const ACL: usize = 4> {
    transport: T,
    config: HciConfig,
    staging: Deque<u8, STAGING_CAPACITY>,
    events: Vec<EventFrame, EVENTS>,
    acl: Vec<AclFrame, ACL>,
}

impl<T: Transport, const EVENTS: usize, const ACL: usize> Hci<T, EVENTS, ACL> {
    /// Wrap a transport.
    ///
    /// Zero-capacity buffers are rejected at compile time:
    ///
    /// ```compile_fail
    /// use ble_hci_spi::{Hci, HciConfig, Transport};
    ///
    /// struct Idle;
    ///
    /// impl embedded_io::ErrorType for Idle {
    ///     type Error = embedded_io::ErrorKind;
    /// }
    ///
    /// impl Transport for Idle {
    ///     fn bytes_available(&mut self) -> Result<usize, Self::Error> { Ok(0) }
    ///     fn read_bytes(&mut self, _: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
    ///     fn write_bytes(&mut self, _: &[u8]) -> Result<(), Self::Error> { Ok(()) }
    ///     fn is_ready_to_accept(&mut self, _: usize) -> Result<bool, Self::Error> { Ok(true) }
    /// }
    ///
    /// let _hci: Hci<Idle, 0, 4> = Hci::new(Idle, HciConfig::new());
    /// ```
    pub fn new(transport: T, config: HciConfig) -> Self {
        const {
            assert!(EVENTS > 0 && ACL > 0, "Hci buffers need room for at least one frame");
        }
        Self {
            transport,
            config,
            staging: Deque::new(),
            events: Vec::new(),
            acl: Vec::new(),
        }
    }

    pub fn config(&self) -> &HciConfig {
        &self.config
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give back the transport. Buffered frames are dropped.
    pub fn release(self) -> T {
        self.transport
    }

    /// Send a command without arguments.
    pub fn send(&mut self, opcode: Opcode) -> Result<CommandResponse, HciError<T::Error>> {
        self.send_command(opcode, &[])
    }

    /// Send a raw command and wait for its completion.
    ///
    /// The frame is written as soon as the transport accepts it; between
    /// refused attempts the transport is re-enabled and incoming bytes are
    /// drained so the peer can make room. Both the write and the wait for
    /// COMMAND_COMPLETE (or COMMAND_STATUS) share one deadline of
    /// [`HciConfig::command_timeout`].
    ///
    /// # Errors
    ///
    /// - [`HciError::NotReady`] if the transport never accepted the frame.
    /// - [`HciError::Timeout`] if no completion arrived in time.
    /// - [`HciError::CommandFailed`] if the controller reported a non-zero
    ///   status.
    pub fn send_command(
        &mut self,
        opcode: Opcode,
        args: &[u8],
    ) -> Result<CommandResponse, HciError<T::Error>> {
        if args.len() > MAX_COMMAND_ARGS {
            return Err(HciError::ArgumentsTooLong(args.len()));
        }
        let mut buf = [0u8; COMMAND_HEADER_LEN + MAX_COMMAND_ARGS];
        let len = frame::encode_command(opcode, args, &mut buf);
        self.transact(opcode, &buf[..len])
    }

    /// Send a typed `bt-hci` command and wait for its completion.
    ///
    /// Same contract as [`send_command`](Self::send_command); the frame is
    /// serialized by the command's own `WriteHci` implementation.
    pub fn exec<C: Cmd>(&mut self, cmd: &C) -> Result<CommandResponse, HciError<T::Error>> {
        let opcode = Opcode::of::<C>();
        let packet = WithIndicator::new(cmd);
        let len = packet.size();
        if len > COMMAND_HEADER_LEN + MAX_COMMAND_ARGS {
            return Err(HciError::ArgumentsTooLong(len - COMMAND_HEADER_LEN));
        }

        let mut buf = [0u8; COMMAND_HEADER_LEN + MAX_COMMAND_ARGS];
        let mut out = &mut buf[..];
        if packet.write_hci(&mut out).is_err() {
            return Err(HciError::ArgumentsTooLong(len - COMMAND_HEADER_LEN));
        }
        self.transact(opcode, &buf[..len])
    }

    fn transact(&mut self, opcode: Opcode, frame: &[u8]) -> Result<CommandResponse, HciError<T::Error>> {
        let deadline = Instant::now() + self.config.command_timeout;

        debug!(
            "[hci] tx cmd {} ({} arg bytes)",
            opcode,
            frame.len() - COMMAND_HEADER_LEN
        );

        let sent = poll_until(deadline, || -> Result<_, HciError<T::Error>> {
            if self.transport.is_ready_to_accept(frame.len())? {
                self.transport.write_bytes(frame)?;
                return Ok(Some(()));
            }
            self.transport.reenable()?;
            self.poll()?;
            Ok(None)
        })?;
        if sent == Wait::TimedOut {
            warn!("[hci] link never ready for cmd {}", opcode);
            return Err(HciError::NotReady);
        }

        let done = poll_until(deadline, || -> Result<_, HciError<T::Error>> {
            self.poll()?;
            Ok(self.take_completion(opcode))
        })?;
        match done {
            Wait::Matched(result) => result,
            Wait::TimedOut => {
                warn!("[hci] no completion for cmd {}", opcode);
                Err(HciError::Timeout)
            }
        }
    }

    /// Drain the transport and buffer every complete frame, then expire old
    /// frames.
    ///
    /// A frame split across reads stays staged until the rest arrives. An
    /// unknown packet type discards everything staged, since the stream can
    /// no longer be framed.
    pub fn poll(&mut self) -> Result<(), HciError<T::Error>> {
        self.fill_staging()?;
        let now = Instant::now();
        self.classify(now);
        self.expire(now);
        Ok(())
    }

    /// Remove and return the oldest buffered event matching `pred`.
    pub fn take_event(&mut self, mut pred: impl FnMut(&EventFrame) -> bool) -> Option<EventFrame> {
        let i = self.events.iter().position(|e| pred(e))?;
        Some(self.events.remove(i))
    }

    /// Remove and return the oldest buffered ACL packet.
    pub fn take_acl(&mut self) -> Option<AclFrame> {
        if self.acl.is_empty() {
            return None;
        }
        Some(self.acl.remove(0))
    }

    /// Buffered events, oldest first.
    pub fn pending_events(&self) -> &[EventFrame] {
        &self.events
    }

    /// Buffered ACL packets, oldest first.
    pub fn pending_acl(&self) -> &[AclFrame] {
        &self.acl
    }

    fn take_completion(
        &mut self,
        opcode: Opcode,
    ) -> Option<Result<CommandResponse, HciError<T::Error>>> {
        let ev = self.take_event(|e| e.completes() == Some(opcode))?;

        let status = match ev.code {
            event::COMMAND_STATUS => ev.params.first().copied().unwrap_or(0),
            _ => {
                let response = CommandResponse::from_complete(&ev.params);
                match response.status() {
                    Some(0) | None => {
                        trace!("[hci] cmd {} complete", opcode);
                        return Some(Ok(response));
                    }
                    Some(status) => status,
                }
            }
        };

        if status == 0 {
            trace!("[hci] cmd {} pending", opcode);
            return Some(Ok(CommandResponse::default()));
        }
        warn!("[hci] cmd {} failed: status 0x{:02X}", opcode, status);
        Some(Err(HciError::CommandFailed { opcode, status }))
    }

    fn fill_staging(&mut self) -> Result<(), HciError<T::Error>> {
        let available = self.transport.bytes_available()?;
        if available == 0 {
            return Ok(());
        }

        let room = self.staging.capacity() - self.staging.len();
        let want = available.min(self.config.read_chunk).min(room);
        if want == 0 {
            warn!("[hci] staging full, {} bytes left pending", available);
            return Ok(());
        }

        let mut chunk = [0u8; HciConfig::MAX_READ_CHUNK];
        let n = self.transport.read_bytes(&mut chunk[..want])?;
        for &b in &chunk[..n] {
            // Bounded by `room`.
            let _ = self.staging.push_back(b);
        }
        trace!("[hci] rx {} bytes, {} staged", n, self.staging.len());
        Ok(())
    }

    fn staged(&self, i: usize) -> u8 {
        self.staging.iter().nth(i).copied().unwrap_or(0)
    }

    fn discard(&mut self, n: usize) {
        for _ in 0..n {
            self.staging.pop_front();
        }
    }

    fn classify(&mut self, now: Instant) {
        while let Some(&kind) = self.staging.front() {
            let framed = match kind {
                PACKET_EVENT => self.frame_event(now),
                PACKET_ACL => self.frame_acl(now),
                other => {
                    warn!(
                        "[hci] unknown packet type 0x{:02X}, dropping {} staged bytes",
                        other,
                        self.staging.len()
                    );
                    self.staging.clear();
                    false
                }
            };
            if !framed {
                break;
            }
        }
    }

    /// Frame one event from staging. Returns `false` if it is incomplete.
    fn frame_event(&mut self, now: Instant) -> bool {
        if self.staging.len() < EVENT_HEADER_LEN {
            return false;
        }
        let code = self.staged(1);
        let len = self.staged(2) as usize;
        if self.staging.len() < EVENT_HEADER_LEN + len {
            return false;
        }

        self.discard(EVENT_HEADER_LEN);
        let mut params = Vec::new();
        for _ in 0..len {
            if let Some(b) = self.staging.pop_front() {
                // len <= 255 == capacity
                let _ = params.push(b);
            }
        }
        trace!("[hci] event 0x{:02X}, {} param bytes", code, len);

        if self.events.is_full() {
            let dropped = self.events.remove(0);
            warn!("[hci] event buffer full, dropping event 0x{:02X}", dropped.code);
        }
        // Room was made above; `new` rules out zero capacity.
        let _ = self.events.push(EventFrame {
            code,
            params,
            received_at: now,
        });
        true
    }

    /// Frame one ACL packet from staging. Returns `false` if it is incomplete.
    fn frame_acl(&mut self, now: Instant) -> bool {
        if self.staging.len() < ACL_HEADER_LEN {
            return false;
        }
        let handle_lo = self.staged(1);
        let handle_hi = self.staged(2);
        let len = u16::from_le_bytes([self.staged(3), self.staged(4)]) as usize;
        if len > MAX_ACL_PAYLOAD {
            warn!("[hci] ACL payload of {} bytes exceeds buffer, resyncing", len);
            self.staging.clear();
            return false;
        }
        if self.staging.len() < ACL_HEADER_LEN + len {
            return false;
        }

        self.discard(ACL_HEADER_LEN);
        let mut payload = Vec::new();
        for _ in 0..len {
            if let Some(b) = self.staging.pop_front() {
                let _ = payload.push(b);
            }
        }
        let handle = u16::from_le_bytes([handle_lo, handle_hi & 0x0F]);
        let flags = handle_hi >> 4;
        trace!("[hci] acl handle 0x{:03X}, {} bytes", handle, len);

        if self.acl.is_full() {
            self.acl.remove(0);
            warn!("[hci] ACL buffer full, dropping oldest packet");
        }
        let _ = self.acl.push(AclFrame {
            handle,
            flags,
            payload,
            received_at: now,
        });
        true
    }

    fn expire(&mut self, now: Instant) {
        let expiry = self.config.frame_expiry;
        let fresh = |at: Instant| {
            now.checked_duration_since(at)
                .map_or(true, |age| age <= expiry)
        };

        let before = self.events.len() + self.acl.len();
        self.events.retain(|e| fresh(e.received_at));
        self.acl.retain(|a| fresh(a.received_at));
        let expired = before - (self.events.len() + self.acl.len());
        if expired > 0 {
            debug!("[hci] expired {} buffered frames", expired);
        }
    }
}
