//! Device interface — the char-device-style contract consumers program
//! against.
//!
//! Wire contract:
//!
//! | op    | input            | output / effect                            |
//! |-------|------------------|--------------------------------------------|
//! | read  | buffer >= 2      | `'1'`/`'0'` + `'\n'`; clears the flag      |
//! | write | exactly 4 bytes  | int truthiness -> liveness gate; LED off   |
//! | poll  | —                | READABLE iff an event is pending           |
//! | open / release | —       | no-op                                      |
//!
//! `read_to`/`write_from` mirror the copy-to/from-caller step against
//! arbitrary `io` sinks, so a faulting caller buffer is representable
//! ([`DeviceError::FaultyBuffer`]).

use std::io::{self, Read, Write};
use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;
use tracing::{debug, warn};

use crate::hal::{Level, OutputPin};
use crate::state::EventState;

/// Bytes produced by a successful `read`: `'1'`/`'0'` plus newline.
pub const EVENT_MSG_LEN: usize = 2;

/// Bytes consumed by a successful `write`: one machine integer.
pub const GATE_MSG_LEN: usize = std::mem::size_of::<i32>();

bitflags! {
    /// Readiness mask returned by `poll`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Readiness: u8 {
        const READABLE = 1 << 0;
    }
}

/// Operation-level failures surfaced to the consumer.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Malformed call shape (wrong buffer length). No state was mutated.
    #[error("invalid argument: wrong buffer length")]
    InvalidArgument,

    /// The caller-provided buffer could not be read or written.
    #[error("faulty caller buffer")]
    FaultyBuffer(#[source] io::Error),
}

/// Handle to the motion-sensor device.
///
/// Handles are cheap to clone; all of them observe the same driver context.
/// Open and release carry no state, so a handle is usable as soon as the
/// driver is running.
#[derive(Clone)]
pub struct MotionDevice {
    state: Arc<EventState>,
    led: Arc<dyn OutputPin>,
}

impl MotionDevice {
    pub(crate) fn new(state: Arc<EventState>, led: Arc<dyn OutputPin>) -> Self {
        Self { state, led }
    }

    /// No preconditions, no side effects.
    pub fn open(&self) {}

    /// No preconditions, no side effects.
    pub fn release(&self) {}

    /// Read the pending-event byte pair into `buf`. Clears the detection
    /// flag whether or not an event was pending.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let len = buf.len();
        let mut out: &mut [u8] = buf;
        self.read_to(&mut out, len)
    }

    /// `read` against an arbitrary sink of capacity `len`.
    ///
    /// The event is consumed before the copy is attempted: a faulting sink
    /// still clears the flag. A short buffer fails before any mutation.
    pub fn read_to(&self, out: &mut dyn Write, len: usize) -> Result<usize, DeviceError> {
        if len < EVENT_MSG_LEN {
            return Err(DeviceError::InvalidArgument);
        }

        let detected = self.state.consume();
        let msg = [if detected { b'1' } else { b'0' }, b'\n'];
        out.write_all(&msg).map_err(DeviceError::FaultyBuffer)?;
        Ok(EVENT_MSG_LEN)
    }

    /// Set the liveness gate from a 4-byte integer payload.
    pub fn write(&self, buf: &[u8]) -> Result<usize, DeviceError> {
        let len = buf.len();
        let mut src: &[u8] = buf;
        self.write_from(&mut src, len)
    }

    /// `write` against an arbitrary source claiming `len` bytes.
    ///
    /// The integer's truthiness becomes the new gate value. The LED is
    /// forced off on every successful write, whatever the value. A faulting
    /// source leaves all state untouched.
    pub fn write_from(&self, src: &mut dyn Read, len: usize) -> Result<usize, DeviceError> {
        if len != GATE_MSG_LEN {
            return Err(DeviceError::InvalidArgument);
        }

        let mut raw = [0u8; GATE_MSG_LEN];
        src.read_exact(&mut raw).map_err(DeviceError::FaultyBuffer)?;

        let live = i32::from_ne_bytes(raw) != 0;
        self.state.set_consumer_live(live);
        debug!(live, "liveness gate updated");

        // Forced off regardless of the new gate value.
        if let Err(e) = self.led.set(Level::Low) {
            warn!("failed to force LED off on write: {e}");
        }
        Ok(GATE_MSG_LEN)
    }

    /// Non-blocking readiness snapshot. Never consumes the event.
    pub fn poll(&self) -> Readiness {
        if self.state.is_detected() {
            Readiness::READABLE
        } else {
            Readiness::empty()
        }
    }

    /// Suspend until an event is pending. Pair with `tokio::time::timeout`
    /// for a bounded wait; the driver itself imposes none.
    pub async fn wait_readable(&self) {
        self.state.wait_detected().await;
    }
}
