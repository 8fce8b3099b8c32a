//! GPIO pin abstractions
//!
//! Provides traits for digital input and output pins and for binding a
//! rising-edge interrupt handler, so the driver core is independent of the
//! concrete GPIO backend.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Identifier of a GPIO line on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(pub u8);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

/// Logical level of a GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Logic 0.
    Low,
    /// Logic 1.
    High,
}

/// Edge-trigger policy for interrupt binding.
///
/// The sensor fires on a low-to-high transition; no other policy is
/// supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
}

/// Errors from pin acquisition and access.
#[derive(Error, Debug)]
pub enum PinError {
    #[error("{0} is already requested by another owner")]
    Busy(PinId),

    #[error("{0} has not been requested")]
    NotRequested(PinId),

    #[error("{pin} is not configured as {expected}")]
    WrongDirection { pin: PinId, expected: &'static str },

    #[error("{0} already has an interrupt handler bound")]
    HandlerBound(PinId),
}

/// Digital input pin.
pub trait InputPin: Send + Sync {
    /// Read the current level of the pin.
    fn read(&self) -> Level;

    fn id(&self) -> PinId;
}

/// Digital output pin.
///
/// `set` is fallible: writing to a pin whose claim was released reports
/// [`PinError::NotRequested`]. Callers on the interrupt path ignore the
/// error (a failed actuation is not recoverable there).
pub trait OutputPin: Send + Sync {
    fn set(&self, level: Level) -> Result<(), PinError>;

    fn id(&self) -> PinId;
}

/// Callback invoked when a bound edge fires.
///
/// Runs in the restricted domain: implementations must not block, sleep, or
/// perform unbounded work.
pub trait EdgeHandler: Send + Sync {
    fn on_edge(&self);
}

/// A GPIO controller backend.
///
/// Pins are claimed with `request_*` and must be released with `release`
/// (the lifecycle manager wraps claims in guards). An interrupt handler may
/// be bound to a claimed input pin; `unbind_irq` detaches it.
pub trait Gpio: Send + Sync {
    /// Claim a pin as input.
    fn request_input(&self, pin: PinId) -> Result<Arc<dyn InputPin>, PinError>;

    /// Claim a pin as output, driven to `initial` immediately.
    fn request_output(&self, pin: PinId, initial: Level) -> Result<Arc<dyn OutputPin>, PinError>;

    /// Bind `handler` to edges on a claimed input pin.
    fn bind_irq(
        &self,
        pin: PinId,
        edge: Edge,
        handler: Arc<dyn EdgeHandler>,
    ) -> Result<(), PinError>;

    /// Detach the interrupt handler bound to `pin`, if any.
    fn unbind_irq(&self, pin: PinId);

    /// Release a claimed pin. Releasing an unclaimed pin is a no-op.
    fn release(&self, pin: PinId);
}

/// Guard for a bound interrupt line; detaches the handler on drop.
pub struct IrqBinding {
    gpio: Arc<dyn Gpio>,
    pin: PinId,
}

impl IrqBinding {
    pub fn new(gpio: Arc<dyn Gpio>, pin: PinId) -> Self {
        Self { gpio, pin }
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }
}

impl Drop for IrqBinding {
    fn drop(&mut self) {
        self.gpio.unbind_irq(self.pin);
    }
}

/// Guard for a claimed pin; releases the claim on drop.
pub struct PinClaim {
    gpio: Arc<dyn Gpio>,
    pin: PinId,
}

impl PinClaim {
    pub fn new(gpio: Arc<dyn Gpio>, pin: PinId) -> Self {
        Self { gpio, pin }
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }
}

impl Drop for PinClaim {
    fn drop(&mut self) {
        self.gpio.release(self.pin);
    }
}
