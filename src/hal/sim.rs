//! Simulated GPIO backend.
//!
//! Pin levels live in shared atomics so pin handles work without taking the
//! controller lock, and tests can observe output levels directly. Edges are
//! delivered synchronously on the caller's thread, standing in for the
//! interrupt context: whatever `raise_edge` runs must obey the same
//! non-blocking contract a real handler would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::traits::{Edge, EdgeHandler, Gpio, InputPin, Level, OutputPin, PinError, PinId};

/// State shared between the controller and the pin handles it vends.
struct PinShared {
    level: AtomicBool,
    claimed: AtomicBool,
}

impl PinShared {
    fn new(level: Level) -> Arc<Self> {
        Arc::new(Self {
            level: AtomicBool::new(level == Level::High),
            claimed: AtomicBool::new(true),
        })
    }

    fn level(&self) -> Level {
        if self.level.load(Ordering::Acquire) {
            Level::High
        } else {
            Level::Low
        }
    }

    fn set_level(&self, level: Level) {
        self.level.store(level == Level::High, Ordering::Release);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}

struct PinSlot {
    shared: Arc<PinShared>,
    direction: Direction,
    handler: Option<Arc<dyn EdgeHandler>>,
}

/// Simulated GPIO controller.
pub struct SimGpio {
    pins: Mutex<HashMap<PinId, PinSlot>>,
}

impl SimGpio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pins: Mutex::new(HashMap::new()),
        })
    }

    /// Deliver a rising edge on `pin`: the level pulses high and any bound
    /// handler runs synchronously before the pulse ends.
    pub fn raise_edge(&self, pin: PinId) {
        // Clone the handler out so it runs without the controller lock held.
        let (shared, handler) = {
            let pins = self.pins.lock();
            match pins.get(&pin) {
                Some(slot) => (Arc::clone(&slot.shared), slot.handler.clone()),
                None => return,
            }
        };

        shared.set_level(Level::High);
        if let Some(handler) = handler {
            handler.on_edge();
        }
        shared.set_level(Level::Low);
    }

    /// Current level of `pin`, if it has ever been requested.
    pub fn level(&self, pin: PinId) -> Option<Level> {
        self.pins.lock().get(&pin).map(|slot| slot.shared.level())
    }

    /// Whether `pin` is currently claimed.
    pub fn is_claimed(&self, pin: PinId) -> bool {
        self.pins
            .lock()
            .get(&pin)
            .map(|slot| slot.shared.claimed.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Whether `pin` has an interrupt handler bound.
    pub fn has_handler(&self, pin: PinId) -> bool {
        self.pins
            .lock()
            .get(&pin)
            .map(|slot| slot.handler.is_some())
            .unwrap_or(false)
    }

    fn claim(&self, pin: PinId, direction: Direction, initial: Level) -> Result<Arc<PinShared>, PinError> {
        let mut pins = self.pins.lock();
        match pins.get_mut(&pin) {
            Some(slot) if slot.shared.claimed.load(Ordering::Acquire) => Err(PinError::Busy(pin)),
            Some(slot) => {
                // Re-claim of a previously released pin.
                slot.shared.set_level(initial);
                slot.shared.claimed.store(true, Ordering::Release);
                slot.direction = direction;
                slot.handler = None;
                Ok(Arc::clone(&slot.shared))
            }
            None => {
                let shared = PinShared::new(initial);
                pins.insert(
                    pin,
                    PinSlot {
                        shared: Arc::clone(&shared),
                        direction,
                        handler: None,
                    },
                );
                Ok(shared)
            }
        }
    }
}

impl Gpio for SimGpio {
    fn request_input(&self, pin: PinId) -> Result<Arc<dyn InputPin>, PinError> {
        let shared = self.claim(pin, Direction::Input, Level::Low)?;
        Ok(Arc::new(SimInputPin { pin, shared }))
    }

    fn request_output(&self, pin: PinId, initial: Level) -> Result<Arc<dyn OutputPin>, PinError> {
        let shared = self.claim(pin, Direction::Output, initial)?;
        Ok(Arc::new(SimOutputPin { pin, shared }))
    }

    fn bind_irq(
        &self,
        pin: PinId,
        _edge: Edge,
        handler: Arc<dyn EdgeHandler>,
    ) -> Result<(), PinError> {
        let mut pins = self.pins.lock();
        let slot = pins.get_mut(&pin).ok_or(PinError::NotRequested(pin))?;
        if !slot.shared.claimed.load(Ordering::Acquire) {
            return Err(PinError::NotRequested(pin));
        }
        if slot.direction != Direction::Input {
            return Err(PinError::WrongDirection {
                pin,
                expected: "input",
            });
        }
        if slot.handler.is_some() {
            return Err(PinError::HandlerBound(pin));
        }
        slot.handler = Some(handler);
        Ok(())
    }

    fn unbind_irq(&self, pin: PinId) {
        if let Some(slot) = self.pins.lock().get_mut(&pin) {
            slot.handler = None;
        }
    }

    fn release(&self, pin: PinId) {
        if let Some(slot) = self.pins.lock().get_mut(&pin) {
            slot.shared.claimed.store(false, Ordering::Release);
            slot.handler = None;
        }
    }
}

struct SimInputPin {
    pin: PinId,
    shared: Arc<PinShared>,
}

impl InputPin for SimInputPin {
    fn read(&self) -> Level {
        self.shared.level()
    }

    fn id(&self) -> PinId {
        self.pin
    }
}

struct SimOutputPin {
    pin: PinId,
    shared: Arc<PinShared>,
}

impl OutputPin for SimOutputPin {
    fn set(&self, level: Level) -> Result<(), PinError> {
        if !self.shared.claimed.load(Ordering::Acquire) {
            return Err(PinError::NotRequested(self.pin));
        }
        self.shared.set_level(level);
        Ok(())
    }

    fn id(&self) -> PinId {
        self.pin
    }
}
