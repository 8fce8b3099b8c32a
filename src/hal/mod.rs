// Hardware Abstraction Layer (HAL) for GPIO access
//
// This module provides:
// - Pin identifiers, levels, and the rising-edge policy
// - Traits for digital input/output pins and interrupt binding
// - A simulated backend for tests and hardware-less runs

pub mod sim;
pub mod traits;

// Re-export commonly used types
pub use sim::SimGpio;
pub use traits::{
    Edge, EdgeHandler, Gpio, InputPin, IrqBinding, Level, OutputPin, PinClaim, PinError, PinId,
};
