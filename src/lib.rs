// Motion Sensor Driver - Shared Library
// Event state, interrupt monitor, device interface, and lifecycle manager

pub mod chardev;
pub mod config;
pub mod device;
pub mod hal;
pub mod irq;
pub mod lifecycle;
pub mod state;

pub use chardev::{chrdev_table, ChrdevError, ChrdevTable, DeviceClass, DeviceNode};
pub use config::{ConfigError, DriverConfig};
pub use device::{DeviceError, MotionDevice, Readiness, EVENT_MSG_LEN, GATE_MSG_LEN};
pub use hal::{Edge, EdgeHandler, Gpio, InputPin, Level, OutputPin, PinError, PinId, SimGpio};
pub use irq::InterruptMonitor;
pub use lifecycle::{Driver, InitError, LifecycleStage};
pub use state::EventState;
