//! Driver lifecycle — ordered acquisition, rollback, reverse teardown.
//!
//! Initialization walks a fixed sequence of acquisitions; each one yields a
//! guard that releases on drop. A failure mid-sequence simply returns: the
//! guards acquired so far unwind in reverse order on the way out, so the
//! caller never sees partial state. Teardown is the same unwinding applied
//! to the whole set, with the LED forced off before the pin claims release.
//!
//! Field declaration order in [`Driver`] *is* the teardown order:
//! interrupt binding, actuator task, LED-off, pin claims (LED then sensor),
//! node, class, chardev registration.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::chardev::{ChrdevError, ChrdevRegistration, ChrdevTable, DeviceClass, DeviceNode};
use crate::config::DriverConfig;
use crate::device::MotionDevice;
use crate::hal::{Edge, Gpio, IrqBinding, Level, OutputPin, PinClaim, PinError, PinId};
use crate::irq::{self, ActuatorHandle, InterruptMonitor, LedGate};
use crate::state::EventState;

/// Stages of the lifecycle state machine, in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Unregistered,
    DeviceNumberAcquired,
    ClassCreated,
    NodeCreated,
    PinsAcquired,
    InterruptBound,
    Running,
}

/// Resource acquisition failures. Fatal to startup; by the time one is
/// returned, everything acquired before the failing step has been released.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to register character device")]
    DeviceNumber(#[from] ChrdevError),

    #[error("failed to create device class")]
    ClassCreate(#[source] std::io::Error),

    #[error("failed to create device node")]
    NodeCreate(#[source] std::io::Error),

    #[error("failed to request sensor pin {pin}")]
    SensorPin {
        pin: PinId,
        #[source]
        source: PinError,
    },

    #[error("failed to request LED pin {pin}")]
    LedPin {
        pin: PinId,
        #[source]
        source: PinError,
    },

    #[error("failed to bind interrupt on {pin}")]
    IrqBind {
        pin: PinId,
        #[source]
        source: PinError,
    },
}

/// Halts the LED gate when dropped: any write the aborted actuator still
/// has in flight is discarded and the LED is forced low. Sits between the
/// actuator handle and the pin claims so teardown extinguishes the LED
/// while the pin is still claimed.
struct LedOffGuard {
    gate: Arc<LedGate>,
}

impl Drop for LedOffGuard {
    fn drop(&mut self) {
        self.gate.halt();
    }
}

/// The running driver. Dropping it tears everything down in exactly the
/// reverse of acquisition order.
pub struct Driver {
    _irq: IrqBinding,
    _actuator: ActuatorHandle,
    _led_off: LedOffGuard,
    _led_claim: PinClaim,
    _sensor_claim: PinClaim,
    node: DeviceNode,
    _class: DeviceClass,
    _chrdev: ChrdevRegistration,
    state: Arc<EventState>,
    led: Arc<dyn OutputPin>,
    name: String,
    stage: LifecycleStage,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// Bring the driver up. Must be called within a tokio runtime (the
    /// actuator task is spawned here).
    ///
    /// Acquisition order: device number, class, node, sensor pin, LED pin,
    /// interrupt binding. A failure at any step rolls back the earlier
    /// steps in reverse order and reports which step failed.
    pub fn init(
        config: DriverConfig,
        gpio: Arc<dyn Gpio>,
        table: Arc<ChrdevTable>,
    ) -> Result<Driver, InitError> {
        let name = config.device_name.clone();

        let chrdev = table.register(&name).inspect_err(|e| {
            error!("failed to register character device: {e}");
        })?;
        debug!(stage = ?LifecycleStage::DeviceNumberAcquired, major = chrdev.major(), "acquired");

        let class = DeviceClass::create(&config.run_dir, &name).map_err(|e| {
            error!("failed to create device class: {e}");
            InitError::ClassCreate(e)
        })?;
        debug!(stage = ?LifecycleStage::ClassCreated, "acquired");

        let node = DeviceNode::create(&class, chrdev.major()).map_err(|e| {
            error!("failed to create device node: {e}");
            InitError::NodeCreate(e)
        })?;
        debug!(stage = ?LifecycleStage::NodeCreated, "acquired");

        let _sensor = gpio
            .request_input(config.sensor())
            .map_err(|source| {
                error!("failed to request sensor pin: {source}");
                InitError::SensorPin {
                    pin: config.sensor(),
                    source,
                }
            })?;
        let sensor_claim = PinClaim::new(Arc::clone(&gpio), config.sensor());

        let led = gpio
            .request_output(config.led(), Level::Low)
            .map_err(|source| {
                error!("failed to request LED pin: {source}");
                InitError::LedPin {
                    pin: config.led(),
                    source,
                }
            })?;
        let led_claim = PinClaim::new(Arc::clone(&gpio), config.led());
        debug!(stage = ?LifecycleStage::PinsAcquired, "acquired");

        let state = Arc::new(EventState::new());
        let gate = LedGate::new(Arc::clone(&led));
        let (pulse_tx, actuator) = irq::spawn_actuator(Arc::clone(&gate), config.led_on_time());
        let monitor = Arc::new(InterruptMonitor::new(Arc::clone(&state), pulse_tx));

        gpio.bind_irq(config.sensor(), Edge::Rising, monitor)
            .map_err(|source| {
                error!("unable to bind interrupt: {source}");
                InitError::IrqBind {
                    pin: config.sensor(),
                    source,
                }
            })?;
        let irq = IrqBinding::new(Arc::clone(&gpio), config.sensor());
        debug!(stage = ?LifecycleStage::InterruptBound, "acquired");

        info!(device = %name, "motion sensor driver initialized");
        Ok(Driver {
            _irq: irq,
            _actuator: actuator,
            _led_off: LedOffGuard { gate },
            _led_claim: led_claim,
            _sensor_claim: sensor_claim,
            node,
            _class: class,
            _chrdev: chrdev,
            state,
            led,
            name,
            stage: LifecycleStage::Running,
        })
    }

    /// Hand out a device handle. Opening is free; handles share the driver
    /// context.
    pub fn device(&self) -> MotionDevice {
        MotionDevice::new(Arc::clone(&self.state), Arc::clone(&self.led))
    }

    /// Shared event state, mainly for observation.
    pub fn state(&self) -> &Arc<EventState> {
        &self.state
    }

    pub fn stage(&self) -> LifecycleStage {
        self.stage
    }

    pub fn node_path(&self) -> &std::path::Path {
        self.node.path()
    }

    /// Tear the driver down. Equivalent to dropping it; provided for call
    /// sites where the intent should be explicit.
    pub fn shutdown(self) {}
}

impl Drop for Driver {
    fn drop(&mut self) {
        // Guards release in field order after this runs: irq unbind,
        // actuator stop, LED off, pin claims, node, class, chardev.
        info!(device = %self.name, "motion sensor driver unloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chardev::ChrdevTable;
    use crate::hal::SimGpio;
    use std::path::PathBuf;

    fn temp_run_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("motion-lifecycle-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn test_config(tag: &str) -> DriverConfig {
        DriverConfig {
            run_dir: temp_run_dir(tag),
            ..DriverConfig::default()
        }
    }

    #[tokio::test]
    async fn test_init_reaches_running() {
        let config = test_config("running");
        let run_dir = config.run_dir.clone();
        let gpio = SimGpio::new();
        let table = ChrdevTable::new();

        let driver = Driver::init(config, gpio.clone(), table.clone()).unwrap();
        assert_eq!(driver.stage(), LifecycleStage::Running);
        assert!(driver.node_path().exists());
        assert!(table.lookup("motion_sensor").is_some());
        assert!(gpio.is_claimed(PinId(17)));
        assert!(gpio.is_claimed(PinId(18)));
        assert!(gpio.has_handler(PinId(17)));

        driver.shutdown();
        assert!(table.lookup("motion_sensor").is_none());
        assert!(!gpio.is_claimed(PinId(17)));
        assert!(!gpio.is_claimed(PinId(18)));
        assert!(!gpio.has_handler(PinId(17)));
        let _ = std::fs::remove_dir_all(run_dir);
    }

    #[tokio::test]
    async fn test_pin_conflict_rolls_back_earlier_steps() {
        let config = test_config("pin-conflict");
        let run_dir = config.run_dir.clone();
        let gpio = SimGpio::new();
        let table = ChrdevTable::new();

        // Claim the LED pin out from under the driver.
        let _blocker = gpio.request_output(PinId(18), Level::Low).unwrap();

        let err = Driver::init(config, gpio.clone(), table.clone()).unwrap_err();
        assert!(matches!(err, InitError::LedPin { .. }));

        // Everything acquired before the failing step is gone again.
        assert!(table.lookup("motion_sensor").is_none());
        assert!(!run_dir.join("motion_sensor").exists());
        assert!(!gpio.is_claimed(PinId(17)));
        let _ = std::fs::remove_dir_all(run_dir);
    }
}
