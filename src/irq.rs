//! Interrupt monitor and deferred LED actuation.
//!
//! The edge handler runs in the restricted domain and does bounded work
//! only: gate check, flag set, wake, and a non-blocking handoff to the
//! actuator task. The timed ON hold lives in the actuator task, which runs
//! in an ordinary tokio task and is free to sleep.
//!
//! The actuator writes the LED through a [`LedGate`]. Aborting the task
//! does not wait for an in-flight poll, so on a multi-thread runtime a
//! pulse write can land after the abort; the gate serializes writes against
//! [`LedGate::halt`], which discards any stragglers and leaves the pin low.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::hal::{EdgeHandler, Level, OutputPin};
use crate::state::EventState;

/// Rising-edge handler for the sensor pin.
///
/// Fire-and-forget: nothing on this path returns an error. Edges arriving
/// while the liveness gate is closed are dropped without any visible effect.
pub struct InterruptMonitor {
    state: Arc<EventState>,
    pulse_tx: mpsc::UnboundedSender<()>,
}

impl InterruptMonitor {
    pub fn new(state: Arc<EventState>, pulse_tx: mpsc::UnboundedSender<()>) -> Self {
        Self { state, pulse_tx }
    }
}

impl EdgeHandler for InterruptMonitor {
    fn on_edge(&self) {
        if !self.state.consumer_live() {
            trace!("edge dropped: no active consumer");
            return;
        }

        self.state.record_detection();
        // Unbounded send never blocks; a closed channel means the actuator
        // is gone and the pulse is simply lost.
        let _ = self.pulse_tx.send(());
        info!("Motion detected");
    }
}

/// Serializes actuator writes to the LED against teardown.
///
/// Once halted the gate stops forwarding writes, so a pulse the aborted
/// actuator still had in flight cannot re-light the LED after the final
/// forced low.
pub struct LedGate {
    led: Arc<dyn OutputPin>,
    halted: Mutex<bool>,
}

impl LedGate {
    pub fn new(led: Arc<dyn OutputPin>) -> Arc<Self> {
        Arc::new(Self {
            led,
            halted: Mutex::new(false),
        })
    }

    fn drive(&self, level: Level) {
        let halted = self.halted.lock();
        if *halted {
            return;
        }
        if let Err(e) = self.led.set(level) {
            warn!("failed to drive LED {level:?}: {e}");
        }
    }

    /// Stop forwarding pulse writes and force the LED low. Called during
    /// teardown, after the actuator task has been told to stop.
    pub fn halt(&self) {
        let mut halted = self.halted.lock();
        *halted = true;
        if let Err(e) = self.led.set(Level::Low) {
            warn!("failed to force LED off during teardown: {e}");
        }
    }
}

/// Handle to the spawned actuator task; aborts the task on drop.
pub struct ActuatorHandle {
    task: JoinHandle<()>,
}

impl Drop for ActuatorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the actuator task: each pulse request drives the LED high, holds
/// it for `hold`, then drives it low again. Pin write failures are logged
/// and ignored.
pub fn spawn_actuator(
    gate: Arc<LedGate>,
    hold: Duration,
) -> (mpsc::UnboundedSender<()>, ActuatorHandle) {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let task = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            gate.drive(Level::High);
            tokio::time::sleep(hold).await;
            gate.drive(Level::Low);
            debug!("LED pulse complete");
        }
    });
    (tx, ActuatorHandle { task })
}
