//! End-to-end driver tests: bring the driver up on the simulated GPIO
//! backend, feed it edges, and watch the device contract from the
//! consumer's side.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use motion_driver::{
    ChrdevTable, DeviceError, Driver, DriverConfig, Edge, EdgeHandler, Gpio, InitError, InputPin,
    Level, LifecycleStage, OutputPin, PinError, PinId, Readiness, SimGpio,
};

const SENSOR: PinId = PinId(17);
const LED: PinId = PinId(18);

struct TestRig {
    gpio: Arc<SimGpio>,
    table: Arc<ChrdevTable>,
    run_dir: PathBuf,
}

impl TestRig {
    fn new(tag: &str) -> Self {
        let run_dir =
            std::env::temp_dir().join(format!("motion-itest-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&run_dir);
        Self {
            gpio: SimGpio::new(),
            table: ChrdevTable::new(),
            run_dir,
        }
    }

    fn config(&self) -> DriverConfig {
        DriverConfig {
            run_dir: self.run_dir.clone(),
            ..DriverConfig::default()
        }
    }

    fn init(&self) -> Result<Driver, InitError> {
        Driver::init(self.config(), self.gpio.clone(), self.table.clone())
    }
}

impl Drop for TestRig {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.run_dir);
    }
}

// Scenario 1: start driver; node appears, liveness gate starts closed.
#[tokio::test]
async fn startup_creates_node_with_gate_closed() {
    let rig = TestRig::new("startup");
    let driver = rig.init().unwrap();

    assert_eq!(driver.stage(), LifecycleStage::Running);
    assert!(driver.node_path().exists());
    assert_eq!(
        fs::read_to_string(driver.node_path()).unwrap(),
        "254:0\n"
    );
    assert!(!driver.state().consumer_live());
    assert_eq!(rig.gpio.level(LED), Some(Level::Low));
}

// Scenario 2: writing integer 1 opens the gate and leaves the LED off.
#[tokio::test]
async fn write_opens_gate_and_forces_led_off() {
    let rig = TestRig::new("gate-open");
    let driver = rig.init().unwrap();
    let device = driver.device();
    device.open();

    assert_eq!(device.write(&1i32.to_ne_bytes()).unwrap(), 4);
    assert!(driver.state().consumer_live());
    assert_eq!(rig.gpio.level(LED), Some(Level::Low));
}

// Scenario 3: a rising edge with the gate open sets the flag, wakes a
// blocked poller, and pulses the LED for the hold duration.
#[tokio::test(start_paused = true)]
async fn live_edge_notifies_and_pulses_led() {
    let rig = TestRig::new("live-edge");
    let driver = rig.init().unwrap();
    let device = driver.device();
    device.write(&1i32.to_ne_bytes()).unwrap();

    // Park a waiter on the channel before the edge arrives.
    let waiter = {
        let device = device.clone();
        tokio::spawn(async move { device.wait_readable().await })
    };
    tokio::task::yield_now().await;

    rig.gpio.raise_edge(SENSOR);
    assert_eq!(device.poll(), Readiness::READABLE);

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("blocked poller was not woken")
        .unwrap();

    // LED is held high, then extinguished after ~700 ms.
    tokio::task::yield_now().await;
    assert_eq!(rig.gpio.level(LED), Some(Level::High));
    tokio::time::sleep(Duration::from_millis(750)).await;
    tokio::task::yield_now().await;
    assert_eq!(rig.gpio.level(LED), Some(Level::Low));
}

// Scenario 4: read delivers '1' then '0' with no edge in between.
#[tokio::test]
async fn read_consumes_exactly_once() {
    let rig = TestRig::new("consume");
    let driver = rig.init().unwrap();
    let device = driver.device();
    device.write(&1i32.to_ne_bytes()).unwrap();

    rig.gpio.raise_edge(SENSOR);

    let mut buf = [0u8; 8];
    assert_eq!(device.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"1\n");

    assert_eq!(device.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"0\n");
}

// Rapid edges between reads coalesce into one reported event.
#[tokio::test]
async fn edges_between_reads_coalesce() {
    let rig = TestRig::new("coalesce");
    let driver = rig.init().unwrap();
    let device = driver.device();
    device.write(&1i32.to_ne_bytes()).unwrap();

    for _ in 0..5 {
        rig.gpio.raise_edge(SENSOR);
    }

    let mut buf = [0u8; 2];
    device.read(&mut buf).unwrap();
    assert_eq!(&buf, b"1\n");
    device.read(&mut buf).unwrap();
    assert_eq!(&buf, b"0\n");
}

// Scenario 5: with the gate closed an edge leaves no trace at all.
#[tokio::test]
async fn suppressed_edge_is_invisible() {
    let rig = TestRig::new("suppressed");
    let driver = rig.init().unwrap();
    let device = driver.device();

    rig.gpio.raise_edge(SENSOR);

    assert_eq!(device.poll(), Readiness::empty());
    assert_eq!(rig.gpio.level(LED), Some(Level::Low));

    // No wake either: a bounded wait must time out.
    let woken = tokio::time::timeout(Duration::from_millis(50), device.wait_readable()).await;
    assert!(woken.is_err());
}

// Scenario 6: malformed writes fail without touching the gate.
#[tokio::test]
async fn malformed_write_leaves_gate() {
    let rig = TestRig::new("bad-write");
    let driver = rig.init().unwrap();
    let device = driver.device();
    device.write(&1i32.to_ne_bytes()).unwrap();

    assert!(matches!(
        device.write(&[1u8]),
        Err(DeviceError::InvalidArgument)
    ));
    assert!(driver.state().consumer_live());
}

// Rollback: failure at the very first step acquires nothing.
#[tokio::test]
async fn init_fails_cleanly_on_taken_name() {
    let rig = TestRig::new("taken-name");
    let _occupant = rig.table.register("motion_sensor").unwrap();

    let err = rig.init().unwrap_err();
    assert!(matches!(err, InitError::DeviceNumber(_)));
    assert!(!rig.gpio.is_claimed(SENSOR));
    assert!(!rig.run_dir.join("motion_sensor").exists());
}

// Rollback: class creation failure releases the device number.
#[tokio::test]
async fn init_failure_at_class_unwinds_chrdev() {
    let rig = TestRig::new("class-blocked");
    // Occupy the class path with a plain file.
    fs::create_dir_all(&rig.run_dir).unwrap();
    fs::write(rig.run_dir.join("motion_sensor"), b"in the way").unwrap();

    let err = rig.init().unwrap_err();
    assert!(matches!(err, InitError::ClassCreate(_)));
    assert!(rig.table.lookup("motion_sensor").is_none());
    assert!(!rig.gpio.is_claimed(SENSOR));
}

// Rollback: pin acquisition failure unwinds node, class, and chrdev.
#[tokio::test]
async fn init_failure_at_pins_unwinds_everything() {
    let rig = TestRig::new("pin-blocked");
    let _blocker = rig.gpio.request_input(SENSOR).unwrap();

    let err = rig.init().unwrap_err();
    assert!(matches!(err, InitError::SensorPin { .. }));
    assert!(rig.table.lookup("motion_sensor").is_none());
    assert!(!rig.run_dir.join("motion_sensor").exists());
    assert!(!rig.gpio.is_claimed(LED));
}

// Rollback: node creation failure removes the class and the device number.
// The run dir is padded so every path stays under PATH_MAX until the node's
// `dev` component is appended.
#[tokio::test]
async fn init_failure_at_node_unwinds_class_and_chrdev() {
    let base =
        std::env::temp_dir().join(format!("motion-itest-node-long-{}", std::process::id()));
    let _ = fs::remove_dir_all(&base);

    let target = 4093 - "/motion_sensor".len();
    let mut run_dir = base.clone();
    while target - run_dir.as_os_str().len() > 251 {
        run_dir = run_dir.join("x".repeat(200));
    }
    let pad = target - run_dir.as_os_str().len() - 1;
    run_dir = run_dir.join("y".repeat(pad.max(1)));

    let config = DriverConfig {
        run_dir: run_dir.clone(),
        ..DriverConfig::default()
    };
    let gpio = SimGpio::new();
    let table = ChrdevTable::new();

    let err = Driver::init(config, gpio.clone(), table.clone()).unwrap_err();
    assert!(matches!(err, InitError::NodeCreate(_)));
    assert!(!run_dir.join("motion_sensor").exists());
    assert!(table.lookup("motion_sensor").is_none());
    assert!(!gpio.is_claimed(SENSOR));

    let _ = fs::remove_dir_all(&base);
}

// Delegates to the simulated controller but refuses every interrupt bind.
struct BindRefusingGpio {
    inner: Arc<SimGpio>,
}

impl Gpio for BindRefusingGpio {
    fn request_input(&self, pin: PinId) -> Result<Arc<dyn InputPin>, PinError> {
        self.inner.request_input(pin)
    }

    fn request_output(&self, pin: PinId, initial: Level) -> Result<Arc<dyn OutputPin>, PinError> {
        self.inner.request_output(pin, initial)
    }

    fn bind_irq(
        &self,
        pin: PinId,
        _edge: Edge,
        _handler: Arc<dyn EdgeHandler>,
    ) -> Result<(), PinError> {
        Err(PinError::HandlerBound(pin))
    }

    fn unbind_irq(&self, pin: PinId) {
        self.inner.unbind_irq(pin)
    }

    fn release(&self, pin: PinId) {
        self.inner.release(pin)
    }
}

// Rollback: the last acquisition step failing unwinds pins, node, class,
// and the device number, and leaves the LED low.
#[tokio::test]
async fn init_failure_at_irq_bind_unwinds_everything() {
    let rig = TestRig::new("bind-refused");
    let gpio: Arc<dyn Gpio> = Arc::new(BindRefusingGpio {
        inner: rig.gpio.clone(),
    });

    let err = Driver::init(rig.config(), gpio, rig.table.clone()).unwrap_err();
    assert!(matches!(err, InitError::IrqBind { .. }));
    assert!(!rig.gpio.is_claimed(SENSOR));
    assert!(!rig.gpio.is_claimed(LED));
    assert_eq!(rig.gpio.level(LED), Some(Level::Low));
    assert!(!rig.run_dir.join("motion_sensor").exists());
    assert!(rig.table.lookup("motion_sensor").is_none());
}

// Teardown mid-pulse still leaves the LED off and nothing registered.
#[tokio::test(start_paused = true)]
async fn teardown_extinguishes_led_and_unwinds() {
    let rig = TestRig::new("teardown");
    let driver = rig.init().unwrap();
    let device = driver.device();
    device.write(&1i32.to_ne_bytes()).unwrap();

    rig.gpio.raise_edge(SENSOR);
    tokio::task::yield_now().await;
    assert_eq!(rig.gpio.level(LED), Some(Level::High));

    let node_path = driver.node_path().to_path_buf();
    driver.shutdown();

    assert_eq!(rig.gpio.level(LED), Some(Level::Low));
    assert!(!node_path.exists());
    assert!(rig.table.lookup("motion_sensor").is_none());
    assert!(!rig.gpio.is_claimed(SENSOR));
    assert!(!rig.gpio.is_claimed(LED));
    assert!(!rig.gpio.has_handler(SENSOR));
}

// The device handles are plain clones of shared context; read after a
// reopened handle behaves identically.
#[tokio::test]
async fn open_and_release_are_free() {
    let rig = TestRig::new("open-release");
    let driver = rig.init().unwrap();

    let first = driver.device();
    first.open();
    first.release();

    let second = driver.device();
    second.open();
    second.write(&1i32.to_ne_bytes()).unwrap();
    rig.gpio.raise_edge(SENSOR);
    let mut buf = [0u8; 2];
    second.read(&mut buf).unwrap();
    assert_eq!(&buf, b"1\n");
}
