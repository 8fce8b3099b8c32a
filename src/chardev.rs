//! Character-device bookkeeping — major numbers, device class, device node.
//!
//! User-space rendition of the kernel's chardev surface. Major numbers come
//! from an in-process table; the device class is a runtime directory and the
//! node is a `dev` file inside it holding `"major:0"`, after the sysfs
//! `/sys/class/<name>/dev` convention. Every acquisition hands back a guard
//! that releases on drop, which is what the lifecycle manager leans on for
//! reverse-order teardown.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Dynamic major allocation walks down from here, kernel-style.
pub const DYNAMIC_MAJOR_TOP: u32 = 254;
/// Lowest major the table will hand out.
pub const DYNAMIC_MAJOR_BOTTOM: u32 = 234;

#[derive(Error, Debug)]
pub enum ChrdevError {
    #[error("device name {0:?} is already registered")]
    NameTaken(String),

    #[error("no free major numbers left")]
    MajorsExhausted,
}

struct TableInner {
    by_name: HashMap<String, u32>,
}

impl TableInner {
    /// Highest major in the dynamic range not currently handed out.
    /// Unregistering returns a major to this pool.
    fn free_major(&self) -> Option<u32> {
        (DYNAMIC_MAJOR_BOTTOM..=DYNAMIC_MAJOR_TOP)
            .rev()
            .find(|m| !self.by_name.values().any(|taken| taken == m))
    }
}

/// In-process table of registered character devices.
pub struct ChrdevTable {
    inner: Mutex<TableInner>,
}

impl ChrdevTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(TableInner {
                by_name: HashMap::new(),
            }),
        })
    }

    /// Register `name` and allocate a major number for it. The registration
    /// is released when the returned guard drops.
    pub fn register(self: &Arc<Self>, name: &str) -> Result<ChrdevRegistration, ChrdevError> {
        let mut inner = self.inner.lock();
        if inner.by_name.contains_key(name) {
            return Err(ChrdevError::NameTaken(name.to_string()));
        }
        let major = inner.free_major().ok_or(ChrdevError::MajorsExhausted)?;
        inner.by_name.insert(name.to_string(), major);
        debug!(name, major, "character device registered");
        Ok(ChrdevRegistration {
            table: Arc::clone(self),
            name: name.to_string(),
            major,
        })
    }

    /// Major number registered under `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.inner.lock().by_name.get(name).copied()
    }

    fn unregister(&self, name: &str) {
        self.inner.lock().by_name.remove(name);
        debug!(name, "character device unregistered");
    }
}

/// Guard for a registered device name + major number.
pub struct ChrdevRegistration {
    table: Arc<ChrdevTable>,
    name: String,
    major: u32,
}

impl ChrdevRegistration {
    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ChrdevRegistration {
    fn drop(&mut self) {
        self.table.unregister(&self.name);
    }
}

// Global table used by the daemon; tests construct their own.
static TABLE: OnceLock<Arc<ChrdevTable>> = OnceLock::new();

/// The process-wide character device table.
pub fn chrdev_table() -> Arc<ChrdevTable> {
    Arc::clone(TABLE.get_or_init(ChrdevTable::new))
}

/// Device class: a named directory under the run dir. Removed on drop.
pub struct DeviceClass {
    dir: PathBuf,
}

impl DeviceClass {
    /// Create the class directory `<run_dir>/<name>`. Fails if a class of
    /// the same name already exists.
    pub fn create(run_dir: &Path, name: &str) -> io::Result<Self> {
        fs::create_dir_all(run_dir)?;
        let dir = run_dir.join(name);
        fs::create_dir(&dir)?;
        debug!(path = %dir.display(), "device class created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for DeviceClass {
    fn drop(&mut self) {
        // Leftover entries mean a node guard was leaked; surface nothing,
        // the node is responsible for its own file.
        let _ = fs::remove_dir(&self.dir);
        debug!(path = %self.dir.display(), "device class destroyed");
    }
}

/// Device node: the `dev` file inside the class directory, holding the
/// `major:minor` pair. Removed on drop.
pub struct DeviceNode {
    path: PathBuf,
}

impl DeviceNode {
    pub fn create(class: &DeviceClass, major: u32) -> io::Result<Self> {
        let path = class.path().join("dev");
        fs::write(&path, format!("{major}:0\n"))?;
        debug!(path = %path.display(), "device node created");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl Drop for DeviceNode {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        debug!(path = %self.path.display(), "device node destroyed");
    }
}
