//! Access to wipe targets.
//!
//! Targets are files standing in for devices. [`DeviceAccess`] is the seam the
//! wipe engine goes through, so tests can substitute handles that fail on
//! demand or change size underneath a pass.


use crate::{WipeError, WipeResult};
use rand::RngCore;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

/// Chunk size used when filling a provisioned scratch target
const PROVISION_CHUNK: usize = 64 * 1024;

/// Suffix marker appended to a destroyed target's path
pub const DESTROYED_MARKER: &str = "DESTROYED";

/// An open target extent.
pub trait TargetHandle: Read + Write + Seek + Send {
    /// Current size of the extent in bytes
    fn size(&self) -> io::Result<u64>;

    /// Force written data to durable storage
    fn sync(&mut self) -> io::Result<()>;
}

impl TargetHandle for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Platform operations the wipe engine needs on a target.
pub trait DeviceAccess: Send + Sync {
    fn open_rw(&self, target: &Path) -> WipeResult<Box<dyn TargetHandle>>;

    fn open_read(&self, target: &Path) -> WipeResult<Box<dyn TargetHandle>>;

    fn size(&self, target: &Path) -> WipeResult<u64>;

    /// `Ok(false)` only when the target is genuinely absent; permission
    /// problems surface as errors.
    fn exists(&self, target: &Path) -> WipeResult<bool>;

    /// Move the target away from its original identity. Returns the new path.
    fn detach(&self, target: &Path, tag: &str) -> WipeResult<PathBuf>;

    /// Create a scratch target of `size` bytes filled with random data.
    fn provision(&self, target: &Path, size: u64) -> WipeResult<()>;
}

/// [`DeviceAccess`] over regular files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDeviceAccess;

impl FileDeviceAccess {
    pub fn new() -> Self {
        Self
    }

    /// Path a target is moved to when destroyed
    pub fn detached_path(target: &Path, tag: &str) -> PathBuf {
        let mut raw = target.as_os_str().to_os_string();
        raw.push(format!(".{}_{}", DESTROYED_MARKER, tag));
        PathBuf::from(raw)
    }
}

impl DeviceAccess for FileDeviceAccess {
    fn open_rw(&self, target: &Path) -> WipeResult<Box<dyn TargetHandle>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(target)
            .map_err(|e| WipeError::from_open(&e, target))?;
        Ok(Box::new(file))
    }

    fn open_read(&self, target: &Path) -> WipeResult<Box<dyn TargetHandle>> {
        let file = File::open(target).map_err(|e| WipeError::from_open(&e, target))?;
        Ok(Box::new(file))
    }

    fn size(&self, target: &Path) -> WipeResult<u64> {
        let metadata = fs::metadata(target).map_err(|e| WipeError::from_open(&e, target))?;
        Ok(metadata.len())
    }

    fn exists(&self, target: &Path) -> WipeResult<bool> {
        match fs::symlink_metadata(target) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WipeError::from_open(&e, target)),
        }
    }

    fn detach(&self, target: &Path, tag: &str) -> WipeResult<PathBuf> {
        let destination = Self::detached_path(target, tag);
        if destination.exists() {
            return Err(WipeError::TargetAccess(format!(
                "{} already exists",
                destination.display()
            )));
        }

        fs::rename(target, &destination).map_err(|e| WipeError::from_open(&e, target))?;
        Ok(destination)
    }

    fn provision(&self, target: &Path, size: u64) -> WipeResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target)
            .map_err(|e| WipeError::from_open(&e, target))?;

        let mut rng = rand::thread_rng();
        let mut chunk = vec![0u8; PROVISION_CHUNK];
        let mut remaining = size;
        while remaining > 0 {
            let len = remaining.min(PROVISION_CHUNK as u64) as usize;
            rng.fill_bytes(&mut chunk[..len]);
            file.write_all(&chunk[..len])
                .map_err(|e| WipeError::io("failed to provision scratch target", &e))?;
            remaining -= len as u64;
        }

        file.sync_all()
            .map_err(|e| WipeError::io("failed to flush scratch target", &e))?;

        tracing::info!(path = %target.display(), size, "Provisioned scratch target");
        Ok(())
    }
}
