/// Target builders and a device access that observes each pass

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wipe_ledger::io::{DeviceAccess, FileDeviceAccess, TargetHandle};
use wipe_ledger::WipeResult;

/// Write a target of `len` bytes all equal to `byte`
pub fn filled_target(dir: &TempDir, name: &str, len: usize, byte: u8) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, vec![byte; len]).unwrap();
    path
}

/// Write a target of `len` pseudo-random bytes
pub fn random_target(dir: &TempDir, name: &str, len: usize) -> PathBuf {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(len as u64).fill_bytes(&mut data);
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// File access that records the byte written at offset 0 of every pass.
///
/// Each pass rewinds to the start of the extent, so the recorded bytes are
/// the per-pass patterns in order.
#[derive(Default)]
pub struct PassRecordingAccess {
    inner: FileDeviceAccess,
    first_bytes: Arc<Mutex<Vec<u8>>>,
}

impl PassRecordingAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass_patterns(&self) -> Vec<u8> {
        self.first_bytes.lock().unwrap().clone()
    }
}

impl DeviceAccess for PassRecordingAccess {
    fn open_rw(&self, target: &Path) -> WipeResult<Box<dyn TargetHandle>> {
        let handle = self.inner.open_rw(target)?;
        Ok(Box::new(RecordingHandle {
            inner: handle,
            position: 0,
            first_bytes: Arc::clone(&self.first_bytes),
        }))
    }

    fn open_read(&self, target: &Path) -> WipeResult<Box<dyn TargetHandle>> {
        self.inner.open_read(target)
    }

    fn size(&self, target: &Path) -> WipeResult<u64> {
        self.inner.size(target)
    }

    fn exists(&self, target: &Path) -> WipeResult<bool> {
        self.inner.exists(target)
    }

    fn detach(&self, target: &Path, tag: &str) -> WipeResult<PathBuf> {
        self.inner.detach(target, tag)
    }

    fn provision(&self, target: &Path, size: u64) -> WipeResult<()> {
        self.inner.provision(target, size)
    }
}

struct RecordingHandle {
    inner: Box<dyn TargetHandle>,
    position: u64,
    first_bytes: Arc<Mutex<Vec<u8>>>,
}

impl Read for RecordingHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for RecordingHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.position == 0 && !buf.is_empty() {
            self.first_bytes.lock().unwrap().push(buf[0]);
        }
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for RecordingHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}

impl TargetHandle for RecordingHandle {
    fn size(&self) -> io::Result<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.inner.sync()
    }
}
