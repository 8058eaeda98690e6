//! Host-wide port/PID registry for the Projection Service daemon. A second
//! instance attempting to start observes an allocated port and exits
//! cleanly (the tie-break loser).

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::config::matrix_service_registry_dir;
use crate::error::{CoreError, CoreResult};

pub struct PortRegistry {
    dir: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub port: u16,
    pub pid: u32,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self { dir: matrix_service_registry_dir() }
    }

    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join("registry.lock")
    }

    fn port_path(&self) -> PathBuf {
        self.dir.join("matrixd.port")
    }

    fn pid_path(&self) -> PathBuf {
        self.dir.join("matrixd.pid")
    }

    /// Read the currently-registered daemon, if any, without locking.
    pub fn read(&self) -> Option<Registration> {
        let port = fs::read_to_string(self.port_path()).ok()?.trim().parse().ok()?;
        let pid = fs::read_to_string(self.pid_path()).ok()?.trim().parse().ok()?;
        Some(Registration { port, pid })
    }

    /// Atomically claim a port for this process. Returns
    /// `Err(PortAllocationLost)` if another process already holds a live
    /// registration — the caller should exit cleanly (status 0).
    pub fn claim(&self, chosen_port: u16, pid: u32) -> CoreResult<()> {
        fs::create_dir_all(&self.dir)?;
        let lock_file = OpenOptions::new().create(true).write(true).open(self.lock_path())?;
        lock_file.lock_exclusive().map_err(|_| CoreError::LockBusy { path: self.lock_path() })?;

        let result = (|| -> CoreResult<()> {
            if let Some(existing) = self.read() {
                if process_is_alive(existing.pid) {
                    return Err(CoreError::PortAllocationLost);
                }
            }
            write_atomic(&self.port_path(), chosen_port.to_string().as_bytes())?;
            write_atomic(&self.pid_path(), pid.to_string().as_bytes())?;
            Ok(())
        })();

        let _ = fs2::FileExt::unlock(&lock_file);
        result
    }

    pub fn clear(&self) -> CoreResult<()> {
        let _ = fs::remove_file(self.port_path());
        let _ = fs::remove_file(self.pid_path());
        Ok(())
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> CoreResult<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // Signal 0 performs no-op existence/permission checks.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    true
}
