//! Per-package deployment locks.
//!
//! A deployment holds an exclusive lock on `<ledger>/<package>/.lock` while it
//! extracts, installs and records the package, so two sessions can never install
//! the same package at the same time. The lock file names its holder so a
//! blocked session can say who is deploying.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::util::unix_secs;

const LOCK_FILENAME: &str = ".lock";

/// The session holding a package lock, stored as JSON in the lock file.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Holder {
  pid: u32,
  since: u64,
  command: String,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "package is being deployed by '{command}' (pid {pid}, since unix time {since}); \
     remove {} if that process is gone",
    lock_path.display()
  )]
  Held {
    command: String,
    pid: u32,
    since: u64,
    lock_path: PathBuf,
  },

  #[error("package is locked by another deployment; remove {} if none is running", lock_path.display())]
  HeldUnknown { lock_path: PathBuf },

  #[error("failed to open lock file {}: {source}", path.display())]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to lock {}: {source}", path.display())]
  Lock {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// An exclusive lock on one package's ledger directory, released when dropped.
pub struct PackageLock {
  _file: File,
  lock_path: PathBuf,
}

impl PackageLock {
  /// Take the lock in `dir` without blocking, creating `dir` if needed.
  pub fn acquire(dir: &Path, command: &str) -> Result<Self, LockError> {
    let lock_path = dir.join(LOCK_FILENAME);
    let open_err = |e| LockError::Open {
      path: lock_path.clone(),
      source: e,
    };

    std::fs::create_dir_all(dir).map_err(open_err)?;
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(open_err)?;

    if let Err(err) = try_lock_exclusive(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(held_error(&lock_path));
      }
      return Err(LockError::Lock {
        path: lock_path,
        source: err,
      });
    }

    let holder = Holder {
      pid: std::process::id(),
      since: unix_secs(),
      command: command.to_string(),
    };
    write_holder(&file, &holder).map_err(|e| LockError::Lock {
      path: lock_path.clone(),
      source: e,
    })?;
    debug!(lock = ?lock_path, command, "acquired package lock");

    Ok(PackageLock { _file: file, lock_path })
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_holder(file: &File, holder: &Holder) -> io::Result<()> {
  file.set_len(0)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer(&mut writer, holder).map_err(io::Error::other)?;
  writer.flush()
}

fn read_holder(lock_path: &Path) -> Option<Holder> {
  let mut contents = String::new();
  File::open(lock_path).ok()?.read_to_string(&mut contents).ok()?;
  serde_json::from_str(&contents).ok()
}

fn held_error(lock_path: &Path) -> LockError {
  match read_holder(lock_path) {
    Some(holder) => LockError::Held {
      command: holder.command,
      pid: holder.pid,
      since: holder.since,
      lock_path: lock_path.to_path_buf(),
    },
    None => LockError::HeldUnknown {
      lock_path: lock_path.to_path_buf(),
    },
  }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
