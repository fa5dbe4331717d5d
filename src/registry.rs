//! Tracks every external process the session launches so they can all be
//! killed when the session terminates.
//!
//! The registry owns each [`Child`]. Processes are registered under the
//! registry lock in the same step that spawns them, and a handle reaps its
//! child under that lock in the same step that removes it, so a kill never
//! reaches a pid the OS could have handed out again. Once
//! [`ProcessRegistry::terminate_all`] has run the registry is closed: later
//! spawns are refused instead of leaking a child past shutdown.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const REAP_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct Inner {
  next_id: u64,
  live: HashMap<u64, Live>,
  /// Killed by `terminate_all` but not reaped by their handles yet.
  terminated: HashMap<u64, Live>,
  closed: bool,
}

#[derive(Debug)]
struct Live {
  program: String,
  child: Child,
}

#[derive(Clone, Default)]
pub struct ProcessRegistry {
  inner: Arc<Mutex<Inner>>,
}

/// A registered child. Dropping the handle without waiting leaves the
/// process registered until `terminate_all`.
pub struct ProcessHandle {
  id: u64,
  pid: Option<u32>,
  registry: ProcessRegistry,
}

impl ProcessRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Spawn `command` detached from the terminal and register it.
  pub fn spawn(&self, program: &str, mut command: Command) -> Result<ProcessHandle> {
    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

    let mut inner = self.inner.lock();
    if inner.closed {
      return Err(Error::Process(format!("not launching {program}: session is shutting down")));
    }
    let child = command.spawn().map_err(|e| Error::spawn(program, &e))?;
    let pid = child.id();
    let id = inner.next_id;
    inner.next_id += 1;
    inner.live.insert(id, Live { program: program.to_string(), child });
    debug!(program, pid = ?pid, live = inner.live.len(), "registry: process started");
    drop(inner);

    Ok(ProcessHandle { id, pid, registry: self.clone() })
  }

  pub fn live_count(&self) -> usize {
    self.inner.lock().live.len()
  }

  /// Kill every registered process and refuse further spawns. Safe to call
  /// more than once.
  pub fn terminate_all(&self) {
    let mut inner = self.inner.lock();
    inner.closed = true;
    if inner.live.is_empty() {
      return;
    }
    info!(count = inner.live.len(), "registry: terminating external processes");
    let drained: Vec<(u64, Live)> = inner.live.drain().collect();
    for (id, mut live) in drained {
      if let Err(e) = live.child.start_kill() {
        warn!(program = %live.program, pid = ?live.child.id(), err = %e, "registry: kill failed");
      }
      inner.terminated.insert(id, live);
    }
  }

  /// Reap child `id` if it has exited, deregistering it in the same step.
  fn try_reap(&self, id: u64) -> Result<Option<ExitStatus>> {
    let mut inner = self.inner.lock();
    let inner = &mut *inner;
    let set = if inner.live.contains_key(&id) { &mut inner.live } else { &mut inner.terminated };
    let Some(live) = set.get_mut(&id) else {
      return Err(Error::Process(format!("process {id} is not registered")));
    };
    match live.child.try_wait() {
      Ok(None) => Ok(None),
      reaped => {
        set.remove(&id);
        Ok(reaped?)
      }
    }
  }
}

impl ProcessHandle {
  pub fn pid(&self) -> Option<u32> {
    self.pid
  }

  /// Wait for the process to exit and deregister it.
  pub async fn wait(self) -> Result<ExitStatus> {
    loop {
      if let Some(status) = self.registry.try_reap(self.id)? {
        return Ok(status);
      }
      tokio::time::sleep(REAP_INTERVAL).await;
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;

  fn sleeper() -> Command {
    let mut cmd = Command::new("sleep");
    cmd.arg("30");
    cmd
  }

  #[tokio::test]
  async fn finished_processes_are_deregistered() {
    let registry = ProcessRegistry::new();
    let handle = registry.spawn("true", Command::new("true")).unwrap();
    assert_eq!(registry.live_count(), 1);
    let status = handle.wait().await.unwrap();
    assert!(status.success());
    assert_eq!(registry.live_count(), 0);
  }

  #[tokio::test]
  async fn terminate_all_kills_every_live_process() {
    let registry = ProcessRegistry::new();
    let first = registry.spawn("sleep", sleeper()).unwrap();
    let second = registry.spawn("sleep", sleeper()).unwrap();
    assert_eq!(registry.live_count(), 2);

    registry.terminate_all();
    assert_eq!(registry.live_count(), 0);

    for handle in [first, second] {
      let status = tokio::time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap().unwrap();
      assert!(!status.success());
    }
    registry.terminate_all();
  }

  #[tokio::test]
  async fn spawns_after_shutdown_are_refused() {
    let registry = ProcessRegistry::new();
    registry.terminate_all();
    let err = registry.spawn("sleep", sleeper()).err().unwrap();
    assert_eq!(err.kind(), "process");
    assert_eq!(registry.live_count(), 0);
  }

  #[tokio::test]
  async fn concurrent_spawns_all_register() {
    let registry = ProcessRegistry::new();
    let tasks: Vec<_> = (0..8)
      .map(|_| {
        let registry = registry.clone();
        tokio::spawn(async move { registry.spawn("sleep", sleeper()).unwrap() })
      })
      .collect();
    let mut handles = Vec::new();
    for task in tasks {
      handles.push(task.await.unwrap());
    }
    assert_eq!(registry.live_count(), 8);

    registry.terminate_all();
    for handle in handles {
      tokio::time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap().unwrap();
    }
    assert_eq!(registry.live_count(), 0);
  }

  #[tokio::test]
  async fn missing_binary_is_a_process_error() {
    let registry = ProcessRegistry::new();
    let err = registry.spawn("ytui-no-such-binary", Command::new("ytui-no-such-binary")).err().unwrap();
    assert!(err.to_string().contains("not found"));
    assert_eq!(registry.live_count(), 0);
  }

  fn pid_exists(pid: u32) -> bool {
    std::process::Command::new("sh").arg("-c").arg(format!("kill -0 {pid}")).status().unwrap().success()
  }

  #[tokio::test]
  async fn exited_child_holds_its_pid_until_reaped() {
    let registry = ProcessRegistry::new();
    let handle = registry.spawn("true", Command::new("true")).unwrap();
    let pid = handle.pid().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Exited but unreaped: still registered and the pid is still its own.
    assert_eq!(registry.live_count(), 1);
    assert!(pid_exists(pid));
    registry.terminate_all();

    let status = tokio::time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap().unwrap();
    assert!(status.success());
    assert_eq!(registry.live_count(), 0);
  }
}
