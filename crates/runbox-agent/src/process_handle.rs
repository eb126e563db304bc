use std::time::Duration;

use tokio::process::Child;

/// Wait after SIGKILL before giving up on reaping the child.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited within the grace period.
    Exited(Option<i32>),
    /// Needed SIGKILL.
    Killed,
    /// Signals were sent but the outcome could not be observed.
    Unknown,
}

/// A spawned child plus the process group it leads.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pgid: Option<i32>,
}

impl ProcessHandle {
    /// `child` must have been started as a session leader (`setsid`), so its pid is the pgid.
    pub fn new(child: Child) -> Self {
        let pgid = child.id().map(|p| p as i32);
        Self { child, pgid }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn pgid(&self) -> Option<i32> {
        self.pgid
    }

    /// Point-in-time poll; reaps the child if it has exited.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Group SIGTERM, child SIGTERM, bounded wait, then SIGKILL to both.
    /// Never fails; every error along the way is logged and ignored.
    ///
    /// If the leader was already reaped before this call, its pid may belong to
    /// someone else by now, so the group only gets SIGTERM.
    pub async fn terminate(mut self, grace: Duration) -> Termination {
        let reaped_earlier = self.child.id().is_none();
        if let Some(pgid) = self.pgid {
            signal_group(pgid, Signal::Term);
        }
        if let Some(pid) = self.child.id() {
            signal_pid(pid, Signal::Term);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                // The leader is gone; make sure nothing it forked lingers in the group.
                if !reaped_earlier && let Some(pgid) = self.pgid {
                    signal_group(pgid, Signal::Kill);
                }
                Termination::Exited(status.code())
            }
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "wait on child failed during stop");
                Termination::Unknown
            }
            Err(_) => {
                if let Some(pgid) = self.pgid {
                    signal_group(pgid, Signal::Kill);
                }
                if let Err(err) = self.child.start_kill() {
                    tracing::debug!(error = %err, "kill child failed");
                }
                match tokio::time::timeout(KILL_REAP_TIMEOUT, self.child.wait()).await {
                    Ok(Ok(_)) => Termination::Killed,
                    _ => Termination::Unknown,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
impl Signal {
    fn raw(self) -> libc::c_int {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

/// Signals every process in the group. Missing groups are not an error.
#[cfg(unix)]
pub(crate) fn signal_group(pgid: i32, sig: Signal) {
    if pgid <= 0 {
        return;
    }
    let rc = unsafe { libc::kill(-pgid, sig.raw()) };
    if rc == -1 {
        tracing::debug!(pgid, ?sig, error = %std::io::Error::last_os_error(), "signal group");
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_group(_pgid: i32, _sig: Signal) {}

#[cfg(unix)]
pub(crate) fn signal_pid(pid: u32, sig: Signal) {
    let rc = unsafe { libc::kill(pid as i32, sig.raw()) };
    if rc == -1 {
        tracing::debug!(pid, ?sig, error = %std::io::Error::last_os_error(), "signal pid");
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_pid(_pid: u32, _sig: Signal) {}

/// Whether a process with this pid exists (zombies included).
#[cfg(unix)]
pub(crate) fn pid_alive(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as i32, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub(crate) fn pid_alive(_pid: u32) -> bool {
    false
}

/// Alive and not a zombie.
#[cfg(target_os = "linux")]
pub(crate) fn process_running(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    let Some(end) = stat.rfind(')') else {
        return pid_alive(pid);
    };
    let state = stat.get((end + 2)..).and_then(|rest| rest.chars().next());
    !matches!(state, Some('Z') | Some('X'))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn process_running(pid: u32) -> bool {
    pid_alive(pid)
}
