//! Process-tree termination.
//!
//! Services are spawned as leaders of their own process group on Unix, so a
//! single `killpg` reaches every descendant they fork. On Windows the tree is
//! walked by `taskkill /T`.
use std::io;

/// Signal strength used when terminating a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    /// Ask politely (SIGTERM).
    Graceful,
    /// Force (SIGKILL).
    Forceful,
}

/// Outcome of a signal delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No such process; it already exited.
    Gone,
}

#[cfg(unix)]
mod imp {
    use std::io;

    use nix::{
        errno::Errno,
        sys::signal::{self, Signal},
        unistd::Pid,
    };
    use tracing::{debug, warn};

    use super::{Delivery, TermSignal};

    fn nix_error_to_io(err: Errno) -> io::Error {
        io::Error::from_raw_os_error(err as i32)
    }

    fn to_signal(signal: TermSignal) -> Signal {
        match signal {
            TermSignal::Graceful => Signal::SIGTERM,
            TermSignal::Forceful => Signal::SIGKILL,
        }
    }

    /// Prepares a command so the child leads a new process group.
    pub fn configure_command(cmd: &mut std::process::Command) {
        use std::os::unix::process::CommandExt;

        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) < 0 {
                    let err = io::Error::last_os_error();
                    eprintln!("ambrosia-launcher pre_exec: setpgid(0, 0) failed: {:?}", err);
                    return Err(err);
                }
                Ok(())
            });
        }
    }

    pub fn terminate_tree(pid: u32, signal: TermSignal) -> io::Result<Delivery> {
        let target = Pid::from_raw(pid as i32);
        let sig = to_signal(signal);

        let launcher_pgid = unsafe { libc::getpgid(0) };
        let child_pgid = unsafe { libc::getpgid(target.as_raw()) };

        if child_pgid >= 0 && child_pgid != launcher_pgid {
            match signal::killpg(Pid::from_raw(child_pgid), sig) {
                Ok(()) => {
                    debug!("Sent {sig} to process group {child_pgid}");
                    return Ok(Delivery::Sent);
                }
                Err(Errno::ESRCH) => {
                    debug!("Process group {child_pgid} missing; falling back to direct signal");
                }
                Err(Errno::EPERM) => {
                    warn!(
                        "Insufficient permissions to signal process group {child_pgid}; falling back to direct signal"
                    );
                }
                Err(err) => return Err(nix_error_to_io(err)),
            }
        }

        match signal::kill(target, sig) {
            Ok(()) => Ok(Delivery::Sent),
            Err(Errno::ESRCH) => Ok(Delivery::Gone),
            Err(err) => Err(nix_error_to_io(err)),
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::{io, process::Command};

    use super::{Delivery, TermSignal};

    pub fn configure_command(_cmd: &mut Command) {}

    pub fn terminate_tree(pid: u32, signal: TermSignal) -> io::Result<Delivery> {
        let mut cmd = Command::new("taskkill");
        cmd.arg("/PID").arg(pid.to_string()).arg("/T");
        if signal == TermSignal::Forceful {
            cmd.arg("/F");
        }
        let output = cmd.output()?;
        if output.status.success() {
            Ok(Delivery::Sent)
        } else if output.status.code() == Some(128) {
            Ok(Delivery::Gone)
        } else {
            Err(io::Error::other(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

/// Configures `cmd` so its whole tree can be signalled later.
pub fn configure_command(cmd: &mut std::process::Command) {
    imp::configure_command(cmd)
}

/// Sends `signal` to the process tree rooted at `pid`.
pub fn terminate_tree(pid: u32, signal: TermSignal) -> io::Result<Delivery> {
    imp::terminate_tree(pid, signal)
}
