//! Exit status decoding, shared by the executor and the job table.

use std::fmt;

/// How a process finished, decoded from a `waitpid` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
}

impl ExitStatus {
    pub(crate) fn from_raw(raw: libc::c_int) -> ExitStatus {
        unsafe {
            if libc::WIFSIGNALED(raw) {
                ExitStatus::Signaled(libc::WTERMSIG(raw))
            } else {
                ExitStatus::Exited(libc::WEXITSTATUS(raw))
            }
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    /// The POSIX-shell convention used throughout this crate: a normal exit
    /// keeps its code, a signal death maps to 128 + signum (spec.md §4.4
    /// "Status mapping").
    pub fn shell_status(&self) -> i32 {
        match *self {
            ExitStatus::Exited(code) => code,
            ExitStatus::Signaled(sig) => 128 + sig,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exited with code {code}"),
            ExitStatus::Signaled(sig) => write!(f, "killed by signal {sig}"),
        }
    }
}
