//! Thin, safe-ish wrappers over the `libc` calls the executor and signal
//! discipline need: process creation, pipes, descriptor plumbing, process
//! groups, and terminal ownership. Kept deliberately close to the raw
//! syscalls - the executor owns all the sequencing logic.

use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::{Error, ErrorKind, Result};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{FromRawFd, RawFd};
use std::ptr;

fn check_err<T: Ord + Default>(num: T) -> Result<T> {
    if num < T::default() {
        return Err(Error::last_os_error());
    }
    Ok(num)
}

pub fn pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
}

/// `fork(2)`. Returns `0` in the child, the child's pid in the parent.
///
/// # Safety
/// Only async-signal-safe code may run between this call returning in the
/// child and the eventual `execvp`/`_exit`.
pub unsafe fn fork() -> Result<u32> {
    check_err(unsafe { libc::fork() }).map(|pid| pid as u32)
}

fn os_to_cstring(s: &OsStr) -> Result<CString> {
    CString::new(s.as_bytes()).map_err(|_| Error::from(ErrorKind::InvalidInput))
}

pub fn execvp<S1: AsRef<OsStr>, S2: AsRef<OsStr>>(cmd: S1, args: &[S2]) -> Result<()> {
    let cmd_cstring = os_to_cstring(cmd.as_ref())?;
    let args_cstring: Vec<CString> = args
        .iter()
        .map(|a| os_to_cstring(a.as_ref()))
        .collect::<Result<_>>()?;
    let mut argv: Vec<*const libc::c_char> =
        args_cstring.iter().map(|a| a.as_ptr()).collect();
    argv.push(ptr::null());
    check_err(unsafe { libc::execvp(cmd_cstring.as_ptr(), argv.as_ptr()) })?;
    Ok(())
}

pub fn _exit(status: u8) -> ! {
    unsafe { libc::_exit(status as libc::c_int) }
}

pub const WNOHANG: i32 = libc::WNOHANG;
pub const WUNTRACED: i32 = libc::WUNTRACED;
pub const ECHILD: i32 = libc::ECHILD;

/// Outcome of a single `waitpid` call distinguishing exit/signal from stop.
pub enum WaitOutcome {
    Exited(u32, crate::process::ExitStatus),
    Stopped(u32),
    /// No child currently matches (relevant with `WNOHANG`).
    WouldBlock,
}

pub fn waitpid(pid: i32, flags: i32) -> Result<WaitOutcome> {
    let mut status: libc::c_int = 0;
    let ret = unsafe { libc::waitpid(pid as libc::pid_t, &mut status, flags) };
    if ret == 0 {
        return Ok(WaitOutcome::WouldBlock);
    }
    if ret < 0 {
        return Err(Error::last_os_error());
    }
    if unsafe { libc::WIFSTOPPED(status) } {
        Ok(WaitOutcome::Stopped(ret as u32))
    } else {
        Ok(WaitOutcome::Exited(
            ret as u32,
            crate::process::ExitStatus::from_raw(status),
        ))
    }
}

pub fn kill(pid: i32, signal: i32) -> Result<()> {
    check_err(unsafe { libc::kill(pid, signal) })?;
    Ok(())
}

pub fn dup2(oldfd: RawFd, newfd: RawFd) -> Result<()> {
    check_err(unsafe { libc::dup2(oldfd, newfd) })?;
    Ok(())
}

pub fn close(fd: RawFd) -> Result<()> {
    check_err(unsafe { libc::close(fd) })?;
    Ok(())
}

pub fn dup(fd: RawFd) -> Result<RawFd> {
    check_err(unsafe { libc::dup(fd) })
}

pub fn open_read(path: &std::path::Path) -> Result<File> {
    use std::fs::OpenOptions;
    OpenOptions::new().read(true).open(path)
}

pub fn open_write(path: &std::path::Path, append: bool) -> Result<File> {
    use std::fs::OpenOptions;
    OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)
}

pub fn setpgid(pid: i32, pgid: i32) -> Result<()> {
    // EACCES/ESRCH here typically mean the child already exec'd or exited;
    // both parent and child call this racily by design (spec.md §9).
    let ret = unsafe { libc::setpgid(pid, pgid) };
    if ret < 0 {
        let err = Error::last_os_error();
        if err.raw_os_error() == Some(libc::EACCES) {
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}

pub fn getpid() -> i32 {
    unsafe { libc::getpid() }
}

pub fn getpgrp() -> i32 {
    unsafe { libc::getpgrp() }
}

/// The process group id of `pid`, used to map a reaped pid back to the job
/// table entry it belongs to (the table is keyed by pgid, not pid).
pub fn getpgid(pid: i32) -> Result<i32> {
    check_err(unsafe { libc::getpgid(pid) })
}

pub fn setsid_or_pgrp() -> Result<()> {
    // Place the shell into its own process group, tolerating the case where
    // it already is one (e.g. started as a session leader).
    let pid = getpid();
    setpgid(pid, pid)
}

pub fn tcgetpgrp(fd: RawFd) -> Result<i32> {
    check_err(unsafe { libc::tcgetpgrp(fd) })
}

pub fn tcsetpgrp(fd: RawFd, pgid: i32) -> Result<()> {
    check_err(unsafe { libc::tcsetpgrp(fd, pgid) })?;
    Ok(())
}

pub fn isatty(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

/// Install `handler` for `signum` with the given `sa_flags`.
pub fn sigaction(signum: i32, handler: extern "C" fn(i32), sa_flags: libc::c_int) -> Result<()> {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handler as usize;
        sa.sa_flags = sa_flags;
        libc::sigemptyset(&mut sa.sa_mask);
        check_err(libc::sigaction(signum, &sa, ptr::null_mut()))?;
    }
    Ok(())
}

/// Ignore `signum` entirely (used for SIGTSTP in the shell process).
pub fn ignore_signal(signum: i32) -> Result<()> {
    unsafe {
        if libc::signal(signum, libc::SIG_IGN) == libc::SIG_ERR {
            return Err(Error::last_os_error());
        }
    }
    Ok(())
}

/// Block SIGCHLD for the duration of a foreground `waitpid`, so the async
/// SIGCHLD handler cannot race the executor's own reap of the same pid
/// (spec.md §9 Open Question, resolved this way rather than funneling all
/// reaping through the handler).
pub fn block_sigchld() -> Result<()> {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGCHLD);
        check_err(libc::sigprocmask(libc::SIG_BLOCK, &set, ptr::null_mut()))?;
    }
    Ok(())
}

pub fn unblock_sigchld() -> Result<()> {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGCHLD);
        check_err(libc::sigprocmask(libc::SIG_UNBLOCK, &set, ptr::null_mut()))?;
    }
    Ok(())
}

pub const SIGCHLD: i32 = libc::SIGCHLD;
pub const SIGINT: i32 = libc::SIGINT;
pub const SIGTSTP: i32 = libc::SIGTSTP;
pub const SIGCONT: i32 = libc::SIGCONT;
pub const SIGTERM: i32 = libc::SIGTERM;
pub const SA_RESTART: libc::c_int = libc::SA_RESTART;
pub const SA_NOCLDSTOP: libc::c_int = libc::SA_NOCLDSTOP;

pub const STDIN_FILENO: RawFd = libc::STDIN_FILENO;
pub const STDOUT_FILENO: RawFd = libc::STDOUT_FILENO;
