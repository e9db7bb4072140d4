//! Signal discipline: SIGCHLD reaping, SIGINT relay, SIGTSTP suppression.
//! See spec.md §4.6 and the handler-contract notes in §5.
//!
//! Handlers are restricted to async-signal-safe operations: atomic loads
//! and stores on pre-registered static state, `waitpid`, `kill`,
//! `tcgetpgrp`. No allocation, no locks.

use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicPtr, Ordering};

use crate::job::{JobStatus, JobTable};
use crate::posix;

static SHELL_PGID: AtomicI32 = AtomicI32::new(0);
static TERMINAL_FD: AtomicI32 = AtomicI32::new(-1);
static JOB_TABLE: AtomicPtr<JobTable> = AtomicPtr::new(ptr::null_mut());

/// Install the shell's signal handlers. `job_table` must outlive the
/// process (the caller leaks it, matching the single long-lived shell
/// instance per run).
pub fn install(job_table: &'static JobTable, shell_pgid: i32, terminal_fd: i32) -> std::io::Result<()> {
    SHELL_PGID.store(shell_pgid, Ordering::Release);
    TERMINAL_FD.store(terminal_fd, Ordering::Release);
    JOB_TABLE.store(job_table as *const JobTable as *mut JobTable, Ordering::Release);

    posix::sigaction(
        posix::SIGCHLD,
        sigchld_handler,
        posix::SA_RESTART | posix::SA_NOCLDSTOP,
    )?;
    posix::sigaction(posix::SIGINT, sigint_handler, posix::SA_RESTART)?;
    posix::ignore_signal(posix::SIGTSTP)?;
    log::debug!("signal handlers installed, shell_pgid={shell_pgid}, terminal_fd={terminal_fd}");
    Ok(())
}

fn job_table() -> Option<&'static JobTable> {
    let ptr = JOB_TABLE.load(Ordering::Acquire);
    unsafe { ptr.as_ref() }
}

extern "C" fn sigchld_handler(_signum: i32) {
    let Some(table) = job_table() else { return };

    // Reap each known job's process group by name first. The job table is
    // keyed by pgid, not pid: a pipeline's non-leader members share the
    // leader's pgid but have a different pid of their own. Once a pid has
    // exited and been reaped, POSIX releases it for reuse immediately, so
    // it can no longer be resolved back to its pgid with getpgid() - the
    // pgid has to be known *before* the reap, not looked up after. Scoping
    // the wait to `-pgid` sidesteps that entirely: whichever member of that
    // group is ready gets attributed to the right job without any lookup.
    // A pipeline's job only reaches Done once every member has exited (see
    // job.rs mark_member_exited_by_pgid) - a single member exiting must not
    // flip the whole job to Done while downstream stages are still running.
    table.for_each_active_pgid(|pgid| loop {
        match posix::waitpid(-pgid, posix::WNOHANG) {
            Ok(posix::WaitOutcome::Exited(..)) => {
                table.mark_member_exited_by_pgid(pgid);
            }
            Ok(posix::WaitOutcome::WouldBlock) | Err(_) => break,
            Ok(posix::WaitOutcome::Stopped(_)) => break, // handled below
        }
    });

    // Anything left is either a stop (not reaped above, so its pid is
    // still resolvable with getpgid - stopping a process doesn't release
    // it) or belongs to a foreground pipeline the executor is waiting on
    // synchronously (SIGCHLD is blocked for that duration, so this branch
    // ordinarily only sees stops and the occasional child whose job
    // registration never completed, e.g. a mid-pipeline fork failure).
    loop {
        match posix::waitpid(-1, posix::WNOHANG | posix::WUNTRACED) {
            Ok(posix::WaitOutcome::WouldBlock) => break,
            Ok(posix::WaitOutcome::Stopped(pid)) => {
                // getpgid is not on POSIX's async-signal-safe list;
                // accepted here as common practice among small job-control
                // shells, same as tcgetpgrp in sigint_handler below.
                if let Ok(pgid) = posix::getpgid(pid as i32) {
                    table.update_status_by_pgid(pgid, JobStatus::Stopped);
                }
            }
            Ok(posix::WaitOutcome::Exited(..)) => {}
            Err(_) => break,
        }
    }
}

extern "C" fn sigint_handler(_signum: i32) {
    let shell_pgid = SHELL_PGID.load(Ordering::Acquire);
    let fd = TERMINAL_FD.load(Ordering::Acquire);
    if fd < 0 {
        return;
    }
    // tcgetpgrp is not on POSIX's async-signal-safe list; accepted here as
    // common practice among small job-control shells.
    if let Ok(fg_pgid) = posix::tcgetpgrp(fd) {
        if fg_pgid != shell_pgid {
            let _ = posix::kill(-fg_pgid, posix::SIGINT);
        }
    }
}
