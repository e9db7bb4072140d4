//! The job table: backgrounded and stopped pipelines known to the shell.
//!
//! Laid out as a fixed-size slot array (spec.md §9 Design Notes) so that the
//! SIGCHLD handler can update a slot's status and pgid with plain atomic
//! stores, never taking a lock the main thread might already hold. The
//! command string, which only the main thread ever touches, lives behind a
//! `Mutex` per slot purely for interior mutability - the handler never
//! reads or writes it.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;

use crate::error::{ShellError, ShellResult};

/// Fixed capacity of the job table, per spec.md §3 ("≥100").
pub const CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobStatus {
    Running = 1,
    Stopped = 2,
    Done = 3,
}

impl JobStatus {
    fn from_u8(v: u8) -> Option<JobStatus> {
        match v {
            1 => Some(JobStatus::Running),
            2 => Some(JobStatus::Stopped),
            3 => Some(JobStatus::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Done => "Done",
        };
        write!(f, "{s}")
    }
}

const EMPTY: u8 = 0;

struct Slot {
    status: AtomicU8,
    pgid: AtomicI32,
    job_id: AtomicU32,
    used: AtomicBool,
    /// Pipeline members not yet reaped. A background pipeline's status only
    /// becomes `Done` once every member has exited - a single member exiting
    /// (e.g. the first stage of `sleep 5 | cat &`) must not flip the whole
    /// job to `Done` while downstream stages are still running.
    alive: AtomicU32,
    command: Mutex<String>,
}

impl Slot {
    fn empty() -> Slot {
        Slot {
            status: AtomicU8::new(EMPTY),
            pgid: AtomicI32::new(0),
            job_id: AtomicU32::new(0),
            used: AtomicBool::new(false),
            alive: AtomicU32::new(0),
            command: Mutex::new(String::new()),
        }
    }
}

/// A snapshot of one job, returned by lookups and listings. Does not
/// observe further mutation of the table.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub job_id: u32,
    pub pgid: i32,
    pub command: String,
    pub status: JobStatus,
}

pub struct JobTable {
    slots: Box<[Slot; CAPACITY]>,
    next_job_id: AtomicU32,
}

impl JobTable {
    pub fn new() -> JobTable {
        JobTable {
            slots: Box::new(std::array::from_fn(|_| Slot::empty())),
            next_job_id: AtomicU32::new(1),
        }
    }

    /// Register a new job for `pgid` running `command`, with `member_count`
    /// processes in its pipeline (1 for a single command). Fails if the
    /// table is at capacity.
    pub fn add(
        &self,
        pgid: i32,
        command: String,
        status: JobStatus,
        member_count: u32,
    ) -> ShellResult<u32> {
        let slot = self
            .slots
            .iter()
            .find(|s| !s.used.load(Ordering::Acquire))
            .ok_or(ShellError::JobTableFull)?;

        let job_id = self.next_job_id.fetch_add(1, Ordering::AcqRel);
        *slot.command.lock().unwrap() = command;
        slot.pgid.store(pgid, Ordering::Release);
        slot.job_id.store(job_id, Ordering::Release);
        slot.alive.store(member_count.max(1), Ordering::Release);
        slot.status.store(status as u8, Ordering::Release);
        slot.used.store(true, Ordering::Release);
        Ok(job_id)
    }

    pub fn remove(&self, job_id: u32) -> bool {
        for slot in self.slots.iter() {
            if slot.used.load(Ordering::Acquire) && slot.job_id.load(Ordering::Acquire) == job_id
            {
                slot.status.store(EMPTY, Ordering::Release);
                slot.used.store(false, Ordering::Release);
                *slot.command.lock().unwrap() = String::new();
                return true;
            }
        }
        false
    }

    fn find_by(&self, pred: impl Fn(&Slot) -> bool) -> Option<JobSnapshot> {
        self.slots
            .iter()
            .find(|s| s.used.load(Ordering::Acquire) && pred(s))
            .map(|s| JobSnapshot {
                job_id: s.job_id.load(Ordering::Acquire),
                pgid: s.pgid.load(Ordering::Acquire),
                command: s.command.lock().unwrap().clone(),
                status: JobStatus::from_u8(s.status.load(Ordering::Acquire))
                    .unwrap_or(JobStatus::Done),
            })
    }

    pub fn lookup_by_id(&self, job_id: u32) -> Option<JobSnapshot> {
        self.find_by(|s| s.job_id.load(Ordering::Acquire) == job_id)
    }

    pub fn lookup_by_pgid(&self, pgid: i32) -> Option<JobSnapshot> {
        self.find_by(|s| s.pgid.load(Ordering::Acquire) == pgid)
    }

    /// Update the status of the job owning `job_id`. Called from the main
    /// thread (`fg`/`bg`).
    pub fn update_status_by_id(&self, job_id: u32, status: JobStatus) -> bool {
        for slot in self.slots.iter() {
            if slot.used.load(Ordering::Acquire) && slot.job_id.load(Ordering::Acquire) == job_id
            {
                slot.status.store(status as u8, Ordering::Release);
                return true;
            }
        }
        false
    }

    /// Update the status of the job owning `pgid`. Async-signal-safe: only
    /// touches atomics. Called from the SIGCHLD handler for a stop - every
    /// member of a stopped foreground/background process group is stopped
    /// together (one terminal-generated signal reaches the whole group), so
    /// a single member's WIFSTOPPED event is enough to flag the job.
    pub fn update_status_by_pgid(&self, pgid: i32, status: JobStatus) -> bool {
        for slot in self.slots.iter() {
            if slot.used.load(Ordering::Acquire) && slot.pgid.load(Ordering::Acquire) == pgid {
                slot.status.store(status as u8, Ordering::Release);
                return true;
            }
        }
        false
    }

    /// Record that one member of the job owning `pgid` has exited.
    /// Async-signal-safe. Unlike a stop, a pipeline's members exit one at a
    /// time as each stage finishes - the job only becomes `Done` once every
    /// member has been accounted for, so this decrements a per-job counter
    /// rather than setting `Done` unconditionally. Returns whether the job
    /// transitioned to `Done` as a result of this call.
    pub fn mark_member_exited_by_pgid(&self, pgid: i32) -> bool {
        for slot in self.slots.iter() {
            if slot.used.load(Ordering::Acquire) && slot.pgid.load(Ordering::Acquire) == pgid {
                // The closure always returns Some, so fetch_update never errs.
                let prev = slot
                    .alive
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        Some(n.saturating_sub(1))
                    })
                    .unwrap();
                if prev.saturating_sub(1) == 0 {
                    slot.status.store(JobStatus::Done as u8, Ordering::Release);
                    return true;
                }
                return false;
            }
        }
        false
    }

    /// Invoke `f` with the pgid of every non-`Done` job. Async-signal-safe:
    /// no heap allocation, only atomic loads (unlike `list_active`, which
    /// allocates a `Vec` and takes each slot's command-string `Mutex`). Used
    /// by the SIGCHLD handler to reap each known job's process group by
    /// name rather than resolving an already-reaped pid back to a pgid,
    /// which does not work once the pid has been released by `waitpid`.
    pub fn for_each_active_pgid(&self, mut f: impl FnMut(i32)) {
        for slot in self.slots.iter() {
            if !slot.used.load(Ordering::Acquire) {
                continue;
            }
            let status = JobStatus::from_u8(slot.status.load(Ordering::Acquire));
            if status != Some(JobStatus::Done) {
                f(slot.pgid.load(Ordering::Acquire));
            }
        }
    }

    /// Snapshot of every non-Done job, for `jobs` and similar listings.
    pub fn list_active(&self) -> Vec<JobSnapshot> {
        self.slots
            .iter()
            .filter(|s| s.used.load(Ordering::Acquire))
            .filter_map(|s| {
                let status = JobStatus::from_u8(s.status.load(Ordering::Acquire))?;
                if status == JobStatus::Done {
                    return None;
                }
                Some(JobSnapshot {
                    job_id: s.job_id.load(Ordering::Acquire),
                    pgid: s.pgid.load(Ordering::Acquire),
                    command: s.command.lock().unwrap().clone(),
                    status,
                })
            })
            .collect()
    }

    /// Remove every Done entry, returning their snapshots so the caller can
    /// still report on a job that finished between `jobs` invocations.
    pub fn sweep_done(&self) -> Vec<JobSnapshot> {
        let mut removed = Vec::new();
        for slot in self.slots.iter() {
            if slot.used.load(Ordering::Acquire)
                && JobStatus::from_u8(slot.status.load(Ordering::Acquire)) == Some(JobStatus::Done)
            {
                removed.push(JobSnapshot {
                    job_id: slot.job_id.load(Ordering::Acquire),
                    pgid: slot.pgid.load(Ordering::Acquire),
                    command: slot.command.lock().unwrap().clone(),
                    status: JobStatus::Done,
                });
                slot.used.store(false, Ordering::Release);
                slot.status.store(EMPTY, Ordering::Release);
            }
        }
        removed
    }
}

impl Default for JobTable {
    fn default() -> JobTable {
        JobTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_monotonic() {
        let table = JobTable::new();
        let a = table
            .add(100, "sleep 1".into(), JobStatus::Running, 1)
            .unwrap();
        let b = table
            .add(101, "sleep 2".into(), JobStatus::Running, 1)
            .unwrap();
        assert!(b > a);
    }

    #[test]
    fn lookup_by_id_and_pgid() {
        let table = JobTable::new();
        let id = table.add(55, "cat".into(), JobStatus::Running, 1).unwrap();
        assert_eq!(table.lookup_by_id(id).unwrap().pgid, 55);
        assert_eq!(table.lookup_by_pgid(55).unwrap().job_id, id);
    }

    #[test]
    fn done_entries_are_elided_from_listings() {
        let table = JobTable::new();
        let id = table
            .add(7, "sleep 1".into(), JobStatus::Running, 1)
            .unwrap();
        assert_eq!(table.list_active().len(), 1);
        table.update_status_by_pgid(7, JobStatus::Done);
        assert_eq!(table.list_active().len(), 0);
        let swept = table.sweep_done();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].job_id, id);
        assert!(table.lookup_by_id(id).is_none());
    }

    #[test]
    fn table_rejects_insertion_past_capacity() {
        let table = JobTable::new();
        for i in 0..CAPACITY {
            table
                .add(i as i32 + 1, "x".into(), JobStatus::Running, 1)
                .unwrap();
        }
        assert!(matches!(
            table.add(999, "x".into(), JobStatus::Running, 1),
            Err(ShellError::JobTableFull)
        ));
    }
}
