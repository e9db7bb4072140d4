//! `jobs`, `fg`, `bg`.

use super::Context;
use crate::job::JobStatus;

fn parse_job_id(args: &[String]) -> Result<Option<u32>, String> {
    match args.first() {
        None => Ok(None),
        Some(arg) => {
            let text = arg.strip_prefix('%').unwrap_or(arg);
            text.parse::<u32>()
                .map(Some)
                .map_err(|_| format!("{arg}: no such job"))
        }
    }
}

/// Pick the job a bare `fg`/`bg` (no argument) should act on: the most
/// recently added non-Done entry.
fn most_recent(ctx: &Context) -> Option<crate::job::JobSnapshot> {
    ctx.job_table.list_active().into_iter().max_by_key(|j| j.job_id)
}

pub fn jobs(_args: &[String], ctx: &mut Context) -> i32 {
    for job in ctx.job_table.list_active() {
        println!("[{}] {} {}", job.job_id, job.status, job.command);
    }
    0
}

pub fn fg(args: &[String], ctx: &mut Context) -> i32 {
    let job_id = match parse_job_id(args) {
        Ok(id) => id,
        Err(msg) => {
            eprintln!("fg: {msg}");
            return 1;
        }
    };

    let job = match job_id {
        Some(id) => ctx.job_table.lookup_by_id(id),
        None => most_recent(ctx),
    };
    let job = match job {
        Some(j) => j,
        None => {
            eprintln!("fg: no such job");
            return 1;
        }
    };

    println!("{}", job.command);
    crate::posix::tcsetpgrp(ctx.terminal_fd, job.pgid).ok();
    if crate::posix::kill(-job.pgid, crate::posix::SIGCONT).is_err() {
        // Job may already be running; continuing it again is harmless.
    }
    ctx.job_table.update_status_by_id(job.job_id, JobStatus::Running);

    let status = crate::executor::wait_foreground(
        job.pgid,
        job.pgid,
        &[],
        &job.command,
        ctx,
    );
    crate::posix::tcsetpgrp(ctx.terminal_fd, ctx.shell_pgid).ok();

    // wait_foreground re-adds/updates the job itself when it stops again;
    // otherwise the job ran to completion and must be removed here (spec.md
    // §4.5 "on exit removes the job").
    let still_stopped = ctx
        .job_table
        .lookup_by_id(job.job_id)
        .map(|j| j.status == JobStatus::Stopped)
        .unwrap_or(false);
    if !still_stopped {
        ctx.job_table.remove(job.job_id);
    }

    match status {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fg: {e}");
            1
        }
    }
}

pub fn bg(args: &[String], ctx: &mut Context) -> i32 {
    let job_id = match parse_job_id(args) {
        Ok(id) => id,
        Err(msg) => {
            eprintln!("bg: {msg}");
            return 1;
        }
    };

    let job = match job_id {
        Some(id) => ctx.job_table.lookup_by_id(id),
        None => most_recent(ctx),
    };
    let job = match job {
        Some(j) => j,
        None => {
            eprintln!("bg: no such job");
            return 1;
        }
    };

    if job.status != JobStatus::Stopped {
        eprintln!("bg: job {} is not stopped", job.job_id);
        return 1;
    }

    if crate::posix::kill(-job.pgid, crate::posix::SIGCONT).is_err() {
        eprintln!("bg: failed to continue job {}", job.job_id);
        return 1;
    }
    ctx.job_table.update_status_by_id(job.job_id, JobStatus::Running);
    println!("[{}]+ {} &", job.job_id, job.command);
    0
}
