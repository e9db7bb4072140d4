//! Forks processes for a pipeline, wires pipes and redirections, manages
//! process groups and terminal ownership, and either waits (foreground) or
//! registers a job (background). See spec.md §4.4.

use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use crate::builtins::{self, Context};
use crate::error::ShellResult;
use crate::job::JobStatus;
use crate::parser::{Command, Pipeline, Redirection};
use crate::posix;

const DEV_NULL: &str = "/dev/null";

/// Run `pipeline`, returning its exit status (0 for a backgrounded
/// pipeline, returned immediately after registering the job).
pub fn execute(pipeline: &Pipeline, command_text: &str, ctx: &mut Context) -> ShellResult<i32> {
    if pipeline.commands.len() == 1 {
        let cmd = &pipeline.commands[0];
        if !pipeline.background && builtins::is_builtin(&cmd.argv[0]) {
            return Ok(run_builtin_in_shell(cmd, ctx));
        }
        return run_single_external(cmd, pipeline.background, command_text, ctx);
    }
    run_pipeline(pipeline, command_text, ctx)
}

// ---------------------------------------------------------------------
// Single built-in, no pipe, no background.
// ---------------------------------------------------------------------

struct SavedFds {
    stdin: RawFd,
    stdout: RawFd,
}

fn restore_redirections_shell(saved: &SavedFds) {
    let _ = posix::dup2(saved.stdin, posix::STDIN_FILENO);
    let _ = posix::dup2(saved.stdout, posix::STDOUT_FILENO);
    let _ = posix::close(saved.stdin);
    let _ = posix::close(saved.stdout);
}

/// Applies `r` to the shell's own stdin/stdout, returning the saved fds to
/// restore afterward. On any failure the already-duplicated fds are
/// restored and closed before the error is returned, so a failing output
/// redirection (say) never leaves stdin pointed at the input file it did
/// manage to open, and never leaks the two dup'd descriptors.
fn apply_redirections_shell(r: &Redirection) -> std::io::Result<SavedFds> {
    let saved = SavedFds {
        stdin: posix::dup(posix::STDIN_FILENO)?,
        stdout: posix::dup(posix::STDOUT_FILENO)?,
    };
    if let Err(e) = apply_redirections_shell_inner(r) {
        restore_redirections_shell(&saved);
        return Err(e);
    }
    Ok(saved)
}

fn apply_redirections_shell_inner(r: &Redirection) -> std::io::Result<()> {
    if let Some(path) = &r.input {
        let f = posix::open_read(Path::new(path))?;
        posix::dup2(f.as_raw_fd(), posix::STDIN_FILENO)?;
    }
    if let Some(path) = &r.output {
        let f = posix::open_write(Path::new(path), r.append)?;
        posix::dup2(f.as_raw_fd(), posix::STDOUT_FILENO)?;
    }
    Ok(())
}

fn run_builtin_in_shell(cmd: &Command, ctx: &mut Context) -> i32 {
    let saved = match apply_redirections_shell(&cmd.redirection) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {e}", cmd.argv[0]);
            return 1;
        }
    };
    let status = builtins::execute_builtin(&cmd.argv, ctx);
    restore_redirections_shell(&saved);
    status
}

// ---------------------------------------------------------------------
// Single external command, no pipe.
// ---------------------------------------------------------------------

fn apply_redirections_child(r: &Redirection, background: bool) {
    match &r.input {
        Some(path) => match posix::open_read(Path::new(path)) {
            Ok(f) => {
                let _ = posix::dup2(f.as_raw_fd(), posix::STDIN_FILENO);
            }
            Err(e) => {
                eprintln!("{path}: {e}");
                posix::_exit(1);
            }
        },
        None if background => {
            if let Ok(f) = posix::open_read(Path::new(DEV_NULL)) {
                let _ = posix::dup2(f.as_raw_fd(), posix::STDIN_FILENO);
            }
        }
        None => {}
    }

    if let Some(path) = &r.output {
        match posix::open_write(Path::new(path), r.append) {
            Ok(f) => {
                let _ = posix::dup2(f.as_raw_fd(), posix::STDOUT_FILENO);
            }
            Err(e) => {
                eprintln!("{path}: {e}");
                posix::_exit(1);
            }
        }
    }
}

/// Replace this process image with `argv[0]`, or print the spec.md §4.4
/// diagnostic and exit 1 if it cannot be found.
fn exec_or_die(argv: &[String]) -> ! {
    let _: std::io::Result<()> = posix::execvp(&argv[0], argv);
    eprintln!("{}: command not found", argv[0]);
    posix::_exit(1);
}

fn run_single_external(
    cmd: &Command,
    background: bool,
    command_text: &str,
    ctx: &mut Context,
) -> ShellResult<i32> {
    let pid = unsafe { posix::fork()? };
    if pid == 0 {
        let _ = posix::setpgid(0, 0);
        log::debug!("child: setpgid(0, 0)");
        apply_redirections_child(&cmd.redirection, background);
        if builtins::is_builtin(&cmd.argv[0]) {
            let mut child_history = crate::history::History::new();
            let child_table = crate::job::JobTable::new();
            let mut child_ctx = Context {
                job_table: &child_table,
                history: &mut child_history,
                shell_pgid: ctx.shell_pgid,
                terminal_fd: ctx.terminal_fd,
                exit_requested: None,
            };
            let status = builtins::execute_builtin(&cmd.argv, &mut child_ctx);
            posix::_exit(status as u8);
        }
        exec_or_die(&cmd.argv);
    }

    let pid = pid as i32;
    let _ = posix::setpgid(pid, pid);
    log::debug!("forked pid {pid}, pgid {pid}, background={background}");

    if background {
        let job_id = ctx
            .job_table
            .add(pid, command_text.to_string(), JobStatus::Running, 1)?;
        println!("[{job_id}] {pid}");
        return Ok(0);
    }

    posix::tcsetpgrp(ctx.terminal_fd, pid).ok();
    let status = wait_foreground(pid, pid, &[], command_text, ctx)?;
    posix::tcsetpgrp(ctx.terminal_fd, ctx.shell_pgid).ok();
    Ok(status)
}

// ---------------------------------------------------------------------
// Pipelines of two or more commands.
// ---------------------------------------------------------------------

fn run_pipeline(pipeline: &Pipeline, command_text: &str, ctx: &mut Context) -> ShellResult<i32> {
    let n = pipeline.commands.len();
    let mut pipes: Vec<(std::fs::File, std::fs::File)> = Vec::with_capacity(n - 1);
    for _ in 0..n - 1 {
        match posix::pipe() {
            Ok(p) => pipes.push(p),
            Err(e) => {
                return Err(e.into());
            }
        }
    }

    let mut pids: Vec<i32> = Vec::with_capacity(n);
    let mut pgid: i32 = 0;

    for (i, cmd) in pipeline.commands.iter().enumerate() {
        let fork_result = unsafe { posix::fork() };
        let pid = match fork_result {
            Ok(pid) => pid,
            Err(e) => {
                abort_pipeline(&pids);
                return Err(e.into());
            }
        };

        if pid == 0 {
            child_pipeline_member(i, n, cmd, &pipes, pipeline.background, pgid);
        }

        let pid = pid as i32;
        if pgid == 0 {
            pgid = pid;
        }
        let _ = posix::setpgid(pid, pgid);
        pids.push(pid);
    }

    // The parent never reads or writes these; every fd a child needs was
    // already dup2'd before its exec. `pipes` still owns the raw fds, so
    // dropping it (rather than closing each end by hand) closes them once.
    drop(pipes);

    let last_pid = *pids.last().unwrap();
    log::debug!("forked pipeline pgid {pgid}, members {pids:?}, background={}", pipeline.background);

    if pipeline.background {
        let job_id =
            ctx.job_table
                .add(pgid, command_text.to_string(), JobStatus::Running, n as u32)?;
        println!("[{job_id}] {pgid}");
        return Ok(0);
    }

    posix::tcsetpgrp(ctx.terminal_fd, pgid).ok();
    let status = wait_foreground(pgid, last_pid, &pids[..pids.len() - 1], command_text, ctx)?;
    posix::tcsetpgrp(ctx.terminal_fd, ctx.shell_pgid).ok();
    Ok(status)
}

/// Runs in the forked child for pipeline member `i` of `n`. Never returns:
/// either execs or `_exit`s.
fn child_pipeline_member(
    i: usize,
    n: usize,
    cmd: &Command,
    pipes: &[(std::fs::File, std::fs::File)],
    background: bool,
    pgid: i32,
) -> ! {
    let _ = posix::setpgid(0, if pgid == 0 { 0 } else { pgid });

    if i > 0 {
        let (read_end, _) = &pipes[i - 1];
        let _ = posix::dup2(read_end.as_raw_fd(), posix::STDIN_FILENO);
    } else {
        apply_stdin_for_first(&cmd.redirection, background);
    }

    if i < n - 1 {
        let (_, write_end) = &pipes[i];
        let _ = posix::dup2(write_end.as_raw_fd(), posix::STDOUT_FILENO);
    } else {
        apply_stdout_for_last(&cmd.redirection);
    }

    // Close every pipe descriptor - the full-closure invariant (spec.md
    // §4.4): any left open lets a downstream reader block forever.
    for (read_end, write_end) in pipes {
        let _ = posix::close(read_end.as_raw_fd());
        let _ = posix::close(write_end.as_raw_fd());
    }

    if builtins::is_builtin(&cmd.argv[0]) {
        let mut history = crate::history::History::new();
        let table = crate::job::JobTable::new();
        let mut ctx = Context {
            job_table: &table,
            history: &mut history,
            shell_pgid: pgid,
            terminal_fd: -1,
            exit_requested: None,
        };
        let status = builtins::execute_builtin(&cmd.argv, &mut ctx);
        posix::_exit(status as u8);
    }
    exec_or_die(&cmd.argv);
}

fn apply_stdin_for_first(r: &Redirection, background: bool) {
    if let Some(path) = &r.input {
        match posix::open_read(Path::new(path)) {
            Ok(f) => {
                let _ = posix::dup2(f.as_raw_fd(), posix::STDIN_FILENO);
            }
            Err(e) => {
                eprintln!("{path}: {e}");
                posix::_exit(1);
            }
        }
    } else if background {
        if let Ok(f) = posix::open_read(Path::new(DEV_NULL)) {
            let _ = posix::dup2(f.as_raw_fd(), posix::STDIN_FILENO);
        }
    }
}

fn apply_stdout_for_last(r: &Redirection) {
    if let Some(path) = &r.output {
        match posix::open_write(Path::new(path), r.append) {
            Ok(f) => {
                let _ = posix::dup2(f.as_raw_fd(), posix::STDOUT_FILENO);
            }
            Err(e) => {
                eprintln!("{path}: {e}");
                posix::_exit(1);
            }
        }
    }
}

/// A mid-pipeline fork failed: terminate already-forked children (spec.md
/// §7, resource exhaustion). The pipes allocated so far are closed when the
/// caller's `pipes` Vec drops; this takes no part in closing them itself to
/// avoid closing each fd twice.
fn abort_pipeline(pids: &[i32]) {
    for pid in pids {
        let _ = posix::kill(*pid, posix::SIGTERM);
    }
}

// ---------------------------------------------------------------------
// Foreground wait, shared by single-command, pipeline, and `fg`.
// ---------------------------------------------------------------------

/// Wait for `last_pid` (the process whose exit status is the pipeline's
/// status), reaping `other_pids` non-blockingly afterward. On a stop, `pgid`
/// is registered/updated as a Stopped job and the stop notice is printed.
pub fn wait_foreground(
    pgid: i32,
    last_pid: i32,
    other_pids: &[i32],
    command_text: &str,
    ctx: &mut Context,
) -> ShellResult<i32> {
    posix::block_sigchld().ok();
    let outcome = posix::waitpid(last_pid, posix::WUNTRACED);
    log::debug!("wait_foreground(pgid={pgid}, last_pid={last_pid}) => {}", match &outcome {
        Ok(posix::WaitOutcome::Stopped(_)) => "stopped",
        Ok(posix::WaitOutcome::Exited(..)) => "exited",
        Ok(posix::WaitOutcome::WouldBlock) => "would_block",
        Err(_) => "error",
    });
    let result = match outcome {
        Ok(posix::WaitOutcome::Stopped(_)) => {
            let existing = ctx.job_table.lookup_by_pgid(pgid);
            let job_id = match existing {
                Some(job) => {
                    ctx.job_table.update_status_by_pgid(pgid, JobStatus::Stopped);
                    job.job_id
                }
                None => ctx.job_table.add(
                    pgid,
                    command_text.to_string(),
                    JobStatus::Stopped,
                    other_pids.len() as u32 + 1,
                )?,
            };
            println!("[{job_id}]+ Stopped {command_text}");
            Ok(0)
        }
        Ok(posix::WaitOutcome::Exited(_, status)) => {
            for pid in other_pids {
                let _ = posix::waitpid(*pid, posix::WNOHANG);
            }
            Ok(status.shell_status())
        }
        Ok(posix::WaitOutcome::WouldBlock) => Ok(0),
        Err(e) => Err(e.into()),
    };
    posix::unblock_sigchld().ok();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;
    use crate::job::JobTable;
    use crate::parser::Redirection;

    fn ctx<'a>(table: &'a JobTable, history: &'a mut History) -> Context<'a> {
        Context {
            job_table: table,
            history,
            shell_pgid: posix::getpgrp(),
            terminal_fd: -1,
            exit_requested: None,
        }
    }

    fn cmd(argv: &[&str]) -> Command {
        Command {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            redirection: Redirection::default(),
            background: false,
        }
    }

    #[test]
    fn single_external_success() {
        let table = JobTable::new();
        let mut history = History::new();
        let mut c = ctx(&table, &mut history);
        let pipeline = Pipeline {
            commands: vec![cmd(&["true"])],
            background: false,
        };
        let status = execute(&pipeline, "true", &mut c).unwrap();
        assert_eq!(status, 0);
    }

    #[test]
    fn single_external_propagates_exit_code() {
        let table = JobTable::new();
        let mut history = History::new();
        let mut c = ctx(&table, &mut history);
        let pipeline = Pipeline {
            commands: vec![cmd(&["sh", "-c", "exit 13"])],
            background: false,
        };
        let status = execute(&pipeline, "sh -c 'exit 13'", &mut c).unwrap();
        assert_eq!(status, 13);
    }

    #[test]
    fn unknown_command_exits_with_failure_status() {
        let table = JobTable::new();
        let mut history = History::new();
        let mut c = ctx(&table, &mut history);
        let pipeline = Pipeline {
            commands: vec![cmd(&["nosuchcommand-xyz"])],
            background: false,
        };
        let status = execute(&pipeline, "nosuchcommand-xyz", &mut c).unwrap();
        assert_eq!(status, 1);
    }

    #[test]
    fn pipeline_exit_status_is_last_commands() {
        let table = JobTable::new();
        let mut history = History::new();
        let mut c = ctx(&table, &mut history);
        let pipeline = Pipeline {
            commands: vec![cmd(&["true"]), cmd(&["sh", "-c", "exit 7"])],
            background: false,
        };
        let status = execute(&pipeline, "true | sh -c 'exit 7'", &mut c).unwrap();
        assert_eq!(status, 7);
    }

    #[test]
    fn output_redirection_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let table = JobTable::new();
        let mut history = History::new();
        let mut c = ctx(&table, &mut history);
        let mut command = cmd(&["echo", "hello"]);
        command.redirection.output = Some(path.to_str().unwrap().to_string());
        let pipeline = Pipeline {
            commands: vec![command],
            background: false,
        };
        let status = execute(&pipeline, "echo hello > out.txt", &mut c).unwrap();
        assert_eq!(status, 0);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), "hello");
    }

    #[test]
    fn background_job_is_registered_and_returns_immediately() {
        let table = JobTable::new();
        let mut history = History::new();
        let mut c = ctx(&table, &mut history);
        let pipeline = Pipeline {
            commands: vec![cmd(&["sleep", "1"])],
            background: true,
        };
        let status = execute(&pipeline, "sleep 1", &mut c).unwrap();
        assert_eq!(status, 0);
        assert_eq!(table.list_active().len(), 1);
    }
}
