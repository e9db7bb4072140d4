//! Built-in command recognition and dispatch. See spec.md §4.5 and the
//! per-command table in §6. Implementations are deliberately thin - spec.md
//! calls these "well-understood designs" and only specifies the contract by
//! which the executor invokes them.

mod env;
mod fileops;
mod jobctl;
mod misc;
mod nav;
mod text;

use crate::history::History;
use crate::job::JobTable;

/// The fixed set of recognized built-in names (spec.md §4.5).
const NAMES: &[&str] = &[
    "cd", "pwd", "exit", "echo", "mkdir", "rmdir", "touch", "rm", "cat", "ls", "jobs", "fg", "bg",
    "history", "export", "unset",
];

pub fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

/// State a built-in may need beyond its argv. Shared between the in-process
/// path (single non-piped, non-backgrounded command) and the pipeline-child
/// path, where it is populated with throwaway state since mutations there
/// are local to the subshell (spec.md §4.4, §9).
pub struct Context<'a> {
    pub job_table: &'a JobTable,
    pub history: &'a mut History,
    pub shell_pgid: i32,
    pub terminal_fd: i32,
    /// Set by `exit` to request shell termination with the given status.
    pub exit_requested: Option<i32>,
}

/// Run `argv[0]` as a built-in, returning its exit status.
pub fn execute_builtin(argv: &[String], ctx: &mut Context) -> i32 {
    let args = &argv[1..];
    match argv[0].as_str() {
        "cd" => nav::cd(args),
        "pwd" => nav::pwd(),
        "exit" => misc::exit(args, ctx),
        "echo" => text::echo(args),
        "mkdir" => fileops::mkdir(args),
        "rmdir" => fileops::rmdir(args),
        "touch" => fileops::touch(args),
        "rm" => fileops::rm(args),
        "cat" => fileops::cat(args),
        "ls" => fileops::ls(args),
        "jobs" => jobctl::jobs(args, ctx),
        "fg" => jobctl::fg(args, ctx),
        "bg" => jobctl::bg(args, ctx),
        "history" => misc::history(args, ctx),
        "export" => env::export(args),
        "unset" => env::unset(args),
        other => {
            eprintln!("{other}: not a builtin");
            1
        }
    }
}
