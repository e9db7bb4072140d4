//! Binary entry point: set up the shell's process group and terminal
//! ownership, install signal handlers, then hand off to the REPL.

use myshell::builtins::Context;
use myshell::{history::History, job::JobTable, posix, repl, signals};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = posix::setsid_or_pgrp() {
        eprintln!("myshell: failed to set process group: {e}");
        std::process::exit(1);
    }
    let shell_pgid = posix::getpgrp();

    let terminal_fd = posix::STDIN_FILENO;
    if posix::isatty(terminal_fd) {
        let _ = posix::tcsetpgrp(terminal_fd, shell_pgid);
    }

    let job_table: &'static JobTable = Box::leak(Box::new(JobTable::new()));
    if let Err(e) = signals::install(job_table, shell_pgid, terminal_fd) {
        eprintln!("myshell: failed to install signal handlers: {e}");
        std::process::exit(1);
    }

    let mut history = History::new();
    let mut ctx = Context {
        job_table,
        history: &mut history,
        shell_pgid,
        terminal_fd,
        exit_requested: None,
    };

    let status = repl::run(&mut ctx);
    std::process::exit(status);
}
