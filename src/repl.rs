//! The read-eval-print loop: prompt, read a line, lex, parse, execute,
//! reap finished background jobs. See spec.md §4, §5.

use std::io::{self, Write};

use crate::builtins::Context;
use crate::{executor, lexer, parser};

/// Compile-time knobs gathered in one place rather than left as scattered
/// literals. There is no CLI flag or config file to set any of these from
/// (spec.md §6: no command-line arguments).
pub struct ShellConfig {
    pub prompt: &'static str,
    pub history_capacity: usize,
    pub job_table_capacity: usize,
}

impl Default for ShellConfig {
    fn default() -> ShellConfig {
        ShellConfig {
            prompt: "myshell> ",
            history_capacity: crate::history::CAPACITY,
            job_table_capacity: crate::job::CAPACITY,
        }
    }
}

/// Run the shell until EOF on stdin or a built-in requests an exit. Returns
/// the process exit status.
pub fn run(ctx: &mut Context) -> i32 {
    let config = ShellConfig::default();
    let stdin = io::stdin();
    loop {
        print!("{}", config.prompt);
        if io::stdout().flush().is_err() {
            return 1;
        }

        let mut line = String::new();
        let bytes_read = loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break 0,
            }
        };
        if bytes_read == 0 {
            println!();
            return 0;
        }

        let line = line.trim_end_matches('\n');
        if line.trim().is_empty() {
            report_finished_jobs(ctx);
            continue;
        }

        // History records the raw line before parsing, win or lose
        // (spec.md §5.c).
        ctx.history.add(line);

        log::debug!("executing: {line}");
        run_line(line, ctx);
        if let Some(code) = ctx.exit_requested {
            log::debug!("exit requested with status {code}");
            return code;
        }

        report_finished_jobs(ctx);
    }
}

fn run_line(line: &str, ctx: &mut Context) {
    let tokens = match lexer::lex(line) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("myshell: {e}");
            return;
        }
    };
    if tokens.is_empty() {
        return;
    }

    let pipeline = match parser::parse(&tokens) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("myshell: {e}");
            return;
        }
    };

    if let Err(e) = executor::execute(&pipeline, line, ctx) {
        eprintln!("myshell: {e}");
    }
}

/// Sweep Done entries out of the job table and print their notices, per the
/// ordering guarantee that this happens before the next prompt (spec.md
/// §5.d).
fn report_finished_jobs(ctx: &mut Context) {
    for job in ctx.job_table.sweep_done() {
        println!("[{}]+ Done {}", job.job_id, job.command);
    }
}
