//! `mkdir`, `rmdir`, `touch`, `rm`, `cat`, `ls`.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

fn report_each(args: &[String], op: impl Fn(&str) -> io::Result<()>) -> i32 {
    let mut status = 0;
    for path in args {
        if let Err(e) = op(path) {
            eprintln!("{path}: {e}");
            status = 1;
        }
    }
    status
}

pub fn mkdir(args: &[String]) -> i32 {
    report_each(args, |p| fs::create_dir(p))
}

pub fn rmdir(args: &[String]) -> i32 {
    report_each(args, |p| fs::remove_dir(p))
}

pub fn touch(args: &[String]) -> i32 {
    report_each(args, |p| {
        if Path::new(p).exists() {
            File::options().append(true).open(p).map(|_| ())
        } else {
            File::create(p).map(|_| ())
        }
    })
}

pub fn rm(args: &[String]) -> i32 {
    let mut recursive = false;
    let mut force = false;
    let mut files = Vec::new();
    for a in args {
        match a.as_str() {
            "-r" | "-R" => recursive = true,
            "-f" => force = true,
            other => files.push(other.to_string()),
        }
    }

    let mut status = 0;
    for path in &files {
        let result = if recursive && Path::new(path).is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        if let Err(e) = result {
            if !force {
                eprintln!("rm: {path}: {e}");
                status = 1;
            }
        }
    }
    status
}

pub fn cat(args: &[String]) -> i32 {
    if args.is_empty() {
        let mut buf = String::new();
        if io::stdin().read_to_string(&mut buf).is_err() {
            return 1;
        }
        print!("{buf}");
        return 0;
    }

    let mut status = 0;
    for path in args {
        match fs::read_to_string(path) {
            Ok(contents) => print!("{contents}"),
            Err(e) => {
                eprintln!("cat: {path}: {e}");
                status = 1;
            }
        }
    }
    status
}

const SGR_BLUE: &str = "\x1b[34m";
const SGR_RESET: &str = "\x1b[0m";

pub fn ls(args: &[String]) -> i32 {
    let mut show_hidden = false;
    let mut dirs = Vec::new();
    for a in args {
        if a == "-a" {
            show_hidden = true;
        } else {
            dirs.push(a.to_string());
        }
    }
    if dirs.is_empty() {
        dirs.push(".".to_string());
    }

    let mut status = 0;
    for dir in &dirs {
        if let Err(e) = list_one(dir, show_hidden) {
            eprintln!("ls: {dir}: {e}");
            status = 1;
        }
    }
    status
}

fn list_one(dir: &str, show_hidden: bool) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for entry in entries {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !show_hidden && name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            writeln!(out, "{SGR_BLUE}{name}{SGR_RESET}")?;
        } else {
            writeln!(out, "{name}")?;
        }
    }
    Ok(())
}
