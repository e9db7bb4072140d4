//! `exit`, `history`.

use super::Context;

pub fn exit(args: &[String], ctx: &mut Context) -> i32 {
    let code = match args.first() {
        Some(arg) => match arg.parse::<i32>() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("exit: {arg}: numeric argument required");
                1
            }
        },
        None => 0,
    };
    ctx.exit_requested = Some(code);
    code
}

pub fn history(_args: &[String], ctx: &mut Context) -> i32 {
    for (i, line) in ctx.history.iter().enumerate() {
        println!("{:5}  {line}", i + 1);
    }
    0
}
