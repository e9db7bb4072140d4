//! `echo`.

pub fn echo(args: &[String]) -> i32 {
    let mut newline = true;
    let mut words = args;
    if words.first().map(String::as_str) == Some("-n") {
        newline = false;
        words = &words[1..];
    }

    print!("{}", words.join(" "));
    if newline {
        println!();
    }
    0
}
