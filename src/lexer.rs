//! Tokenizer for a single input line.
//!
//! Drives a small state machine over quoting, backslash escapes (only
//! inside double quotes), and `$NAME` / `${NAME}` parameter expansion. The
//! operators `|`, `<`, `>`, `>>`, `&` are not special to the lexer itself -
//! they come out as ordinary tokens and the parser recognizes them by exact
//! string comparison. See spec.md §4.1 for the full contract.

use std::env;

use crate::error::LexError;

/// Upper bound on the number of tokens a single line may produce.
pub const MAX_TOKENS: usize = 128;
/// Upper bound on the length of a single token, matching `MAX_INPUT_SIZE`.
pub const MAX_TOKEN_LENGTH: usize = 4096;

pub type Token = String;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    EscapeInDouble,
}

/// Tokenize `line` (already stripped of its trailing newline).
pub fn lex(line: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut chars = line.chars().peekable();

    macro_rules! push_char {
        ($c:expr) => {{
            if current.len() >= MAX_TOKEN_LENGTH {
                return Err(LexError::TokenTooLong);
            }
            current.push($c);
        }};
    }

    macro_rules! end_token {
        () => {
            if !current.is_empty() {
                if tokens.len() >= MAX_TOKENS {
                    return Err(LexError::TooManyTokens);
                }
                tokens.push(std::mem::take(&mut current));
            }
        };
    }

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                c if c.is_whitespace() => end_token!(),
                '\'' => state = State::SingleQuoted,
                '"' => state = State::DoubleQuoted,
                '$' => expand_variable(&mut chars, &mut current)?,
                other => push_char!(other),
            },
            State::SingleQuoted => {
                if c == '\'' {
                    state = State::Normal;
                } else {
                    push_char!(c);
                }
            }
            State::DoubleQuoted => match c {
                '"' => state = State::Normal,
                '\\' => state = State::EscapeInDouble,
                '$' => expand_variable(&mut chars, &mut current)?,
                other => push_char!(other),
            },
            State::EscapeInDouble => {
                let mapped = match c {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    other => other,
                };
                push_char!(mapped);
                state = State::DoubleQuoted;
            }
        }
    }

    match state {
        State::SingleQuoted => return Err(LexError::UnterminatedSingleQuote),
        State::DoubleQuoted | State::EscapeInDouble => {
            return Err(LexError::UnterminatedDoubleQuote)
        }
        State::Normal => {}
    }

    end_token!();
    Ok(tokens)
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Expand a `$NAME` or `${NAME}` reference immediately following a `$` that
/// has already been consumed from `chars`. If `$` is not followed by a
/// valid name start, it is pushed back as a literal `$`, the same fallback
/// every other non-special character gets in `Normal`/`DoubleQuoted` state.
fn expand_variable(
    chars: &mut std::iter::Peekable<std::str::Chars>,
    current: &mut String,
) -> Result<(), LexError> {
    if chars.peek() == Some(&'{') {
        chars.next();
        let mut name = String::new();
        for c in chars.by_ref() {
            if c == '}' {
                break;
            }
            name.push(c);
        }
        append_value(current, &name)?;
    } else if chars.peek().is_some_and(|&c| is_name_start(c)) {
        let mut name = String::new();
        while chars.peek().is_some_and(|&c| is_name_start(c)) {
            name.push(chars.next().unwrap());
        }
        append_value(current, &name)?;
    } else {
        if current.len() >= MAX_TOKEN_LENGTH {
            return Err(LexError::TokenTooLong);
        }
        current.push('$');
    }
    Ok(())
}

fn append_value(current: &mut String, name: &str) -> Result<(), LexError> {
    if let Ok(value) = env::var(name) {
        if current.len() + value.len() > MAX_TOKEN_LENGTH {
            return Err(LexError::TokenTooLong);
        }
        current.push_str(&value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(lex("echo hello world").unwrap(), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn empty_line_has_no_tokens() {
        assert!(lex("").unwrap().is_empty());
        assert!(lex("   ").unwrap().is_empty());
    }

    #[test]
    fn single_quotes_are_fully_literal() {
        assert_eq!(lex("echo 'a\\tb'").unwrap(), vec!["echo", "a\\tb"]);
    }

    #[test]
    fn double_quote_escapes() {
        assert_eq!(lex(r#"echo "a\tb""#).unwrap(), vec!["echo", "a\tb"]);
    }

    #[test]
    fn quoted_regions_do_not_introduce_boundaries() {
        assert_eq!(lex(r#"a"b c"d"#).unwrap(), vec!["ab cd"]);
    }

    #[test]
    fn unterminated_quotes_are_errors() {
        assert_eq!(lex("echo 'abc").unwrap_err(), LexError::UnterminatedSingleQuote);
        assert_eq!(lex("echo \"abc").unwrap_err(), LexError::UnterminatedDoubleQuote);
    }

    #[test]
    fn variable_expansion_unbraced_and_braced() {
        std::env::set_var("MYSHELL_TEST_K", "V");
        assert_eq!(lex("$MYSHELL_TEST_K").unwrap(), vec!["V"]);
        assert_eq!(lex("${MYSHELL_TEST_K}").unwrap(), vec!["V"]);
        assert_eq!(lex("\"x${MYSHELL_TEST_K}y\"").unwrap(), vec!["xVy"]);
        std::env::remove_var("MYSHELL_TEST_K");
    }

    #[test]
    fn unset_variable_expands_to_nothing() {
        std::env::remove_var("MYSHELL_TEST_UNSET");
        assert!(lex("$MYSHELL_TEST_UNSET").unwrap().is_empty());
        assert_eq!(lex("\"x${MYSHELL_TEST_UNSET}y\"").unwrap(), vec!["xy"]);
    }

    #[test]
    fn operators_are_not_split_out_of_adjacent_tokens() {
        assert_eq!(lex("a>b").unwrap(), vec!["a>b"]);
        assert_eq!(lex("a > b").unwrap(), vec!["a", ">", "b"]);
    }

    #[test]
    fn bare_dollar_is_a_literal_dollar() {
        assert_eq!(lex("echo $").unwrap(), vec!["echo", "$"]);
        assert_eq!(lex("echo $ x").unwrap(), vec!["echo", "$", "x"]);
        assert_eq!(lex("\"a$ b\"").unwrap(), vec!["a$ b"]);
    }

    #[test]
    fn too_many_tokens_is_an_error() {
        let line = "a ".repeat(MAX_TOKENS + 1);
        assert_eq!(lex(&line).unwrap_err(), LexError::TooManyTokens);
    }
}
