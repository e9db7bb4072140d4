//! Turns a token sequence into a [`Pipeline`] of [`Command`]s with
//! redirections and background flags. See spec.md §4.2 and §3.

use crate::error::ShellError;

/// A single command's input/output redirection, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirection {
    pub input: Option<String>,
    pub output: Option<String>,
    pub append: bool,
}

/// One command in a pipeline: argv, redirections, and whether *this*
/// pipeline as a whole runs in the background (mirrored onto every command
/// for convenience by [`parse`]; the authoritative flag lives on
/// [`Pipeline`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub argv: Vec<String>,
    pub redirection: Redirection,
    pub background: bool,
}

impl Command {
    fn new() -> Command {
        Command {
            argv: Vec::new(),
            redirection: Redirection::default(),
            background: false,
        }
    }
}

/// A non-empty chain of [`Command`]s to be connected stdin→stdout via
/// anonymous pipes, plus the pipeline-wide background flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub background: bool,
}

/// Parse a token sequence produced by [`crate::lexer::lex`].
pub fn parse(tokens: &[String]) -> Result<Pipeline, ShellError> {
    let mut tokens = tokens.to_vec();

    let background = tokens.last().map(|t| t == "&").unwrap_or(false);
    if background {
        tokens.pop();
    }

    let segments = split_on_pipe(&tokens)?;

    let mut commands = Vec::with_capacity(segments.len());
    for segment in segments {
        let mut command = parse_segment(segment)?;
        command.background = background;
        commands.push(command);
    }

    Ok(Pipeline {
        commands,
        background,
    })
}

fn split_on_pipe(tokens: &[String]) -> Result<Vec<&[String]>, ShellError> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        if tok == "|" {
            if i == start {
                return Err(ShellError::syntax("unexpected token |"));
            }
            segments.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    if start >= tokens.len() {
        return Err(ShellError::syntax("unexpected token |"));
    }
    segments.push(&tokens[start..]);
    Ok(segments)
}

fn parse_segment(segment: &[String]) -> Result<Command, ShellError> {
    let mut command = Command::new();
    let mut i = 0;
    while i < segment.len() {
        match segment[i].as_str() {
            "<" => {
                let path = segment
                    .get(i + 1)
                    .ok_or_else(|| ShellError::syntax("missing input redirection target"))?;
                if command.redirection.input.is_some() {
                    return Err(ShellError::syntax("multiple input redirections"));
                }
                command.redirection.input = Some(path.clone());
                i += 2;
            }
            ">" | ">>" => {
                let append = segment[i] == ">>";
                let path = segment
                    .get(i + 1)
                    .ok_or_else(|| ShellError::syntax("missing output redirection target"))?;
                if command.redirection.output.is_some() {
                    return Err(ShellError::syntax("multiple output redirections"));
                }
                command.redirection.output = Some(path.clone());
                command.redirection.append = append;
                i += 2;
            }
            "&" => {
                return Err(ShellError::syntax("& must be at end"));
            }
            other => {
                command.argv.push(other.to_string());
                i += 1;
            }
        }
    }

    if command.argv.is_empty() {
        return Err(ShellError::syntax("empty command"));
    }

    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_line(line: &str) -> Result<Pipeline, ShellError> {
        parse(&lex(line).unwrap())
    }

    #[test]
    fn single_command() {
        let p = parse_line("echo hello world").unwrap();
        assert_eq!(p.commands.len(), 1);
        assert_eq!(p.commands[0].argv, vec!["echo", "hello", "world"]);
        assert!(!p.background);
    }

    #[test]
    fn pipe_count_matches_segments() {
        let p = parse_line("ls | grep foo | wc -l").unwrap();
        assert_eq!(p.commands.len(), 3);
    }

    #[test]
    fn background_flag_strips_trailing_ampersand() {
        let p = parse_line("sleep 1 &").unwrap();
        assert!(p.background);
        assert_eq!(p.commands[0].argv, vec!["sleep", "1"]);
    }

    #[test]
    fn redirections_are_recorded() {
        let p = parse_line("sort < in.txt >> out.txt").unwrap();
        let cmd = &p.commands[0];
        assert_eq!(cmd.argv, vec!["sort"]);
        assert_eq!(cmd.redirection.input.as_deref(), Some("in.txt"));
        assert_eq!(cmd.redirection.output.as_deref(), Some("out.txt"));
        assert!(cmd.redirection.append);
    }

    #[test]
    fn duplicate_redirections_are_syntax_errors() {
        assert!(parse_line("cat < a < b").is_err());
        assert!(parse_line("cat > a > b").is_err());
    }

    #[test]
    fn stray_pipe_is_a_syntax_error() {
        assert!(parse_line("| ls").is_err());
        assert!(parse_line("ls |").is_err());
        assert!(parse_line("ls || grep x").is_err());
    }

    #[test]
    fn ampersand_not_at_end_is_a_syntax_error() {
        assert!(parse_line("ls & grep x").is_err());
    }

    #[test]
    fn empty_argv_is_a_syntax_error() {
        assert!(parse_line("> out.txt").is_err());
    }
}
