//! nom grammar for a single command line.
//!
//! A command line starts with the `!` sigil (`!!` for immediates) and may
//! chain several commands: `!op1 arg !op2 key=value`. Each command runs to
//! the next sigil or end of line. Tokens never start with `!`, which is how
//! the chain boundary is found.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{space0, space1},
    combinator::{all_consuming, map, value, verify},
    multi::{many0, many1},
    sequence::{preceded, terminated, tuple},
    IResult,
};

/// A command as it appears on the line, before token classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand {
    pub immediate: bool,
    pub opname: String,
    pub tokens: Vec<String>,
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| c != ' ' && c != '\t'),
        |t: &str| !t.starts_with('!'),
    )(input)
}

fn sigil(input: &str) -> IResult<&str, bool> {
    alt((value(true, tag("!!")), value(false, tag("!"))))(input)
}

fn raw_command(input: &str) -> IResult<&str, RawCommand> {
    map(
        tuple((sigil, identifier, many0(preceded(space1, token)))),
        |(immediate, opname, tokens)| RawCommand {
            immediate,
            opname: opname.to_string(),
            tokens: tokens.into_iter().map(str::to_string).collect(),
        },
    )(input)
}

/// Parses a full command line into its chained commands.
pub fn command_line(input: &str) -> IResult<&str, Vec<RawCommand>> {
    all_consuming(terminated(
        many1(preceded(space0, raw_command)),
        space0,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_command_with_tokens() {
        let (_, cmds) = command_line("!split sep=, maxsize=100").expect("parses");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].opname, "split");
        assert_eq!(cmds[0].tokens, vec!["sep=,", "maxsize=100"]);
        assert!(!cmds[0].immediate);
    }

    #[test]
    fn chained_commands_split_on_sigil() {
        let (_, cmds) = command_line("!split !take 3 !join").expect("parses");
        let names: Vec<&str> = cmds.iter().map(|c| c.opname.as_str()).collect();
        assert_eq!(names, vec!["split", "take", "join"]);
        assert_eq!(cmds[1].tokens, vec!["3"]);
        assert!(cmds[2].tokens.is_empty());
    }

    #[test]
    fn immediate_sigil() {
        let (_, cmds) = command_line("!!def split-join").expect("parses");
        assert!(cmds[0].immediate);
        assert_eq!(cmds[0].opname, "def");
        assert_eq!(cmds[0].tokens, vec!["split-join"]);
    }

    #[test]
    fn binding_and_reference_tokens_stay_verbatim() {
        let (_, cmds) = command_line("!global >t1 !cross <<t1 >pair").expect("parses");
        assert_eq!(cmds[0].tokens, vec![">t1"]);
        assert_eq!(cmds[1].tokens, vec!["<<t1", ">pair"]);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(command_line("not a command").is_err());
        assert!(command_line("! nope").is_err());
    }
}
