//! Script parser: turns ARPEL script text into an ordered command list.
//!
//! The grammar is line-oriented:
//!
//! * a line starting with `!` introduces one or more chained commands
//!   (`!op1 ... !op2 ...`), each terminated by the next sigil or end of
//!   line; `!!op` marks an immediate command executed at parse time;
//! * lines following a command that start with neither `!` nor `#`
//!   accumulate verbatim, dedented, as that command's prompt body;
//! * `#`-prefixed lines are comments and discarded;
//! * within a command line, `key=value` tokens become keyword arguments,
//!   bare tokens positional arguments (auto-coerced to int or float when
//!   they parse as such, with backslash escapes decoded otherwise),
//!   `>name` binds the result, `>>name` binds into the global namespace,
//!   and `<name` / `<<name` reference a previously named table.
//!
//! Parsing is a pure function of the text; operator-name validation against
//! a [`Registry`] happens in a second pass (see [`validate`]) so that
//! immediate commands like `def` can register new operators before the
//! names they introduce are checked. An unknown operator is a fatal parse
//! error raised before any execution.

pub mod command;
pub mod line;

pub use command::{Command, TableRef};

use tracing::debug;

use crate::error::ParseError;
use crate::registry::{clean_to_id, Registry};
use crate::value::Value;

/// Decodes the common backslash escapes in a quoted-ish literal; unknown
/// escapes keep their backslash.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn coerce_token(token: &str) -> Value {
    match Value::coerce(token) {
        Value::Str(s) => Value::Str(unescape(&s)),
        v => v,
    }
}

/// Removes the common leading whitespace of all non-blank lines, then trims
/// the result. Returns `None` for an all-whitespace body. The indent is
/// counted in characters, not bytes, so wide whitespace cannot split a
/// multi-byte character.
fn dedent(body: &str) -> Option<String> {
    let indent = body
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);
    let text = body
        .lines()
        .map(|l| {
            let start = l
                .char_indices()
                .nth(indent)
                .map(|(i, _)| i)
                .unwrap_or(l.len());
            &l[start..]
        })
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn classify_tokens(cmd: &mut Command, tokens: &[String], linenum: usize) -> Result<(), ParseError> {
    for tok in tokens {
        if let Some(name) = tok.strip_prefix(">>") {
            cmd.global_bind = Some(clean_to_id(name));
        } else if let Some(name) = tok.strip_prefix('>') {
            cmd.varnames.push(clean_to_id(name));
        } else if let Some(name) = tok.strip_prefix("<<") {
            cmd.table_refs.push(TableRef {
                name: clean_to_id(name),
                global: true,
            });
        } else if let Some(name) = tok.strip_prefix('<') {
            cmd.table_refs.push(TableRef {
                name: clean_to_id(name),
                global: false,
            });
        } else if let Some((key, val)) = tok.split_once('=') {
            if key.is_empty() {
                return Err(ParseError::Malformed {
                    line: linenum,
                    message: format!("keyword argument with empty key: \"{}\"", tok),
                });
            }
            cmd.kwargs.push((clean_to_id(key), coerce_token(val)));
        } else {
            cmd.args.push(coerce_token(tok));
        }
    }
    Ok(())
}

/// Parses script text into commands. Syntax-only: operator names are not
/// resolved and immediate commands are not executed here.
pub fn parse_source(source: &str) -> Result<Vec<Command>, ParseError> {
    let mut commands: Vec<Command> = Vec::new();
    let mut prompt = String::new();

    let mut flush_prompt = |commands: &mut Vec<Command>, prompt: &mut String| {
        if let Some(last) = commands.last_mut() {
            if last.prompt.is_none() {
                last.prompt = dedent(prompt);
            }
        }
        prompt.clear();
    };

    for (i, raw_line) in source.lines().enumerate() {
        let linenum = i + 1;
        if raw_line.starts_with('#') {
            continue;
        }
        if !raw_line.starts_with('!') {
            if !commands.is_empty() {
                prompt.push_str(raw_line);
                prompt.push('\n');
            }
            continue;
        }

        flush_prompt(&mut commands, &mut prompt);

        let (_, raws) = line::command_line(raw_line).map_err(|e| ParseError::Malformed {
            line: linenum,
            message: e.to_string(),
        })?;
        for raw in raws {
            let mut cmd = Command::new(&clean_to_id(&raw.opname), linenum);
            cmd.immediate = raw.immediate;
            classify_tokens(&mut cmd, &raw.tokens, linenum)?;
            commands.push(cmd);
        }
    }
    flush_prompt(&mut commands, &mut prompt);

    debug!(count = commands.len(), "parsed script");
    Ok(commands)
}

/// Verifies every command names a registered operator. Fatal on the first
/// unknown name, before any execution.
pub fn validate(registry: &Registry, commands: &[Command]) -> Result<(), ParseError> {
    for cmd in commands {
        if !registry.contains(&cmd.opname) {
            return Err(ParseError::UnknownOperator {
                name: cmd.opname.clone(),
                line: cmd.linenum,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn comments_are_discarded() {
        let cmds = parse_source("# a comment\n!split\n# another\n!join\n").expect("parses");
        let names: Vec<&str> = cmds.iter().map(|c| c.opname.as_str()).collect();
        assert_eq!(names, vec!["split", "join"]);
        assert_eq!(cmds[0].linenum, 2);
        assert_eq!(cmds[1].linenum, 4);
    }

    #[test]
    fn prompt_lines_accumulate_dedented() {
        let src = "!format\n  Hello {name},\n  welcome.\n!print\n";
        let cmds = parse_source(src).expect("parses");
        assert_eq!(
            cmds[0].prompt.as_deref(),
            Some("Hello {name},\nwelcome.")
        );
        assert_eq!(cmds[1].prompt, None);
    }

    #[test]
    fn prompt_dedent_counts_wide_whitespace_in_chars() {
        let cmds = parse_source("!format\n\u{3000}a\n b\n").expect("parses");
        assert_eq!(cmds[0].prompt.as_deref(), Some("a\nb"));
    }

    #[test]
    fn prompt_attaches_to_last_chained_command() {
        let src = "!split !format\n{value}!\n";
        let cmds = parse_source(src).expect("parses");
        assert_eq!(cmds[0].prompt, None);
        assert_eq!(cmds[1].prompt.as_deref(), Some("{value}!"));
    }

    #[test]
    fn kwargs_args_and_coercion() {
        let cmds = parse_source("!split sep=, maxsize=100 3 4.5 word\n").expect("parses");
        let cmd = &cmds[0];
        assert_eq!(cmd.kwargs[0], ("sep".to_string(), Value::Str(",".into())));
        assert_eq!(cmd.kwargs[1], ("maxsize".to_string(), Value::Int(100)));
        assert_eq!(
            cmd.args,
            vec![Value::Int(3), Value::Float(4.5), Value::Str("word".into())]
        );
    }

    #[test]
    fn bindings_and_references() {
        let cmds = parse_source("!global >t1 >>saved !cross <t1 <<g1\n").expect("parses");
        assert_eq!(cmds[0].varnames, vec!["t1".to_string()]);
        assert_eq!(cmds[0].global_bind.as_deref(), Some("saved"));
        assert_eq!(
            cmds[1].table_refs,
            vec![
                TableRef { name: "t1".into(), global: false },
                TableRef { name: "g1".into(), global: true },
            ]
        );
    }

    #[test]
    fn anonymous_binding_slot() {
        let cmds = parse_source("!split > >inner\n").expect("parses");
        assert_eq!(cmds[0].varnames, vec!["".to_string(), "inner".to_string()]);
        assert_eq!(cmds[0].varname_at(0), None);
        assert_eq!(cmds[0].varname_at(1), Some("inner"));
    }

    #[test]
    fn hyphens_normalize_to_underscores() {
        let cmds = parse_source("!grade-up key-col=x\n").expect("parses");
        assert_eq!(cmds[0].opname, "grade_up");
        assert_eq!(cmds[0].kwargs[0].0, "key_col");
    }

    #[test]
    fn escapes_decode_in_string_values() {
        let cmds = parse_source("!join sep=\\n\n").expect("parses");
        assert_eq!(cmds[0].kwargs[0].1, Value::Str("\n".into()));
    }

    #[test]
    fn unknown_operator_is_fatal() {
        let reg = Registry::new();
        let cmds = parse_source("!no-such-op\n").expect("syntax ok");
        let err = validate(&reg, &cmds).expect_err("must fail");
        assert_eq!(
            err,
            ParseError::UnknownOperator { name: "no_such_op".into(), line: 1 }
        );
    }

    #[test]
    fn malformed_line_is_fatal() {
        assert!(parse_source("!\n").is_err());
    }

    #[test]
    fn prompt_before_any_command_is_ignored() {
        let cmds = parse_source("loose text\n!split\n").expect("parses");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].prompt, None);
    }
}
