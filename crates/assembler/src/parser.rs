//! Assembly source line parser for labels, instructions, and directives.
//!
//! Each line is reduced to a [`ParsedLine`]: an optional label plus either
//! nothing, an instruction (mnemonic and raw operand strings), or a typed
//! directive. Operand and directive-argument expressions stay as text here;
//! they are evaluated by the passes, which own the symbol environment.
//!
//! Comments start at the first `;` outside string and character literals.
//! The label is the longest prefix ending at the first top-level `:`;
//! colons inside `[...]` or quotes do not count, so register-pair operands
//! like `[R2:R3]` survive on label-less lines.

use crate::expr::unescape;

/// A data/layout directive with its argument parsed into a typed payload.
///
/// Expression arguments are kept as text and evaluated in the pass that
/// owns the symbol state at the right time (`.org`, `.res`, `.align`,
/// `.define` in pass 1; `.byte`/`.word` values in pass 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `.org expr`: move the location counter.
    Org(String),
    /// `.byte`/`.db v, ...`: emit each expression as one byte.
    Byte(Vec<String>),
    /// `.word`/`.dw v, ...`: emit each expression as two bytes, low first.
    Word(Vec<String>),
    /// `.string`/`.asciiz "..."`: emit the decoded bytes plus a 0x00
    /// terminator (the terminator is added at emission).
    Str(Vec<u8>),
    /// `.define`/`.equ NAME expr`: bind a symbol.
    Define {
        /// Symbol name being bound.
        name: String,
        /// Value expression text.
        value: String,
    },
    /// `.res`/`.dsb expr`: reserve that many zero bytes.
    Res(String),
    /// `.align expr`: pad with zeros to the next multiple.
    Align(String),
    /// `.include "path"`: `None` when the path argument is missing.
    Include(Option<String>),
}

/// Body of a parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineBody {
    /// Blank or comment-only line (possibly carrying a standalone label).
    Empty,
    /// An instruction with its raw operand texts.
    Instruction {
        /// Mnemonic, case-folded to uppercase.
        mnemonic: String,
        /// Operands split on top-level commas, trimmed.
        operands: Vec<String>,
    },
    /// A typed directive.
    Directive(Directive),
}

/// A single parsed source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// Label attached on this line, if any (verbatim, case-sensitive).
    pub label: Option<String>,
    /// Line body.
    pub body: LineBody,
}

impl ParsedLine {
    /// A line with no label and no body.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            label: None,
            body: LineBody::Empty,
        }
    }
}

/// Line-level parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Directive name not in the directive set.
    UnknownDirective(String),
    /// String literal missing its closing quote.
    UnterminatedString,
    /// Non-whitespace text after a closing quote.
    TrailingText,
    /// Directive used without its required argument.
    MissingArgument(&'static str),
    /// Directive expected a quoted string argument.
    ExpectedString(&'static str),
    /// `.define` name does not match the symbol-name grammar.
    InvalidDefineName(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDirective(name) => write!(f, "Unknown directive: .{name}"),
            Self::UnterminatedString => write!(f, "unterminated string literal"),
            Self::TrailingText => write!(f, "unexpected text after string literal"),
            Self::MissingArgument(directive) => {
                write!(f, "directive .{directive} requires an argument")
            }
            Self::ExpectedString(directive) => {
                write!(f, "directive .{directive} expects a string literal")
            }
            Self::InvalidDefineName(name) => {
                write!(f, "invalid symbol name '{name}' in .DEFINE")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses one source line.
///
/// # Errors
///
/// Returns a [`ParseError`] for malformed directives or unterminated
/// string literals. Instruction-level problems (unknown mnemonics, bad
/// operands) are not detected here; they belong to the passes.
pub fn parse_line(line: &str) -> Result<ParsedLine, ParseError> {
    let stripped = strip_comment(line);
    let trimmed = stripped.trim();

    if trimmed.is_empty() {
        return Ok(ParsedLine::empty());
    }

    let (label, rest) = match split_label(trimmed) {
        Some((label, rest)) => (Some(label), rest.trim()),
        None => (None, trimmed),
    };

    if rest.is_empty() {
        return Ok(ParsedLine {
            label,
            body: LineBody::Empty,
        });
    }

    let body = if rest.starts_with('.') {
        LineBody::Directive(parse_directive(rest)?)
    } else {
        parse_instruction(rest)
    };

    Ok(ParsedLine { label, body })
}

/// Strips a trailing `;` comment, ignoring semicolons inside string and
/// character literals.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut in_char = false;
    let mut escaped = false;

    for (pos, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string || in_char => escaped = true,
            '"' if !in_char => in_string = !in_string,
            '\'' if !in_string => in_char = !in_char,
            ';' if !in_string && !in_char => return &line[..pos],
            _ => {}
        }
    }
    line
}

/// Splits off a leading label at the first top-level colon.
fn split_label(text: &str) -> Option<(String, &str)> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut in_char = false;
    let mut escaped = false;

    for (pos, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string || in_char => escaped = true,
            '"' if !in_char => in_string = !in_string,
            '\'' if !in_string => in_char = !in_char,
            '[' | '(' if !in_string && !in_char => depth += 1,
            ']' | ')' if !in_string && !in_char => depth -= 1,
            ':' if depth == 0 && !in_string && !in_char => {
                let candidate = text[..pos].trim();
                return is_valid_label(candidate)
                    .then(|| (candidate.to_string(), &text[pos + 1..]));
            }
            _ => {}
        }
    }
    None
}

/// Label grammar: an identifier, or `.` followed by an identifier for
/// local labels.
fn is_valid_label(text: &str) -> bool {
    let body = text.strip_prefix('.').unwrap_or(text);
    let mut chars = body.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Symbol-name grammar for `.define`: `[A-Za-z_][A-Za-z0-9_.]*`.
fn is_valid_symbol_name(text: &str) -> bool {
    !text.starts_with('.') && is_valid_label(text)
}

/// Splits text on top-level commas; brackets, parentheses, and quotes
/// suppress splitting.
fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut in_char = false;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            escaped = false;
            current.push(c);
            continue;
        }
        match c {
            '\\' if in_string || in_char => {
                escaped = true;
                current.push(c);
            }
            '"' if !in_char => {
                in_string = !in_string;
                current.push(c);
            }
            '\'' if !in_string => {
                in_char = !in_char;
                current.push(c);
            }
            '[' | '(' if !in_string && !in_char => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' if !in_string && !in_char => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 && !in_string && !in_char => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

fn parse_instruction(text: &str) -> LineBody {
    let (mnemonic, rest) = text
        .find(char::is_whitespace)
        .map_or((text, ""), |pos| (&text[..pos], text[pos..].trim()));

    let operands = if rest.is_empty() {
        Vec::new()
    } else {
        split_top_level_commas(rest)
    };

    LineBody::Instruction {
        mnemonic: mnemonic.to_ascii_uppercase(),
        operands,
    }
}

fn parse_directive(text: &str) -> Result<Directive, ParseError> {
    let without_dot = &text[1..];
    let (name, arg) = without_dot
        .find(char::is_whitespace)
        .map_or((without_dot, ""), |pos| {
            (&without_dot[..pos], without_dot[pos..].trim())
        });

    match name.to_ascii_uppercase().as_str() {
        "ORG" => require_argument("ORG", arg).map(Directive::Org),
        "BYTE" | "DB" => {
            require_argument("BYTE", arg)?;
            Ok(Directive::Byte(split_top_level_commas(arg)))
        }
        "WORD" | "DW" => {
            require_argument("WORD", arg)?;
            Ok(Directive::Word(split_top_level_commas(arg)))
        }
        "STRING" | "ASCIIZ" => parse_string_literal("STRING", arg).map(Directive::Str),
        "DEFINE" | "EQU" => parse_define(arg),
        "RES" | "DSB" => require_argument("RES", arg).map(Directive::Res),
        "ALIGN" => require_argument("ALIGN", arg).map(Directive::Align),
        "INCLUDE" => Ok(Directive::Include(parse_include_path(arg))),
        _ => Err(ParseError::UnknownDirective(name.to_ascii_uppercase())),
    }
}

fn require_argument(directive: &'static str, arg: &str) -> Result<String, ParseError> {
    if arg.is_empty() {
        Err(ParseError::MissingArgument(directive))
    } else {
        Ok(arg.to_string())
    }
}

fn parse_define(arg: &str) -> Result<Directive, ParseError> {
    let (name, value) = arg
        .find(char::is_whitespace)
        .map_or((arg, ""), |pos| (&arg[..pos], arg[pos..].trim()));

    if name.is_empty() || value.is_empty() {
        return Err(ParseError::MissingArgument("DEFINE"));
    }
    if !is_valid_symbol_name(name) {
        return Err(ParseError::InvalidDefineName(name.to_string()));
    }

    Ok(Directive::Define {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Decodes a quoted string literal into bytes, applying the escape set.
fn parse_string_literal(directive: &'static str, arg: &str) -> Result<Vec<u8>, ParseError> {
    let trimmed = arg.trim();
    let Some(rest) = trimmed.strip_prefix('"') else {
        return Err(if trimmed.is_empty() {
            ParseError::MissingArgument(directive)
        } else {
            ParseError::ExpectedString(directive)
        });
    };

    let mut bytes = Vec::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let leftover: String = chars.collect();
                if leftover.trim().is_empty() {
                    return Ok(bytes);
                }
                return Err(ParseError::TrailingText);
            }
            '\\' => {
                let escaped = chars.next().ok_or(ParseError::UnterminatedString)?;
                push_byte(&mut bytes, unescape(escaped));
            }
            other => push_byte(&mut bytes, other),
        }
    }
    Err(ParseError::UnterminatedString)
}

#[allow(clippy::cast_possible_truncation)]
fn push_byte(bytes: &mut Vec<u8>, c: char) {
    bytes.push((c as u32 & 0xFF) as u8);
}

fn parse_include_path(arg: &str) -> Option<String> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix('"') {
        let end = rest.find('"')?;
        return Some(rest[..end].to_string());
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_comment_lines() {
        assert_eq!(parse_line(""), Ok(ParsedLine::empty()));
        assert_eq!(parse_line("   "), Ok(ParsedLine::empty()));
        assert_eq!(parse_line("; just a comment"), Ok(ParsedLine::empty()));
        assert_eq!(parse_line("  ; indented comment"), Ok(ParsedLine::empty()));
    }

    #[test]
    fn label_only_line() {
        let parsed = parse_line("start:").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("start"));
        assert_eq!(parsed.body, LineBody::Empty);
    }

    #[test]
    fn local_label_only_line() {
        let parsed = parse_line("  .loop:  ; spin").unwrap();
        assert_eq!(parsed.label.as_deref(), Some(".loop"));
        assert_eq!(parsed.body, LineBody::Empty);
    }

    #[test]
    fn label_with_instruction() {
        let parsed = parse_line("init: LD R0, #1").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("init"));
        assert_eq!(
            parsed.body,
            LineBody::Instruction {
                mnemonic: "LD".into(),
                operands: vec!["R0".into(), "#1".into()],
            }
        );
    }

    #[test]
    fn mnemonic_is_case_folded_but_label_is_not() {
        let parsed = parse_line("Start: ld r0, #1").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("Start"));
        let LineBody::Instruction { mnemonic, .. } = parsed.body else {
            panic!("expected instruction");
        };
        assert_eq!(mnemonic, "LD");
    }

    #[test]
    fn register_pair_colon_is_not_a_label() {
        let parsed = parse_line("LD R0, [R2:R3]").unwrap();
        assert_eq!(parsed.label, None);
        assert_eq!(
            parsed.body,
            LineBody::Instruction {
                mnemonic: "LD".into(),
                operands: vec!["R0".into(), "[R2:R3]".into()],
            }
        );
    }

    #[test]
    fn label_before_register_pair_operand() {
        let parsed = parse_line("copy: ST R1, [R4:R5]").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("copy"));
    }

    #[test]
    fn comment_semicolon_inside_string_is_kept() {
        let parsed = parse_line(".string \"a;b\" ; real comment").unwrap();
        assert_eq!(
            parsed.body,
            LineBody::Directive(Directive::Str(vec![b'a', b';', b'b']))
        );
    }

    #[test]
    fn comment_semicolon_inside_char_literal_is_kept() {
        let parsed = parse_line("LD R0, #';'").unwrap();
        assert_eq!(
            parsed.body,
            LineBody::Instruction {
                mnemonic: "LD".into(),
                operands: vec!["R0".into(), "#';'".into()],
            }
        );
    }

    #[test]
    fn operands_split_on_top_level_commas_only() {
        let parsed = parse_line("LD R0, [table + R1]").unwrap();
        let LineBody::Instruction { operands, .. } = parsed.body else {
            panic!("expected instruction");
        };
        assert_eq!(operands, vec!["R0".to_string(), "[table + R1]".to_string()]);

        let parsed = parse_line(".byte (1 + 2) * 3, lo, hi").unwrap();
        assert_eq!(
            parsed.body,
            LineBody::Directive(Directive::Byte(vec![
                "(1 + 2) * 3".into(),
                "lo".into(),
                "hi".into(),
            ]))
        );
    }

    #[test]
    fn instruction_without_operands() {
        let parsed = parse_line("RET").unwrap();
        assert_eq!(
            parsed.body,
            LineBody::Instruction {
                mnemonic: "RET".into(),
                operands: vec![],
            }
        );
    }

    #[test]
    fn directive_org() {
        let parsed = parse_line(".org $0200").unwrap();
        assert_eq!(
            parsed.body,
            LineBody::Directive(Directive::Org("$0200".into()))
        );
    }

    #[test]
    fn directive_aliases() {
        assert_eq!(
            parse_line(".db 1, 2").unwrap().body,
            LineBody::Directive(Directive::Byte(vec!["1".into(), "2".into()]))
        );
        assert_eq!(
            parse_line(".dw $1234").unwrap().body,
            LineBody::Directive(Directive::Word(vec!["$1234".into()]))
        );
        assert_eq!(
            parse_line(".asciiz \"hi\"").unwrap().body,
            LineBody::Directive(Directive::Str(vec![b'h', b'i']))
        );
        assert_eq!(
            parse_line(".equ LIMIT 10").unwrap().body,
            LineBody::Directive(Directive::Define {
                name: "LIMIT".into(),
                value: "10".into(),
            })
        );
        assert_eq!(
            parse_line(".dsb 8").unwrap().body,
            LineBody::Directive(Directive::Res("8".into()))
        );
    }

    #[test]
    fn directive_names_are_case_insensitive() {
        assert_eq!(
            parse_line(".ORG 0").unwrap().body,
            LineBody::Directive(Directive::Org("0".into()))
        );
        assert_eq!(
            parse_line(".Byte 1").unwrap().body,
            LineBody::Directive(Directive::Byte(vec!["1".into()]))
        );
    }

    #[test]
    fn directive_string_escapes() {
        let parsed = parse_line(".string \"A\\nB\\0\"").unwrap();
        assert_eq!(
            parsed.body,
            LineBody::Directive(Directive::Str(vec![0x41, 0x0A, 0x42, 0x00]))
        );
    }

    #[test]
    fn directive_string_unknown_escape_keeps_char() {
        let parsed = parse_line(".string \"\\q\"").unwrap();
        assert_eq!(parsed.body, LineBody::Directive(Directive::Str(vec![b'q'])));
    }

    #[test]
    fn directive_string_errors() {
        assert_eq!(
            parse_line(".string \"open"),
            Err(ParseError::UnterminatedString)
        );
        assert_eq!(
            parse_line(".string 42"),
            Err(ParseError::ExpectedString("STRING"))
        );
        assert_eq!(
            parse_line(".string \"a\" junk"),
            Err(ParseError::TrailingText)
        );
    }

    #[test]
    fn directive_include_paths() {
        assert_eq!(
            parse_line(".include \"lib/math.f8\"").unwrap().body,
            LineBody::Directive(Directive::Include(Some("lib/math.f8".into())))
        );
        assert_eq!(
            parse_line(".include").unwrap().body,
            LineBody::Directive(Directive::Include(None))
        );
    }

    #[test]
    fn directive_define_validation() {
        assert_eq!(
            parse_line(".define X"),
            Err(ParseError::MissingArgument("DEFINE"))
        );
        assert_eq!(
            parse_line(".define 9lives 1"),
            Err(ParseError::InvalidDefineName("9lives".into()))
        );
    }

    #[test]
    fn directive_missing_arguments() {
        assert_eq!(parse_line(".org"), Err(ParseError::MissingArgument("ORG")));
        assert_eq!(parse_line(".byte"), Err(ParseError::MissingArgument("BYTE")));
        assert_eq!(parse_line(".res"), Err(ParseError::MissingArgument("RES")));
        assert_eq!(
            parse_line(".align"),
            Err(ParseError::MissingArgument("ALIGN"))
        );
    }

    #[test]
    fn unknown_directive() {
        assert_eq!(
            parse_line(".bogus 1"),
            Err(ParseError::UnknownDirective("BOGUS".into()))
        );
    }

    #[test]
    fn label_on_directive_line() {
        let parsed = parse_line("table: .word 1, 2, 3").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("table"));
        assert!(matches!(
            parsed.body,
            LineBody::Directive(Directive::Word(_))
        ));
    }

    #[test]
    fn invalid_label_candidate_falls_through_to_instruction() {
        // `9bad` is not a label, so the colon stays in the mnemonic text
        // and pass 1 reports an unknown opcode.
        let parsed = parse_line("9bad: NOP").unwrap();
        assert_eq!(parsed.label, None);
        let LineBody::Instruction { mnemonic, .. } = parsed.body else {
            panic!("expected instruction");
        };
        assert_eq!(mnemonic, "9BAD:");
    }
}
