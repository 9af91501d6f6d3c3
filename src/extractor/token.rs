//! # Call Tokens
//!
//! One grammar for every inline call form. A block is scanned once; at each `~`
//! the alternatives below are tried in order and the first that matches wins:
//!
//! | Form | Kind |
//! |---|---|
//! | `~ai-image[Agent](prompt)` | Image |
//! | `~ai-speech[Agent](prompt)` | Speech |
//! | `~intent[Agent](<Label>, prompt)` | Intent |
//! | `~define[Name](Label)` | VariableInput |
//! | `~ai[Agent]("""multi-line prompt""")` | Text |
//! | `~ai[Agent](unquoted prompt, (nested) parens allowed)` | Text |
//! | `~ai[Agent]("quoted prompt")` | Text |
//!
//! Image, speech and define forms are single-line. Text and intent bodies may
//! span lines. Text that matches none of the forms stays literal.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until},
    character::complete::{char, multispace0},
    combinator::{map, not, peek, value, verify},
    error::{context, ErrorKind, ParseError, VerboseError},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use super::CallKind;

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

const TRIPLE_QUOTE: &str = "\"\"\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallToken<'a> {
    pub kind: CallKind,
    /// Agent name, or the variable name of a `~define` field.
    pub target: &'a str,
    /// Prompt with surrounding quotes and whitespace removed. Empty for `~define`.
    pub prompt: &'a str,
    /// Intent button text or define field label.
    pub label: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Call {
        token: CallToken<'a>,
        /// The exact source text of the call.
        source: &'a str,
    },
}

fn fail<'a, T>(input: &'a str, kind: ErrorKind) -> ParserResult<'a, T> {
    Err(nom::Err::Error(VerboseError::from_error_kind(input, kind)))
}

fn non_blank(value: &&str) -> bool {
    !value.trim().is_empty()
}

fn unquote(body: &str) -> &str {
    let body = body.trim();
    if body.len() >= 2 && body.starts_with('"') && body.ends_with('"') {
        body[1..body.len() - 1].trim()
    } else {
        body
    }
}

fn agent_name(input: &str) -> ParserResult<&str> {
    context(
        "agent name",
        map(
            delimited(char('['), verify(is_not("]\n"), non_blank), char(']')),
            str::trim,
        ),
    )(input)
}

/// Text up to the `)` that closes the call, skipping over nested parentheses.
/// The closing parenthesis is not consumed.
fn balanced(input: &str) -> ParserResult<&str> {
    let mut depth = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return Ok((&input[i..], &input[..i])),
            ')' => depth -= 1,
            _ => {}
        }
    }
    fail(input, ErrorKind::TakeUntil)
}

/// `(body)` on a single line.
fn single_line_body(input: &str) -> ParserResult<&str> {
    verify(
        map(delimited(char('('), is_not(")\n"), char(')')), unquote),
        |body: &str| !body.is_empty(),
    )(input)
}

fn media_call(input: &str) -> ParserResult<CallToken<'_>> {
    let (input, kind) = alt((
        value(CallKind::Image, tag("~ai-image")),
        value(CallKind::Speech, tag("~ai-speech")),
    ))(input)?;
    let (input, (target, prompt)) = tuple((agent_name, single_line_body))(input)?;
    Ok((
        input,
        CallToken {
            kind,
            target,
            prompt,
            label: None,
        },
    ))
}

fn intent_call(input: &str) -> ParserResult<CallToken<'_>> {
    let (input, target) = preceded(tag("~intent"), agent_name)(input)?;
    let (input, label) = preceded(
        char('('),
        delimited(char('<'), verify(is_not(">\n"), non_blank), char('>')),
    )(input)?;
    let (input, body) = preceded(
        tuple((multispace0, char(','), multispace0)),
        terminated(balanced, char(')')),
    )(input)?;
    let prompt = unquote(body);
    if prompt.is_empty() {
        return fail(input, ErrorKind::Verify);
    }
    Ok((
        input,
        CallToken {
            kind: CallKind::Intent,
            target,
            prompt,
            label: Some(label.trim()),
        },
    ))
}

fn define_call(input: &str) -> ParserResult<CallToken<'_>> {
    let (input, (target, label)) =
        preceded(tag("~define"), tuple((agent_name, single_line_body)))(input)?;
    Ok((
        input,
        CallToken {
            kind: CallKind::VariableInput,
            target,
            prompt: "",
            label: Some(label),
        },
    ))
}

fn triple_quoted_body(input: &str) -> ParserResult<&str> {
    map(
        delimited(
            preceded(multispace0, tag(TRIPLE_QUOTE)),
            take_until(TRIPLE_QUOTE),
            tuple((tag(TRIPLE_QUOTE), multispace0, char(')'))),
        ),
        str::trim,
    )(input)
}

fn unquoted_body(input: &str) -> ParserResult<&str> {
    map(
        preceded(
            tuple((multispace0, peek(not(char('"'))))),
            terminated(balanced, char(')')),
        ),
        str::trim,
    )(input)
}

/// A quoted body ends at the first `"` followed by optional whitespace and `)`,
/// so the prompt itself may contain quotes.
fn quoted_body(input: &str) -> ParserResult<&str> {
    let (rest, _) = preceded(multispace0, char('"'))(input)?;
    for (i, _) in rest.match_indices('"') {
        let closing: ParserResult<char> = preceded(multispace0, char(')'))(&rest[i + 1..]);
        if let Ok((remaining, _)) = closing {
            return Ok((remaining, rest[..i].trim()));
        }
    }
    fail(rest, ErrorKind::Char)
}

fn text_call(input: &str) -> ParserResult<CallToken<'_>> {
    let (input, target) = preceded(tag("~ai"), agent_name)(input)?;
    let (input, prompt) = preceded(
        char('('),
        verify(
            alt((
                context("triple quoted prompt", triple_quoted_body),
                context("unquoted prompt", unquoted_body),
                context("quoted prompt", quoted_body),
            )),
            |prompt: &str| !prompt.is_empty(),
        ),
    )(input)?;
    Ok((
        input,
        CallToken {
            kind: CallKind::Text,
            target,
            prompt,
            label: None,
        },
    ))
}

pub fn parse_call(input: &str) -> ParserResult<CallToken<'_>> {
    context(
        "call",
        alt((media_call, intent_call, define_call, text_call)),
    )(input)
}

/// Splits `text` into literal runs and calls. Concatenating every segment's
/// source gives back `text`.
#[tracing::instrument(level = "trace", skip(text))]
pub fn tokenize(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('~') {
        let start = pos + offset;
        match parse_call(&text[start..]) {
            Ok((rest, token)) => {
                let end = text.len() - rest.len();
                if start > literal_start {
                    segments.push(Segment::Literal(&text[literal_start..start]));
                }
                segments.push(Segment::Call {
                    token,
                    source: &text[start..end],
                });
                literal_start = end;
                pos = end;
            }
            Err(_) => pos = start + 1,
        }
    }
    if literal_start < text.len() {
        segments.push(Segment::Literal(&text[literal_start..]));
    }
    segments
}

/// Just the call tokens of `text`, in order.
pub fn calls(text: &str) -> impl Iterator<Item = CallToken<'_>> {
    tokenize(text).into_iter().filter_map(|segment| match segment {
        Segment::Call { token, .. } => Some(token),
        Segment::Literal(_) => None,
    })
}
