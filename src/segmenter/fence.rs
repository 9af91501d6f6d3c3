//! # Fence Lines
//!
//! Recognizes the two kinds of fence lines the segmenter cares about:
//!
//! * the definition fence, a line consisting solely of `:::`
//! * literal code fences, three or more backticks or tildes followed by an
//!   optional info string
//!
//! The two never overlap: `:::` is not a code fence, and `~~~`/```` ``` ```` are
//! never taken for a definition fence. A `:::` line inside an open code fence is
//! code, not a fence.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{multispace0, space0},
    combinator::{eof, map, verify},
    error::{context, VerboseError},
    sequence::{delimited, terminated},
    IResult,
};

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// The token opening and closing a definition block.
pub const DEFINITION_FENCE: &str = ":::";

const MIN_CODE_FENCE_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceLine {
    Definition,
    Code(CodeFence),
}

/// An opening code fence. Closed by a fence line of the same marker that is at
/// least as long and carries no info string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFence {
    pub marker: char,
    pub len: usize,
}

impl CodeFence {
    pub fn closes(&self, line: &str) -> bool {
        match parse_code_fence(line) {
            Ok((info, fence)) => {
                fence.marker == self.marker && fence.len >= self.len && info.trim().is_empty()
            }
            Err(_) => false,
        }
    }
}

#[tracing::instrument(level = "trace", skip(line))]
pub fn parse_definition_fence(line: &str) -> ParserResult<&str> {
    context(
        "definition fence",
        delimited(multispace0, tag(DEFINITION_FENCE), terminated(multispace0, eof)),
    )(line)
}

fn marker_run(marker: char) -> impl Fn(&str) -> ParserResult<CodeFence> {
    move |input| {
        map(
            verify(take_while1(|c| c == marker), |run: &str| {
                run.len() >= MIN_CODE_FENCE_LEN
            }),
            |run: &str| CodeFence {
                marker,
                len: run.len(),
            },
        )(input)
    }
}

/// Parses an opening or closing code fence; the remaining input is the info string.
#[tracing::instrument(level = "trace", skip(line))]
pub fn parse_code_fence(line: &str) -> ParserResult<CodeFence> {
    let (info, fence) = context(
        "code fence",
        delimited(space0, alt((marker_run('`'), marker_run('~'))), space0),
    )(line)?;
    // a backtick fence's info string may not contain backticks
    if fence.marker == '`' && info.contains('`') {
        return Err(nom::Err::Error(VerboseError {
            errors: vec![(
                info,
                nom::error::VerboseErrorKind::Context("backtick in info string"),
            )],
        }));
    }
    Ok((info, fence))
}

pub fn classify(line: &str) -> Option<FenceLine> {
    if parse_definition_fence(line).is_ok() {
        return Some(FenceLine::Definition);
    }
    parse_code_fence(line)
        .ok()
        .map(|(_, fence)| FenceLine::Code(fence))
}

pub fn is_definition_fence(line: &str) -> bool {
    parse_definition_fence(line).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_fence() {
        assert!(is_definition_fence(":::"));
        assert!(is_definition_fence("  ::: "));
        assert!(is_definition_fence(":::\r"));
        assert!(is_definition_fence("\t:::\t\r\n"));
        assert!(!is_definition_fence("::::"));
        assert!(!is_definition_fence("::: agent"));
        assert!(!is_definition_fence(":: :"));
    }

    #[test]
    fn test_code_fence() {
        let (info, fence) = parse_code_fence("```rust").unwrap();
        assert_eq!(fence, CodeFence { marker: '`', len: 3 });
        assert_eq!(info, "rust");

        let (_, fence) = parse_code_fence("~~~~").unwrap();
        assert_eq!(fence, CodeFence { marker: '~', len: 4 });

        assert!(parse_code_fence("``").is_err());
        assert!(parse_code_fence("``` a`b").is_err());
    }

    #[test]
    fn test_fences_do_not_overlap() {
        assert_eq!(classify(":::"), Some(FenceLine::Definition));
        assert!(matches!(classify("```"), Some(FenceLine::Code(_))));
        assert_eq!(classify("~ai[Agent](\"hi\")"), None);
        assert_eq!(classify("plain text"), None);
    }

    #[test]
    fn test_closing_fence() {
        let fence = CodeFence { marker: '`', len: 3 };
        assert!(fence.closes("```"));
        assert!(fence.closes("`````  "));
        assert!(!fence.closes("```js"));
        assert!(!fence.closes("~~~"));
        assert!(!fence.closes(":::"));
    }
}
