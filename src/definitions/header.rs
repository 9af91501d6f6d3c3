//! nom grammar for definition header lines, `@kind[name](params)`, and for the
//! `tool:[Name]` capability binding.

use nom::{
    bytes::complete::{is_not, tag, tag_no_case, take_till},
    character::complete::{char, multispace0},
    combinator::{map, verify},
    error::{context, VerboseError},
    sequence::{delimited, preceded, tuple},
    IResult,
};

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header<'a> {
    pub kind: &'a str,
    pub name: &'a str,
    pub params: &'a str,
}

fn non_blank(value: &&str) -> bool {
    !value.trim().is_empty()
}

/// Parses a header at the start of a (trimmed) line. Anything after the closing
/// parenthesis is left in the remaining input and ignored by callers.
#[tracing::instrument(level = "trace", skip(input))]
pub fn parse_header(input: &str) -> ParserResult<Header<'_>> {
    context(
        "definition header",
        map(
            tuple((
                preceded(
                    char('@'),
                    context("kind", verify(is_not("[\n"), non_blank)),
                ),
                context(
                    "name",
                    delimited(char('['), verify(is_not("]\n"), non_blank), char(']')),
                ),
                context(
                    "params",
                    delimited(char('('), take_till(|c| c == ')' || c == '\n'), char(')')),
                ),
            )),
            |(kind, name, params): (&str, &str, &str)| Header {
                kind: kind.trim(),
                name: name.trim(),
                params: params.trim(),
            },
        ),
    )(input)
}

/// `tool:[Name]`, case-insensitive, optional whitespace around the colon.
pub fn parse_tool_binding(input: &str) -> ParserResult<&str> {
    context(
        "tool binding",
        map(
            preceded(
                tuple((tag_no_case("tool"), multispace0, tag(":"), multispace0)),
                delimited(char('['), verify(is_not("]\n"), non_blank), char(']')),
            ),
            str::trim,
        ),
    )(input)
}

/// Finds the first `tool:[Name]` anywhere in `text`. Returns the bound name and
/// the byte range of the match.
pub fn find_tool_binding(text: &str) -> Option<(&str, std::ops::Range<usize>)> {
    text.char_indices()
        .filter(|(_, c)| c.eq_ignore_ascii_case(&'t'))
        .find_map(|(start, _)| {
            parse_tool_binding(&text[start..])
                .ok()
                .map(|(rest, name)| (name, start..text.len() - rest.len()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let (rest, header) = parse_header("@define[Wallet](ABC123)").unwrap();
        assert_eq!(
            header,
            Header {
                kind: "define",
                name: "Wallet",
                params: "ABC123"
            }
        );
        assert_eq!(rest, "");

        let (_, header) = parse_header("@ai[ Summarizer ](\"gpt-4o-mini\",[X]) trailing").unwrap();
        assert_eq!(header.name, "Summarizer");
        assert_eq!(header.params, "\"gpt-4o-mini\",[X]");

        let (_, header) = parse_header("@tool[Empty]()").unwrap();
        assert_eq!(header.params, "");
    }

    #[test]
    fn test_malformed_headers() {
        assert!(parse_header("@define Wallet").is_err());
        assert!(parse_header("@define[Wallet]").is_err());
        assert!(parse_header("@[Wallet](x)").is_err());
        assert!(parse_header("@ai[](x)").is_err());
        assert!(parse_header("define[Wallet](x)").is_err());
        assert!(parse_header("@ai[A](unclosed").is_err());
    }

    #[test]
    fn test_tool_binding() {
        assert_eq!(parse_tool_binding("tool:[Balance]").unwrap().1, "Balance");
        assert_eq!(parse_tool_binding("TOOL : [ Balance ]").unwrap().1, "Balance");
        assert!(parse_tool_binding("tool:Balance").is_err());

        let text = "uses tool:[Balance] for lookups";
        let (name, range) = find_tool_binding(text).unwrap();
        assert_eq!(name, "Balance");
        assert_eq!(&text[range], "tool:[Balance]");
        assert!(find_tool_binding("no binding here").is_none());
    }
}
