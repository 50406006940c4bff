//! Shared lexical rules for structured HTTP header values
//!
//! Token, quoted-string and parameter rules from RFC 9110 §5.6, written as
//! winnow parsers over `&mut &str`. Each header grammar composes these and
//! drives its own element loop so one malformed element never poisons the
//! rest of the header.

use winnow::combinator::fail;
use winnow::prelude::*;
use winnow::token::{any, take_while};
use winnow::ModalResult;

/// RFC 9110 `tchar`
pub(crate) fn is_tchar(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|' | '~'
        )
}

/// RFC 7235 `token68` body characters (without the trailing `=` padding)
fn is_token68_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '+' | '/')
}

pub(crate) fn is_ws(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Optional whitespace (`OWS` / `BWS`)
pub(crate) fn ows<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(0.., is_ws).parse_next(input)
}

pub(crate) fn token<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., is_tchar).parse_next(input)
}

/// A `quoted-string`, returned with the surrounding quotes removed and
/// `quoted-pair` escapes resolved.
pub(crate) fn quoted_string(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut value = String::new();
    loop {
        let chunk = take_while(0.., |c: char| c != '"' && c != '\\' && (c == '\t' || !c.is_control()))
            .parse_next(input)?;
        value.push_str(chunk);
        match any.parse_next(input)? {
            '"' => return Ok(value),
            '\\' => {
                let escaped = any.parse_next(input)?;
                value.push(escaped);
            }
            _ => return fail(input),
        }
    }
}

/// `token68`: credentials such as a Basic base64 blob. Must be followed by a
/// delimiter so that `realm==basic` is not mistaken for one.
pub(crate) fn token68<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    let start = *input;
    take_while(1.., is_token68_char).parse_next(input)?;
    take_while(0.., '=').parse_next(input)?;
    if !at_delimiter(input, &[',']) {
        return fail(input);
    }
    Ok(&start[..start.len() - input.len()])
}

/// Parameter value: a quoted-string or a bare token. Bare values may carry
/// trailing `=` padding, which unquoted tickets and nonces commonly do.
pub(crate) fn param_value(input: &mut &str) -> ModalResult<String> {
    if input.starts_with('"') {
        return quoted_string(input);
    }
    let start = *input;
    token(input)?;
    take_while(0.., '=').parse_next(input)?;
    Ok(start[..start.len() - input.len()].to_string())
}

/// `token BWS "=" BWS ( token / quoted-string )`, followed by whitespace, one
/// of the `delimiters`, or the end of input.
pub(crate) fn param(input: &mut &str, delimiters: &[char]) -> ModalResult<(String, String)> {
    let name = token(input)?;
    ows(input)?;
    '='.parse_next(input)?;
    ows(input)?;
    let value = param_value(input)?;
    if !at_delimiter(input, delimiters) {
        return fail(input);
    }
    Ok((name.to_string(), value))
}

/// True when the input is exhausted or continues with whitespace or one of
/// the given delimiters.
pub(crate) fn at_delimiter(input: &str, delimiters: &[char]) -> bool {
    match input.chars().next() {
        None => true,
        Some(c) => is_ws(c) || delimiters.contains(&c),
    }
}

/// Skip list separators (commas and whitespace) between elements.
pub(crate) fn skip_separators(input: &mut &str) {
    *input = input.trim_start_matches(|c: char| c == ',' || is_ws(c));
}

/// Advance past the current element up to (not including) the next
/// top-level character accepted by `stop`. Quoted strings are skipped
/// whole; with `angle_brackets`, so are `<...>` URI references.
/// Returns the skipped text.
pub(crate) fn skip_until<'i>(
    input: &mut &'i str,
    stop: impl Fn(char) -> bool,
    angle_brackets: bool,
) -> &'i str {
    let text = *input;
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;
    let mut end = text.len();

    for (idx, c) in text.char_indices() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        if in_angle {
            if c == '>' {
                in_angle = false;
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            '<' if angle_brackets => in_angle = true,
            c if stop(c) => {
                end = idx;
                break;
            }
            _ => {}
        }
    }

    *input = &text[end..];
    &text[..end]
}
