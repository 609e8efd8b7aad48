//! Query string canonicalization using nom
//!
//! Accepted shape (`application/x-www-form-urlencoded`, `&` separated only):
//! ```text
//! query   = segment *( "&" segment )
//! segment = [ key [ "=" value ] ]
//! key     = *( escape / <any char except & = ; %> )
//! value   = *( escape / <any char except & ; %> )
//! escape  = "%" HEXDIG HEXDIG
//! ```
//!
//! A stray `%` or a `;` separator rejects the whole query. Valid queries are
//! decoded to bytes, stably sorted by key (values of a repeated key keep their
//! order) and re-encoded, so the output is itself a valid input that
//! normalizes to the same string. Decoding never goes through `str`, so an
//! escape such as `%FF` is carried through unchanged.

use nom::{
    branch::alt,
    bytes::complete::{take_while1, take_while_m_n},
    character::complete::char,
    combinator::{all_consuming, opt, recognize},
    multi::{many0, separated_list0},
    sequence::pair,
    IResult,
};
use percent_encoding::percent_decode_str;
use url::form_urlencoded;

/// Why a raw query string was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// `;` used as a pair separator
    #[error("invalid semicolon separator in query at byte {0}")]
    Semicolon(usize),

    /// `%` not followed by two hex digits
    #[error("invalid percent escape in query at byte {0}")]
    BadEscape(usize),
}

/// Canonical encoding of a raw query string.
///
/// The empty query (and any query made only of empty segments) normalizes to
/// the empty string.
pub fn normalize_query(raw: &str) -> Result<String, QueryError> {
    if raw.is_empty() {
        return Ok(String::new());
    }

    let segments = match all_consuming(segments)(raw) {
        Ok((_, segments)) => segments,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            return Err(rejection(raw, e.input));
        }
        Err(nom::Err::Incomplete(_)) => return Err(QueryError::BadEscape(raw.len())),
    };

    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = segments
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            (decode(key), decode(value))
        })
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let encoded: Vec<String> = pairs
        .iter()
        .map(|(key, value)| {
            let mut pair: String = form_urlencoded::byte_serialize(key).collect();
            pair.push('=');
            pair.extend(form_urlencoded::byte_serialize(value));
            pair
        })
        .collect();

    Ok(encoded.join("&"))
}

/// Decode one component to raw bytes. Escapes that are not valid UTF-8
/// survive as the same bytes, so distinct inputs never collapse together.
fn decode(component: &str) -> Vec<u8> {
    let spaced = component.replace('+', " ");
    percent_decode_str(&spaced).collect()
}

fn rejection(raw: &str, rest: &str) -> QueryError {
    let at = raw.len() - rest.len();
    if rest.starts_with(';') {
        QueryError::Semicolon(at)
    } else {
        QueryError::BadEscape(at)
    }
}

fn segments(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list0(char('&'), segment)(input)
}

fn segment(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        component(is_key_char),
        opt(pair(char('='), component(is_value_char))),
    ))(input)
}

fn component<'a>(allowed: fn(char) -> bool) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    recognize(many0(alt((escape, take_while1(allowed)))))
}

fn escape(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        char('%'),
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
    ))(input)
}

fn is_key_char(c: char) -> bool {
    !matches!(c, '&' | '=' | ';' | '%')
}

fn is_value_char(c: char) -> bool {
    !matches!(c, '&' | ';' | '%')
}
