//! Duration strings such as `"90s"`, `"1h30m"` or `"1.5h"`
//!
//! Config files written for the Go service use `time.ParseDuration` syntax,
//! which allows a decimal fraction on any unit. `humantime` only takes
//! integers, so `"1.5h"` would stop loading; this small nom grammar accepts
//! the same forms Go does.

use std::time::Duration;

use anyhow::{bail, Result};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, digit1},
    combinator::{all_consuming, map_res, opt, recognize, value},
    multi::many1,
    sequence::pair,
    IResult,
};
use serde::{Deserialize, Deserializer};

const NANOS_PER_MICRO: f64 = 1e3;
const NANOS_PER_MILLI: f64 = 1e6;
const NANOS_PER_SEC: f64 = 1e9;

/// Parse one or more `<number><unit>` terms and add them up.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. Numbers may carry a
/// decimal fraction. A zero total is allowed; callers decide what it means.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let nanos = match all_consuming(many1(term))(raw.trim()) {
        Ok((_, terms)) => terms.into_iter().sum::<f64>(),
        Err(_) => bail!("invalid duration {raw:?}, expected e.g. \"90s\" or \"1h30m\""),
    };

    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        bail!("duration {raw:?} is out of range");
    }

    Ok(Duration::from_nanos(nanos.round() as u64))
}

/// serde adapter for duration string fields
pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn term(input: &str) -> IResult<&str, f64> {
    let (input, amount) = number(input)?;
    let (input, scale) = unit(input)?;
    Ok((input, amount * scale))
}

fn number(input: &str) -> IResult<&str, f64> {
    map_res(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        str::parse::<f64>,
    )(input)
}

fn unit(input: &str) -> IResult<&str, f64> {
    alt((
        value(1.0, tag("ns")),
        value(NANOS_PER_MICRO, tag("us")),
        value(NANOS_PER_MICRO, tag("µs")),
        value(NANOS_PER_MICRO, tag("μs")),
        value(NANOS_PER_MILLI, tag("ms")),
        value(NANOS_PER_SEC, tag("s")),
        value(60.0 * NANOS_PER_SEC, tag("m")),
        value(3600.0 * NANOS_PER_SEC, tag("h")),
    ))(input)
}
