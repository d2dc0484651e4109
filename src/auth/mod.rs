//! # HTTP authentication
//!
//! This module implements the Privacy Pass HTTP Authentication Scheme used
//! to deliver token challenges and redeem tokens:
//!
//!  - [`authenticate`] covers the challenge phase (`WWW-Authenticate`).
//!  - [`authorize`] covers the redemption phase (`Authorization`).

pub mod authenticate;
pub mod authorize;

use nom::{bytes::complete::take_while1, character::complete::char, multi::many0, IResult};

fn space(input: &str) -> IResult<&str, char> {
    char(' ')(input)
}

fn opt_spaces(input: &str) -> IResult<&str, Vec<char>> {
    many0(space)(input)
}

fn key_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-')(input)
}

fn base64_char(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '-' | '_' | '='))(
        input,
    )
}

fn num_char(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_digit())(input)
}
