use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag_no_case, take_till1, take_while, take_while_m_n},
    character::complete::{alpha1, char, digit1, hex_digit1},
    combinator::{all_consuming, map_opt},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, terminated},
};

use crate::constants::{COMMAND_CHAR, MAX_USERNAME_LENGTH};

// Command line grammar
//
//   command  = "/" *WSP keyword *( 1*WSP arg ) ; after trimming
//   keyword  = 1*( any char except whitespace )
//   arg      = 1*( any char except whitespace )

fn token_parser(input: &str) -> IResult<&str, &str> {
    take_till1(char::is_whitespace).parse(input)
}

fn whitespace1_parser(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| !c.is_whitespace()).parse(input)
}

pub fn command_line_parser(input: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(preceded(
        (char(COMMAND_CHAR), take_while(char::is_whitespace)),
        separated_list1(whitespace1_parser, token_parser),
    ))
    .parse(input)
}

/// Splits `"/keyword arg ..."` into tokens, keyword first. `None` when the
/// trimmed text is not a command.
pub fn parse_command_line(text: &str) -> Option<Vec<String>> {
    let (_, tokens) = command_line_parser(text.trim()).ok()?;
    Some(tokens.into_iter().map(str::to_owned).collect())
}

//   username = 1*24( ALPHA / DIGIT / "_" / "-" )
fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

pub fn username_parser(input: &str) -> IResult<&str, &str> {
    all_consuming(take_while_m_n(1, MAX_USERNAME_LENGTH, is_username_char)).parse(input)
}

// Profanity word list: words separated by commas and/or whitespace.
fn is_word_separator(c: char) -> bool {
    c == ',' || c.is_whitespace()
}

pub fn word_list_parser(input: &str) -> IResult<&str, Vec<&str>> {
    terminated(
        many0(preceded(
            take_while(is_word_separator),
            take_till1(is_word_separator),
        )),
        take_while(is_word_separator),
    )
    .parse(input)
}

// Character references: &name; &#DDD; &#xHHH;
fn named_entity(name: &str) -> Option<char> {
    let c = match name.to_ascii_lowercase().as_str() {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "zwsp" => '\u{200b}',
        _ => return None,
    };
    Some(c)
}

pub fn html_entity_parser(input: &str) -> IResult<&str, char> {
    delimited(
        char('&'),
        alt((
            preceded(
                tag_no_case("#x"),
                map_opt(hex_digit1, |hex: &str| {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                }),
            ),
            preceded(
                char('#'),
                map_opt(digit1, |dec: &str| {
                    dec.parse::<u32>().ok().and_then(char::from_u32)
                }),
            ),
            map_opt(alpha1, named_entity),
        )),
        char(';'),
    )
    .parse(input)
}
